//! Postgres implementation of the CRM store.
//!
//! Rows are read into `Db*` structs with `sqlx::FromRow` and converted into
//! domain types. Money columns are `BIGINT` minor units; typed JSON (discount
//! rules, segment kinds, notification targets) is stored as `JSONB`.
//!
//! Balance-changing writes run inside one database transaction that locks the
//! customer row (`SELECT ... FOR UPDATE`). Campaign caps are serialised with a
//! transaction-scoped advisory lock per campaign.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{check_ledger, CrmStore, CustomerHistory, StoreError, StoreResult};
use crate::domains::campaigns::models::{
    Campaign, CampaignFilters, CampaignStatus, CampaignWithUsage, DiscountRule, UsageCounts,
    ValidHours,
};
use crate::domains::customers::models::{Customer, CustomerFilters, LoyaltyLevel, Tier};
use crate::domains::dashboard::models::{
    DailyRevenue, DashboardMetrics, DashboardWindow, RecentActivity,
};
use crate::domains::money::Money;
use crate::domains::notifications::models::{
    CustomerNotification, NotificationLog, NotificationTarget, PushTarget,
};
use crate::domains::points::models::{
    PointEntry, PointHistory, PointHistoryFilters, PointHistoryView, PointStats,
};
use crate::domains::products::models::{Product, ProductFilters, ProductSales};
use crate::domains::segments::criteria::PurchaseFact;
use crate::domains::segments::models::{RefreshOutcome, Segment, SegmentKind, SegmentMember};
use crate::domains::transactions::models::{
    AppliedCampaign, SaleRecord, Transaction, TransactionFilters, TransactionItem,
    TransactionSummary, TransactionView,
};
use crate::domains::users::{Restaurant, User};
use shared::config::DatabaseConfig;
use shared::{Page, PageRequest};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

        info!("Initializing database connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect(url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "Database connection pool created successfully"
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Unexpected(anyhow::anyhow!("invalid {} in database: {}", what, value))
}

fn conflict_on_unique(err: sqlx::Error, message: impl Into<String>) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message.into()),
        _ => StoreError::Database(err),
    }
}

fn paging(page: PageRequest) -> (i64, i64) {
    (page.limit() as i64, page.offset() as i64)
}

fn search_term(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct DbUser {
    id: Uuid,
    restaurant_id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

fn user_from_db(row: DbUser) -> StoreResult<User> {
    Ok(User {
        role: row.role.parse().map_err(|_| corrupt("role", &row.role))?,
        id: row.id,
        restaurant_id: row.restaurant_id,
        email: row.email,
        name: row.name,
        password_hash: row.password_hash,
        created_at: row.created_at,
    })
}

#[derive(Debug, FromRow)]
struct DbTier {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    display_name: String,
    level: i32,
    min_points: i64,
    point_multiplier: Decimal,
    discount_percent: Decimal,
    color: Option<String>,
}

impl From<DbTier> for Tier {
    fn from(row: DbTier) -> Self {
        Tier {
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            display_name: row.display_name,
            level: row.level,
            min_points: row.min_points,
            point_multiplier: row.point_multiplier,
            discount_percent: row.discount_percent,
            color: row.color,
        }
    }
}

const CUSTOMER_COLUMNS: &str = "id, restaurant_id, name, email, phone, birth_date, points, level, \
     tier_id, total_spent, visit_count, last_visit, created_at, updated_at";

#[derive(Debug, FromRow)]
struct DbCustomer {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    birth_date: Option<NaiveDate>,
    points: i64,
    level: String,
    tier_id: Option<Uuid>,
    total_spent: i64,
    visit_count: i64,
    last_visit: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn customer_from_db(row: DbCustomer) -> StoreResult<Customer> {
    Ok(Customer {
        level: row.level.parse().map_err(|_| corrupt("loyalty level", &row.level))?,
        id: row.id,
        restaurant_id: row.restaurant_id,
        name: row.name,
        email: row.email,
        phone: row.phone,
        birth_date: row.birth_date,
        points: row.points,
        tier_id: row.tier_id,
        total_spent: Money::from_minor(row.total_spent),
        visit_count: row.visit_count,
        last_visit: row.last_visit,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

const CAMPAIGN_COLUMNS: &str = "c.id, c.restaurant_id, c.name, c.description, c.campaign_type, \
     c.start_date, c.end_date, c.discount, c.min_purchase, c.max_usage, c.max_usage_per_customer, \
     c.valid_hours, c.valid_days, c.target_products, c.free_products, c.points_multiplier, \
     c.points_required, c.buy_quantity, c.send_notification, c.notification_title, \
     c.notification_message, c.is_active, c.created_at, c.updated_at, \
     ARRAY(SELECT cs.segment_id FROM campaign_segments cs WHERE cs.campaign_id = c.id) AS segment_ids, \
     (SELECT COUNT(*) FROM campaign_usages u WHERE u.campaign_id = c.id) AS usage_count";

#[derive(Debug, FromRow)]
struct DbCampaign {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    description: String,
    campaign_type: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    discount: Json<DiscountRule>,
    min_purchase: Option<i64>,
    max_usage: Option<i64>,
    max_usage_per_customer: Option<i64>,
    valid_hours: Option<Json<ValidHours>>,
    valid_days: Vec<String>,
    target_products: Vec<Uuid>,
    free_products: Vec<Uuid>,
    points_multiplier: Decimal,
    points_required: Option<i64>,
    buy_quantity: Option<i32>,
    send_notification: bool,
    notification_title: Option<String>,
    notification_message: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    segment_ids: Vec<Uuid>,
    usage_count: i64,
}

fn campaign_from_db(row: DbCampaign) -> StoreResult<CampaignWithUsage> {
    let valid_days = row
        .valid_days
        .iter()
        .map(|day| day.parse::<Weekday>().map_err(|_| corrupt("weekday", day)))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(CampaignWithUsage {
        usage_count: row.usage_count,
        campaign: Campaign {
            campaign_type: row
                .campaign_type
                .parse()
                .map_err(|_| corrupt("campaign type", &row.campaign_type))?,
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            discount: row.discount.0,
            min_purchase: row.min_purchase.map(Money::from_minor),
            max_usage: row.max_usage,
            max_usage_per_customer: row.max_usage_per_customer,
            valid_hours: row.valid_hours.map(|hours| hours.0),
            valid_days,
            target_products: row.target_products,
            free_products: row.free_products,
            points_multiplier: row.points_multiplier,
            points_required: row.points_required,
            buy_quantity: row.buy_quantity,
            send_notification: row.send_notification,
            notification_title: row.notification_title,
            notification_message: row.notification_message,
            segment_ids: row.segment_ids,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        },
    })
}

const SEGMENT_COLUMNS: &str = "s.id, s.restaurant_id, s.name, s.description, s.kind, \
     s.last_refreshed_at, s.created_at, s.updated_at, \
     (SELECT COUNT(*) FROM segment_members m WHERE m.segment_id = s.id) AS member_count";

#[derive(Debug, FromRow)]
struct DbSegment {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    description: Option<String>,
    kind: Json<SegmentKind>,
    last_refreshed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    member_count: i64,
}

impl From<DbSegment> for Segment {
    fn from(row: DbSegment) -> Self {
        Segment {
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            description: row.description,
            kind: row.kind.0,
            member_count: row.member_count,
            last_refreshed_at: row.last_refreshed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TRANSACTION_COLUMNS: &str = "t.id, t.restaurant_id, t.customer_id, t.order_number, \
     t.total_amount, t.discount_amount, t.final_amount, t.points_earned, t.points_used, \
     t.payment_method, t.status, t.notes, t.applied_campaigns, t.transaction_date, t.created_at, \
     c.name AS customer_name";

#[derive(Debug, FromRow)]
struct DbTransaction {
    id: Uuid,
    restaurant_id: Uuid,
    customer_id: Uuid,
    order_number: String,
    total_amount: i64,
    discount_amount: i64,
    final_amount: i64,
    points_earned: i64,
    points_used: i64,
    payment_method: Option<String>,
    status: String,
    notes: Option<String>,
    applied_campaigns: Json<Vec<AppliedCampaign>>,
    transaction_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    customer_name: String,
}

#[derive(Debug, FromRow)]
struct DbTransactionItem {
    id: Uuid,
    transaction_id: Uuid,
    product_id: Option<Uuid>,
    product_name: String,
    category: Option<String>,
    quantity: i32,
    unit_price: i64,
    total_price: i64,
    discount_amount: i64,
    is_free: bool,
    notes: Option<String>,
}

impl From<DbTransactionItem> for TransactionItem {
    fn from(row: DbTransactionItem) -> Self {
        TransactionItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            category: row.category,
            quantity: row.quantity,
            unit_price: Money::from_minor(row.unit_price),
            total_price: Money::from_minor(row.total_price),
            discount_amount: Money::from_minor(row.discount_amount),
            is_free: row.is_free,
            notes: row.notes,
        }
    }
}

fn transaction_from_db(row: DbTransaction, items: Vec<TransactionItem>) -> StoreResult<TransactionView> {
    Ok(TransactionView {
        transaction: Transaction {
            status: row.status.parse().map_err(|_| corrupt("transaction status", &row.status))?,
            id: row.id,
            restaurant_id: row.restaurant_id,
            customer_id: row.customer_id,
            order_number: row.order_number,
            total_amount: Money::from_minor(row.total_amount),
            discount_amount: Money::from_minor(row.discount_amount),
            final_amount: Money::from_minor(row.final_amount),
            points_earned: row.points_earned,
            points_used: row.points_used,
            payment_method: row.payment_method,
            notes: row.notes,
            items,
            applied_campaigns: row.applied_campaigns.0,
            transaction_date: row.transaction_date,
            created_at: row.created_at,
        },
        customer_name: row.customer_name,
    })
}

const POINT_COLUMNS: &str = "p.id, p.customer_id, p.amount, p.point_type, p.source, p.source_id, \
     p.description, p.balance_after, p.created_at";

#[derive(Debug, FromRow)]
struct DbPointHistory {
    id: Uuid,
    customer_id: Uuid,
    amount: i64,
    point_type: String,
    source: String,
    source_id: Option<Uuid>,
    description: Option<String>,
    balance_after: i64,
    created_at: DateTime<Utc>,
}

fn point_from_db(row: DbPointHistory) -> StoreResult<PointHistory> {
    Ok(PointHistory {
        point_type: row.point_type.parse().map_err(|_| corrupt("point type", &row.point_type))?,
        source: row.source.parse().map_err(|_| corrupt("point source", &row.source))?,
        id: row.id,
        customer_id: row.customer_id,
        amount: row.amount,
        source_id: row.source_id,
        description: row.description,
        balance_after: row.balance_after,
        created_at: row.created_at,
    })
}

#[derive(Debug, FromRow)]
struct DbPointHistoryView {
    #[sqlx(flatten)]
    entry: DbPointHistory,
    customer_name: String,
}

#[derive(Debug, FromRow)]
struct DbProduct {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    description: Option<String>,
    category: String,
    price: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<DbProduct> for Product {
    fn from(row: DbProduct) -> Self {
        Product {
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            description: row.description,
            category: row.category,
            price: Money::from_minor(row.price),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const NOTIFICATION_COLUMNS: &str = "id, restaurant_id, title, body, notification_type, target, \
     target_description, recipient_ids, sent_count, failed_count, created_at";

#[derive(Debug, FromRow)]
struct DbNotification {
    id: Uuid,
    restaurant_id: Uuid,
    title: String,
    body: String,
    notification_type: String,
    target: Json<NotificationTarget>,
    target_description: String,
    recipient_ids: Vec<Uuid>,
    sent_count: i64,
    failed_count: i64,
    created_at: DateTime<Utc>,
}

fn notification_from_db(row: DbNotification) -> StoreResult<NotificationLog> {
    Ok(NotificationLog {
        notification_type: row
            .notification_type
            .parse()
            .map_err(|_| corrupt("notification type", &row.notification_type))?,
        id: row.id,
        restaurant_id: row.restaurant_id,
        title: row.title,
        body: row.body,
        target: row.target.0,
        target_description: row.target_description,
        recipient_ids: row.recipient_ids,
        sent_count: row.sent_count,
        failed_count: row.failed_count,
        created_at: row.created_at,
    })
}

#[derive(Debug, FromRow)]
struct DbDashboardCounts {
    total_customers: i64,
    customers_this_month: i64,
    customers_last_month: i64,
    total_campaigns: i64,
    active_campaigns: i64,
    campaigns_ending_today: i64,
    total_segments: i64,
    segments_this_month: i64,
    total_transactions: i64,
    transactions_this_month: i64,
    transactions_last_month: i64,
    revenue_today: i64,
    revenue_this_month: i64,
    revenue_last_month: i64,
}

// ---------------------------------------------------------------------------
// Shared transactional helpers
// ---------------------------------------------------------------------------

async fn lock_customer(
    conn: &mut PgConnection,
    restaurant_id: Uuid,
    customer_id: Uuid,
) -> StoreResult<Customer> {
    let row: Option<DbCustomer> = sqlx::query_as(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND restaurant_id = $2 FOR UPDATE"
    ))
    .bind(customer_id)
    .bind(restaurant_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(customer_from_db)
        .transpose()?
        .ok_or(StoreError::NotFound("Customer"))
}

/// Insert ledger rows and set the new balance. The customer row must be locked.
async fn write_ledger(
    conn: &mut PgConnection,
    customer: &Customer,
    entries: Vec<PointEntry>,
    now: DateTime<Utc>,
) -> StoreResult<Vec<PointHistory>> {
    check_ledger(customer.points, &entries)?;

    let mut balance = customer.points;
    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        balance += entry.amount;
        let row = PointHistory {
            id: Uuid::new_v4(),
            customer_id: customer.id,
            amount: entry.amount,
            point_type: entry.point_type,
            source: entry.source,
            source_id: entry.source_id,
            description: entry.description,
            balance_after: balance,
            created_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO point_history
                (id, customer_id, amount, point_type, source, source_id, description, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(row.customer_id)
        .bind(row.amount)
        .bind(row.point_type.as_str())
        .bind(row.source.as_str())
        .bind(row.source_id)
        .bind(&row.description)
        .bind(row.balance_after)
        .bind(row.created_at)
        .execute(&mut *conn)
        .await?;
        rows.push(row);
    }

    sqlx::query("UPDATE customers SET points = $2, updated_at = $3 WHERE id = $1")
        .bind(customer.id)
        .bind(balance)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(rows)
}

async fn replace_campaign_segments(
    conn: &mut PgConnection,
    campaign_id: Uuid,
    segment_ids: &[Uuid],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM campaign_segments WHERE campaign_id = $1")
        .bind(campaign_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO campaign_segments (campaign_id, segment_id) \
         SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(campaign_id)
    .bind(segment_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn weekday_names(days: &[Weekday]) -> Vec<String> {
    days.iter().map(|day| day.to_string()).collect()
}

const CUSTOMER_FILTER: &str = "restaurant_id = $1 \
     AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR email ILIKE '%' || $2 || '%' OR phone ILIKE '%' || $2 || '%') \
     AND ($3::text IS NULL OR level = $3) \
     AND ($4::uuid IS NULL OR tier_id = $4)";

const CAMPAIGN_FILTER: &str = "c.restaurant_id = $1 \
     AND ($2::text IS NULL OR c.name ILIKE '%' || $2 || '%' OR c.description ILIKE '%' || $2 || '%') \
     AND ($3::text IS NULL OR c.campaign_type = $3) \
     AND ($4::boolean IS NULL OR c.is_active = $4)";

const TRANSACTION_FILTER: &str = "t.restaurant_id = $1 \
     AND ($2::uuid IS NULL OR t.customer_id = $2) \
     AND ($3::text IS NULL OR t.status = $3) \
     AND ($4::timestamptz IS NULL OR t.transaction_date >= $4) \
     AND ($5::timestamptz IS NULL OR t.transaction_date <= $5)";

const POINT_FILTER: &str = "c.restaurant_id = $1 \
     AND ($2::uuid IS NULL OR p.customer_id = $2) \
     AND ($3::text IS NULL OR p.point_type = $3) \
     AND ($4::text IS NULL OR p.source = $4) \
     AND ($5::timestamptz IS NULL OR p.created_at >= $5) \
     AND ($6::timestamptz IS NULL OR p.created_at <= $6)";

const PRODUCT_FILTER: &str = "restaurant_id = $1 \
     AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%') \
     AND ($3::text IS NULL OR lower(category) = lower($3)) \
     AND ($4::boolean IS NULL OR is_active = $4)";

fn campaign_status_flag(filters: &CampaignFilters) -> Option<bool> {
    filters.status.map(|status| status == CampaignStatus::Active)
}

impl PgStore {
    async fn load_items(&self, transaction_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<TransactionItem>>> {
        let rows: Vec<DbTransactionItem> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, product_id, product_name, category, quantity,
                   unit_price, total_price, discount_amount, is_free, notes
            FROM transaction_items
            WHERE transaction_id = ANY($1)
            ORDER BY transaction_id, position
            "#,
        )
        .bind(transaction_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<TransactionItem>> = HashMap::new();
        for row in rows {
            items.entry(row.transaction_id).or_default().push(row.into());
        }
        Ok(items)
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn create_restaurant(&self, restaurant: Restaurant) -> StoreResult<Restaurant> {
        sqlx::query(
            "INSERT INTO restaurants (id, name, address, phone, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(restaurant.id)
        .bind(&restaurant.name)
        .bind(&restaurant.address)
        .bind(&restaurant.phone)
        .bind(restaurant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "restaurant already exists"))?;
        Ok(restaurant)
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, restaurant_id, email, name, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(user.restaurant_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("user {} already exists", user.email)))?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<DbUser> = sqlx::query_as(
            r#"
            SELECT id, restaurant_id, email, name, password_hash, role, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_db).transpose()
    }

    async fn list_tiers(&self, restaurant_id: Uuid) -> StoreResult<Vec<Tier>> {
        let rows: Vec<DbTier> = sqlx::query_as(
            r#"
            SELECT id, restaurant_id, name, display_name, level, min_points,
                   point_multiplier, discount_percent, color
            FROM tiers
            WHERE restaurant_id = $1
            ORDER BY level, min_points
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tier::from).collect())
    }

    async fn create_tier(&self, tier: Tier) -> StoreResult<Tier> {
        sqlx::query(
            r#"
            INSERT INTO tiers (id, restaurant_id, name, display_name, level, min_points,
                               point_multiplier, discount_percent, color)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(tier.id)
        .bind(tier.restaurant_id)
        .bind(&tier.name)
        .bind(&tier.display_name)
        .bind(tier.level)
        .bind(tier.min_points)
        .bind(tier.point_multiplier)
        .bind(tier.discount_percent)
        .bind(&tier.color)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("tier {} already exists", tier.name)))?;
        Ok(tier)
    }

    async fn list_customers(
        &self,
        restaurant_id: Uuid,
        filters: &CustomerFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Customer>> {
        let search = search_term(&filters.search);
        let level = filters.level.map(|l| l.as_str());
        let (limit, offset) = paging(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM customers WHERE {CUSTOMER_FILTER}"))
            .bind(restaurant_id)
            .bind(&search)
            .bind(level)
            .bind(filters.tier_id)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<DbCustomer> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE {CUSTOMER_FILTER} \
             ORDER BY created_at DESC, name LIMIT $5 OFFSET $6"
        ))
        .bind(restaurant_id)
        .bind(&search)
        .bind(level)
        .bind(filters.tier_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let customers = rows
            .into_iter()
            .map(customer_from_db)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(customers, page, total as u64))
    }

    async fn get_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<Customer> {
        let row: Option<DbCustomer> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND restaurant_id = $2"
        ))
        .bind(customer_id)
        .bind(restaurant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(customer_from_db)
            .transpose()?
            .ok_or(StoreError::NotFound("Customer"))
    }

    async fn create_customer(
        &self,
        customer: Customer,
        opening: Option<PointEntry>,
    ) -> StoreResult<Customer> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO customers (id, restaurant_id, name, email, phone, birth_date, points, level,
                                   tier_id, total_spent, visit_count, last_visit, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(customer.id)
        .bind(customer.restaurant_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.birth_date)
        .bind(customer.level.as_str())
        .bind(customer.tier_id)
        .bind(customer.total_spent.minor())
        .bind(customer.visit_count)
        .bind(customer.last_visit)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "a customer with this email already exists"))?;

        if let Some(entry) = opening {
            let locked = lock_customer(&mut tx, customer.restaurant_id, customer.id).await?;
            write_ledger(&mut tx, &locked, vec![entry], customer.created_at).await?;
        }
        let created = lock_customer(&mut tx, customer.restaurant_id, customer.id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update_customer(&self, customer: Customer) -> StoreResult<Customer> {
        let row: Option<DbCustomer> = sqlx::query_as(&format!(
            "UPDATE customers SET name = $3, email = $4, phone = $5, birth_date = $6, level = $7, \
             tier_id = $8, updated_at = $9 \
             WHERE id = $1 AND restaurant_id = $2 RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(customer.id)
        .bind(customer.restaurant_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.birth_date)
        .bind(customer.level.as_str())
        .bind(customer.tier_id)
        .bind(customer.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "a customer with this email already exists"))?;
        row.map(customer_from_db)
            .transpose()?
            .ok_or(StoreError::NotFound("Customer"))
    }

    async fn delete_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1 AND restaurant_id = $2")
            .bind(customer_id)
            .bind(restaurant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Customer"));
        }
        Ok(())
    }

    async fn customer_segment_ids(&self, customer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT segment_id FROM segment_members WHERE customer_id = $1 ORDER BY segment_id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn push_targets(&self, restaurant_id: Uuid) -> StoreResult<Vec<PushTarget>> {
        #[derive(FromRow)]
        struct Row {
            id: Uuid,
            name: String,
            email: Option<String>,
            level: String,
            segment_ids: Vec<Uuid>,
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.email, c.level,
                   ARRAY(SELECT m.segment_id FROM segment_members m WHERE m.customer_id = c.id) AS segment_ids
            FROM customers c
            WHERE c.restaurant_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PushTarget {
                    level: row
                        .level
                        .parse::<LoyaltyLevel>()
                        .map_err(|_| corrupt("loyalty level", &row.level))?,
                    id: row.id,
                    name: row.name,
                    email: row.email,
                    segment_ids: row.segment_ids,
                })
            })
            .collect()
    }

    async fn list_campaigns(
        &self,
        restaurant_id: Uuid,
        filters: &CampaignFilters,
        page: PageRequest,
    ) -> StoreResult<Page<CampaignWithUsage>> {
        let search = search_term(&filters.search);
        let campaign_type = filters.campaign_type.map(|t| t.as_str());
        let active = campaign_status_flag(filters);
        let (limit, offset) = paging(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM campaigns c WHERE {CAMPAIGN_FILTER}"))
            .bind(restaurant_id)
            .bind(&search)
            .bind(campaign_type)
            .bind(active)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<DbCampaign> = sqlx::query_as(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE {CAMPAIGN_FILTER} \
             ORDER BY c.created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(restaurant_id)
        .bind(&search)
        .bind(campaign_type)
        .bind(active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let campaigns = rows
            .into_iter()
            .map(campaign_from_db)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(campaigns, page, total as u64))
    }

    async fn active_campaigns(&self, restaurant_id: Uuid) -> StoreResult<Vec<Campaign>> {
        let rows: Vec<DbCampaign> = sqlx::query_as(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns c \
             WHERE c.restaurant_id = $1 AND c.is_active ORDER BY c.created_at DESC"
        ))
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| campaign_from_db(row).map(|c| c.campaign))
            .collect()
    }

    async fn get_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign> {
        let row: Option<DbCampaign> = sqlx::query_as(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE c.id = $1 AND c.restaurant_id = $2"
        ))
        .bind(campaign_id)
        .bind(restaurant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(campaign_from_db)
            .transpose()?
            .map(|c| c.campaign)
            .ok_or(StoreError::NotFound("Campaign"))
    }

    async fn create_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, restaurant_id, name, description, campaign_type, start_date, end_date, discount,
                min_purchase, max_usage, max_usage_per_customer, valid_hours, valid_days,
                target_products, free_products, points_multiplier, points_required, buy_quantity,
                send_notification, notification_title, notification_message, is_active,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.restaurant_id)
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.campaign_type.as_str())
        .bind(campaign.start_date)
        .bind(campaign.end_date)
        .bind(Json(&campaign.discount))
        .bind(campaign.min_purchase.map(Money::minor))
        .bind(campaign.max_usage)
        .bind(campaign.max_usage_per_customer)
        .bind(campaign.valid_hours.as_ref().map(Json))
        .bind(weekday_names(&campaign.valid_days))
        .bind(&campaign.target_products)
        .bind(&campaign.free_products)
        .bind(campaign.points_multiplier)
        .bind(campaign.points_required)
        .bind(campaign.buy_quantity)
        .bind(campaign.send_notification)
        .bind(&campaign.notification_title)
        .bind(&campaign.notification_message)
        .bind(campaign.is_active)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&mut *tx)
        .await?;
        replace_campaign_segments(&mut tx, campaign.id, &campaign.segment_ids).await?;
        tx.commit().await?;
        Ok(campaign)
    }

    async fn update_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                name = $3, description = $4, campaign_type = $5, start_date = $6, end_date = $7,
                discount = $8, min_purchase = $9, max_usage = $10, max_usage_per_customer = $11,
                valid_hours = $12, valid_days = $13, target_products = $14, free_products = $15,
                points_multiplier = $16, points_required = $17, buy_quantity = $18,
                send_notification = $19, notification_title = $20, notification_message = $21,
                is_active = $22, updated_at = $23
            WHERE id = $1 AND restaurant_id = $2
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.restaurant_id)
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.campaign_type.as_str())
        .bind(campaign.start_date)
        .bind(campaign.end_date)
        .bind(Json(&campaign.discount))
        .bind(campaign.min_purchase.map(Money::minor))
        .bind(campaign.max_usage)
        .bind(campaign.max_usage_per_customer)
        .bind(campaign.valid_hours.as_ref().map(Json))
        .bind(weekday_names(&campaign.valid_days))
        .bind(&campaign.target_products)
        .bind(&campaign.free_products)
        .bind(campaign.points_multiplier)
        .bind(campaign.points_required)
        .bind(campaign.buy_quantity)
        .bind(campaign.send_notification)
        .bind(&campaign.notification_title)
        .bind(&campaign.notification_message)
        .bind(campaign.is_active)
        .bind(campaign.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Campaign"));
        }
        replace_campaign_segments(&mut tx, campaign.id, &campaign.segment_ids).await?;
        tx.commit().await?;
        Ok(campaign)
    }

    async fn delete_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1 AND restaurant_id = $2")
            .bind(campaign_id)
            .bind(restaurant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Campaign"));
        }
        Ok(())
    }

    async fn campaign_usage(
        &self,
        customer_id: Uuid,
        campaign_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, UsageCounts>> {
        let rows: Vec<(Uuid, i64, i64)> = sqlx::query_as(
            r#"
            SELECT campaign_id,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE customer_id = $1) AS by_customer
            FROM campaign_usages
            WHERE campaign_id = ANY($2)
            GROUP BY campaign_id
            "#,
        )
        .bind(customer_id)
        .bind(campaign_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, total, by_customer)| (id, UsageCounts { total, by_customer }))
            .collect())
    }

    async fn purchased_quantity(&self, customer_id: Uuid, product_ids: &[Uuid]) -> StoreResult<i64> {
        let quantity: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(i.quantity), 0)::BIGINT
            FROM transaction_items i
            JOIN transactions t ON t.id = i.transaction_id
            WHERE t.customer_id = $1
              AND t.status = 'COMPLETED'
              AND (cardinality($2::uuid[]) = 0 OR i.product_id = ANY($2))
            "#,
        )
        .bind(customer_id)
        .bind(product_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(quantity)
    }

    async fn list_segments(&self, restaurant_id: Uuid, page: PageRequest) -> StoreResult<Page<Segment>> {
        let (limit, offset) = paging(page);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments WHERE restaurant_id = $1")
            .bind(restaurant_id)
            .fetch_one(&self.pool)
            .await?;
        let rows: Vec<DbSegment> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments s WHERE s.restaurant_id = $1 \
             ORDER BY s.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(restaurant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(
            rows.into_iter().map(Segment::from).collect(),
            page,
            total as u64,
        ))
    }

    async fn get_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<Segment> {
        let row: Option<DbSegment> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments s WHERE s.id = $1 AND s.restaurant_id = $2"
        ))
        .bind(segment_id)
        .bind(restaurant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Segment::from).ok_or(StoreError::NotFound("Segment"))
    }

    async fn segment_members(&self, segment_id: Uuid) -> StoreResult<Vec<SegmentMember>> {
        let rows: Vec<(Uuid, String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.email, c.points
            FROM segment_members m
            JOIN customers c ON c.id = m.customer_id
            WHERE m.segment_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(segment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(customer_id, name, email, points)| SegmentMember {
                customer_id,
                name,
                email,
                points,
            })
            .collect())
    }

    async fn create_segment(&self, segment: Segment) -> StoreResult<Segment> {
        sqlx::query(
            r#"
            INSERT INTO segments (id, restaurant_id, name, description, kind, last_refreshed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(segment.id)
        .bind(segment.restaurant_id)
        .bind(&segment.name)
        .bind(&segment.description)
        .bind(Json(&segment.kind))
        .bind(segment.last_refreshed_at)
        .bind(segment.created_at)
        .bind(segment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(Segment {
            member_count: 0,
            ..segment
        })
    }

    async fn update_segment(&self, segment: Segment) -> StoreResult<Segment> {
        let result = sqlx::query(
            r#"
            UPDATE segments SET name = $3, description = $4, kind = $5, updated_at = $6
            WHERE id = $1 AND restaurant_id = $2
            "#,
        )
        .bind(segment.id)
        .bind(segment.restaurant_id)
        .bind(&segment.name)
        .bind(&segment.description)
        .bind(Json(&segment.kind))
        .bind(segment.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Segment"));
        }
        self.get_segment(segment.restaurant_id, segment.id).await
    }

    async fn delete_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM segments WHERE id = $1 AND restaurant_id = $2")
            .bind(segment_id)
            .bind(restaurant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Segment"));
        }
        Ok(())
    }

    async fn add_segment_members(&self, segment_id: Uuid, customer_ids: &[Uuid]) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let restaurant_id: Option<Uuid> =
            sqlx::query_scalar("SELECT restaurant_id FROM segments WHERE id = $1 FOR UPDATE")
                .bind(segment_id)
                .fetch_optional(&mut *tx)
                .await?;
        let restaurant_id = restaurant_id.ok_or(StoreError::NotFound("Segment"))?;

        let unique: Vec<Uuid> = customer_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let known: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customers WHERE restaurant_id = $1 AND id = ANY($2)",
        )
        .bind(restaurant_id)
        .bind(&unique)
        .fetch_one(&mut *tx)
        .await?;
        if known != unique.len() as i64 {
            return Err(StoreError::Conflict(
                "some customers do not belong to this restaurant".to_string(),
            ));
        }

        let result = sqlx::query(
            "INSERT INTO segment_members (segment_id, customer_id) \
             SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(segment_id)
        .bind(&unique)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() as i64)
    }

    async fn remove_segment_member(&self, segment_id: Uuid, customer_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM segment_members WHERE segment_id = $1 AND customer_id = $2")
            .bind(segment_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Segment member"));
        }
        Ok(())
    }

    async fn replace_segment_members(
        &self,
        segment_id: Uuid,
        customer_ids: &[Uuid],
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<RefreshOutcome> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM segments WHERE id = $1 FOR UPDATE")
            .bind(segment_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound("Segment"));
        }

        let previous: BTreeSet<Uuid> =
            sqlx::query_scalar::<_, Uuid>("SELECT customer_id FROM segment_members WHERE segment_id = $1")
                .bind(segment_id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
        let next: BTreeSet<Uuid> = customer_ids.iter().copied().collect();
        let next_ids: Vec<Uuid> = next.iter().copied().collect();

        sqlx::query("DELETE FROM segment_members WHERE segment_id = $1 AND NOT (customer_id = ANY($2))")
            .bind(segment_id)
            .bind(&next_ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO segment_members (segment_id, customer_id, added_at) \
             SELECT $1, UNNEST($2::uuid[]), $3 ON CONFLICT DO NOTHING",
        )
        .bind(segment_id)
        .bind(&next_ids)
        .bind(refreshed_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE segments SET last_refreshed_at = $2, updated_at = $2 WHERE id = $1")
            .bind(segment_id)
            .bind(refreshed_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RefreshOutcome {
            added: next.difference(&previous).count() as i64,
            removed: previous.difference(&next).count() as i64,
            total: next.len() as i64,
        })
    }

    async fn purchase_history(&self, restaurant_id: Uuid) -> StoreResult<Vec<CustomerHistory>> {
        let customers: Vec<(Uuid, i64, i64)> = sqlx::query_as(
            "SELECT id, visit_count, points FROM customers WHERE restaurant_id = $1",
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        let sales: Vec<(Uuid, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT customer_id, final_amount, transaction_date
            FROM transactions
            WHERE restaurant_id = $1 AND status = 'COMPLETED'
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut purchases: HashMap<Uuid, Vec<PurchaseFact>> = HashMap::new();
        for (customer_id, final_amount, occurred_at) in sales {
            purchases.entry(customer_id).or_default().push(PurchaseFact {
                final_amount: Money::from_minor(final_amount),
                occurred_at,
            });
        }

        Ok(customers
            .into_iter()
            .map(|(customer_id, visit_count, points)| CustomerHistory {
                customer_id,
                visit_count,
                points,
                purchases: purchases.remove(&customer_id).unwrap_or_default(),
            })
            .collect())
    }

    async fn list_transactions(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
        page: PageRequest,
    ) -> StoreResult<Page<TransactionView>> {
        let status = filters.status.map(|s| s.as_str());
        let (limit, offset) = paging(page);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM transactions t WHERE {TRANSACTION_FILTER}"
        ))
        .bind(restaurant_id)
        .bind(filters.customer_id)
        .bind(status)
        .bind(filters.from)
        .bind(filters.to)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t JOIN customers c ON c.id = t.customer_id \
             WHERE {TRANSACTION_FILTER} ORDER BY t.transaction_date DESC LIMIT $6 OFFSET $7"
        ))
        .bind(restaurant_id)
        .bind(filters.customer_id)
        .bind(status)
        .bind(filters.from)
        .bind(filters.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        let transactions = rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                transaction_from_db(row, lines)
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(transactions, page, total as u64))
    }

    async fn transaction_summary(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
    ) -> StoreResult<TransactionSummary> {
        let (count, revenue, discounts, points_earned, points_used): (i64, i64, i64, i64, i64) =
            sqlx::query_as(&format!(
                "SELECT COUNT(*), \
                        COALESCE(SUM(t.final_amount), 0)::BIGINT, \
                        COALESCE(SUM(t.discount_amount), 0)::BIGINT, \
                        COALESCE(SUM(t.points_earned), 0)::BIGINT, \
                        COALESCE(SUM(t.points_used), 0)::BIGINT \
                 FROM transactions t WHERE {TRANSACTION_FILTER} AND t.status = 'COMPLETED'"
            ))
            .bind(restaurant_id)
            .bind(filters.customer_id)
            .bind(filters.status.map(|s| s.as_str()))
            .bind(filters.from)
            .bind(filters.to)
            .fetch_one(&self.pool)
            .await?;

        let revenue = Money::from_minor(revenue);
        Ok(TransactionSummary {
            count,
            revenue,
            discounts: Money::from_minor(discounts),
            average_order_value: revenue.average_over(count),
            points_earned,
            points_used,
        })
    }

    async fn record_sale(&self, sale: SaleRecord) -> StoreResult<(Transaction, Customer)> {
        let transaction = sale.transaction;
        let mut tx = self.pool.begin().await?;

        let customer = lock_customer(&mut tx, transaction.restaurant_id, transaction.customer_id).await?;

        // lock campaigns in a stable order so concurrent sales cannot deadlock
        let mut caps = sale.campaign_caps.clone();
        caps.sort_by_key(|cap| cap.campaign_id);
        for cap in &caps {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
                .bind(cap.campaign_id.to_string())
                .execute(&mut *tx)
                .await?;

            let (total, by_customer): (i64, i64) = sqlx::query_as(
                r#"
                SELECT COUNT(*), COUNT(*) FILTER (WHERE customer_id = $2)
                FROM campaign_usages
                WHERE campaign_id = $1
                "#,
            )
            .bind(cap.campaign_id)
            .bind(customer.id)
            .fetch_one(&mut *tx)
            .await?;

            if cap.max_usage.map_or(false, |max| total >= max)
                || cap.max_usage_per_customer.map_or(false, |max| by_customer >= max)
            {
                return Err(StoreError::UsageCapReached {
                    campaign_id: cap.campaign_id,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, restaurant_id, customer_id, order_number, total_amount, discount_amount,
                final_amount, points_earned, points_used, payment_method, status, notes,
                applied_campaigns, transaction_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.restaurant_id)
        .bind(transaction.customer_id)
        .bind(&transaction.order_number)
        .bind(transaction.total_amount.minor())
        .bind(transaction.discount_amount.minor())
        .bind(transaction.final_amount.minor())
        .bind(transaction.points_earned)
        .bind(transaction.points_used)
        .bind(&transaction.payment_method)
        .bind(transaction.status.as_str())
        .bind(&transaction.notes)
        .bind(Json(&transaction.applied_campaigns))
        .bind(transaction.transaction_date)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("order number {} already exists", transaction.order_number))
        })?;

        for (position, item) in transaction.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transaction_items (
                    id, transaction_id, position, product_id, product_name, category, quantity,
                    unit_price, total_price, discount_amount, is_free, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.id)
            .bind(transaction.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.category)
            .bind(item.quantity)
            .bind(item.unit_price.minor())
            .bind(item.total_price.minor())
            .bind(item.discount_amount.minor())
            .bind(item.is_free)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;
        }

        for applied in &transaction.applied_campaigns {
            sqlx::query(
                r#"
                INSERT INTO campaign_usages (id, campaign_id, customer_id, transaction_id, used_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(applied.campaign_id)
            .bind(customer.id)
            .bind(transaction.id)
            .bind(transaction.transaction_date)
            .execute(&mut *tx)
            .await?;
        }

        write_ledger(&mut tx, &customer, sale.ledger, transaction.created_at).await?;

        sqlx::query(
            r#"
            UPDATE customers SET
                total_spent = total_spent + $2,
                visit_count = visit_count + 1,
                last_visit = GREATEST(COALESCE(last_visit, $3), $3),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(customer.id)
        .bind(transaction.final_amount.minor())
        .bind(transaction.transaction_date)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        let updated = lock_customer(&mut tx, transaction.restaurant_id, customer.id).await?;
        tx.commit().await?;
        Ok((transaction, updated))
    }

    async fn list_point_history(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
        page: PageRequest,
    ) -> StoreResult<Page<PointHistoryView>> {
        let (limit, offset) = paging(page);
        let point_type = filters.point_type.map(|t| t.as_str());
        let source = filters.source.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM point_history p JOIN customers c ON c.id = p.customer_id WHERE {POINT_FILTER}"
        ))
        .bind(restaurant_id)
        .bind(filters.customer_id)
        .bind(point_type)
        .bind(source)
        .bind(filters.from)
        .bind(filters.to)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<DbPointHistoryView> = sqlx::query_as(&format!(
            "SELECT {POINT_COLUMNS}, c.name AS customer_name \
             FROM point_history p JOIN customers c ON c.id = p.customer_id \
             WHERE {POINT_FILTER} ORDER BY p.created_at DESC LIMIT $7 OFFSET $8"
        ))
        .bind(restaurant_id)
        .bind(filters.customer_id)
        .bind(point_type)
        .bind(source)
        .bind(filters.from)
        .bind(filters.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| {
                Ok(PointHistoryView {
                    customer_name: row.customer_name,
                    entry: point_from_db(row.entry)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(entries, page, total as u64))
    }

    async fn point_stats(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
    ) -> StoreResult<PointStats> {
        let (earned, spent, expired): (i64, i64, i64) = sqlx::query_as(&format!(
            "SELECT \
                COALESCE(SUM(p.amount) FILTER (WHERE p.point_type = 'EARNED'), 0)::BIGINT, \
                COALESCE(SUM(ABS(p.amount)) FILTER (WHERE p.point_type = 'SPENT'), 0)::BIGINT, \
                COALESCE(SUM(ABS(p.amount)) FILTER (WHERE p.point_type = 'EXPIRED'), 0)::BIGINT \
             FROM point_history p JOIN customers c ON c.id = p.customer_id WHERE {POINT_FILTER}"
        ))
        .bind(restaurant_id)
        .bind(filters.customer_id)
        .bind(filters.point_type.map(|t| t.as_str()))
        .bind(filters.source.map(|s| s.as_str()))
        .bind(filters.from)
        .bind(filters.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(PointStats {
            total_earned: earned,
            total_spent: spent,
            total_expired: expired,
            net_balance: earned - spent - expired,
        })
    }

    async fn apply_points(
        &self,
        restaurant_id: Uuid,
        customer_id: Uuid,
        entries: Vec<PointEntry>,
    ) -> StoreResult<(Customer, Vec<PointHistory>)> {
        let mut tx = self.pool.begin().await?;
        let customer = lock_customer(&mut tx, restaurant_id, customer_id).await?;
        let rows = write_ledger(&mut tx, &customer, entries, Utc::now()).await?;
        let updated = lock_customer(&mut tx, restaurant_id, customer_id).await?;
        tx.commit().await?;
        Ok((updated, rows))
    }

    async fn ledger_totals(&self, customer_id: Uuid) -> StoreResult<(i64, i64)> {
        let totals: (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT, COUNT(*) FROM point_history WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn list_products(
        &self,
        restaurant_id: Uuid,
        filters: &ProductFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Product>> {
        let search = search_term(&filters.search);
        let category = search_term(&filters.category);
        let (limit, offset) = paging(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {PRODUCT_FILTER}"))
            .bind(restaurant_id)
            .bind(&search)
            .bind(&category)
            .bind(filters.is_active)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<DbProduct> = sqlx::query_as(&format!(
            "SELECT id, restaurant_id, name, description, category, price, is_active, created_at \
             FROM products WHERE {PRODUCT_FILTER} ORDER BY category, name LIMIT $5 OFFSET $6"
        ))
        .bind(restaurant_id)
        .bind(&search)
        .bind(&category)
        .bind(filters.is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(
            rows.into_iter().map(Product::from).collect(),
            page,
            total as u64,
        ))
    }

    async fn create_product(&self, product: Product) -> StoreResult<Product> {
        sqlx::query(
            r#"
            INSERT INTO products (id, restaurant_id, name, description, category, price, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id)
        .bind(product.restaurant_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price.minor())
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("product {} already exists", product.name)))?;
        Ok(product)
    }

    async fn resolve_notification_target(
        &self,
        restaurant_id: Uuid,
        target: &NotificationTarget,
    ) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = match target {
            NotificationTarget::All => {
                sqlx::query_scalar("SELECT id FROM customers WHERE restaurant_id = $1 ORDER BY id")
                    .bind(restaurant_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            NotificationTarget::Levels(levels) => {
                let names: Vec<&str> = levels.iter().map(LoyaltyLevel::as_str).collect();
                sqlx::query_scalar(
                    "SELECT id FROM customers WHERE restaurant_id = $1 AND level = ANY($2) ORDER BY id",
                )
                .bind(restaurant_id)
                .bind(&names)
                .fetch_all(&self.pool)
                .await?
            }
            NotificationTarget::Customers(customer_ids) => {
                sqlx::query_scalar(
                    "SELECT id FROM customers WHERE restaurant_id = $1 AND id = ANY($2) ORDER BY id",
                )
                .bind(restaurant_id)
                .bind(customer_ids)
                .fetch_all(&self.pool)
                .await?
            }
            NotificationTarget::Segments(segment_ids) => {
                sqlx::query_scalar(
                    r#"
                    SELECT DISTINCT m.customer_id
                    FROM segment_members m
                    JOIN segments s ON s.id = m.segment_id
                    WHERE s.restaurant_id = $1 AND s.id = ANY($2)
                    ORDER BY m.customer_id
                    "#,
                )
                .bind(restaurant_id)
                .bind(segment_ids)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(ids)
    }

    async fn record_notification(&self, log: NotificationLog) -> StoreResult<NotificationLog> {
        sqlx::query(
            r#"
            INSERT INTO notification_logs (id, restaurant_id, title, body, notification_type, target,
                                           target_description, recipient_ids, sent_count, failed_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(log.id)
        .bind(log.restaurant_id)
        .bind(&log.title)
        .bind(&log.body)
        .bind(log.notification_type.as_str())
        .bind(Json(&log.target))
        .bind(&log.target_description)
        .bind(&log.recipient_ids)
        .bind(log.sent_count)
        .bind(log.failed_count)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(log)
    }

    async fn list_notifications(
        &self,
        restaurant_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<NotificationLog>> {
        let (limit, offset) = paging(page);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification_logs WHERE restaurant_id = $1")
            .bind(restaurant_id)
            .fetch_one(&self.pool)
            .await?;
        let rows: Vec<DbNotification> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification_logs WHERE restaurant_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(restaurant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let logs = rows
            .into_iter()
            .map(notification_from_db)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(logs, page, total as u64))
    }

    async fn customer_notifications(
        &self,
        customer_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<CustomerNotification>> {
        let (limit, offset) = paging(page);
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_logs WHERE $1 = ANY(recipient_ids)")
                .bind(customer_id)
                .fetch_one(&self.pool)
                .await?;
        let rows: Vec<DbNotification> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification_logs WHERE $1 = ANY(recipient_ids) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(customer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let feed = rows
            .into_iter()
            .map(|row| notification_from_db(row).map(|log| CustomerNotification::from(&log)))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(feed, page, total as u64))
    }

    async fn dashboard_metrics(
        &self,
        restaurant_id: Uuid,
        window: &DashboardWindow,
    ) -> StoreResult<DashboardMetrics> {
        let counts: DbDashboardCounts = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM customers WHERE restaurant_id = $1) AS total_customers,
                (SELECT COUNT(*) FROM customers WHERE restaurant_id = $1
                    AND created_at >= $2 AND created_at <= $3) AS customers_this_month,
                (SELECT COUNT(*) FROM customers WHERE restaurant_id = $1
                    AND created_at >= $4 AND created_at < $2) AS customers_last_month,
                (SELECT COUNT(*) FROM campaigns WHERE restaurant_id = $1) AS total_campaigns,
                (SELECT COUNT(*) FROM campaigns WHERE restaurant_id = $1 AND is_active
                    AND start_date <= $3 AND end_date >= $3) AS active_campaigns,
                (SELECT COUNT(*) FROM campaigns WHERE restaurant_id = $1 AND is_active
                    AND end_date >= $5 AND end_date < $6) AS campaigns_ending_today,
                (SELECT COUNT(*) FROM segments WHERE restaurant_id = $1) AS total_segments,
                (SELECT COUNT(*) FROM segments WHERE restaurant_id = $1
                    AND created_at >= $2 AND created_at <= $3) AS segments_this_month,
                (SELECT COUNT(*) FROM transactions WHERE restaurant_id = $1
                    AND status = 'COMPLETED') AS total_transactions,
                (SELECT COUNT(*) FROM transactions WHERE restaurant_id = $1 AND status = 'COMPLETED'
                    AND transaction_date >= $2 AND transaction_date <= $3) AS transactions_this_month,
                (SELECT COUNT(*) FROM transactions WHERE restaurant_id = $1 AND status = 'COMPLETED'
                    AND transaction_date >= $4 AND transaction_date < $2) AS transactions_last_month,
                (SELECT COALESCE(SUM(final_amount), 0)::BIGINT FROM transactions WHERE restaurant_id = $1
                    AND status = 'COMPLETED' AND transaction_date >= $5 AND transaction_date < $6) AS revenue_today,
                (SELECT COALESCE(SUM(final_amount), 0)::BIGINT FROM transactions WHERE restaurant_id = $1
                    AND status = 'COMPLETED' AND transaction_date >= $2 AND transaction_date <= $3) AS revenue_this_month,
                (SELECT COALESCE(SUM(final_amount), 0)::BIGINT FROM transactions WHERE restaurant_id = $1
                    AND status = 'COMPLETED' AND transaction_date >= $4 AND transaction_date < $2) AS revenue_last_month
            "#,
        )
        .bind(restaurant_id)
        .bind(window.month_start)
        .bind(window.now)
        .bind(window.last_month_start)
        .bind(window.today_start)
        .bind(window.tomorrow_start)
        .fetch_one(&self.pool)
        .await?;

        let recent: Vec<(Uuid, Uuid, String, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT t.id, t.customer_id, c.name, t.final_amount, t.points_earned, t.transaction_date
            FROM transactions t
            JOIN customers c ON c.id = t.customer_id
            WHERE t.restaurant_id = $1 AND t.status = 'COMPLETED'
            ORDER BY t.transaction_date DESC
            LIMIT 5
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        let top: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT i.product_name, SUM(i.quantity)::BIGINT AS quantity, SUM(i.total_price)::BIGINT AS revenue
            FROM transaction_items i
            JOIN transactions t ON t.id = i.transaction_id
            WHERE t.restaurant_id = $1 AND t.status = 'COMPLETED'
              AND t.transaction_date >= $2 AND t.transaction_date <= $3
            GROUP BY i.product_name
            ORDER BY quantity DESC, revenue DESC, i.product_name
            LIMIT 5
            "#,
        )
        .bind(restaurant_id)
        .bind(window.month_start)
        .bind(window.now)
        .fetch_all(&self.pool)
        .await?;

        let by_day: Vec<(NaiveDate, i64, i64)> = sqlx::query_as(
            r#"
            SELECT (t.transaction_date AT TIME ZONE $4)::date AS day,
                   SUM(t.final_amount)::BIGINT AS revenue,
                   COUNT(*) AS orders
            FROM transactions t
            WHERE t.restaurant_id = $1 AND t.status = 'COMPLETED'
              AND t.transaction_date >= $2 AND t.transaction_date <= $3
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(restaurant_id)
        .bind(window.week_start)
        .bind(window.now)
        .bind(window.tz.name())
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardMetrics {
            total_customers: counts.total_customers,
            customers_this_month: counts.customers_this_month,
            customers_last_month: counts.customers_last_month,
            total_campaigns: counts.total_campaigns,
            active_campaigns: counts.active_campaigns,
            campaigns_ending_today: counts.campaigns_ending_today,
            total_segments: counts.total_segments,
            segments_this_month: counts.segments_this_month,
            total_transactions: counts.total_transactions,
            transactions_this_month: counts.transactions_this_month,
            transactions_last_month: counts.transactions_last_month,
            revenue_today: Money::from_minor(counts.revenue_today),
            revenue_this_month: Money::from_minor(counts.revenue_this_month),
            revenue_last_month: Money::from_minor(counts.revenue_last_month),
            recent_activity: recent
                .into_iter()
                .map(
                    |(transaction_id, customer_id, customer_name, final_amount, points_earned, transaction_date)| {
                        RecentActivity {
                            transaction_id,
                            customer_id,
                            customer_name,
                            final_amount: Money::from_minor(final_amount),
                            points_earned,
                            transaction_date,
                        }
                    },
                )
                .collect(),
            top_products: top
                .into_iter()
                .map(|(product_name, quantity, revenue)| ProductSales {
                    product_name,
                    quantity,
                    revenue: Money::from_minor(revenue),
                })
                .collect(),
            revenue_by_day: by_day
                .into_iter()
                .map(|(date, revenue, orders)| DailyRevenue {
                    date,
                    revenue: Money::from_minor(revenue),
                    orders,
                })
                .collect(),
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
