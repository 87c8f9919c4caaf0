//! Persistence seam. Services only ever see `Arc<dyn CrmStore>`.
//!
//! Every read and write is scoped by restaurant. Operations that touch the
//! point balance (`record_sale`, `apply_points`, `create_customer` with an
//! opening entry) write the ledger rows and the balance in one unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domains::campaigns::models::{Campaign, CampaignFilters, CampaignWithUsage, UsageCounts};
use crate::domains::customers::models::{Customer, CustomerFilters, Tier};
use crate::domains::dashboard::models::{DashboardMetrics, DashboardWindow};
use crate::domains::notifications::models::{
    CustomerNotification, NotificationLog, NotificationTarget, PushTarget,
};
use crate::domains::points::models::{
    PointEntry, PointHistory, PointHistoryFilters, PointHistoryView, PointStats,
};
use crate::domains::products::models::{Product, ProductFilters};
use crate::domains::segments::criteria::PurchaseFact;
use crate::domains::segments::models::{RefreshOutcome, Segment, SegmentMember};
use crate::domains::transactions::models::{
    SaleRecord, Transaction, TransactionFilters, TransactionSummary, TransactionView,
};
use crate::domains::users::{Restaurant, User};
use shared::config::{Config, StoreBackend};
use shared::{AppError, Page, PageRequest};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },
    #[error("usage limit reached for campaign {campaign_id}")]
    UsageCapReached { campaign_id: Uuid },
    #[error("point balance out of range: balance {balance}, change {amount}")]
    BalanceOutOfRange { balance: i64, amount: i64 },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(resource) => AppError::not_found(resource),
            StoreError::Conflict(message) => AppError::conflict(message),
            StoreError::InsufficientPoints { balance, requested } => AppError::invalid_field(
                "points",
                format!(
                    "Insufficient points: balance is {}, {} requested",
                    balance, requested
                ),
            ),
            StoreError::UsageCapReached { campaign_id } => AppError::conflict(format!(
                "Campaign {} has reached its usage limit",
                campaign_id
            )),
            StoreError::BalanceOutOfRange { .. } => {
                AppError::invalid_field("points", "Point balance would exceed the supported range")
            }
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Unexpected(e) => AppError::Generic(e),
        }
    }
}

/// Validate ledger entries against the balance they are applied to, in order.
/// Returns the resulting balance.
pub(crate) fn check_ledger(balance: i64, entries: &[PointEntry]) -> StoreResult<i64> {
    let requested = entries
        .iter()
        .filter(|e| e.amount < 0)
        .fold(0i64, |acc, e| acc.saturating_add(e.amount.saturating_neg()));
    let mut running = balance;
    for entry in entries {
        running = running
            .checked_add(entry.amount)
            .ok_or(StoreError::BalanceOutOfRange { balance: running, amount: entry.amount })?;
        if running < 0 {
            return Err(StoreError::InsufficientPoints { balance, requested });
        }
    }
    Ok(running)
}

/// A customer's purchase history as consumed by segment refresh
#[derive(Debug, Clone)]
pub struct CustomerHistory {
    pub customer_id: Uuid,
    pub visit_count: i64,
    pub points: i64,
    pub purchases: Vec<PurchaseFact>,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn create_restaurant(&self, restaurant: Restaurant) -> StoreResult<Restaurant>;
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_tiers(&self, restaurant_id: Uuid) -> StoreResult<Vec<Tier>>;
    async fn create_tier(&self, tier: Tier) -> StoreResult<Tier>;

    async fn list_customers(
        &self,
        restaurant_id: Uuid,
        filters: &CustomerFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Customer>>;
    async fn get_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<Customer>;
    /// `customer.points` must be zero; the opening entry, if any, goes through the ledger
    async fn create_customer(
        &self,
        customer: Customer,
        opening: Option<PointEntry>,
    ) -> StoreResult<Customer>;
    /// Profile fields only; balance, spend and visit counters are left untouched
    async fn update_customer(&self, customer: Customer) -> StoreResult<Customer>;
    async fn delete_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<()>;
    async fn customer_segment_ids(&self, customer_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn push_targets(&self, restaurant_id: Uuid) -> StoreResult<Vec<PushTarget>>;

    async fn list_campaigns(
        &self,
        restaurant_id: Uuid,
        filters: &CampaignFilters,
        page: PageRequest,
    ) -> StoreResult<Page<CampaignWithUsage>>;
    /// Campaigns with `is_active` set, newest first
    async fn active_campaigns(&self, restaurant_id: Uuid) -> StoreResult<Vec<Campaign>>;
    async fn get_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign>;
    async fn create_campaign(&self, campaign: Campaign) -> StoreResult<Campaign>;
    async fn update_campaign(&self, campaign: Campaign) -> StoreResult<Campaign>;
    async fn delete_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<()>;
    async fn campaign_usage(
        &self,
        customer_id: Uuid,
        campaign_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, UsageCounts>>;
    /// Units of the given products (any product when empty) bought in completed sales
    async fn purchased_quantity(&self, customer_id: Uuid, product_ids: &[Uuid]) -> StoreResult<i64>;

    async fn list_segments(&self, restaurant_id: Uuid, page: PageRequest) -> StoreResult<Page<Segment>>;
    async fn get_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<Segment>;
    async fn segment_members(&self, segment_id: Uuid) -> StoreResult<Vec<SegmentMember>>;
    async fn create_segment(&self, segment: Segment) -> StoreResult<Segment>;
    async fn update_segment(&self, segment: Segment) -> StoreResult<Segment>;
    async fn delete_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<()>;
    /// Returns how many of the customers were not members yet
    async fn add_segment_members(&self, segment_id: Uuid, customer_ids: &[Uuid]) -> StoreResult<i64>;
    async fn remove_segment_member(&self, segment_id: Uuid, customer_id: Uuid) -> StoreResult<()>;
    async fn replace_segment_members(
        &self,
        segment_id: Uuid,
        customer_ids: &[Uuid],
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<RefreshOutcome>;
    /// Completed purchases of every customer of the restaurant, customers without sales included
    async fn purchase_history(&self, restaurant_id: Uuid) -> StoreResult<Vec<CustomerHistory>>;

    async fn list_transactions(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
        page: PageRequest,
    ) -> StoreResult<Page<TransactionView>>;
    async fn transaction_summary(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
    ) -> StoreResult<TransactionSummary>;
    /// Transaction, usages, ledger rows and customer counters in one unit.
    /// Fails without writing anything when the balance or a campaign cap would be exceeded.
    async fn record_sale(&self, sale: SaleRecord) -> StoreResult<(Transaction, Customer)>;

    async fn list_point_history(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
        page: PageRequest,
    ) -> StoreResult<Page<PointHistoryView>>;
    async fn point_stats(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
    ) -> StoreResult<PointStats>;
    /// Appends the entries and moves the balance; a negative resulting balance is rejected
    async fn apply_points(
        &self,
        restaurant_id: Uuid,
        customer_id: Uuid,
        entries: Vec<PointEntry>,
    ) -> StoreResult<(Customer, Vec<PointHistory>)>;
    /// Sum and count of a customer's ledger rows
    async fn ledger_totals(&self, customer_id: Uuid) -> StoreResult<(i64, i64)>;

    async fn list_products(
        &self,
        restaurant_id: Uuid,
        filters: &ProductFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Product>>;
    async fn create_product(&self, product: Product) -> StoreResult<Product>;

    async fn resolve_notification_target(
        &self,
        restaurant_id: Uuid,
        target: &NotificationTarget,
    ) -> StoreResult<Vec<Uuid>>;
    async fn record_notification(&self, log: NotificationLog) -> StoreResult<NotificationLog>;
    async fn list_notifications(
        &self,
        restaurant_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<NotificationLog>>;
    async fn customer_notifications(
        &self,
        customer_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<CustomerNotification>>;

    async fn dashboard_metrics(
        &self,
        restaurant_id: Uuid,
        window: &DashboardWindow,
    ) -> StoreResult<DashboardMetrics>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

/// Build the backend selected by configuration
pub async fn store_from_config(config: &Config) -> anyhow::Result<Arc<dyn CrmStore>> {
    match config.store {
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.database).await?;
            if config.database.run_migrations {
                store.migrate().await?;
            }
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::points::models::PointSource;

    #[test]
    fn ledger_check_rejects_overdraft_in_order() {
        let spend_first = vec![
            PointEntry::spent(30, PointSource::Reward, "redeem"),
            PointEntry::earned(50, PointSource::Purchase, "sale"),
        ];
        assert!(matches!(
            check_ledger(20, &spend_first),
            Err(StoreError::InsufficientPoints { balance: 20, requested: 30 })
        ));
        assert_eq!(check_ledger(30, &spend_first).unwrap(), 50);
    }

    #[test]
    fn ledger_check_refuses_to_wrap_the_balance() {
        let top_up = vec![PointEntry::earned(1, PointSource::Manual, "top up")];
        assert!(matches!(
            check_ledger(i64::MAX, &top_up),
            Err(StoreError::BalanceOutOfRange { balance: i64::MAX, amount: 1 })
        ));

        let err: AppError = check_ledger(i64::MAX, &top_up).unwrap_err().into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(matches!(err, AppError::InvalidFields(ref fields) if fields.contains_key("points")));
    }

    #[test]
    fn store_errors_map_to_http_errors() {
        let err: AppError = StoreError::NotFound("Customer").into();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

        let err: AppError = StoreError::UsageCapReached { campaign_id: Uuid::nil() }.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

        let err: AppError = StoreError::InsufficientPoints { balance: 1, requested: 5 }.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
