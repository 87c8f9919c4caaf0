//! In-memory implementation of the CRM store.
//!
//! All state lives in one struct behind a single `tokio::sync::RwLock`, so
//! every multi-entity write (a sale, a point adjustment, a segment refresh)
//! happens under one write guard and is atomic with respect to other requests.
//! Nothing is durable: state is lost when the process exits. Used for local
//! development and by the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_ledger, CrmStore, CustomerHistory, StoreError, StoreResult};
use crate::domains::campaigns::models::{
    Campaign, CampaignFilters, CampaignUsage, CampaignWithUsage, UsageCounts,
};
use crate::domains::customers::models::{Customer, CustomerFilters, Tier};
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
use crate::domains::segments::models::{RefreshOutcome, Segment, SegmentMember};
use crate::domains::transactions::models::{
    SaleRecord, Transaction, TransactionFilters, TransactionStatus, TransactionSummary,
    TransactionView,
};
use crate::domains::users::{Restaurant, User};
use shared::{Page, PageRequest};

#[derive(Debug, Default)]
struct State {
    restaurants: HashMap<Uuid, Restaurant>,
    users: Vec<User>,
    tiers: Vec<Tier>,
    customers: HashMap<Uuid, Customer>,
    campaigns: Vec<Campaign>,
    usages: Vec<CampaignUsage>,
    segments: Vec<Segment>,
    memberships: HashMap<Uuid, BTreeSet<Uuid>>,
    transactions: Vec<Transaction>,
    point_history: Vec<PointHistory>,
    products: Vec<Product>,
    notifications: Vec<NotificationLog>,
}

impl State {
    fn customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<&Customer> {
        self.customers
            .get(&customer_id)
            .filter(|c| c.restaurant_id == restaurant_id)
            .ok_or(StoreError::NotFound("Customer"))
    }

    fn customer_name(&self, customer_id: Uuid) -> String {
        self.customers
            .get(&customer_id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn belongs_to(&self, restaurant_id: Uuid, customer_id: Uuid) -> bool {
        self.customers
            .get(&customer_id)
            .map_or(false, |c| c.restaurant_id == restaurant_id)
    }

    fn segment_with_count(&self, segment: &Segment) -> Segment {
        let mut segment = segment.clone();
        segment.member_count = self
            .memberships
            .get(&segment.id)
            .map_or(0, |members| members.len() as i64);
        segment
    }

    fn usage_total(&self, campaign_id: Uuid) -> i64 {
        self.usages.iter().filter(|u| u.campaign_id == campaign_id).count() as i64
    }

    /// Append entries and move the balance; entries must have passed `check_ledger`
    fn write_ledger(
        &mut self,
        customer_id: Uuid,
        entries: Vec<PointEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<PointHistory>> {
        let customer = self
            .customers
            .get_mut(&customer_id)
            .ok_or(StoreError::NotFound("Customer"))?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            customer.points += entry.amount;
            rows.push(PointHistory {
                id: Uuid::new_v4(),
                customer_id,
                amount: entry.amount,
                point_type: entry.point_type,
                source: entry.source,
                source_id: entry.source_id,
                description: entry.description,
                balance_after: customer.points,
                created_at: now,
            });
        }
        customer.updated_at = now;
        self.point_history.extend(rows.iter().cloned());
        Ok(rows)
    }

    fn completed_in_restaurant(&self, restaurant_id: Uuid) -> impl Iterator<Item = &Transaction> + '_ {
        self.transactions
            .iter()
            .filter(move |t| t.restaurant_id == restaurant_id && t.status == TransactionStatus::Completed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    // stable sort over reversed insertion order keeps later inserts first on ties
    items.reverse();
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn create_restaurant(&self, restaurant: Restaurant) -> StoreResult<Restaurant> {
        let mut state = self.state.write().await;
        state.restaurants.insert(restaurant.id, restaurant.clone());
        Ok(restaurant)
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.email)));
        }
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_tiers(&self, restaurant_id: Uuid) -> StoreResult<Vec<Tier>> {
        let state = self.state.read().await;
        let mut tiers: Vec<Tier> = state
            .tiers
            .iter()
            .filter(|t| t.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        tiers.sort_by_key(|t| (t.level, t.min_points));
        Ok(tiers)
    }

    async fn create_tier(&self, tier: Tier) -> StoreResult<Tier> {
        let mut state = self.state.write().await;
        if state
            .tiers
            .iter()
            .any(|t| t.restaurant_id == tier.restaurant_id && t.name == tier.name)
        {
            return Err(StoreError::Conflict(format!("tier {} already exists", tier.name)));
        }
        state.tiers.push(tier.clone());
        Ok(tier)
    }

    async fn list_customers(
        &self,
        restaurant_id: Uuid,
        filters: &CustomerFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Customer>> {
        let state = self.state.read().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| c.restaurant_id == restaurant_id && filters.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
        Ok(Page::from_vec(customers, page))
    }

    async fn get_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<Customer> {
        let state = self.state.read().await;
        state.customer(restaurant_id, customer_id).cloned()
    }

    async fn create_customer(
        &self,
        customer: Customer,
        opening: Option<PointEntry>,
    ) -> StoreResult<Customer> {
        let mut state = self.state.write().await;
        if let Some(email) = customer.email.as_deref() {
            let taken = state.customers.values().any(|c| {
                c.restaurant_id == customer.restaurant_id
                    && c.email.as_deref().map_or(false, |e| e.eq_ignore_ascii_case(email))
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "a customer with email {} already exists",
                    email
                )));
            }
        }

        let id = customer.id;
        let now = customer.created_at;
        let mut customer = customer;
        customer.points = 0;
        if let Some(entry) = &opening {
            check_ledger(0, std::slice::from_ref(entry))?;
        }
        state.customers.insert(id, customer);
        if let Some(entry) = opening {
            state.write_ledger(id, vec![entry], now)?;
        }
        Ok(state.customers[&id].clone())
    }

    async fn update_customer(&self, customer: Customer) -> StoreResult<Customer> {
        let mut state = self.state.write().await;
        if let Some(email) = customer.email.as_deref() {
            let taken = state.customers.values().any(|c| {
                c.id != customer.id
                    && c.restaurant_id == customer.restaurant_id
                    && c.email.as_deref().map_or(false, |e| e.eq_ignore_ascii_case(email))
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "a customer with email {} already exists",
                    email
                )));
            }
        }
        let existing = state
            .customers
            .get_mut(&customer.id)
            .filter(|c| c.restaurant_id == customer.restaurant_id)
            .ok_or(StoreError::NotFound("Customer"))?;

        existing.name = customer.name;
        existing.email = customer.email;
        existing.phone = customer.phone;
        existing.birth_date = customer.birth_date;
        existing.level = customer.level;
        existing.tier_id = customer.tier_id;
        existing.updated_at = customer.updated_at;
        Ok(existing.clone())
    }

    async fn delete_customer(&self, restaurant_id: Uuid, customer_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.customer(restaurant_id, customer_id)?;
        state.customers.remove(&customer_id);
        state.transactions.retain(|t| t.customer_id != customer_id);
        state.point_history.retain(|p| p.customer_id != customer_id);
        state.usages.retain(|u| u.customer_id != customer_id);
        for members in state.memberships.values_mut() {
            members.remove(&customer_id);
        }
        Ok(())
    }

    async fn customer_segment_ids(&self, customer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .segments
            .iter()
            .filter(|s| {
                state
                    .memberships
                    .get(&s.id)
                    .map_or(false, |members| members.contains(&customer_id))
            })
            .map(|s| s.id)
            .collect())
    }

    async fn push_targets(&self, restaurant_id: Uuid) -> StoreResult<Vec<PushTarget>> {
        let state = self.state.read().await;
        let mut targets: Vec<PushTarget> = state
            .customers
            .values()
            .filter(|c| c.restaurant_id == restaurant_id)
            .map(|c| PushTarget {
                id: c.id,
                name: c.name.clone(),
                email: c.email.clone(),
                level: c.level,
                segment_ids: state
                    .segments
                    .iter()
                    .filter(|s| state.memberships.get(&s.id).map_or(false, |m| m.contains(&c.id)))
                    .map(|s| s.id)
                    .collect(),
            })
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(targets)
    }

    async fn list_campaigns(
        &self,
        restaurant_id: Uuid,
        filters: &CampaignFilters,
        page: PageRequest,
    ) -> StoreResult<Page<CampaignWithUsage>> {
        let state = self.state.read().await;
        let mut campaigns: Vec<CampaignWithUsage> = state
            .campaigns
            .iter()
            .filter(|c| c.restaurant_id == restaurant_id && filters.matches(c))
            .map(|c| CampaignWithUsage {
                campaign: c.clone(),
                usage_count: state.usage_total(c.id),
            })
            .collect();
        newest_first(&mut campaigns, |c| c.campaign.created_at);
        Ok(Page::from_vec(campaigns, page))
    }

    async fn active_campaigns(&self, restaurant_id: Uuid) -> StoreResult<Vec<Campaign>> {
        let state = self.state.read().await;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .iter()
            .filter(|c| c.restaurant_id == restaurant_id && c.is_active)
            .cloned()
            .collect();
        newest_first(&mut campaigns, |c| c.created_at);
        Ok(campaigns)
    }

    async fn get_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign> {
        let state = self.state.read().await;
        state
            .campaigns
            .iter()
            .find(|c| c.id == campaign_id && c.restaurant_id == restaurant_id)
            .cloned()
            .ok_or(StoreError::NotFound("Campaign"))
    }

    async fn create_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        let mut state = self.state.write().await;
        state.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn update_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        let mut state = self.state.write().await;
        let existing = state
            .campaigns
            .iter_mut()
            .find(|c| c.id == campaign.id && c.restaurant_id == campaign.restaurant_id)
            .ok_or(StoreError::NotFound("Campaign"))?;
        *existing = campaign.clone();
        Ok(campaign)
    }

    async fn delete_campaign(&self, restaurant_id: Uuid, campaign_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let before = state.campaigns.len();
        state
            .campaigns
            .retain(|c| !(c.id == campaign_id && c.restaurant_id == restaurant_id));
        if state.campaigns.len() == before {
            return Err(StoreError::NotFound("Campaign"));
        }
        state.usages.retain(|u| u.campaign_id != campaign_id);
        Ok(())
    }

    async fn campaign_usage(
        &self,
        customer_id: Uuid,
        campaign_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, UsageCounts>> {
        let state = self.state.read().await;
        let mut usage: HashMap<Uuid, UsageCounts> = HashMap::new();
        for record in state.usages.iter().filter(|u| campaign_ids.contains(&u.campaign_id)) {
            let counts = usage.entry(record.campaign_id).or_default();
            counts.total += 1;
            if record.customer_id == customer_id {
                counts.by_customer += 1;
            }
        }
        Ok(usage)
    }

    async fn purchased_quantity(&self, customer_id: Uuid, product_ids: &[Uuid]) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.customer_id == customer_id && t.status == TransactionStatus::Completed)
            .flat_map(|t| t.items.iter())
            .filter(|item| {
                product_ids.is_empty()
                    || item.product_id.map_or(false, |id| product_ids.contains(&id))
            })
            .map(|item| item.quantity as i64)
            .sum())
    }

    async fn list_segments(&self, restaurant_id: Uuid, page: PageRequest) -> StoreResult<Page<Segment>> {
        let state = self.state.read().await;
        let mut segments: Vec<Segment> = state
            .segments
            .iter()
            .filter(|s| s.restaurant_id == restaurant_id)
            .map(|s| state.segment_with_count(s))
            .collect();
        newest_first(&mut segments, |s| s.created_at);
        Ok(Page::from_vec(segments, page))
    }

    async fn get_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<Segment> {
        let state = self.state.read().await;
        state
            .segments
            .iter()
            .find(|s| s.id == segment_id && s.restaurant_id == restaurant_id)
            .map(|s| state.segment_with_count(s))
            .ok_or(StoreError::NotFound("Segment"))
    }

    async fn segment_members(&self, segment_id: Uuid) -> StoreResult<Vec<SegmentMember>> {
        let state = self.state.read().await;
        let mut members: Vec<SegmentMember> = state
            .memberships
            .get(&segment_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.customers.get(id))
            .map(|c| SegmentMember {
                customer_id: c.id,
                name: c.name.clone(),
                email: c.email.clone(),
                points: c.points,
            })
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn create_segment(&self, segment: Segment) -> StoreResult<Segment> {
        let mut state = self.state.write().await;
        state.segments.push(segment.clone());
        state.memberships.entry(segment.id).or_default();
        Ok(state.segment_with_count(&segment))
    }

    async fn update_segment(&self, segment: Segment) -> StoreResult<Segment> {
        let mut state = self.state.write().await;
        let existing = state
            .segments
            .iter_mut()
            .find(|s| s.id == segment.id && s.restaurant_id == segment.restaurant_id)
            .ok_or(StoreError::NotFound("Segment"))?;
        *existing = segment.clone();
        Ok(state.segment_with_count(&segment))
    }

    async fn delete_segment(&self, restaurant_id: Uuid, segment_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let before = state.segments.len();
        state
            .segments
            .retain(|s| !(s.id == segment_id && s.restaurant_id == restaurant_id));
        if state.segments.len() == before {
            return Err(StoreError::NotFound("Segment"));
        }
        state.memberships.remove(&segment_id);
        for campaign in state.campaigns.iter_mut() {
            campaign.segment_ids.retain(|id| *id != segment_id);
        }
        Ok(())
    }

    async fn add_segment_members(&self, segment_id: Uuid, customer_ids: &[Uuid]) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let restaurant_id = state
            .segments
            .iter()
            .find(|s| s.id == segment_id)
            .map(|s| s.restaurant_id)
            .ok_or(StoreError::NotFound("Segment"))?;
        if let Some(missing) = customer_ids.iter().find(|id| !state.belongs_to(restaurant_id, **id)) {
            return Err(StoreError::Conflict(format!(
                "customer {} does not belong to this restaurant",
                missing
            )));
        }
        let members = state.memberships.entry(segment_id).or_default();
        let added = customer_ids.iter().filter(|id| members.insert(**id)).count();
        Ok(added as i64)
    }

    async fn remove_segment_member(&self, segment_id: Uuid, customer_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let removed = state
            .memberships
            .get_mut(&segment_id)
            .map_or(false, |members| members.remove(&customer_id));
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound("Segment member"))
        }
    }

    async fn replace_segment_members(
        &self,
        segment_id: Uuid,
        customer_ids: &[Uuid],
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<RefreshOutcome> {
        let mut state = self.state.write().await;
        let segment = state
            .segments
            .iter_mut()
            .find(|s| s.id == segment_id)
            .ok_or(StoreError::NotFound("Segment"))?;
        segment.last_refreshed_at = Some(refreshed_at);
        segment.updated_at = refreshed_at;

        let next: BTreeSet<Uuid> = customer_ids.iter().copied().collect();
        let previous = state.memberships.insert(segment_id, next.clone()).unwrap_or_default();

        Ok(RefreshOutcome {
            added: next.difference(&previous).count() as i64,
            removed: previous.difference(&next).count() as i64,
            total: next.len() as i64,
        })
    }

    async fn purchase_history(&self, restaurant_id: Uuid) -> StoreResult<Vec<CustomerHistory>> {
        let state = self.state.read().await;
        let mut purchases: HashMap<Uuid, Vec<PurchaseFact>> = HashMap::new();
        for t in state.completed_in_restaurant(restaurant_id) {
            purchases.entry(t.customer_id).or_default().push(PurchaseFact {
                final_amount: t.final_amount,
                occurred_at: t.transaction_date,
            });
        }
        Ok(state
            .customers
            .values()
            .filter(|c| c.restaurant_id == restaurant_id)
            .map(|c| CustomerHistory {
                customer_id: c.id,
                visit_count: c.visit_count,
                points: c.points,
                purchases: purchases.remove(&c.id).unwrap_or_default(),
            })
            .collect())
    }

    async fn list_transactions(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
        page: PageRequest,
    ) -> StoreResult<Page<TransactionView>> {
        let state = self.state.read().await;
        let mut transactions: Vec<TransactionView> = state
            .transactions
            .iter()
            .filter(|t| t.restaurant_id == restaurant_id && filters.matches(t))
            .map(|t| TransactionView {
                transaction: t.clone(),
                customer_name: state.customer_name(t.customer_id),
            })
            .collect();
        newest_first(&mut transactions, |t| t.transaction.transaction_date);
        Ok(Page::from_vec(transactions, page))
    }

    async fn transaction_summary(
        &self,
        restaurant_id: Uuid,
        filters: &TransactionFilters,
    ) -> StoreResult<TransactionSummary> {
        let state = self.state.read().await;
        let mut summary = TransactionSummary::default();
        for t in state
            .completed_in_restaurant(restaurant_id)
            .filter(|t| filters.matches(t))
        {
            summary.count += 1;
            summary.revenue += t.final_amount;
            summary.discounts += t.discount_amount;
            summary.points_earned += t.points_earned;
            summary.points_used += t.points_used;
        }
        summary.average_order_value = summary.revenue.average_over(summary.count);
        Ok(summary)
    }

    async fn record_sale(&self, sale: SaleRecord) -> StoreResult<(Transaction, Customer)> {
        let mut state = self.state.write().await;
        let transaction = sale.transaction;
        let customer = state
            .customer(transaction.restaurant_id, transaction.customer_id)?
            .clone();

        for cap in &sale.campaign_caps {
            let total = state.usage_total(cap.campaign_id);
            let by_customer = state
                .usages
                .iter()
                .filter(|u| u.campaign_id == cap.campaign_id && u.customer_id == customer.id)
                .count() as i64;
            if cap.max_usage.map_or(false, |max| total >= max)
                || cap.max_usage_per_customer.map_or(false, |max| by_customer >= max)
            {
                return Err(StoreError::UsageCapReached {
                    campaign_id: cap.campaign_id,
                });
            }
        }
        check_ledger(customer.points, &sale.ledger)?;

        let now = transaction.created_at;
        for applied in &transaction.applied_campaigns {
            state.usages.push(CampaignUsage {
                id: Uuid::new_v4(),
                campaign_id: applied.campaign_id,
                customer_id: customer.id,
                transaction_id: Some(transaction.id),
                used_at: transaction.transaction_date,
            });
        }
        state.write_ledger(customer.id, sale.ledger, now)?;

        let updated = {
            let record = state
                .customers
                .get_mut(&customer.id)
                .ok_or(StoreError::NotFound("Customer"))?;
            if transaction.status == TransactionStatus::Completed {
                record.total_spent += transaction.final_amount;
                record.visit_count += 1;
                record.last_visit = Some(
                    record
                        .last_visit
                        .map_or(transaction.transaction_date, |last| last.max(transaction.transaction_date)),
                );
            }
            record.updated_at = now;
            record.clone()
        };
        state.transactions.push(transaction.clone());
        Ok((transaction, updated))
    }

    async fn list_point_history(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
        page: PageRequest,
    ) -> StoreResult<Page<PointHistoryView>> {
        let state = self.state.read().await;
        let mut rows: Vec<PointHistoryView> = state
            .point_history
            .iter()
            .filter(|p| state.belongs_to(restaurant_id, p.customer_id) && filters.matches(p))
            .map(|p| PointHistoryView {
                entry: p.clone(),
                customer_name: state.customer_name(p.customer_id),
            })
            .collect();
        newest_first(&mut rows, |p| p.entry.created_at);
        Ok(Page::from_vec(rows, page))
    }

    async fn point_stats(
        &self,
        restaurant_id: Uuid,
        filters: &PointHistoryFilters,
    ) -> StoreResult<PointStats> {
        let state = self.state.read().await;
        Ok(PointStats::from_entries(state.point_history.iter().filter(|p| {
            state.belongs_to(restaurant_id, p.customer_id) && filters.matches(p)
        })))
    }

    async fn apply_points(
        &self,
        restaurant_id: Uuid,
        customer_id: Uuid,
        entries: Vec<PointEntry>,
    ) -> StoreResult<(Customer, Vec<PointHistory>)> {
        let mut state = self.state.write().await;
        let customer = state.customer(restaurant_id, customer_id)?.clone();
        check_ledger(customer.points, &entries)?;
        let rows = state.write_ledger(customer_id, entries, Utc::now())?;
        let customer = state.customer(restaurant_id, customer_id)?.clone();
        Ok((customer, rows))
    }

    async fn ledger_totals(&self, customer_id: Uuid) -> StoreResult<(i64, i64)> {
        let state = self.state.read().await;
        Ok(state
            .point_history
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .fold((0, 0), |(sum, count), p| (sum + p.amount, count + 1)))
    }

    async fn list_products(
        &self,
        restaurant_id: Uuid,
        filters: &ProductFilters,
        page: PageRequest,
    ) -> StoreResult<Page<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| p.restaurant_id == restaurant_id && filters.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
        Ok(Page::from_vec(products, page))
    }

    async fn create_product(&self, product: Product) -> StoreResult<Product> {
        let mut state = self.state.write().await;
        if state.products.iter().any(|p| {
            p.restaurant_id == product.restaurant_id && p.name.eq_ignore_ascii_case(&product.name)
        }) {
            return Err(StoreError::Conflict(format!("product {} already exists", product.name)));
        }
        state.products.push(product.clone());
        Ok(product)
    }

    async fn resolve_notification_target(
        &self,
        restaurant_id: Uuid,
        target: &NotificationTarget,
    ) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        let in_restaurant = state
            .customers
            .values()
            .filter(|c| c.restaurant_id == restaurant_id);

        let ids: BTreeSet<Uuid> = match target {
            NotificationTarget::All => in_restaurant.map(|c| c.id).collect(),
            NotificationTarget::Levels(levels) => in_restaurant
                .filter(|c| levels.contains(&c.level))
                .map(|c| c.id)
                .collect(),
            NotificationTarget::Customers(ids) => in_restaurant
                .filter(|c| ids.contains(&c.id))
                .map(|c| c.id)
                .collect(),
            NotificationTarget::Segments(segment_ids) => state
                .segments
                .iter()
                .filter(|s| s.restaurant_id == restaurant_id && segment_ids.contains(&s.id))
                .filter_map(|s| state.memberships.get(&s.id))
                .flatten()
                .copied()
                .collect(),
        };
        Ok(ids.into_iter().collect())
    }

    async fn record_notification(&self, log: NotificationLog) -> StoreResult<NotificationLog> {
        let mut state = self.state.write().await;
        state.notifications.push(log.clone());
        Ok(log)
    }

    async fn list_notifications(
        &self,
        restaurant_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<NotificationLog>> {
        let state = self.state.read().await;
        let mut logs: Vec<NotificationLog> = state
            .notifications
            .iter()
            .filter(|n| n.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        newest_first(&mut logs, |n| n.created_at);
        Ok(Page::from_vec(logs, page))
    }

    async fn customer_notifications(
        &self,
        customer_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<Page<CustomerNotification>> {
        let state = self.state.read().await;
        let mut feed: Vec<CustomerNotification> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_ids.contains(&customer_id))
            .map(CustomerNotification::from)
            .collect();
        newest_first(&mut feed, |n| n.created_at);
        Ok(Page::from_vec(feed, page))
    }

    async fn dashboard_metrics(
        &self,
        restaurant_id: Uuid,
        window: &DashboardWindow,
    ) -> StoreResult<DashboardMetrics> {
        let state = self.state.read().await;
        let this_month = |at: DateTime<Utc>| at >= window.month_start && at <= window.now;
        let last_month = |at: DateTime<Utc>| at >= window.last_month_start && at < window.month_start;

        let customers: Vec<&Customer> = state
            .customers
            .values()
            .filter(|c| c.restaurant_id == restaurant_id)
            .collect();
        let campaigns: Vec<&Campaign> = state
            .campaigns
            .iter()
            .filter(|c| c.restaurant_id == restaurant_id)
            .collect();
        let segments: Vec<&Segment> = state
            .segments
            .iter()
            .filter(|s| s.restaurant_id == restaurant_id)
            .collect();
        let completed: Vec<&Transaction> = state.completed_in_restaurant(restaurant_id).collect();

        let revenue = |pred: &dyn Fn(DateTime<Utc>) -> bool| -> Money {
            completed
                .iter()
                .filter(|t| pred(t.transaction_date))
                .map(|t| t.final_amount)
                .sum()
        };

        let mut recent: Vec<&Transaction> = completed.clone();
        recent.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        let recent_activity = recent
            .into_iter()
            .take(5)
            .map(|t| RecentActivity {
                transaction_id: t.id,
                customer_id: t.customer_id,
                customer_name: state.customer_name(t.customer_id),
                final_amount: t.final_amount,
                points_earned: t.points_earned,
                transaction_date: t.transaction_date,
            })
            .collect();

        let mut by_product: HashMap<String, (i64, Money)> = HashMap::new();
        for item in completed
            .iter()
            .filter(|t| this_month(t.transaction_date))
            .flat_map(|t| t.items.iter())
        {
            let entry = by_product.entry(item.product_name.clone()).or_default();
            entry.0 += item.quantity as i64;
            entry.1 += item.total_price;
        }
        let mut top_products: Vec<ProductSales> = by_product
            .into_iter()
            .map(|(product_name, (quantity, revenue))| ProductSales {
                product_name,
                quantity,
                revenue,
            })
            .collect();
        top_products.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then(b.revenue.cmp(&a.revenue))
                .then(a.product_name.cmp(&b.product_name))
        });
        top_products.truncate(5);

        let mut by_day: BTreeMap<chrono::NaiveDate, (Money, i64)> = BTreeMap::new();
        for t in completed
            .iter()
            .filter(|t| t.transaction_date >= window.week_start && t.transaction_date <= window.now)
        {
            let entry = by_day.entry(window.local_date(t.transaction_date)).or_default();
            entry.0 += t.final_amount;
            entry.1 += 1;
        }

        Ok(DashboardMetrics {
            total_customers: customers.len() as i64,
            customers_this_month: customers.iter().filter(|c| this_month(c.created_at)).count() as i64,
            customers_last_month: customers.iter().filter(|c| last_month(c.created_at)).count() as i64,
            total_campaigns: campaigns.len() as i64,
            active_campaigns: campaigns
                .iter()
                .filter(|c| c.is_active && c.is_within_window(window.now))
                .count() as i64,
            campaigns_ending_today: campaigns
                .iter()
                .filter(|c| {
                    c.is_active && c.end_date >= window.today_start && c.end_date < window.tomorrow_start
                })
                .count() as i64,
            total_segments: segments.len() as i64,
            segments_this_month: segments.iter().filter(|s| this_month(s.created_at)).count() as i64,
            total_transactions: completed.len() as i64,
            transactions_this_month: completed
                .iter()
                .filter(|t| this_month(t.transaction_date))
                .count() as i64,
            transactions_last_month: completed
                .iter()
                .filter(|t| last_month(t.transaction_date))
                .count() as i64,
            revenue_today: revenue(&|at| at >= window.today_start && at < window.tomorrow_start),
            revenue_this_month: revenue(&this_month),
            revenue_last_month: revenue(&last_month),
            recent_activity,
            top_products,
            revenue_by_day: by_day
                .into_iter()
                .map(|(date, (revenue, orders))| DailyRevenue { date, revenue, orders })
                .collect(),
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
