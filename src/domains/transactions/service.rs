//! Recording sales and reading them back

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{Page, PageRequest, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::{
    AppliedCampaign, CampaignCap, SaleRecord, Transaction, TransactionFilters, TransactionItem,
    TransactionStatus, TransactionSummary, TransactionView,
};
use crate::domains::campaigns::discount::{applies_to_order, DraftOrder, OrderLine};
use crate::domains::campaigns::eligibility::ineligibility_reason;
use crate::domains::campaigns::models::Campaign;
use crate::domains::campaigns::service::eligibility_context;
use crate::domains::context::Principal;
use crate::domains::customers::models::Customer;
use crate::domains::loyalty::accrual::base_points;
use crate::domains::loyalty::{campaign_bonus_points, net_delta, points_for_amount};
use crate::domains::money::{Money, MAX_AMOUNT};
use crate::domains::points::models::{PointEntry, PointSource};
use crate::observability::metrics;
use crate::store::{CrmStore, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransactionItemRequest {
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub product_name: String,
    pub category: Option<String>,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
    pub unit_price: Money,
    pub total_price: Money,
    #[serde(default)]
    pub discount_amount: Money,
    #[serde(default)]
    pub is_free: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppliedCampaignRequest {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub discount_amount: Money,
    #[serde(default)]
    pub free_items: Vec<String>,
}

/// Body of `POST /transactions`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Order number must be between 1 and 50 characters"))]
    pub order_number: Option<String>,
    pub total_amount: Money,
    #[serde(default)]
    pub discount_amount: Money,
    pub final_amount: Money,
    #[serde(default)]
    #[validate(range(min = 0, max = 1_000_000_000, message = "Points used must be between 0 and 1000000000"))]
    pub points_used: i64,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Vec<TransactionItemRequest>,
    #[serde(default)]
    pub applied_campaigns: Vec<AppliedCampaignRequest>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl CreateTransactionRequest {
    fn check_amounts(&self, errors: &mut shared::FieldErrors) {
        for (field, amount) in [
            ("total_amount", self.total_amount),
            ("discount_amount", self.discount_amount),
            ("final_amount", self.final_amount),
        ] {
            if amount.is_out_of_range() {
                push_field_error(errors, field, amount_range_message());
            }
        }
        let in_range = ![self.total_amount, self.discount_amount, self.final_amount]
            .iter()
            .any(|amount| amount.is_out_of_range());
        if in_range && self.total_amount.checked_sub(self.discount_amount) != Some(self.final_amount) {
            push_field_error(errors, "final_amount", "Final amount must equal total minus discount");
        }
        if self.items.is_empty() {
            push_field_error(errors, "items", "At least one item is required");
        }
        for (index, item) in self.items.iter().enumerate() {
            for (field, amount) in [
                ("unit_price", item.unit_price),
                ("total_price", item.total_price),
                ("discount_amount", item.discount_amount),
            ] {
                if amount.is_out_of_range() {
                    push_field_error(errors, format!("items[{}].{}", index, field), amount_range_message());
                }
            }
        }
        let mut seen = HashSet::new();
        for (index, applied) in self.applied_campaigns.iter().enumerate() {
            if !seen.insert(applied.campaign_id) {
                push_field_error(
                    errors,
                    format!("applied_campaigns[{}].campaign_id", index),
                    "Campaign applied more than once",
                );
            }
            if applied.discount_amount.is_out_of_range() {
                push_field_error(
                    errors,
                    format!("applied_campaigns[{}].discount_amount", index),
                    amount_range_message(),
                );
            }
        }
    }
}

impl CreateTransactionRequest {
    /// The sale's lines as campaign rules see them
    fn draft_order(&self) -> DraftOrder {
        DraftOrder {
            items: self
                .items
                .iter()
                .map(|item| OrderLine {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}

fn amount_range_message() -> String {
    format!("Amount must be between 0 and {}", MAX_AMOUNT)
}

/// `ORD-20250314-9F2C41AB`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Points and ledger rows for one sale, before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct SalePoints {
    pub purchase_points: i64,
    /// Per applied campaign, in request order
    pub campaign_bonus: Vec<i64>,
    pub ledger: Vec<PointEntry>,
}

impl SalePoints {
    pub fn earned(&self) -> i64 {
        self.purchase_points + self.campaign_bonus.iter().sum::<i64>()
    }
}

/// Spent points leave the balance before earned points are credited
pub fn sale_points(
    transaction_id: Uuid,
    final_amount: Money,
    tier_multiplier: Option<Decimal>,
    points_used: i64,
    campaigns: &[Campaign],
) -> SalePoints {
    let purchase_points = points_for_amount(final_amount, tier_multiplier);
    let base = base_points(final_amount);
    let campaign_bonus: Vec<i64> = campaigns
        .iter()
        .map(|campaign| campaign_bonus_points(base, campaign.points_multiplier))
        .collect();

    let mut ledger = Vec::new();
    if points_used > 0 {
        ledger.push(
            PointEntry::spent(points_used, PointSource::Reward, "Points redeemed on purchase")
                .with_source_id(transaction_id),
        );
    }
    if purchase_points > 0 {
        ledger.push(
            PointEntry::earned(purchase_points, PointSource::Purchase, "Points earned on purchase")
                .with_source_id(transaction_id),
        );
    }
    for (campaign, bonus) in campaigns.iter().zip(&campaign_bonus) {
        if *bonus > 0 {
            ledger.push(
                PointEntry::earned(*bonus, PointSource::Campaign, format!("Campaign bonus: {}", campaign.name))
                    .with_source_id(campaign.id),
            );
        }
    }

    SalePoints {
        purchase_points,
        campaign_bonus,
        ledger,
    }
}

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn CrmStore>,
    tz: Tz,
}

impl TransactionService {
    pub fn new(store: Arc<dyn CrmStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub async fn list(
        &self,
        principal: &Principal,
        filters: &TransactionFilters,
        page: PageRequest,
    ) -> Result<Page<TransactionView>> {
        principal.require_back_office()?;
        Ok(self
            .store
            .list_transactions(principal.restaurant_id, filters, page)
            .await?)
    }

    pub async fn summary(&self, principal: &Principal, filters: &TransactionFilters) -> Result<TransactionSummary> {
        principal.require_back_office()?;
        Ok(self
            .store
            .transaction_summary(principal.restaurant_id, filters)
            .await?)
    }

    pub async fn create(&self, principal: &Principal, request: CreateTransactionRequest) -> Result<(Transaction, Customer)> {
        principal.require_back_office()?;
        let result = self.create_at(principal, request, Utc::now()).await;
        metrics::record_sale(result.is_ok());
        result
    }

    async fn create_at(
        &self,
        principal: &Principal,
        request: CreateTransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<(Transaction, Customer)> {
        let mut errors = field_errors_of(&request);
        request.check_amounts(&mut errors);
        ensure_valid(errors)?;

        let restaurant_id = principal.restaurant_id;
        let customer = self.store.get_customer(restaurant_id, request.customer_id).await?;

        let mut errors = shared::FieldErrors::new();
        if request.points_used > customer.points {
            push_field_error(
                &mut errors,
                "points_used",
                format!("Customer has only {} points", customer.points),
            );
        }

        let mut campaigns = Vec::with_capacity(request.applied_campaigns.len());
        for (index, applied) in request.applied_campaigns.iter().enumerate() {
            match self.store.get_campaign(restaurant_id, applied.campaign_id).await {
                Ok(campaign) => campaigns.push(campaign),
                Err(StoreError::NotFound(_)) => push_field_error(
                    &mut errors,
                    format!("applied_campaigns[{}].campaign_id", index),
                    "Campaign does not exist",
                ),
                Err(e) => return Err(e.into()),
            }
        }
        ensure_valid(errors)?;

        let ctx = eligibility_context(self.store.as_ref(), customer.id, &campaigns, now).await?;
        let order = request.draft_order();
        let local_now = now.with_timezone(&self.tz).naive_local();
        let mut errors = shared::FieldErrors::new();
        for (index, campaign) in campaigns.iter().enumerate() {
            let field = format!("applied_campaigns[{}].campaign_id", index);
            if let Some(reason) = ineligibility_reason(campaign, &ctx) {
                warn!(campaign_id = %campaign.id, customer_id = %customer.id, ?reason, "Campaign not eligible at sale time");
                push_field_error(
                    &mut errors,
                    field,
                    format!("Campaign {} is not available to this customer", campaign.name),
                );
            } else if let Err(reason) = applies_to_order(campaign, &order, local_now) {
                warn!(campaign_id = %campaign.id, customer_id = %customer.id, ?reason, "Campaign does not fit the order");
                push_field_error(
                    &mut errors,
                    field,
                    format!("Campaign {} does not apply to this order", campaign.name),
                );
            }
        }
        ensure_valid(errors)?;

        let tier_multiplier = match customer.tier_id {
            Some(tier_id) => self
                .store
                .list_tiers(restaurant_id)
                .await?
                .into_iter()
                .find(|tier| tier.id == tier_id)
                .map(|tier| tier.point_multiplier),
            None => None,
        };

        let transaction_id = Uuid::new_v4();
        let points = sale_points(
            transaction_id,
            request.final_amount,
            tier_multiplier,
            request.points_used,
            &campaigns,
        );

        let applied_campaigns = request
            .applied_campaigns
            .iter()
            .zip(&campaigns)
            .zip(&points.campaign_bonus)
            .map(|((applied, campaign), bonus)| AppliedCampaign {
                campaign_id: campaign.id,
                campaign_name: campaign.name.clone(),
                discount_amount: applied.discount_amount,
                free_items: applied.free_items.clone(),
                points_earned: *bonus,
            })
            .collect();

        let items = request
            .items
            .into_iter()
            .map(|item| TransactionItem {
                id: Uuid::new_v4(),
                product_id: item.product_id,
                product_name: item.product_name.trim().to_string(),
                category: item.category,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
                discount_amount: item.discount_amount,
                is_free: item.is_free,
                notes: item.notes,
            })
            .collect();

        let order_number = request
            .order_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| generate_order_number(now));

        let transaction = Transaction {
            id: transaction_id,
            restaurant_id,
            customer_id: customer.id,
            order_number,
            total_amount: request.total_amount,
            discount_amount: request.discount_amount,
            final_amount: request.final_amount,
            points_earned: points.earned(),
            points_used: request.points_used,
            payment_method: request.payment_method,
            status: TransactionStatus::Completed,
            notes: request.notes,
            items,
            applied_campaigns,
            transaction_date: request.transaction_date.unwrap_or(now),
            created_at: now,
        };

        let campaign_caps = campaigns
            .iter()
            .map(|campaign| CampaignCap {
                campaign_id: campaign.id,
                max_usage: campaign.max_usage,
                max_usage_per_customer: campaign.max_usage_per_customer,
            })
            .collect();

        let ledger = points.ledger.clone();
        let (transaction, customer) = self
            .store
            .record_sale(SaleRecord {
                transaction,
                ledger: ledger.clone(),
                campaign_caps,
            })
            .await?;

        for entry in &ledger {
            metrics::record_points(entry.point_type.as_str(), entry.source.as_str(), entry.amount);
        }
        for campaign in &campaigns {
            metrics::record_campaign_redemption(campaign.campaign_type.as_str());
        }

        info!(
            transaction_id = %transaction.id,
            customer_id = %customer.id,
            order_number = %transaction.order_number,
            final_amount = %transaction.final_amount,
            points_earned = transaction.points_earned,
            points_used = transaction.points_used,
            delta = net_delta(transaction.points_earned, transaction.points_used),
            balance = customer.points,
            "Sale recorded"
        );
        Ok((transaction, customer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::campaigns::models::tests::campaign_fixture;
    use crate::domains::campaigns::discount::MAX_LINE_QUANTITY;
    use crate::domains::campaigns::models::CampaignType;
    use crate::domains::customers::models::{LoyaltyLevel, Tier};
    use crate::domains::points::models::PointType;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use shared::{AppError, Role};

    struct Fixture {
        store: Arc<dyn CrmStore>,
        service: TransactionService,
        principal: Principal,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        Fixture {
            service: TransactionService::new(store.clone(), chrono_tz::Europe::Istanbul),
            principal: Principal::new(Uuid::new_v4(), "kasa@aircrm.com", Role::Staff, Uuid::new_v4()),
            store,
        }
    }

    async fn customer_with(f: &Fixture, opening: i64, tier_id: Option<Uuid>) -> Customer {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            restaurant_id: f.principal.restaurant_id,
            name: "Burak Demir".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            points: 0,
            level: LoyaltyLevel::Regular,
            tier_id,
            total_spent: Money::ZERO,
            visit_count: 0,
            last_visit: None,
            created_at: now,
            updated_at: now,
        };
        let opening = (opening > 0).then(|| PointEntry::earned(opening, PointSource::Bonus, "Opening balance"));
        f.store.create_customer(customer, opening).await.unwrap()
    }

    fn sale(customer_id: Uuid, total: i64, discount: i64, points_used: i64) -> CreateTransactionRequest {
        CreateTransactionRequest {
            customer_id,
            order_number: None,
            total_amount: Money::from_units(total),
            discount_amount: Money::from_units(discount),
            final_amount: Money::from_units(total - discount),
            points_used,
            payment_method: Some("CARD".to_string()),
            notes: None,
            items: vec![TransactionItemRequest {
                product_id: None,
                product_name: "Menemen".to_string(),
                category: Some("Kahvaltı".to_string()),
                quantity: 1,
                unit_price: Money::from_units(total),
                total_price: Money::from_units(total),
                discount_amount: Money::ZERO,
                is_free: false,
                notes: None,
            }],
            applied_campaigns: vec![],
            transaction_date: None,
        }
    }

    #[tokio::test]
    async fn sale_moves_balance_and_ledger_together() {
        let f = fixture();
        let customer = customer_with(&f, 50, None).await;

        let (transaction, updated) = f
            .service
            .create(&f.principal, sale(customer.id, 99, 0, 20))
            .await
            .unwrap();

        assert_eq!(transaction.points_earned, 9);
        assert_eq!(updated.points, 50 - 20 + 9);
        assert_eq!(updated.visit_count, 1);
        assert_eq!(updated.total_spent, Money::from_units(99));
        assert!(transaction.order_number.starts_with("ORD-"));
        assert_eq!(f.store.ledger_totals(customer.id).await.unwrap(), (39, 3));
    }

    #[tokio::test]
    async fn tier_multiplier_applies_when_assigned() {
        let f = fixture();
        let tier = f
            .store
            .create_tier(Tier {
                id: Uuid::new_v4(),
                restaurant_id: f.principal.restaurant_id,
                name: "gold".to_string(),
                display_name: "Altın".to_string(),
                level: 3,
                min_points: 1000,
                point_multiplier: Decimal::from(2),
                discount_percent: Decimal::ZERO,
                color: None,
            })
            .await
            .unwrap();
        let customer = customer_with(&f, 0, Some(tier.id)).await;

        let (transaction, _) = f
            .service
            .create(&f.principal, sale(customer.id, 100, 0, 0))
            .await
            .unwrap();
        assert_eq!(transaction.points_earned, 20);
    }

    #[tokio::test]
    async fn overspending_points_writes_nothing() {
        let f = fixture();
        let customer = customer_with(&f, 10, None).await;

        let err = f
            .service
            .create(&f.principal, sale(customer.id, 100, 0, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("points_used")));
        assert_eq!(f.store.ledger_totals(customer.id).await.unwrap(), (10, 1));
    }

    #[tokio::test]
    async fn inconsistent_totals_are_rejected() {
        let f = fixture();
        let customer = customer_with(&f, 0, None).await;
        let mut request = sale(customer.id, 100, 10, 0);
        request.final_amount = Money::from_units(95);
        request.items[0].quantity = 0;

        let err = f.service.create(&f.principal, request).await.unwrap_err();
        match err {
            AppError::InvalidFields(map) => {
                assert!(map.contains_key("final_amount"));
                assert!(map.contains_key("items[0].quantity"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn per_customer_cap_is_enforced_at_sale_time() {
        let f = fixture();
        let customer = customer_with(&f, 0, None).await;
        let now = Utc::now();
        let mut campaign = campaign_fixture();
        campaign.restaurant_id = f.principal.restaurant_id;
        campaign.start_date = now - Duration::days(1);
        campaign.end_date = now + Duration::days(1);
        campaign.max_usage_per_customer = Some(1);
        let campaign = f.store.create_campaign(campaign).await.unwrap();

        let mut request = sale(customer.id, 100, 20, 0);
        request.applied_campaigns = vec![AppliedCampaignRequest {
            campaign_id: campaign.id,
            discount_amount: Money::from_units(20),
            free_items: vec![],
        }];
        f.service.create(&f.principal, request.clone()).await.unwrap();

        let err = f.service.create(&f.principal, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("applied_campaigns[0].campaign_id")));
    }

    #[tokio::test]
    async fn extreme_amounts_are_field_errors() {
        let f = fixture();
        let customer = customer_with(&f, 0, None).await;
        let mut request = sale(customer.id, 100, 0, 0);
        request.total_amount = Money::from_minor(i64::MAX);
        request.discount_amount = Money::from_minor(-1);
        request.final_amount = Money::from_minor(i64::MAX);
        request.items[0].quantity = MAX_LINE_QUANTITY + 1;

        let err = f.service.create(&f.principal, request).await.unwrap_err();
        match err {
            AppError::InvalidFields(map) => {
                assert!(map.contains_key("total_amount"));
                assert!(map.contains_key("discount_amount"));
                assert!(map.contains_key("items[0].quantity"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(f.store.ledger_totals(customer.id).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn sale_without_items_is_rejected() {
        let f = fixture();
        let customer = customer_with(&f, 0, None).await;
        let mut request = sale(customer.id, 100, 0, 0);
        request.items.clear();

        let err = f.service.create(&f.principal, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("items")));
    }

    #[tokio::test]
    async fn campaign_minimum_purchase_is_checked_at_sale_time() {
        let f = fixture();
        let customer = customer_with(&f, 0, None).await;
        let now = Utc::now();
        let mut campaign = campaign_fixture();
        campaign.restaurant_id = f.principal.restaurant_id;
        campaign.start_date = now - Duration::days(1);
        campaign.end_date = now + Duration::days(1);
        campaign.min_purchase = Some(Money::from_units(200));
        let campaign = f.store.create_campaign(campaign).await.unwrap();

        let mut request = sale(customer.id, 100, 20, 0);
        request.applied_campaigns = vec![AppliedCampaignRequest {
            campaign_id: campaign.id,
            discount_amount: Money::from_units(20),
            free_items: vec![],
        }];

        let err = f.service.create(&f.principal, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("applied_campaigns[0].campaign_id")));
        assert_eq!(f.store.ledger_totals(customer.id).await.unwrap(), (0, 0));
    }

    #[test]
    fn loyalty_campaign_adds_bonus_after_spend() {
        let mut campaign = campaign_fixture();
        campaign.campaign_type = CampaignType::LoyaltyPoints;
        campaign.points_multiplier = Decimal::from(3);
        let id = Uuid::new_v4();

        let points = sale_points(id, Money::from_units(100), None, 5, &[campaign.clone()]);
        assert_eq!(points.purchase_points, 10);
        assert_eq!(points.campaign_bonus, vec![20]);
        assert_eq!(points.earned(), 30);

        let kinds: Vec<(PointType, PointSource, i64)> = points
            .ledger
            .iter()
            .map(|e| (e.point_type, e.source, e.amount))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PointType::Spent, PointSource::Reward, -5),
                (PointType::Earned, PointSource::Purchase, 10),
                (PointType::Earned, PointSource::Campaign, 20),
            ]
        );
        assert_eq!(points.ledger[2].source_id, Some(campaign.id));
    }
}
