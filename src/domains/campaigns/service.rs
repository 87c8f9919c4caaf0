//! Campaign administration and the customer-facing campaign queries

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{AppError, FieldErrors, Page, PageRequest, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::discount::{
    applies_to_order, discount_for_order, DraftOrder, FreeItem, NotApplicable, MAX_LINE_QUANTITY,
};
use super::eligibility::{eligible_campaigns, EligibilityContext};
use super::models::{
    Campaign, CampaignFilters, CampaignType, CampaignWithUsage, DiscountRule, ValidHours,
};
use crate::domains::context::Principal;
use crate::domains::loyalty::stamps::{stamp_progress, StampProgress};
use crate::domains::money::{Money, MAX_AMOUNT};
use crate::store::{CrmStore, StoreError, StoreResult};

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

/// Body of `POST /campaigns` and `PUT /campaigns/:id`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CampaignRequest {
    #[validate(length(min = 2, max = 120, message = "Name must be between 2 and 120 characters"))]
    pub name: String,
    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,
    pub campaign_type: CampaignType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub discount: DiscountRule,
    pub min_purchase: Option<Money>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub max_usage: Option<i64>,
    #[validate(range(min = 1, message = "Per-customer limit must be at least 1"))]
    pub max_usage_per_customer: Option<i64>,
    pub valid_hours: Option<ValidHours>,
    #[serde(default)]
    pub valid_days: Vec<Weekday>,
    #[serde(default)]
    pub target_products: Vec<Uuid>,
    #[serde(default)]
    pub free_products: Vec<Uuid>,
    #[serde(default = "default_multiplier")]
    pub points_multiplier: Decimal,
    #[validate(range(min = 1, message = "Required points must be at least 1"))]
    pub points_required: Option<i64>,
    #[validate(range(min = 1, message = "Buy quantity must be at least 1"))]
    pub buy_quantity: Option<i32>,
    #[serde(default)]
    pub send_notification: bool,
    #[validate(length(max = 100))]
    pub notification_title: Option<String>,
    #[validate(length(max = 500))]
    pub notification_message: Option<String>,
    #[serde(default)]
    pub segment_ids: Vec<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CampaignRequest {
    /// Cross-field rules the derive cannot express
    fn field_errors(&self) -> FieldErrors {
        let mut errors = field_errors_of(self);

        if self.end_date < self.start_date {
            push_field_error(&mut errors, "end_date", "End date must not be before the start date");
        }
        match &self.discount {
            DiscountRule::Percentage { percent } => {
                if *percent <= Decimal::ZERO || *percent > Decimal::from(100) {
                    push_field_error(&mut errors, "discount.percent", "Percentage must be between 0 and 100");
                }
            }
            DiscountRule::FixedAmount { amount } => {
                if amount.is_negative() || amount.is_zero() {
                    push_field_error(&mut errors, "discount.amount", "Discount amount must be positive");
                }
            }
            DiscountRule::FreeItem => {
                if self.free_products.is_empty() {
                    push_field_error(&mut errors, "free_products", "Select at least one free product");
                }
            }
            DiscountRule::BuyOneGetOne => {}
        }
        if self.min_purchase.map_or(false, Money::is_negative) {
            push_field_error(&mut errors, "min_purchase", "Minimum purchase must not be negative");
        }
        if self.points_multiplier <= Decimal::ZERO {
            push_field_error(&mut errors, "points_multiplier", "Points multiplier must be positive");
        }
        if self.send_notification
            && self.notification_title.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            push_field_error(&mut errors, "notification_title", "Title is required when a notification is sent");
        }

        errors
    }

    fn into_campaign(self, id: Uuid, restaurant_id: Uuid, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Campaign {
        let mut segment_ids = self.segment_ids;
        segment_ids.sort();
        segment_ids.dedup();
        let mut valid_days = self.valid_days;
        valid_days.sort_by_key(Weekday::num_days_from_monday);
        valid_days.dedup();

        Campaign {
            id,
            restaurant_id,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            campaign_type: self.campaign_type,
            start_date: self.start_date,
            end_date: self.end_date,
            discount: self.discount,
            min_purchase: self.min_purchase,
            max_usage: self.max_usage,
            max_usage_per_customer: self.max_usage_per_customer,
            valid_hours: self.valid_hours,
            valid_days,
            target_products: self.target_products,
            free_products: self.free_products,
            points_multiplier: self.points_multiplier,
            points_required: self.points_required,
            buy_quantity: self.buy_quantity,
            send_notification: self.send_notification,
            notification_title: self.notification_title,
            notification_message: self.notification_message,
            segment_ids,
            is_active: self.is_active,
            created_at,
            updated_at: now,
        }
    }
}

/// What one campaign would do to a draft order
#[derive(Debug, Clone, Serialize)]
pub struct CampaignQuote {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub campaign_type: CampaignType,
    pub discount_amount: Money,
    pub free_items: Vec<FreeItem>,
    pub final_amount: Money,
}

/// Eligible campaign that does not fit the order as it stands
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCampaign {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    #[serde(flatten)]
    pub reason: NotApplicable,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteResult {
    pub order_total: Money,
    pub applicable: Vec<CampaignQuote>,
    pub not_applicable: Vec<SkippedCampaign>,
}

/// Build the eligibility context of one customer for the given campaigns
pub async fn eligibility_context(
    store: &dyn CrmStore,
    customer_id: Uuid,
    campaigns: &[Campaign],
    now: DateTime<Utc>,
) -> StoreResult<EligibilityContext> {
    let ids: Vec<Uuid> = campaigns.iter().map(|c| c.id).collect();
    let segments = store.customer_segment_ids(customer_id).await?;
    let usage = store.campaign_usage(customer_id, &ids).await?;

    let mut ctx = EligibilityContext::new(now).with_segments(segments);
    ctx.usage = usage;
    Ok(ctx)
}

/// Campaigns the customer may redeem at `now`, newest first
pub async fn available_campaigns(
    store: &dyn CrmStore,
    restaurant_id: Uuid,
    customer_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<Vec<Campaign>> {
    let campaigns = store.active_campaigns(restaurant_id).await?;
    let ctx = eligibility_context(store, customer_id, &campaigns, now).await?;
    Ok(eligible_campaigns(&campaigns, &ctx).into_iter().cloned().collect())
}

/// Stamp cards for every running campaign that counts purchases
pub async fn stamp_cards(
    store: &dyn CrmStore,
    restaurant_id: Uuid,
    customer_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<Vec<StampProgress>> {
    let campaigns: Vec<Campaign> = store
        .active_campaigns(restaurant_id)
        .await?
        .into_iter()
        .filter(|c| c.buy_quantity.is_some() && c.is_within_window(now))
        .collect();
    if campaigns.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = campaigns.iter().map(|c| c.id).collect();
    let usage = store.campaign_usage(customer_id, &ids).await?;

    let mut cards = Vec::with_capacity(campaigns.len());
    for campaign in &campaigns {
        let purchases = store
            .purchased_quantity(customer_id, &campaign.target_products)
            .await?;
        let used = usage.get(&campaign.id).map_or(0, |u| u.by_customer);
        if let Some(card) = stamp_progress(campaign, purchases, used) {
            cards.push(card);
        }
    }
    Ok(cards)
}

#[derive(Clone)]
pub struct CampaignService {
    store: Arc<dyn CrmStore>,
    tz: Tz,
}

impl CampaignService {
    pub fn new(store: Arc<dyn CrmStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub async fn list(
        &self,
        principal: &Principal,
        filters: &CampaignFilters,
        page: PageRequest,
    ) -> Result<Page<CampaignWithUsage>> {
        principal.require_back_office()?;
        Ok(self
            .store
            .list_campaigns(principal.restaurant_id, filters, page)
            .await?)
    }

    pub async fn get(&self, principal: &Principal, campaign_id: Uuid) -> Result<Campaign> {
        principal.require_back_office()?;
        Ok(self.store.get_campaign(principal.restaurant_id, campaign_id).await?)
    }

    pub async fn create(&self, principal: &Principal, request: CampaignRequest) -> Result<Campaign> {
        principal.require_back_office()?;
        self.validate(principal, &request).await?;

        let now = Utc::now();
        let campaign = request.into_campaign(Uuid::new_v4(), principal.restaurant_id, now, now);
        let campaign = self.store.create_campaign(campaign).await?;

        info!(
            campaign_id = %campaign.id,
            campaign_type = %campaign.campaign_type,
            restaurant_id = %campaign.restaurant_id,
            "Campaign created"
        );
        Ok(campaign)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        campaign_id: Uuid,
        request: CampaignRequest,
    ) -> Result<Campaign> {
        principal.require_back_office()?;
        let existing = self.store.get_campaign(principal.restaurant_id, campaign_id).await?;
        self.validate(principal, &request).await?;

        let campaign = request.into_campaign(existing.id, existing.restaurant_id, existing.created_at, Utc::now());
        let campaign = self.store.update_campaign(campaign).await?;

        info!(campaign_id = %campaign.id, "Campaign updated");
        Ok(campaign)
    }

    pub async fn delete(&self, principal: &Principal, campaign_id: Uuid) -> Result<()> {
        principal.require_admin()?;
        self.store.delete_campaign(principal.restaurant_id, campaign_id).await?;
        info!(campaign_id = %campaign_id, "Campaign deleted");
        Ok(())
    }

    pub async fn set_active(&self, principal: &Principal, campaign_id: Uuid, active: bool) -> Result<Campaign> {
        principal.require_back_office()?;
        let mut campaign = self.store.get_campaign(principal.restaurant_id, campaign_id).await?;
        if campaign.is_active == active {
            return Ok(campaign);
        }
        campaign.is_active = active;
        campaign.updated_at = Utc::now();
        let campaign = self.store.update_campaign(campaign).await?;

        info!(campaign_id = %campaign.id, active, "Campaign status changed");
        Ok(campaign)
    }

    /// Campaigns the customer may redeem right now
    pub async fn available_for_customer(&self, principal: &Principal, customer_id: Uuid) -> Result<Vec<Campaign>> {
        if !principal.can_view_customer(customer_id) {
            return Err(AppError::authorization("Not allowed to view this customer"));
        }
        // scope check: the customer must exist in the caller's restaurant
        self.store.get_customer(principal.restaurant_id, customer_id).await?;
        Ok(available_campaigns(self.store.as_ref(), principal.restaurant_id, customer_id, Utc::now()).await?)
    }

    /// Eligible campaigns that fit the draft order, with the discount each gives.
    /// Nothing is recorded; the caller picks which ones to apply.
    pub async fn quote(&self, principal: &Principal, customer_id: Uuid, order: DraftOrder) -> Result<QuoteResult> {
        principal.require_back_office()?;
        validate_order(&order)?;
        self.quote_at(principal, customer_id, &order, Utc::now()).await
    }

    async fn quote_at(
        &self,
        principal: &Principal,
        customer_id: Uuid,
        order: &DraftOrder,
        now: DateTime<Utc>,
    ) -> Result<QuoteResult> {
        self.store.get_customer(principal.restaurant_id, customer_id).await?;
        let campaigns = available_campaigns(self.store.as_ref(), principal.restaurant_id, customer_id, now).await?;
        let local_now = now.with_timezone(&self.tz).naive_local();
        let order_total = order.total();

        let mut applicable = Vec::new();
        let mut not_applicable = Vec::new();
        for campaign in campaigns {
            match applies_to_order(&campaign, order, local_now) {
                Ok(()) => {
                    let discount = discount_for_order(&campaign, order);
                    applicable.push(CampaignQuote {
                        campaign_id: campaign.id,
                        campaign_name: campaign.name,
                        campaign_type: campaign.campaign_type,
                        final_amount: order_total.saturating_sub(discount.amount),
                        discount_amount: discount.amount,
                        free_items: discount.free_items,
                    });
                }
                Err(reason) => not_applicable.push(SkippedCampaign {
                    campaign_id: campaign.id,
                    campaign_name: campaign.name,
                    reason,
                }),
            }
        }

        Ok(QuoteResult {
            order_total,
            applicable,
            not_applicable,
        })
    }

    async fn validate(&self, principal: &Principal, request: &CampaignRequest) -> Result<()> {
        let mut errors = request.field_errors();
        for segment_id in &request.segment_ids {
            match self.store.get_segment(principal.restaurant_id, *segment_id).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    push_field_error(&mut errors, "segment_ids", format!("Segment {} does not exist", segment_id))
                }
                Err(e) => return Err(e.into()),
            }
        }
        ensure_valid(errors)
    }
}

fn validate_order(order: &DraftOrder) -> Result<()> {
    let mut errors = FieldErrors::new();
    if order.items.is_empty() {
        push_field_error(&mut errors, "items", "At least one item is required");
    }
    for (index, line) in order.items.iter().enumerate() {
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            push_field_error(
                &mut errors,
                format!("items[{}].quantity", index),
                format!("Quantity must be between 1 and {}", MAX_LINE_QUANTITY),
            );
        }
        if line.unit_price.is_out_of_range() {
            push_field_error(
                &mut errors,
                format!("items[{}].unit_price", index),
                format!("Price must be between 0 and {}", MAX_AMOUNT),
            );
        }
    }
    ensure_valid(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::campaigns::discount::OrderLine;
    use crate::domains::campaigns::models::tests::campaign_fixture;
    use crate::domains::customers::models::{Customer, LoyaltyLevel};
    use crate::store::MemoryStore;
    use shared::Role;

    fn request() -> CampaignRequest {
        let campaign = campaign_fixture();
        CampaignRequest {
            name: campaign.name,
            description: campaign.description,
            campaign_type: campaign.campaign_type,
            start_date: campaign.start_date,
            end_date: campaign.end_date,
            discount: campaign.discount,
            min_purchase: None,
            max_usage: None,
            max_usage_per_customer: None,
            valid_hours: None,
            valid_days: vec![],
            target_products: vec![],
            free_products: vec![],
            points_multiplier: Decimal::ONE,
            points_required: None,
            buy_quantity: None,
            send_notification: false,
            notification_title: None,
            notification_message: None,
            segment_ids: vec![],
            is_active: true,
        }
    }

    fn customer(restaurant_id: Uuid) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            restaurant_id,
            name: "Ayşe Yılmaz".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            points: 0,
            level: LoyaltyLevel::Regular,
            tier_id: None,
            total_spent: Money::ZERO,
            visit_count: 0,
            last_visit: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cross_field_rules_are_reported_per_field() {
        let mut bad = request();
        bad.end_date = bad.start_date - chrono::Duration::days(1);
        bad.discount = DiscountRule::Percentage { percent: Decimal::from(120) };
        bad.max_usage = Some(0);
        bad.name = "x".to_string();

        let errors = bad.field_errors();
        assert!(errors.contains_key("end_date"));
        assert!(errors.contains_key("discount.percent"));
        assert!(errors.contains_key("max_usage"));
        assert!(errors.contains_key("name"));
        assert!(request().field_errors().is_empty());
    }

    #[tokio::test]
    async fn unknown_segment_is_rejected() {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        let service = CampaignService::new(store, chrono_tz::Europe::Istanbul);
        let principal = Principal::new(Uuid::new_v4(), "admin@aircrm.com", Role::RestaurantAdmin, Uuid::new_v4());

        let mut req = request();
        req.segment_ids = vec![Uuid::new_v4()];
        let err = service.create(&principal, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("segment_ids")));
    }

    #[tokio::test]
    async fn quote_splits_applicable_and_skipped() {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        let service = CampaignService::new(store.clone(), chrono_tz::Europe::Istanbul);
        let restaurant_id = Uuid::new_v4();
        let principal = Principal::new(Uuid::new_v4(), "staff@aircrm.com", Role::Staff, restaurant_id);
        let customer = store.create_customer(customer(restaurant_id), None).await.unwrap();

        let now = Utc::now();
        let mut percent = request();
        percent.start_date = now - chrono::Duration::days(1);
        percent.end_date = now + chrono::Duration::days(1);
        service.create(&principal, percent.clone()).await.unwrap();

        let mut big_spender = percent;
        big_spender.name = "Büyük sipariş".to_string();
        big_spender.min_purchase = Some(Money::from_units(1000));
        service.create(&principal, big_spender).await.unwrap();

        let order = DraftOrder {
            items: vec![OrderLine {
                product_id: None,
                product_name: "Latte".to_string(),
                quantity: 2,
                unit_price: Money::from_units(50),
            }],
        };
        let quote = service.quote_at(&principal, customer.id, &order, now).await.unwrap();

        assert_eq!(quote.order_total, Money::from_units(100));
        assert_eq!(quote.applicable.len(), 1);
        assert_eq!(quote.applicable[0].discount_amount, Money::from_units(20));
        assert_eq!(quote.applicable[0].final_amount, Money::from_units(80));
        assert_eq!(quote.not_applicable.len(), 1);
        assert!(matches!(
            quote.not_applicable[0].reason,
            NotApplicable::BelowMinimumPurchase { .. }
        ));
    }

    #[test]
    fn empty_order_is_invalid() {
        assert!(validate_order(&DraftOrder::default()).is_err());
    }

    #[test]
    fn oversized_order_lines_are_invalid() {
        let order = DraftOrder {
            items: vec![
                OrderLine {
                    product_id: None,
                    product_name: "Su".to_string(),
                    quantity: MAX_LINE_QUANTITY + 1,
                    unit_price: Money::from_units(1),
                },
                OrderLine {
                    product_id: None,
                    product_name: "Pide".to_string(),
                    quantity: 1,
                    unit_price: Money::from_minor(i64::MAX),
                },
            ],
        };
        match validate_order(&order) {
            Err(AppError::InvalidFields(map)) => {
                assert!(map.contains_key("items[0].quantity"));
                assert!(map.contains_key("items[1].unit_price"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
