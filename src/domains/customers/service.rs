//! Customer administration, customer detail page and loyalty tiers

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{AppError, Page, PageRequest, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::{Customer, CustomerFilters, CustomerStats, LoyaltyLevel, Tier};
use crate::domains::campaigns::models::Campaign;
use crate::domains::campaigns::service::{available_campaigns, stamp_cards};
use crate::domains::context::Principal;
use crate::domains::loyalty::{next_tier_progress, StampProgress, TierProgress};
use crate::domains::money::Money;
use crate::domains::points::models::{PointEntry, PointHistoryFilters, PointHistoryView, PointSource};
use crate::domains::transactions::models::{TransactionFilters, TransactionView};
use crate::store::CrmStore;

const DETAIL_TRANSACTIONS: u32 = 10;
const DETAIL_POINT_ROWS: u32 = 20;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 7, max = 20, message = "Phone must be between 7 and 20 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub level: LoyaltyLevel,
    pub tier_id: Option<Uuid>,
    /// Opening balance, written to the ledger as a bonus
    #[validate(range(min = 0, max = 1_000_000_000, message = "Initial points must be between 0 and 1000000000"))]
    pub initial_points: Option<i64>,
}

/// Partial profile update. `points` is accepted only to reject it with a
/// clear message: balances move through point adjustments. `tier_id: null`
/// removes the tier, an absent `tier_id` leaves it alone.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 7, max = 20, message = "Phone must be between 7 and 20 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub level: Option<LoyaltyLevel>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub tier_id: Option<Option<Uuid>>,
    pub points: Option<i64>,
}

/// Distinguishes a field sent as `null` (`Some(None)`) from a missing one (`None`)
fn explicit_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTierRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: String,
    #[validate(length(min = 2, max = 50))]
    pub display_name: String,
    #[validate(range(min = 0))]
    pub level: i32,
    #[validate(range(min = 0, message = "Threshold must not be negative"))]
    pub min_points: i64,
    pub point_multiplier: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    pub color: Option<String>,
}

/// Everything the customer detail page shows
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    pub customer: Customer,
    pub tier: Option<Tier>,
    pub next_tier: Option<TierProgress>,
    pub stats: CustomerStats,
    pub segment_ids: Vec<Uuid>,
    pub recent_transactions: Vec<TransactionView>,
    pub point_history: Vec<PointHistoryView>,
    pub available_campaigns: Vec<Campaign>,
    pub stamp_cards: Vec<StampProgress>,
}

#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn CrmStore>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        principal: &Principal,
        filters: &CustomerFilters,
        page: PageRequest,
    ) -> Result<Page<Customer>> {
        principal.require_back_office()?;
        Ok(self
            .store
            .list_customers(principal.restaurant_id, filters, page)
            .await?)
    }

    pub async fn get(&self, principal: &Principal, customer_id: Uuid) -> Result<Customer> {
        if !principal.can_view_customer(customer_id) {
            return Err(AppError::authorization("Not allowed to view this customer"));
        }
        Ok(self.store.get_customer(principal.restaurant_id, customer_id).await?)
    }

    pub async fn get_detail(&self, principal: &Principal, customer_id: Uuid) -> Result<CustomerDetail> {
        let customer = self.get(principal, customer_id).await?;
        let restaurant_id = customer.restaurant_id;
        let now = Utc::now();

        let tiers = self.store.list_tiers(restaurant_id).await?;
        let tier = customer
            .tier_id
            .and_then(|id| tiers.iter().find(|tier| tier.id == id))
            .cloned();
        let next_tier = next_tier_progress(&tiers, customer.points);

        let recent_transactions = self
            .store
            .list_transactions(
                restaurant_id,
                &TransactionFilters {
                    customer_id: Some(customer.id),
                    ..Default::default()
                },
                PageRequest::new(1, DETAIL_TRANSACTIONS),
            )
            .await?
            .items;

        let point_filters = PointHistoryFilters {
            customer_id: Some(customer.id),
            ..Default::default()
        };
        let point_history = self
            .store
            .list_point_history(restaurant_id, &point_filters, PageRequest::new(1, DETAIL_POINT_ROWS))
            .await?
            .items;
        let point_stats = self.store.point_stats(restaurant_id, &point_filters).await?;

        let segment_ids = self.store.customer_segment_ids(customer.id).await?;
        let available_campaigns = available_campaigns(self.store.as_ref(), restaurant_id, customer.id, now).await?;
        let stamp_cards = stamp_cards(self.store.as_ref(), restaurant_id, customer.id, now).await?;

        let stats = CustomerStats {
            total_spent: customer.total_spent,
            total_visits: customer.visit_count,
            average_spent: customer.total_spent.average_over(customer.visit_count),
            current_points: customer.points,
            total_points_earned: point_stats.total_earned,
            total_points_spent: point_stats.total_spent,
        };

        Ok(CustomerDetail {
            customer,
            tier,
            next_tier,
            stats,
            segment_ids,
            recent_transactions,
            point_history,
            available_campaigns,
            stamp_cards,
        })
    }

    pub async fn create(&self, principal: &Principal, request: CreateCustomerRequest) -> Result<Customer> {
        principal.require_back_office()?;
        let mut errors = field_errors_of(&request);
        if let Some(tier_id) = request.tier_id {
            if !self.tier_exists(principal.restaurant_id, tier_id).await? {
                push_field_error(&mut errors, "tier_id", "Tier does not exist");
            }
        }
        ensure_valid(errors)?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            restaurant_id: principal.restaurant_id,
            name: request.name.trim().to_string(),
            email: normalize_email(request.email),
            phone: request.phone.map(|p| p.trim().to_string()),
            birth_date: request.birth_date,
            points: 0,
            level: request.level,
            tier_id: request.tier_id,
            total_spent: Money::ZERO,
            visit_count: 0,
            last_visit: None,
            created_at: now,
            updated_at: now,
        };
        let opening = request
            .initial_points
            .filter(|points| *points > 0)
            .map(|points| PointEntry::earned(points, PointSource::Bonus, "Opening balance"));

        let customer = self.store.create_customer(customer, opening).await?;
        info!(customer_id = %customer.id, points = customer.points, "Customer created");
        Ok(customer)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<Customer> {
        principal.require_back_office()?;
        let mut errors = field_errors_of(&request);
        if request.points.is_some() {
            push_field_error(
                &mut errors,
                "points",
                "Points can only be changed through a point adjustment",
            );
        }
        if let Some(Some(tier_id)) = request.tier_id {
            if !self.tier_exists(principal.restaurant_id, tier_id).await? {
                push_field_error(&mut errors, "tier_id", "Tier does not exist");
            }
        }
        ensure_valid(errors)?;

        let mut customer = self.store.get_customer(principal.restaurant_id, customer_id).await?;
        if let Some(name) = request.name {
            customer.name = name.trim().to_string();
        }
        if request.email.is_some() {
            customer.email = normalize_email(request.email);
        }
        if let Some(phone) = request.phone {
            customer.phone = Some(phone.trim().to_string());
        }
        if request.birth_date.is_some() {
            customer.birth_date = request.birth_date;
        }
        if let Some(level) = request.level {
            customer.level = level;
        }
        if let Some(tier_id) = request.tier_id {
            customer.tier_id = tier_id;
        }
        customer.updated_at = Utc::now();

        let customer = self.store.update_customer(customer).await?;
        info!(customer_id = %customer.id, "Customer updated");
        Ok(customer)
    }

    pub async fn delete(&self, principal: &Principal, customer_id: Uuid) -> Result<()> {
        principal.require_admin()?;
        self.store.delete_customer(principal.restaurant_id, customer_id).await?;
        info!(customer_id = %customer_id, "Customer deleted");
        Ok(())
    }

    pub async fn list_tiers(&self, principal: &Principal) -> Result<Vec<Tier>> {
        Ok(self.store.list_tiers(principal.restaurant_id).await?)
    }

    pub async fn create_tier(&self, principal: &Principal, request: CreateTierRequest) -> Result<Tier> {
        principal.require_admin()?;
        let mut errors = field_errors_of(&request);
        if request.point_multiplier <= Decimal::ZERO {
            push_field_error(&mut errors, "point_multiplier", "Multiplier must be positive");
        }
        if request.discount_percent < Decimal::ZERO || request.discount_percent > Decimal::from(100) {
            push_field_error(&mut errors, "discount_percent", "Discount must be between 0 and 100");
        }
        ensure_valid(errors)?;

        let tier = self
            .store
            .create_tier(Tier {
                id: Uuid::new_v4(),
                restaurant_id: principal.restaurant_id,
                name: request.name.trim().to_lowercase(),
                display_name: request.display_name,
                level: request.level,
                min_points: request.min_points,
                point_multiplier: request.point_multiplier,
                discount_percent: request.discount_percent,
                color: request.color,
            })
            .await?;
        info!(tier_id = %tier.id, min_points = tier.min_points, "Tier created");
        Ok(tier)
    }

    async fn tier_exists(&self, restaurant_id: Uuid, tier_id: Uuid) -> Result<bool> {
        let tiers = self.store.list_tiers(restaurant_id).await?;
        Ok(tiers.iter().any(|tier| tier.id == tier_id))
    }
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::Role;

    fn setup() -> (CustomerService, Arc<dyn CrmStore>, Principal) {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        let principal = Principal::new(Uuid::new_v4(), "admin@aircrm.com", Role::RestaurantAdmin, Uuid::new_v4());
        (CustomerService::new(store.clone()), store, principal)
    }

    fn create_request(name: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            phone: None,
            birth_date: None,
            level: LoyaltyLevel::Regular,
            tier_id: None,
            initial_points: Some(120),
        }
    }

    #[tokio::test]
    async fn opening_balance_goes_through_the_ledger() {
        let (service, store, principal) = setup();
        let customer = service.create(&principal, create_request("Mehmet")).await.unwrap();

        assert_eq!(customer.points, 120);
        assert_eq!(store.ledger_totals(customer.id).await.unwrap(), (120, 1));
    }

    #[tokio::test]
    async fn points_are_not_writable_through_update() {
        let (service, _, principal) = setup();
        let customer = service.create(&principal, create_request("Zeynep")).await.unwrap();

        let request = UpdateCustomerRequest {
            name: None,
            email: None,
            phone: None,
            birth_date: None,
            level: None,
            tier_id: None,
            points: Some(10_000),
        };
        let err = service.update(&principal, customer.id, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("points")));
    }

    #[tokio::test]
    async fn tier_can_be_assigned_and_cleared() {
        let (service, _, principal) = setup();
        let tier = service
            .create_tier(
                &principal,
                CreateTierRequest {
                    name: "Gold".to_string(),
                    display_name: "Altın".to_string(),
                    level: 3,
                    min_points: 1000,
                    point_multiplier: Decimal::from(2),
                    discount_percent: Decimal::ZERO,
                    color: None,
                },
            )
            .await
            .unwrap();
        let customer = service.create(&principal, create_request("Selin")).await.unwrap();

        let assign: UpdateCustomerRequest =
            serde_json::from_value(serde_json::json!({ "tier_id": tier.id })).unwrap();
        let updated = service.update(&principal, customer.id, assign).await.unwrap();
        assert_eq!(updated.tier_id, Some(tier.id));

        let rename: UpdateCustomerRequest =
            serde_json::from_value(serde_json::json!({ "name": "Selin Koç" })).unwrap();
        assert_eq!(rename.tier_id, None);
        let updated = service.update(&principal, customer.id, rename).await.unwrap();
        assert_eq!(updated.tier_id, Some(tier.id));

        let clear: UpdateCustomerRequest =
            serde_json::from_value(serde_json::json!({ "tier_id": null })).unwrap();
        assert_eq!(clear.tier_id, Some(None));
        let updated = service.update(&principal, customer.id, clear).await.unwrap();
        assert_eq!(updated.tier_id, None);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (service, _, principal) = setup();
        service.create(&principal, create_request("Can")).await.unwrap();
        let err = service.create(&principal, create_request("Can")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn customers_of_other_restaurants_are_hidden() {
        let (service, _, principal) = setup();
        let customer = service.create(&principal, create_request("Elif")).await.unwrap();

        let outsider = Principal::new(Uuid::new_v4(), "other@aircrm.com", Role::Staff, Uuid::new_v4());
        let err = service.get(&outsider, customer.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn detail_reports_stats_and_next_tier() {
        let (service, _, principal) = setup();
        service
            .create_tier(
                &principal,
                CreateTierRequest {
                    name: "Silver".to_string(),
                    display_name: "Gümüş".to_string(),
                    level: 2,
                    min_points: 500,
                    point_multiplier: Decimal::new(15, 1),
                    discount_percent: Decimal::from(5),
                    color: None,
                },
            )
            .await
            .unwrap();
        let customer = service.create(&principal, create_request("Deniz")).await.unwrap();

        let detail = service.get_detail(&principal, customer.id).await.unwrap();
        assert_eq!(detail.stats.current_points, 120);
        assert_eq!(detail.stats.total_points_earned, 120);
        assert!(detail.tier.is_none());
        assert_eq!(detail.next_tier.unwrap().points_needed, 380);
        assert_eq!(detail.point_history.len(), 1);
    }
}
