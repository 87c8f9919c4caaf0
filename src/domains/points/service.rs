//! Point ledger queries and the manual balance operations

use serde::{Deserialize, Serialize};
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{AppError, Page, PageRequest, Result};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::{
    PointAudit, PointEntry, PointHistory, PointHistoryFilters, PointHistoryView, PointSource, PointStats,
    MAX_POINTS_PER_MOVE,
};
use crate::domains::context::Principal;
use crate::domains::customers::models::Customer;
use crate::observability::metrics;
use crate::store::CrmStore;

/// Signed manual adjustment; positive credits, negative debits
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustPointsRequest {
    pub customer_id: Uuid,
    pub amount: i64,
    #[serde(default = "default_adjust_source")]
    pub source: PointSource,
    #[validate(length(min = 3, max = 500, message = "Description must be between 3 and 500 characters"))]
    pub description: String,
}

fn default_adjust_source() -> PointSource {
    PointSource::Manual
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExpirePointsRequest {
    pub customer_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000_000, message = "Amount must be between 1 and 1000000000"))]
    pub amount: i64,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Balance after a manual operation, with the rows that moved it
#[derive(Debug, Clone, Serialize)]
pub struct PointMovement {
    pub customer: Customer,
    pub entries: Vec<PointHistory>,
}

#[derive(Clone)]
pub struct PointsService {
    store: Arc<dyn CrmStore>,
}

impl PointsService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn history(
        &self,
        principal: &Principal,
        filters: &PointHistoryFilters,
        page: PageRequest,
    ) -> Result<Page<PointHistoryView>> {
        principal.require_back_office()?;
        Ok(self
            .store
            .list_point_history(principal.restaurant_id, filters, page)
            .await?)
    }

    pub async fn stats(&self, principal: &Principal, filters: &PointHistoryFilters) -> Result<PointStats> {
        principal.require_back_office()?;
        Ok(self.store.point_stats(principal.restaurant_id, filters).await?)
    }

    pub async fn adjust(&self, principal: &Principal, request: AdjustPointsRequest) -> Result<PointMovement> {
        principal.require_admin()?;
        let mut errors = field_errors_of(&request);
        if request.amount == 0 {
            push_field_error(&mut errors, "amount", "Amount must not be zero");
        }
        if request.amount.unsigned_abs() > MAX_POINTS_PER_MOVE.unsigned_abs() {
            push_field_error(
                &mut errors,
                "amount",
                format!("Amount must be between -{0} and {0}", MAX_POINTS_PER_MOVE),
            );
        }
        if !matches!(request.source, PointSource::Manual | PointSource::Bonus) {
            push_field_error(&mut errors, "source", "Only MANUAL or BONUS adjustments are allowed");
        }
        ensure_valid(errors)?;

        let description = request.description.trim().to_string();
        let entry = if request.amount > 0 {
            PointEntry::earned(request.amount, request.source, description)
        } else {
            PointEntry::spent(request.amount, request.source, description)
        };
        let point_type = entry.point_type;

        let (customer, entries) = self
            .store
            .apply_points(principal.restaurant_id, request.customer_id, vec![entry])
            .await?;
        metrics::record_points(point_type.as_str(), request.source.as_str(), request.amount);

        info!(
            customer_id = %customer.id,
            amount = request.amount,
            source = %request.source,
            by = %principal.email,
            balance = customer.points,
            "Points adjusted"
        );
        Ok(PointMovement { customer, entries })
    }

    /// Expires up to `amount` points; asking for more than the balance expires the balance
    pub async fn expire(&self, principal: &Principal, request: ExpirePointsRequest) -> Result<PointMovement> {
        principal.require_admin()?;
        ensure_valid(field_errors_of(&request))?;

        let customer = self
            .store
            .get_customer(principal.restaurant_id, request.customer_id)
            .await?;
        let amount = request.amount.min(customer.points);
        if amount <= 0 {
            return Err(AppError::invalid_field("amount", "Customer has no points to expire"));
        }
        if amount < request.amount {
            warn!(
                customer_id = %customer.id,
                requested = request.amount,
                expired = amount,
                "Expiry capped at the current balance"
            );
        }

        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Points expired".to_string());
        let (customer, entries) = self
            .store
            .apply_points(
                principal.restaurant_id,
                customer.id,
                vec![PointEntry::expired(amount, description)],
            )
            .await?;
        metrics::record_points("EXPIRED", PointSource::Manual.as_str(), amount);

        info!(customer_id = %customer.id, expired = amount, balance = customer.points, "Points expired");
        Ok(PointMovement { customer, entries })
    }

    /// Compares the stored balance with the sum of the customer's ledger rows
    pub async fn audit(&self, principal: &Principal, customer_id: Uuid) -> Result<PointAudit> {
        principal.require_back_office()?;
        let customer = self.store.get_customer(principal.restaurant_id, customer_id).await?;
        let (ledger_sum, entries) = self.store.ledger_totals(customer.id).await?;

        let audit = PointAudit {
            customer_id: customer.id,
            balance: customer.points,
            ledger_sum,
            entries,
            consistent: customer.points == ledger_sum,
        };
        if !audit.consistent {
            warn!(
                customer_id = %customer.id,
                balance = audit.balance,
                ledger_sum = audit.ledger_sum,
                "Point balance does not match the ledger"
            );
        }
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::customers::models::LoyaltyLevel;
    use crate::domains::money::Money;
    use crate::domains::points::models::PointType;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use shared::Role;

    async fn setup(opening: i64) -> (PointsService, Principal, Uuid) {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        let principal = Principal::new(Uuid::new_v4(), "admin@aircrm.com", Role::Admin, Uuid::new_v4());
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            restaurant_id: principal.restaurant_id,
            name: "Selin Kaya".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            points: 0,
            level: LoyaltyLevel::Silver,
            tier_id: None,
            total_spent: Money::ZERO,
            visit_count: 0,
            last_visit: None,
            created_at: now,
            updated_at: now,
        };
        let opening = PointEntry::earned(opening, PointSource::Bonus, "Opening balance");
        let customer = store.create_customer(customer, Some(opening)).await.unwrap();
        (PointsService::new(store), principal, customer.id)
    }

    fn adjust(customer_id: Uuid, amount: i64) -> AdjustPointsRequest {
        AdjustPointsRequest {
            customer_id,
            amount,
            source: PointSource::Manual,
            description: "Kasa düzeltmesi".to_string(),
        }
    }

    #[tokio::test]
    async fn negative_adjustment_is_recorded_as_spent() {
        let (service, principal, customer_id) = setup(100).await;
        let movement = service.adjust(&principal, adjust(customer_id, -40)).await.unwrap();

        assert_eq!(movement.customer.points, 60);
        assert_eq!(movement.entries[0].point_type, PointType::Spent);
        assert_eq!(movement.entries[0].amount, -40);
        assert_eq!(movement.entries[0].balance_after, 60);
    }

    #[tokio::test]
    async fn adjustment_below_zero_is_rejected() {
        let (service, principal, customer_id) = setup(30).await;
        let err = service.adjust(&principal, adjust(customer_id, -31)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("points")));

        let audit = service.audit(&principal, customer_id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.balance, 30);
    }

    #[tokio::test]
    async fn zero_and_purchase_adjustments_are_invalid() {
        let (service, principal, customer_id) = setup(0).await;
        assert!(service.adjust(&principal, adjust(customer_id, 0)).await.is_err());

        let mut request = adjust(customer_id, 10);
        request.source = PointSource::Purchase;
        let err = service.adjust(&principal, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("source")));
    }

    #[tokio::test]
    async fn oversized_adjustments_never_reach_the_ledger() {
        let (service, principal, customer_id) = setup(10).await;
        for amount in [i64::MAX, i64::MIN, MAX_POINTS_PER_MOVE + 1] {
            let err = service.adjust(&principal, adjust(customer_id, amount)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("amount")));
        }

        let movement = service
            .adjust(&principal, adjust(customer_id, MAX_POINTS_PER_MOVE))
            .await
            .unwrap();
        assert_eq!(movement.customer.points, MAX_POINTS_PER_MOVE + 10);

        let audit = service.audit(&principal, customer_id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.entries, 2);
    }

    #[tokio::test]
    async fn expiry_is_capped_at_balance() {
        let (service, principal, customer_id) = setup(25).await;
        let request = ExpirePointsRequest {
            customer_id,
            amount: 100,
            description: None,
        };
        let movement = service.expire(&principal, request.clone()).await.unwrap();
        assert_eq!(movement.customer.points, 0);
        assert_eq!(movement.entries[0].amount, -25);
        assert_eq!(movement.entries[0].point_type, PointType::Expired);

        assert!(service.expire(&principal, request).await.is_err());
    }

    #[tokio::test]
    async fn staff_cannot_adjust() {
        let (service, principal, customer_id) = setup(0).await;
        let staff = Principal::new(Uuid::new_v4(), "staff@aircrm.com", Role::Staff, principal.restaurant_id);
        let err = service.adjust(&staff, adjust(customer_id, 5)).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization { .. }));
    }
}
