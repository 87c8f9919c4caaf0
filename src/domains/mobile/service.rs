use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AppError, Page, PageRequest, Result, Role};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domains::campaigns::models::Campaign;
use crate::domains::campaigns::service::{available_campaigns, stamp_cards};
use crate::domains::context::Principal;
use crate::domains::customers::models::{LoyaltyLevel, Tier};
use crate::domains::loyalty::{next_tier_progress, StampProgress, TierProgress};
use crate::domains::money::Money;
use crate::domains::notifications::models::CustomerNotification;
use crate::domains::points::models::{PointHistoryFilters, PointHistoryView};
use crate::domains::transactions::models::{TransactionFilters, TransactionView};
use crate::store::CrmStore;

const CARD_ROWS: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct CardHolder {
    pub id: Uuid,
    pub name: String,
    pub points: i64,
    pub level: LoyaltyLevel,
    pub total_spent: Money,
    pub visit_count: i64,
    pub last_visit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoyaltyCard {
    pub customer: CardHolder,
    pub tier: Option<Tier>,
    pub next_tier: Option<TierProgress>,
    pub available_campaigns: Vec<Campaign>,
    pub stamp_cards: Vec<StampProgress>,
    pub recent_transactions: Vec<TransactionView>,
    pub recent_points: Vec<PointHistoryView>,
}

#[derive(Clone)]
pub struct MobileService {
    store: Arc<dyn CrmStore>,
}

impl MobileService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// A customer principal always gets their own card; staff name the customer
    pub fn card_owner(principal: &Principal, requested: Option<Uuid>) -> Result<Uuid> {
        match (principal.role, requested) {
            (Role::Customer, Some(id)) if id != principal.subject => {
                Err(AppError::authorization("Not allowed to view this customer"))
            }
            (Role::Customer, _) => Ok(principal.subject),
            (_, Some(id)) if principal.role.is_back_office() => Ok(id),
            (_, None) => Err(AppError::invalid_field("customer_id", "customer_id is required")),
            _ => Err(AppError::authorization("Not allowed to view this customer")),
        }
    }

    pub async fn card(&self, principal: &Principal, requested: Option<Uuid>) -> Result<LoyaltyCard> {
        let customer_id = Self::card_owner(principal, requested)?;
        let customer = self.store.get_customer(principal.restaurant_id, customer_id).await?;
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
                PageRequest::new(1, CARD_ROWS),
            )
            .await?
            .items;
        let recent_points = self
            .store
            .list_point_history(
                restaurant_id,
                &PointHistoryFilters {
                    customer_id: Some(customer.id),
                    ..Default::default()
                },
                PageRequest::new(1, CARD_ROWS),
            )
            .await?
            .items;

        let available_campaigns = available_campaigns(self.store.as_ref(), restaurant_id, customer.id, now).await?;
        let stamp_cards = stamp_cards(self.store.as_ref(), restaurant_id, customer.id, now).await?;
        debug!(
            customer_id = %customer.id,
            campaigns = available_campaigns.len(),
            stamp_cards = stamp_cards.len(),
            "Loyalty card built"
        );

        Ok(LoyaltyCard {
            customer: CardHolder {
                id: customer.id,
                name: customer.name,
                points: customer.points,
                level: customer.level,
                total_spent: customer.total_spent,
                visit_count: customer.visit_count,
                last_visit: customer.last_visit,
            },
            tier,
            next_tier,
            available_campaigns,
            stamp_cards,
            recent_transactions,
            recent_points,
        })
    }

    pub async fn notifications(
        &self,
        principal: &Principal,
        requested: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Page<CustomerNotification>> {
        let customer_id = Self::card_owner(principal, requested)?;
        self.store.get_customer(principal.restaurant_id, customer_id).await?;
        Ok(self.store.customer_notifications(customer_id, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customers_only_see_their_own_card() {
        let restaurant = Uuid::new_v4();
        let me = Uuid::new_v4();
        let customer = Principal::new(me, "me@example.com", Role::Customer, restaurant);
        assert_eq!(MobileService::card_owner(&customer, None).unwrap(), me);
        assert_eq!(MobileService::card_owner(&customer, Some(me)).unwrap(), me);
        assert!(MobileService::card_owner(&customer, Some(Uuid::new_v4())).is_err());

        let staff = Principal::new(Uuid::new_v4(), "staff@aircrm.com", Role::Staff, restaurant);
        let other = Uuid::new_v4();
        assert_eq!(MobileService::card_owner(&staff, Some(other)).unwrap(), other);
        assert!(matches!(
            MobileService::card_owner(&staff, None),
            Err(AppError::InvalidFields(_))
        ));
    }
}
