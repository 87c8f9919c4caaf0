use chrono::Utc;
use serde::Deserialize;
use shared::error::{ensure_valid, field_errors_of};
use shared::{AppError, Page, PageRequest, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::dispatcher::NotificationDispatcher;
use super::models::{
    CustomerNotification, NotificationLog, NotificationPayload, NotificationTarget, NotificationType, PushTarget,
};
use crate::domains::context::Principal;
use crate::observability::metrics;
use crate::store::CrmStore;

/// Body of `POST /notifications/send`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub body: String,
    #[serde(default)]
    pub notification_type: NotificationType,
    pub target: NotificationTarget,
    pub data: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn CrmStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn CrmStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn send(&self, principal: &Principal, request: SendNotificationRequest) -> Result<NotificationLog> {
        principal.require_admin()?;
        ensure_valid(field_errors_of(&request))?;
        request.target.validate()?;

        let recipients = self
            .store
            .resolve_notification_target(principal.restaurant_id, &request.target)
            .await?;
        if recipients.is_empty() {
            return Err(AppError::invalid_field("target", "No customers match the selected recipients"));
        }

        let payload = NotificationPayload {
            title: request.title.trim().to_string(),
            body: request.body.trim().to_string(),
            notification_type: request.notification_type,
            data: request.data,
        };
        let outcome = self.dispatcher.dispatch(&payload, &recipients).await;
        metrics::record_push_notifications(payload.notification_type.as_str(), outcome.sent, outcome.failed);

        let log = self
            .store
            .record_notification(NotificationLog {
                id: Uuid::new_v4(),
                restaurant_id: principal.restaurant_id,
                title: payload.title,
                body: payload.body,
                notification_type: payload.notification_type,
                target_description: request.target.describe(),
                target: request.target,
                recipient_ids: recipients,
                sent_count: outcome.sent,
                failed_count: outcome.failed,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            notification_id = %log.id,
            target = %log.target_description,
            sent = log.sent_count,
            failed = log.failed_count,
            "Notification sent"
        );
        Ok(log)
    }

    pub async fn history(&self, principal: &Principal, page: PageRequest) -> Result<Page<NotificationLog>> {
        principal.require_back_office()?;
        Ok(self.store.list_notifications(principal.restaurant_id, page).await?)
    }

    /// Mobile feed of one customer
    pub async fn customer_history(
        &self,
        principal: &Principal,
        customer_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<CustomerNotification>> {
        if !principal.can_view_customer(customer_id) {
            return Err(AppError::authorization("Not allowed to view this customer"));
        }
        self.store.get_customer(principal.restaurant_id, customer_id).await?;
        Ok(self.store.customer_notifications(customer_id, page).await?)
    }

    /// Customers offered in the recipient picker
    pub async fn recipients(&self, principal: &Principal) -> Result<Vec<PushTarget>> {
        principal.require_back_office()?;
        Ok(self.store.push_targets(principal.restaurant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::customers::models::{Customer, LoyaltyLevel};
    use crate::domains::money::Money;
    use crate::domains::notifications::dispatcher::LogDispatcher;
    use crate::store::MemoryStore;
    use shared::Role;

    async fn setup() -> (NotificationService, Principal, Vec<Customer>) {
        let store: Arc<dyn CrmStore> = Arc::new(MemoryStore::new());
        let principal = Principal::new(Uuid::new_v4(), "admin@aircrm.com", Role::RestaurantAdmin, Uuid::new_v4());
        let mut customers = Vec::new();
        for (name, level) in [("Ali", LoyaltyLevel::Gold), ("Veli", LoyaltyLevel::Regular), ("Ece", LoyaltyLevel::Gold)] {
            let now = Utc::now();
            let customer = Customer {
                id: Uuid::new_v4(),
                restaurant_id: principal.restaurant_id,
                name: name.to_string(),
                email: None,
                phone: None,
                birth_date: None,
                points: 0,
                level,
                tier_id: None,
                total_spent: Money::ZERO,
                visit_count: 0,
                last_visit: None,
                created_at: now,
                updated_at: now,
            };
            customers.push(store.create_customer(customer, None).await.unwrap());
        }
        (NotificationService::new(store, Arc::new(LogDispatcher)), principal, customers)
    }

    fn request(target: NotificationTarget) -> SendNotificationRequest {
        SendNotificationRequest {
            title: "Altın üyelere özel".to_string(),
            body: "Bu hafta tatlılar bizden".to_string(),
            notification_type: NotificationType::Reward,
            target,
            data: None,
        }
    }

    #[tokio::test]
    async fn level_target_reaches_matching_customers_only() {
        let (service, principal, customers) = setup().await;
        let log = service
            .send(&principal, request(NotificationTarget::Levels(vec![LoyaltyLevel::Gold])))
            .await
            .unwrap();

        assert_eq!(log.sent_count, 2);
        assert!(!log.recipient_ids.contains(&customers[1].id));

        let customer = Principal::new(customers[0].id, "ali@example.com", Role::Customer, principal.restaurant_id);
        let feed = service
            .customer_history(&customer, customers[0].id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "Altın üyelere özel");
    }

    #[tokio::test]
    async fn empty_audience_is_an_error() {
        let (service, principal, _) = setup().await;
        let err = service
            .send(&principal, request(NotificationTarget::Levels(vec![LoyaltyLevel::Platinum])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(ref map) if map.contains_key("target")));

        let err = service
            .send(&principal, request(NotificationTarget::Customers(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(_)));
    }

    #[tokio::test]
    async fn customers_cannot_read_each_others_feed() {
        let (service, principal, customers) = setup().await;
        let customer = Principal::new(customers[0].id, "ali@example.com", Role::Customer, principal.restaurant_id);
        let err = service
            .customer_history(&customer, customers[1].id, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization { .. }));
    }
}
