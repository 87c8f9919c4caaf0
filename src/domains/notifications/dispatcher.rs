//! Delivery of notifications to customers.
//!
//! The CRM only hands messages to a push gateway; it does not track delivery
//! beyond the per-recipient sent/failed counts.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{DispatchOutcome, NotificationPayload};
use shared::config::NotificationConfig;
use shared::{AppError, Result};

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, payload: &NotificationPayload, customer_ids: &[Uuid]) -> DispatchOutcome;
}

#[derive(Serialize)]
struct GatewayMessage<'a> {
    customer_id: Uuid,
    #[serde(flatten)]
    payload: &'a NotificationPayload,
}

/// POSTs one JSON message per recipient to the configured push gateway
pub struct WebhookDispatcher {
    http_client: Client,
    gateway_url: String,
}

impl WebhookDispatcher {
    pub fn new(gateway_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            gateway_url: gateway_url.into(),
        })
    }

    async fn send_one(&self, payload: &NotificationPayload, customer_id: Uuid) -> Result<()> {
        let response = self
            .http_client
            .post(&self.gateway_url)
            .json(&GatewayMessage {
                customer_id,
                payload,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "push gateway returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, payload: &NotificationPayload, customer_ids: &[Uuid]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for customer_id in customer_ids {
            match self.send_one(payload, *customer_id).await {
                Ok(()) => outcome.sent += 1,
                Err(e) => {
                    warn!(customer_id = %customer_id, error = %e, "Push delivery failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            sent = outcome.sent,
            failed = outcome.failed,
            title = %payload.title,
            "Notification dispatched to push gateway"
        );
        outcome
    }
}

/// Used when no gateway is configured: every recipient is logged as sent
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, payload: &NotificationPayload, customer_ids: &[Uuid]) -> DispatchOutcome {
        info!(
            recipients = customer_ids.len(),
            notification_type = %payload.notification_type,
            title = %payload.title,
            "No push gateway configured, notification logged only"
        );
        DispatchOutcome {
            sent: customer_ids.len() as i64,
            failed: 0,
        }
    }
}

pub fn dispatcher_from_config(config: &NotificationConfig) -> Result<Arc<dyn NotificationDispatcher>> {
    match &config.push_gateway_url {
        Some(url) => {
            info!(gateway = %url, "Using push gateway for notifications");
            Ok(Arc::new(WebhookDispatcher::new(
                url.clone(),
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
        None => Ok(Arc::new(LogDispatcher)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::notifications::models::NotificationType;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Hafta sonu fırsatı".to_string(),
            body: "Tüm tatlılarda %20 indirim".to_string(),
            notification_type: NotificationType::Campaign,
            data: None,
        }
    }

    #[tokio::test]
    async fn posts_one_message_per_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .and(body_partial_json(serde_json::json!({ "notification_type": "CAMPAIGN" })))
            .respond_with(ResponseTemplate::new(202))
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(format!("{}/push", server.uri()), Duration::from_secs(2)).unwrap();
        let outcome = dispatcher
            .dispatch(&payload(), &[Uuid::new_v4(), Uuid::new_v4()])
            .await;

        assert_eq!(outcome, DispatchOutcome { sent: 2, failed: 0 });
    }

    #[tokio::test]
    async fn gateway_errors_count_as_failed() {
        let server = MockServer::start().await;
        let unlucky = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "customer_id": unlucky })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(server.uri(), Duration::from_secs(2)).unwrap();
        let outcome = dispatcher
            .dispatch(&payload(), &[Uuid::new_v4(), unlucky, Uuid::new_v4()])
            .await;

        assert_eq!(outcome, DispatchOutcome { sent: 2, failed: 1 });
    }

    #[tokio::test]
    async fn log_dispatcher_reports_everyone_sent() {
        let outcome = LogDispatcher.dispatch(&payload(), &[Uuid::new_v4()]).await;
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.failed, 0);
    }
}
