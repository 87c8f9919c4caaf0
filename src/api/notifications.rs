use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

use crate::api::common::{ApiResponse, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::notifications::models::{NotificationLog, PushTarget};
use crate::domains::notifications::service::SendNotificationRequest;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(notification_history))
        .route("/notifications/send", post(send_notification))
        .route("/notifications/customers", get(notification_recipients))
}

/// GET /api/v1/notifications
pub async fn notification_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Page<NotificationLog>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let history = state.notifications.history(&principal, query.page_request()).await?;
    Ok(meta.ok(history))
}

/// POST /api/v1/notifications/send
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationLog>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let log = state.notifications.send(&principal, request).await?;
    Ok(meta.created(log))
}

/// GET /api/v1/notifications/customers
pub async fn notification_recipients(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<PushTarget>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let recipients = state.notifications.recipients(&principal).await?;
    Ok(meta.ok(recipients))
}
