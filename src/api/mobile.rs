use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::common::{ApiResponse, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::mobile::LoyaltyCard;
use crate::domains::notifications::models::CustomerNotification;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mobile/card", get(loyalty_card))
        .route("/mobile/notifications", get(mobile_notifications))
}

#[derive(Debug, Deserialize)]
pub struct MobileQuery {
    #[serde(alias = "customerId")]
    pub customer_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /api/v1/mobile/card
pub async fn loyalty_card(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MobileQuery>,
) -> Result<Json<ApiResponse<LoyaltyCard>>> {
    let meta = RequestMeta::from_headers(&headers);
    let card = state.mobile.card(&principal, query.customer_id).await?;
    Ok(meta.ok(card))
}

/// GET /api/v1/mobile/notifications
pub async fn mobile_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MobileQuery>,
) -> Result<Json<ApiResponse<Page<CustomerNotification>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let feed = state
        .mobile
        .notifications(&principal, query.customer_id, page)
        .await?;
    Ok(meta.ok(feed))
}
