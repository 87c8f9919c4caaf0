use axum::{extract::State, http::HeaderMap, routing::get, Extension, Json, Router};
use std::sync::Arc;

use crate::api::common::{ApiResponse, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::dashboard::models::DashboardStats;
use crate::state::AppState;
use shared::Result;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard/stats", get(dashboard_stats))
}

/// GET /api/v1/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<DashboardStats>>> {
    let meta = RequestMeta::from_headers(&headers);
    let stats = state.dashboard.stats(&principal).await?;
    Ok(meta.ok(stats))
}
