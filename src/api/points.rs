use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::common::{ApiResponse, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::points::models::{PointHistoryFilters, PointHistoryView, PointSource, PointStats, PointType};
use crate::domains::points::service::{AdjustPointsRequest, ExpirePointsRequest, PointMovement};
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/point-history", get(point_history))
        .route("/point-history/stats", get(point_stats))
        .route("/point-history/adjust", post(adjust_points))
        .route("/point-history/expire", post(expire_points))
}

#[derive(Debug, Deserialize)]
pub struct PointHistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(alias = "customerId")]
    pub customer_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub point_type: Option<PointType>,
    pub source: Option<PointSource>,
    #[serde(alias = "startDate")]
    pub from: Option<DateTime<Utc>>,
    #[serde(alias = "endDate")]
    pub to: Option<DateTime<Utc>>,
}

impl PointHistoryQuery {
    fn filters(&self) -> PointHistoryFilters {
        PointHistoryFilters {
            customer_id: self.customer_id,
            point_type: self.point_type,
            source: self.source,
            from: self.from,
            to: self.to,
        }
    }
}

/// GET /api/v1/point-history
pub async fn point_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PointHistoryQuery>,
) -> Result<Json<ApiResponse<Page<PointHistoryView>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let history = state.points.history(&principal, &query.filters(), page).await?;
    Ok(meta.ok(history))
}

/// GET /api/v1/point-history/stats
pub async fn point_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PointHistoryQuery>,
) -> Result<Json<ApiResponse<PointStats>>> {
    let meta = RequestMeta::from_headers(&headers);
    let stats = state.points.stats(&principal, &query.filters()).await?;
    Ok(meta.ok(stats))
}

/// POST /api/v1/point-history/adjust
pub async fn adjust_points(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<AdjustPointsRequest>,
) -> Result<Json<ApiResponse<PointMovement>>> {
    let meta = RequestMeta::from_headers(&headers);
    let movement = state.points.adjust(&principal, request).await?;
    Ok(meta.ok(movement))
}

/// POST /api/v1/point-history/expire
pub async fn expire_points(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<ExpirePointsRequest>,
) -> Result<Json<ApiResponse<PointMovement>>> {
    let meta = RequestMeta::from_headers(&headers);
    let movement = state.points.expire(&principal, request).await?;
    Ok(meta.ok(movement))
}
