use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::common::{ApiResponse, Deleted, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::segments::models::{RefreshOutcome, Segment, SegmentDetail};
use crate::domains::segments::service::{AddMembersRequest, CreateSegmentRequest, UpdateSegmentRequest};
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/segments", get(list_segments).post(create_segment))
        .route(
            "/segments/:id",
            get(get_segment).put(update_segment).delete(delete_segment),
        )
        .route("/segments/:id/members", post(add_members))
        .route("/segments/:id/members/:customer_id", delete(remove_member))
        .route("/segments/:id/refresh", post(refresh_segment))
}

#[derive(Debug, Serialize)]
pub struct MembersAdded {
    pub segment_id: Uuid,
    pub added: i64,
}

/// GET /api/v1/segments
pub async fn list_segments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Page<Segment>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let segments = state.segments.list(&principal, query.page_request()).await?;
    Ok(meta.ok(segments))
}

/// POST /api/v1/segments
pub async fn create_segment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SegmentDetail>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let segment = state.segments.create(&principal, request).await?;
    Ok(meta.created(segment))
}

/// GET /api/v1/segments/:id
pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SegmentDetail>>> {
    let meta = RequestMeta::from_headers(&headers);
    let segment = state.segments.get(&principal, id).await?;
    Ok(meta.ok(segment))
}

/// PUT /api/v1/segments/:id
pub async fn update_segment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSegmentRequest>,
) -> Result<Json<ApiResponse<Segment>>> {
    let meta = RequestMeta::from_headers(&headers);
    let segment = state.segments.update(&principal, id, request).await?;
    Ok(meta.ok(segment))
}

/// DELETE /api/v1/segments/:id
pub async fn delete_segment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let meta = RequestMeta::from_headers(&headers);
    state.segments.delete(&principal, id).await?;
    Ok(meta.ok(Deleted { id, deleted: true }))
}

/// POST /api/v1/segments/:id/members
pub async fn add_members(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddMembersRequest>,
) -> Result<Json<ApiResponse<MembersAdded>>> {
    let meta = RequestMeta::from_headers(&headers);
    let added = state.segments.add_members(&principal, id, request).await?;
    Ok(meta.ok(MembersAdded { segment_id: id, added }))
}

/// DELETE /api/v1/segments/:id/members/:customer_id
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path((id, customer_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let meta = RequestMeta::from_headers(&headers);
    state.segments.remove_member(&principal, id, customer_id).await?;
    Ok(meta.ok(Deleted {
        id: customer_id,
        deleted: true,
    }))
}

/// POST /api/v1/segments/:id/refresh
pub async fn refresh_segment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RefreshOutcome>>> {
    let meta = RequestMeta::from_headers(&headers);
    let outcome = state.segments.refresh(&principal, id).await?;
    Ok(meta.ok(outcome))
}
