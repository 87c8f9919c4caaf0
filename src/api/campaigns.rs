use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::common::{ApiResponse, Deleted, PageQuery, RequestMeta};
use crate::domains::campaigns::models::{Campaign, CampaignFilters, CampaignStatus, CampaignType, CampaignWithUsage};
use crate::domains::campaigns::service::CampaignRequest;
use crate::domains::context::Principal;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/campaigns/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/campaigns/:id/activate", post(activate_campaign))
        .route("/campaigns/:id/deactivate", post(deactivate_campaign))
}

#[derive(Debug, Deserialize)]
pub struct CampaignListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub campaign_type: Option<CampaignType>,
    pub status: Option<CampaignStatus>,
}

/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<ApiResponse<Page<CampaignWithUsage>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let filters = CampaignFilters {
        search: query.search,
        campaign_type: query.campaign_type,
        status: query.status,
    };
    let campaigns = state.campaigns.list(&principal, &filters, page).await?;
    Ok(meta.ok(campaigns))
}

/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CampaignRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Campaign>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let campaign = state.campaigns.create(&principal, request).await?;
    Ok(meta.created(campaign))
}

/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Campaign>>> {
    let meta = RequestMeta::from_headers(&headers);
    let campaign = state.campaigns.get(&principal, id).await?;
    Ok(meta.ok(campaign))
}

/// PUT /api/v1/campaigns/:id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<CampaignRequest>,
) -> Result<Json<ApiResponse<Campaign>>> {
    let meta = RequestMeta::from_headers(&headers);
    let campaign = state.campaigns.update(&principal, id, request).await?;
    Ok(meta.ok(campaign))
}

/// DELETE /api/v1/campaigns/:id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let meta = RequestMeta::from_headers(&headers);
    state.campaigns.delete(&principal, id).await?;
    Ok(meta.ok(Deleted { id, deleted: true }))
}

/// POST /api/v1/campaigns/:id/activate
pub async fn activate_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Campaign>>> {
    let meta = RequestMeta::from_headers(&headers);
    let campaign = state.campaigns.set_active(&principal, id, true).await?;
    Ok(meta.ok(campaign))
}

/// POST /api/v1/campaigns/:id/deactivate
pub async fn deactivate_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Campaign>>> {
    let meta = RequestMeta::from_headers(&headers);
    let campaign = state.campaigns.set_active(&principal, id, false).await?;
    Ok(meta.ok(campaign))
}
