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
use crate::domains::campaigns::discount::DraftOrder;
use crate::domains::campaigns::models::Campaign;
use crate::domains::campaigns::service::QuoteResult;
use crate::domains::context::Principal;
use crate::domains::customers::models::{Customer, CustomerFilters, LoyaltyLevel, Tier};
use crate::domains::customers::service::{
    CreateCustomerRequest, CreateTierRequest, CustomerDetail, UpdateCustomerRequest,
};
use crate::domains::points::models::PointAudit;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/customers/:id/campaigns", get(customer_campaigns))
        .route("/customers/:id/campaigns/quote", post(quote_campaigns))
        .route("/customers/:id/points/audit", get(audit_points))
        .route("/tiers", get(list_tiers).post(create_tier))
}

#[derive(Debug, Deserialize)]
pub struct CustomerListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub level: Option<LoyaltyLevel>,
    #[serde(alias = "tierId")]
    pub tier_id: Option<Uuid>,
}

/// GET /api/v1/customers
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CustomerListQuery>,
) -> Result<Json<ApiResponse<Page<Customer>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let filters = CustomerFilters {
        search: query.search,
        level: query.level,
        tier_id: query.tier_id,
    };
    let customers = state.customers.list(&principal, &filters, page).await?;
    Ok(meta.ok(customers))
}

/// POST /api/v1/customers
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Customer>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let customer = state.customers.create(&principal, request).await?;
    Ok(meta.created(customer))
}

/// GET /api/v1/customers/:id
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerDetail>>> {
    let meta = RequestMeta::from_headers(&headers);
    let detail = state.customers.get_detail(&principal, id).await?;
    Ok(meta.ok(detail))
}

/// PUT /api/v1/customers/:id
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>> {
    let meta = RequestMeta::from_headers(&headers);
    let customer = state.customers.update(&principal, id, request).await?;
    Ok(meta.ok(customer))
}

/// DELETE /api/v1/customers/:id
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let meta = RequestMeta::from_headers(&headers);
    state.customers.delete(&principal, id).await?;
    Ok(meta.ok(Deleted { id, deleted: true }))
}

/// GET /api/v1/customers/:id/campaigns
pub async fn customer_campaigns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Campaign>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let campaigns = state.campaigns.available_for_customer(&principal, id).await?;
    Ok(meta.ok(campaigns))
}

/// POST /api/v1/customers/:id/campaigns/quote
pub async fn quote_campaigns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(order): Json<DraftOrder>,
) -> Result<Json<ApiResponse<QuoteResult>>> {
    let meta = RequestMeta::from_headers(&headers);
    let quote = state.campaigns.quote(&principal, id, order).await?;
    Ok(meta.ok(quote))
}

/// GET /api/v1/customers/:id/points/audit
pub async fn audit_points(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PointAudit>>> {
    let meta = RequestMeta::from_headers(&headers);
    let audit = state.points.audit(&principal, id).await?;
    Ok(meta.ok(audit))
}

/// GET /api/v1/tiers
pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<Tier>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let tiers = state.customers.list_tiers(&principal).await?;
    Ok(meta.ok(tiers))
}

/// POST /api/v1/tiers
pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateTierRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Tier>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let tier = state.customers.create_tier(&principal, request).await?;
    Ok(meta.created(tier))
}
