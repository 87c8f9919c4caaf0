use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::common::{ApiResponse, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::products::models::{Product, ProductFilters};
use crate::domains::products::service::CreateProductRequest;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/products", get(list_products).post(create_product))
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
}

/// GET /api/v1/products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<Page<Product>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let filters = ProductFilters {
        search: query.search,
        category: query.category,
        is_active: query.is_active,
    };
    let products = state.products.list(&principal, &filters, page).await?;
    Ok(meta.ok(products))
}

/// POST /api/v1/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let product = state.products.create(&principal, request).await?;
    Ok(meta.created(product))
}
