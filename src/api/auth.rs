use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

use crate::api::common::{ApiResponse, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::users::service::{CustomerTokenRequest, LoginRequest, LoginResponse};
use crate::state::AppState;
use shared::auth::IssuedToken;
use shared::Result;

/// Routes reachable without a token
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/customer-token", post(customer_token))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let meta = RequestMeta::from_headers(&headers);
    let response = state.users.login(request).await?;
    Ok(meta.ok(response))
}

/// GET /api/v1/auth/me
pub async fn me(headers: HeaderMap, Extension(principal): Extension<Principal>) -> Json<ApiResponse<Principal>> {
    RequestMeta::from_headers(&headers).ok(principal)
}

/// POST /api/v1/auth/customer-token
pub async fn customer_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CustomerTokenRequest>,
) -> Result<Json<ApiResponse<IssuedToken>>> {
    let meta = RequestMeta::from_headers(&headers);
    let token = state.users.customer_token(&principal, request.customer_id).await?;
    Ok(meta.ok(token))
}
