use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod domains;
pub mod middleware;
pub mod observability;
pub mod security;
pub mod state;
pub mod store;

use api::create_api_router;
use observability::{metrics_handler, metrics_middleware};
use security::{cors_layer, security_headers_middleware};
use state::AppState;

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.app.cors_allowed_origins);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(create_api_router(app_state.clone()))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": chrono::Utc::now() })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "timestamp": chrono::Utc::now() })),
            )
        }
    }
}
