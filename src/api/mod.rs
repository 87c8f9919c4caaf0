pub mod auth;
pub mod campaigns;
pub mod common;
pub mod customers;
pub mod dashboard;
pub mod mobile;
pub mod notifications;
pub mod points;
pub mod products;
pub mod segments;
pub mod transactions;

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;

use crate::middleware::require_auth;
use crate::state::AppState;

pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .merge(auth::router())
        .merge(customers::router())
        .merge(campaigns::router())
        .merge(segments::router())
        .merge(transactions::router())
        .merge(points::router())
        .merge(products::router())
        .merge(notifications::router())
        .merge(dashboard::router())
        .merge(mobile::router())
        .route_layer(from_fn_with_state(state, require_auth));

    Router::new().nest(
        "/api/v1",
        Router::new().merge(auth::public_router()).merge(protected),
    )
}
