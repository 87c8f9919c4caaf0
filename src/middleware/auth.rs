use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domains::context::Principal;
use crate::observability::metrics;
use crate::state::AppState;
use shared::{AppError, Result};

pub const RESTAURANT_HEADER: &str = "x-restaurant-id";

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::authentication("Missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::authentication("Authorization header must be in format: Bearer <token>"))?
        .trim();
    if token.is_empty() {
        return Err(AppError::authentication("Empty bearer token"));
    }
    Ok(token)
}

/// Restaurant the static API token acts for: the header wins over configuration
fn service_restaurant(headers: &HeaderMap, configured: Option<Uuid>) -> Result<Uuid> {
    match headers.get(RESTAURANT_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<Uuid>().ok())
            .ok_or_else(|| AppError::validation("X-Restaurant-Id must be a UUID")),
        None => configured.ok_or_else(|| {
            AppError::authentication("Service token requires an X-Restaurant-Id header")
        }),
    }
}

/// Resolve the caller from a JWT or the static API token
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal> {
    let token = bearer_token(headers)?;

    if state.auth.is_api_token(token) {
        let restaurant_id = service_restaurant(headers, state.config.auth.service_restaurant_id)?;
        metrics::record_auth_attempt("api_token", true);
        return Ok(Principal::service(restaurant_id));
    }

    match state.auth.validate_token(token) {
        Ok(claims) => {
            metrics::record_auth_attempt("jwt", true);
            Principal::from_claims(&claims)
        }
        Err(e) => {
            metrics::record_auth_attempt("jwt", false);
            Err(e)
        }
    }
}

/// Rejects unauthenticated requests and stores the `Principal` in the request extensions
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let principal = match authenticate(&state, request.headers()) {
        Ok(principal) => principal,
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "Authentication failed");
            return Err(e);
        }
    };

    debug!(
        subject = %principal.subject,
        role = principal.role.as_str(),
        restaurant_id = %principal.restaurant_id,
        "Request authenticated"
    );
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc");
    }

    #[test]
    fn restaurant_header_overrides_configuration() {
        let configured = Uuid::new_v4();
        let requested = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert_eq!(service_restaurant(&headers, Some(configured)).unwrap(), configured);
        assert!(service_restaurant(&headers, None).is_err());

        headers.insert(RESTAURANT_HEADER, HeaderValue::from_str(&requested.to_string()).unwrap());
        assert_eq!(service_restaurant(&headers, Some(configured)).unwrap(), requested);

        headers.insert(RESTAURANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(service_restaurant(&headers, Some(configured)).is_err());
    }
}
