// ============================================================================
// REQUEST METRICS MIDDLEWARE
// ============================================================================

use axum::{extract::Request, middleware::Next, response::Response};
use shared::ErrorCode;
use std::time::Instant;

use crate::observability::{record_error, record_http_request};

/// Records count, latency and size of every HTTP request
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let normalized_path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    let response_size = estimate_response_size(&response);

    record_http_request(&method, &normalized_path, status, duration, response_size);
    if let Some(ErrorCode(code)) = response.extensions().get::<ErrorCode>() {
        record_error(code);
    }

    response
}

/// Collapse ids in the path so label cardinality stays bounded
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if uuid::Uuid::parse_str(seg).is_ok() || seg.parse::<i64>().is_ok() {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn estimate_response_size(response: &Response) -> usize {
    response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ERRORS_TOTAL;
    use axum::{middleware, routing::get, Router};
    use shared::AppError;
    use tower::ServiceExt;

    #[tokio::test]
    async fn error_responses_are_counted_by_code() {
        let app = Router::new()
            .route("/conflict", get(|| async { Err::<(), _>(AppError::conflict("Email already in use")) }))
            .route("/ok", get(|| async { "ok" }))
            .layer(middleware::from_fn(metrics_middleware));
        let before = ERRORS_TOTAL.with_label_values(&["CONFLICT"]).get();

        let request = || Request::builder().uri("/conflict").body(axum::body::Body::empty()).unwrap();
        app.clone().oneshot(request()).await.unwrap();
        app.clone().oneshot(request()).await.unwrap();
        let ok = Request::builder().uri("/ok").body(axum::body::Body::empty()).unwrap();
        app.oneshot(ok).await.unwrap();

        assert!(ERRORS_TOTAL.with_label_values(&["CONFLICT"]).get() >= before + 2);
    }

    #[test]
    fn ids_are_collapsed() {
        assert_eq!(
            normalize_path("/api/v1/customers/6f1c2a4e-8d3b-4f5a-9c7e-1b2d3e4f5a6b/stats"),
            "/api/v1/customers/:id/stats"
        );
        assert_eq!(normalize_path("/api/v1/campaigns/42"), "/api/v1/campaigns/:id");
        assert_eq!(normalize_path("/health"), "/health");
    }
}
