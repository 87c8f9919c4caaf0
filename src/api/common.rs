use axum::{http::HeaderMap, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use shared::PageRequest;
use std::time::Instant;
use uuid::Uuid;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, request_id: String, execution_time_ms: Option<u64>) -> Self {
        Self {
            success: true,
            data: Some(data),
            request_id,
            timestamp: chrono::Utc::now(),
            execution_time_ms,
        }
    }
}

/// Per-request bookkeeping shared by every handler
pub struct RequestMeta {
    pub request_id: String,
    started: Instant,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = headers
            .get("x-request-id")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            request_id,
            started: Instant::now(),
        }
    }

    pub fn ok<T: Serialize>(self, data: T) -> Json<ApiResponse<T>> {
        let elapsed = self.started.elapsed().as_millis() as u64;
        Json(ApiResponse::success(data, self.request_id, Some(elapsed)))
    }

    pub fn created<T: Serialize>(self, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
        (StatusCode::CREATED, self.ok(data))
    }
}

/// Page/limit part of list queries; flattening is avoided so numbers parse from the query string
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn request_id_comes_from_header_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-42"));
        assert_eq!(RequestMeta::from_headers(&headers).request_id, "req-42");
        assert_eq!(RequestMeta::from_headers(&HeaderMap::new()).request_id.len(), 36);
    }

    #[test]
    fn page_query_is_clamped() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(1000),
        };
        let page = query.page_request();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, shared::MAX_PAGE_SIZE);
    }
}
