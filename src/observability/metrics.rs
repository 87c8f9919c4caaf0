// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Request and business counters exported on /metrics
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    /// Total HTTP requests by method, endpoint and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    pub static ref HTTP_RESPONSE_SIZE_BYTES: HistogramVec = register_histogram_vec!(
        "http_response_size_bytes",
        "HTTP response size in bytes",
        &["method", "endpoint"],
        vec![100.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0, 500000.0, 1000000.0]
    )
    .unwrap();

    // ========================================================================
    // AUTHENTICATION METRICS
    // ========================================================================

    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "auth_attempts_total",
        "Total authentication attempts",
        &["auth_type", "status"]
    )
    .unwrap();

    // ========================================================================
    // LOYALTY METRICS
    // ========================================================================

    /// Sales recorded through the transaction service
    pub static ref SALES_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crm_sales_recorded_total",
        "Total sales recorded",
        &["status"]
    )
    .unwrap();

    /// Points written to the ledger, by point type and source
    pub static ref POINTS_MOVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crm_points_moved_total",
        "Absolute points written to the ledger",
        &["point_type", "source"]
    )
    .unwrap();

    pub static ref CAMPAIGN_REDEMPTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crm_campaign_redemptions_total",
        "Campaigns applied to recorded sales",
        &["campaign_type"]
    )
    .unwrap();

    pub static ref SEGMENT_REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crm_segment_refreshes_total",
        "Automatic segment refreshes",
        &["status"]
    )
    .unwrap();

    pub static ref PUSH_NOTIFICATIONS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "push_notifications_sent_total",
        "Push notifications dispatched per recipient",
        &["notification_type", "status"]
    )
    .unwrap();

    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "errors_total",
        "Errors returned to clients",
        &["error_code"]
    )
    .unwrap();
}

/// Helper to record one HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64, response_size: usize) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);

    HTTP_RESPONSE_SIZE_BYTES
        .with_label_values(&[method, endpoint])
        .observe(response_size as f64);
}

pub fn record_auth_attempt(auth_type: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    AUTH_ATTEMPTS_TOTAL.with_label_values(&[auth_type, status]).inc();
}

pub fn record_sale(success: bool) {
    let status = if success { "success" } else { "rejected" };
    SALES_RECORDED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_points(point_type: &str, source: &str, amount: i64) {
    POINTS_MOVED_TOTAL
        .with_label_values(&[point_type, source])
        .inc_by(amount.unsigned_abs());
}

pub fn record_campaign_redemption(campaign_type: &str) {
    CAMPAIGN_REDEMPTIONS_TOTAL.with_label_values(&[campaign_type]).inc();
}

pub fn record_segment_refresh(success: bool) {
    let status = if success { "success" } else { "error" };
    SEGMENT_REFRESHES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_push_notifications(notification_type: &str, sent: i64, failed: i64) {
    PUSH_NOTIFICATIONS_SENT_TOTAL
        .with_label_values(&[notification_type, "sent"])
        .inc_by(sent.max(0) as u64);
    PUSH_NOTIFICATIONS_SENT_TOTAL
        .with_label_values(&[notification_type, "failed"])
        .inc_by(failed.max(0) as u64);
}

pub fn record_error(error_code: &str) {
    ERRORS_TOTAL.with_label_values(&[error_code]).inc();
}
