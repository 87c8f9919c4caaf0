//! End-to-end request flows against the in-memory store

use aircrm_ws::{
    create_app_router,
    domains::notifications::LogDispatcher,
    state::AppState,
    store::MemoryStore,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shared::config::{
    AppConfig, AuthConfig, Config, DatabaseConfig, NotificationConfig, SeedConfig, StoreBackend,
};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const API_TOKEN: &str = "pos-terminal-token";

fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_seconds: 1,
            idle_timeout_seconds: 1,
            max_lifetime_seconds: 1,
            run_migrations: false,
        },
        store: StoreBackend::Memory,
        auth: AuthConfig {
            jwt_secret: "integration-secret".to_string(),
            access_token_ttl_seconds: 3600,
            api_bearer_token: Some(API_TOKEN.to_string()),
            service_restaurant_id: None,
        },
        notifications: NotificationConfig {
            push_gateway_url: None,
            timeout_seconds: 5,
        },
        seed: SeedConfig {
            restaurant_name: "Deniz Lokantası".to_string(),
            admin_email: Some("admin@aircrm.com".to_string()),
            admin_password: Some("admin123".to_string()),
            admin_name: "Yönetici".to_string(),
        },
        app: AppConfig {
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            port: 0,
            business_timezone: "Europe/Istanbul".to_string(),
            request_timeout_seconds: 30,
            cors_allowed_origins: vec![],
        },
    }
}

struct TestApp {
    router: Router,
    token: String,
    restaurant_id: Uuid,
}

impl TestApp {
    async fn start() -> Self {
        let config = test_config();
        let seed = config.seed.clone();
        let state = AppState::with_parts(config, Arc::new(MemoryStore::new()), Arc::new(LogDispatcher));
        let admin = state.users.seed(&seed).await.unwrap().expect("admin seeded");
        let router = create_app_router(Arc::new(state));

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "admin@aircrm.com", "password": "admin123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let token = body["data"]["access_token"].as_str().unwrap().to_string();

        Self {
            router,
            token,
            restaurant_id: admin.restaurant_id,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.router, method, uri, Some(&self.token), body).await
    }

    async fn create_customer(&self, name: &str, email: &str) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/customers",
                Some(json!({ "name": name, "email": email, "phone": "+905551112233" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    async fn record_sale(&self, customer_id: Uuid, amount: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "customer_id": customer_id,
                "total_amount": amount,
                "final_amount": amount,
                "payment_method": "CARD",
                "items": [{
                    "product_name": "Levrek Izgara",
                    "quantity": 1,
                    "unit_price": amount,
                    "total_price": amount
                }]
            })),
        )
        .await
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::start().await;
    let (status, body) = send(&app.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::start().await;

    let (status, body) = send(&app.router, Method::GET, "/api/v1/customers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");

    let (status, _) = send(&app.router, Method::GET, "/api/v1/customers", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = TestApp::start().await;
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "admin@aircrm.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Authentication error: Invalid email or password");
}

#[tokio::test]
async fn sale_updates_balance_and_ledger() {
    let app = TestApp::start().await;
    let customer_id = app.create_customer("Ayşe Yılmaz", "ayse@example.com").await;

    let (status, body) = app.record_sale(customer_id, "125.50").await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["transaction"]["points_earned"], 12);
    assert_eq!(body["data"]["customer"]["points"], 12);
    assert_eq!(body["data"]["customer"]["visit_count"], 1);

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/customers/{}", customer_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["customer"]["points"], 12);
    assert_eq!(body["data"]["recent_transactions"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/point-history?customerId={}", customer_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"]["items"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["point_type"], "EARNED");
    assert_eq!(rows[0]["balance_after"], 12);
}

#[tokio::test]
async fn inconsistent_totals_are_a_validation_error() {
    let app = TestApp::start().await;
    let customer_id = app.create_customer("Mehmet Kaya", "mehmet@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "customer_id": customer_id,
                "total_amount": "100.00",
                "discount_amount": "10.00",
                "final_amount": "95.00",
                "items": [{
                    "product_name": "Çay",
                    "quantity": 0,
                    "unit_price": "100.00",
                    "total_price": "100.00"
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["details"]["final_amount"].is_array());
    assert!(body["error"]["details"]["items[0].quantity"].is_array());
}

#[tokio::test]
async fn automatic_segment_refresh_picks_up_buyers() {
    let app = TestApp::start().await;
    let buyer = app.create_customer("Zeynep Demir", "zeynep@example.com").await;
    app.create_customer("Can Öztürk", "can@example.com").await;
    let (status, _) = app.record_sale(buyer, "80.00").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/segments",
            Some(json!({
                "name": "Returning guests",
                "mode": "AUTOMATIC",
                "criteria": {
                    "period": "all_time",
                    "rules": [{ "field": "purchase_count", "min": 1 }]
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let segment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::POST, &format!("/api/v1/segments/{}/refresh", segment_id), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["added"], 1);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn notifications_are_logged_per_recipient() {
    let app = TestApp::start().await;
    let first = app.create_customer("Elif Şahin", "elif@example.com").await;
    let second = app.create_customer("Burak Arslan", "burak@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/notifications/send",
            Some(json!({
                "title": "Hafta sonu menüsü",
                "body": "Cumartesi tatlılar bizden",
                "notification_type": "CAMPAIGN",
                "target": { "kind": "CUSTOMERS", "ids": [first, second] }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["sent_count"], 2);
    assert_eq!(body["data"]["failed_count"], 0);

    let (status, body) = app.call(Method::GET, "/api/v1/notifications", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn api_token_acts_for_the_header_restaurant() {
    let app = TestApp::start().await;
    app.create_customer("Deniz Aksoy", "deniz@example.com").await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/customers")
        .header(header::AUTHORIZATION, format!("Bearer {}", API_TOKEN))
        .header("x-restaurant-id", app.restaurant_id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app.router, Method::GET, "/api/v1/customers", Some(API_TOKEN), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_tokens_only_open_their_own_card() {
    let app = TestApp::start().await;
    let owner = app.create_customer("Selin Koç", "selin@example.com").await;
    let other = app.create_customer("Emre Çelik", "emre@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/customer-token",
            Some(json!({ "customer_id": owner })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let customer_token = body["data"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, Method::GET, "/api/v1/mobile/card", Some(&customer_token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["customer"]["id"], owner.to_string());

    let (status, _) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/mobile/card?customer_id={}", other),
        Some(&customer_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, Method::GET, "/api/v1/customers", Some(&customer_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
