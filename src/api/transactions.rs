use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::common::{ApiResponse, PageQuery, RequestMeta};
use crate::domains::context::Principal;
use crate::domains::customers::models::Customer;
use crate::domains::transactions::models::{
    Transaction, TransactionFilters, TransactionStatus, TransactionSummary, TransactionView,
};
use crate::domains::transactions::service::CreateTransactionRequest;
use crate::state::AppState;
use shared::{Page, Result};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/summary", get(transaction_summary))
}

#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(alias = "customerId")]
    pub customer_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    #[serde(alias = "startDate")]
    pub from: Option<DateTime<Utc>>,
    #[serde(alias = "endDate")]
    pub to: Option<DateTime<Utc>>,
}

impl TransactionListQuery {
    fn filters(&self) -> TransactionFilters {
        TransactionFilters {
            customer_id: self.customer_id,
            status: self.status,
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordedSale {
    pub transaction: Transaction,
    pub customer: Customer,
}

/// GET /api/v1/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<ApiResponse<Page<TransactionView>>>> {
    let meta = RequestMeta::from_headers(&headers);
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .page_request();
    let transactions = state
        .transactions
        .list(&principal, &query.filters(), page)
        .await?;
    Ok(meta.ok(transactions))
}

/// POST /api/v1/transactions
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RecordedSale>>)> {
    let meta = RequestMeta::from_headers(&headers);
    let (transaction, customer) = state.transactions.create(&principal, request).await?;
    Ok(meta.created(RecordedSale { transaction, customer }))
}

/// GET /api/v1/transactions/summary
pub async fn transaction_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<ApiResponse<TransactionSummary>>> {
    let meta = RequestMeta::from_headers(&headers);
    let summary = state.transactions.summary(&principal, &query.filters()).await?;
    Ok(meta.ok(summary))
}
