use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domains::money::Money;
use crate::domains::points::models::PointEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        Self::Completed
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(format!("unknown transaction status {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub category: Option<String>,
    pub quantity: i32,
    pub unit_price: Money,
    pub total_price: Money,
    pub discount_amount: Money,
    pub is_free: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCampaign {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub discount_amount: Money,
    pub free_items: Vec<String>,
    pub points_earned: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub customer_id: Uuid,
    pub order_number: String,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub points_earned: i64,
    pub points_used: i64,
    pub payment_method: Option<String>,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub items: Vec<TransactionItem>,
    pub applied_campaigns: Vec<AppliedCampaign>,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Transaction row joined with the customer's display name
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub customer_name: String,
}

/// Usage caps re-checked by the store while recording the sale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignCap {
    pub campaign_id: Uuid,
    pub max_usage: Option<i64>,
    pub max_usage_per_customer: Option<i64>,
}

/// Everything written atomically for one completed sale
#[derive(Debug, Clone)]
pub struct SaleRecord {
    pub transaction: Transaction,
    pub ledger: Vec<PointEntry>,
    pub campaign_caps: Vec<CampaignCap>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilters {
    pub customer_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilters {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.customer_id.map_or(true, |id| transaction.customer_id == id)
            && self.status.map_or(true, |status| transaction.status == status)
            && self.from.map_or(true, |from| transaction.transaction_date >= from)
            && self.to.map_or(true, |to| transaction.transaction_date <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub count: i64,
    pub revenue: Money,
    pub discounts: Money,
    pub average_order_value: Money,
    pub points_earned: i64,
    pub points_used: i64,
}
