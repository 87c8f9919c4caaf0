use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Largest point amount a single request may move
pub const MAX_POINTS_PER_MOVE: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointType {
    Earned,
    Spent,
    Expired,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "EARNED",
            Self::Spent => "SPENT",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EARNED" => Ok(Self::Earned),
            "SPENT" => Ok(Self::Spent),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(format!("unknown point type {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointSource {
    Purchase,
    Reward,
    Bonus,
    Manual,
    Campaign,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::Reward => "REWARD",
            Self::Bonus => "BONUS",
            Self::Manual => "MANUAL",
            Self::Campaign => "CAMPAIGN",
        }
    }
}

impl fmt::Display for PointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE" => Ok(Self::Purchase),
            "REWARD" => Ok(Self::Reward),
            "BONUS" => Ok(Self::Bonus),
            "MANUAL" => Ok(Self::Manual),
            "CAMPAIGN" => Ok(Self::Campaign),
            other => Err(format!("unknown point source {}", other)),
        }
    }
}

/// Immutable ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointHistory {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub point_type: PointType,
    pub source: PointSource,
    pub source_id: Option<Uuid>,
    pub description: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Ledger row before the store assigns its id and running balance
#[derive(Debug, Clone, PartialEq)]
pub struct PointEntry {
    pub amount: i64,
    pub point_type: PointType,
    pub source: PointSource,
    pub source_id: Option<Uuid>,
    pub description: Option<String>,
}

impl PointEntry {
    pub fn earned(amount: i64, source: PointSource, description: impl Into<String>) -> Self {
        Self {
            amount: amount.saturating_abs(),
            point_type: PointType::Earned,
            source,
            source_id: None,
            description: Some(description.into()),
        }
    }

    pub fn spent(amount: i64, source: PointSource, description: impl Into<String>) -> Self {
        Self {
            amount: -amount.saturating_abs(),
            point_type: PointType::Spent,
            source,
            source_id: None,
            description: Some(description.into()),
        }
    }

    pub fn expired(amount: i64, description: impl Into<String>) -> Self {
        Self {
            amount: -amount.saturating_abs(),
            point_type: PointType::Expired,
            source: PointSource::Manual,
            source_id: None,
            description: Some(description.into()),
        }
    }

    pub fn with_source_id(mut self, source_id: Uuid) -> Self {
        self.source_id = Some(source_id);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointHistoryFilters {
    pub customer_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub point_type: Option<PointType>,
    pub source: Option<PointSource>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl PointHistoryFilters {
    pub fn matches(&self, row: &PointHistory) -> bool {
        self.customer_id.map_or(true, |id| row.customer_id == id)
            && self.point_type.map_or(true, |t| row.point_type == t)
            && self.source.map_or(true, |s| row.source == s)
            && self.from.map_or(true, |from| row.created_at >= from)
            && self.to.map_or(true, |to| row.created_at <= to)
    }
}

/// Ledger row joined with the customer's display name
#[derive(Debug, Clone, Serialize)]
pub struct PointHistoryView {
    #[serde(flatten)]
    pub entry: PointHistory,
    pub customer_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PointStats {
    pub total_earned: i64,
    pub total_spent: i64,
    pub total_expired: i64,
    pub net_balance: i64,
}

impl PointStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a PointHistory>) -> Self {
        let mut stats = PointStats::default();
        for entry in entries {
            match entry.point_type {
                PointType::Earned => stats.total_earned += entry.amount,
                PointType::Spent => stats.total_spent += entry.amount.abs(),
                PointType::Expired => stats.total_expired += entry.amount.abs(),
            }
        }
        stats.net_balance = stats.total_earned - stats.total_spent - stats.total_expired;
        stats
    }
}

/// Ledger/balance consistency for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointAudit {
    pub customer_id: Uuid,
    pub balance: i64,
    pub ledger_sum: i64,
    pub entries: i64,
    pub consistent: bool,
}
