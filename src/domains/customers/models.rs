//! Customer and tier models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domains::money::Money;

/// Legacy ordinal level kept on every customer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyLevel {
    Regular,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
        }
    }

    pub fn ordinal(&self) -> i32 {
        match self {
            Self::Regular => 0,
            Self::Bronze => 1,
            Self::Silver => 2,
            Self::Gold => 3,
            Self::Platinum => 4,
        }
    }
}

impl Default for LoyaltyLevel {
    fn default() -> Self {
        Self::Regular
    }
}

impl fmt::Display for LoyaltyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoyaltyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REGULAR" => Ok(Self::Regular),
            "BRONZE" => Ok(Self::Bronze),
            "SILVER" => Ok(Self::Silver),
            "GOLD" => Ok(Self::Gold),
            "PLATINUM" => Ok(Self::Platinum),
            other => Err(format!("unknown loyalty level {}", other)),
        }
    }
}

/// Restaurant-defined loyalty tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub level: i32,
    pub min_points: i64,
    pub point_multiplier: Decimal,
    pub discount_percent: Decimal,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub points: i64,
    pub level: LoyaltyLevel,
    pub tier_id: Option<Uuid>,
    pub total_spent: Money,
    pub visit_count: i64,
    pub last_visit: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilters {
    pub search: Option<String>,
    pub level: Option<LoyaltyLevel>,
    pub tier_id: Option<Uuid>,
}

impl CustomerFilters {
    pub fn matches(&self, customer: &Customer) -> bool {
        if let Some(level) = self.level {
            if customer.level != level {
                return false;
            }
        }
        if let Some(tier_id) = self.tier_id {
            if customer.tier_id != Some(tier_id) {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                let hit = |value: &Option<String>| {
                    value
                        .as_deref()
                        .map(|v| v.to_lowercase().contains(&term))
                        .unwrap_or(false)
                };
                customer.name.to_lowercase().contains(&term)
                    || hit(&customer.email)
                    || hit(&customer.phone)
            }
        }
    }
}

/// Aggregate spend/points figures shown on the customer detail page
#[derive(Debug, Clone, Serialize)]
pub struct CustomerStats {
    pub total_spent: Money,
    pub total_visits: i64,
    pub average_spent: Money,
    pub current_points: i64,
    pub total_points_earned: i64,
    pub total_points_spent: i64,
}
