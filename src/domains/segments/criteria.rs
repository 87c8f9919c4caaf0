//! Typed predicates for automatic segments.
//!
//! Criteria are validated when a segment is written. Older clients still send
//! the flat `{ "purchaseCount": { "min": 20 }, "period": "last_90_days" }`
//! object, which [`SegmentCriteria::from_legacy_json`] converts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;

use crate::domains::money::Money;
use shared::{AppError, FieldErrors, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "last_90_days")]
    Last90Days,
    #[serde(rename = "last_365_days")]
    Last365Days,
    AllTime,
}

impl Period {
    /// Start of the window ending at `now`; `None` means no lower bound
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            Period::Last7Days => 7,
            Period::Last30Days => 30,
            Period::Last90Days => 90,
            Period::Last365Days => 365,
            Period::AllTime => return None,
        };
        Some(now - Duration::days(days))
    }
}

impl Default for Period {
    fn default() -> Self {
        Period::AllTime
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "last_7_days" | "7d" => Ok(Period::Last7Days),
            "last_30_days" | "30d" => Ok(Period::Last30Days),
            "last_90_days" | "90d" => Ok(Period::Last90Days),
            "last_365_days" | "365d" | "last_year" => Ok(Period::Last365Days),
            "all_time" | "all" => Ok(Period::AllTime),
            other => Err(format!("unknown period {}", other)),
        }
    }
}

/// Inclusive bounds; a missing side is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn at_least(min: T) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn is_inverted(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Criterion {
    PurchaseCount(Range<i64>),
    AverageOrderValue(Range<Money>),
    TotalSpent(Range<Money>),
    /// Days since the last completed purchase ever made (not period bound)
    DaysSinceLastPurchase(Range<i64>),
    VisitCount(Range<i64>),
    Points(Range<i64>),
}

impl Criterion {
    pub fn field(&self) -> &'static str {
        match self {
            Criterion::PurchaseCount(_) => "purchase_count",
            Criterion::AverageOrderValue(_) => "average_order_value",
            Criterion::TotalSpent(_) => "total_spent",
            Criterion::DaysSinceLastPurchase(_) => "days_since_last_purchase",
            Criterion::VisitCount(_) => "visit_count",
            Criterion::Points(_) => "points",
        }
    }

    pub fn matches(&self, stats: &PurchaseStats, now: DateTime<Utc>) -> bool {
        match self {
            Criterion::PurchaseCount(range) => range.contains(stats.purchase_count),
            Criterion::AverageOrderValue(range) => range.contains(stats.average_order_value),
            Criterion::TotalSpent(range) => range.contains(stats.total_spent),
            Criterion::DaysSinceLastPurchase(range) => match stats.last_purchase_at {
                Some(last) => range.contains((now - last).num_days()),
                // never purchased: satisfies any lower bound, fails any upper bound
                None => range.max.is_none(),
            },
            Criterion::VisitCount(range) => range.contains(stats.visit_count),
            Criterion::Points(range) => range.contains(stats.points),
        }
    }

    fn problems(&self) -> Vec<&'static str> {
        let (open, inverted, negative) = match self {
            Criterion::PurchaseCount(r)
            | Criterion::DaysSinceLastPurchase(r)
            | Criterion::VisitCount(r)
            | Criterion::Points(r) => (
                r.is_open(),
                r.is_inverted(),
                r.min.map_or(false, |v| v < 0) || r.max.map_or(false, |v| v < 0),
            ),
            Criterion::AverageOrderValue(r) | Criterion::TotalSpent(r) => (
                r.is_open(),
                r.is_inverted(),
                r.min.map_or(false, Money::is_negative) || r.max.map_or(false, Money::is_negative),
            ),
        };
        let mut problems = Vec::new();
        if open {
            problems.push("At least one of min or max is required");
        }
        if inverted {
            problems.push("min must not be greater than max");
        }
        if negative {
            problems.push("Bounds must not be negative");
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCriteria {
    #[serde(default)]
    pub period: Period,
    pub rules: Vec<Criterion>,
}

impl SegmentCriteria {
    pub fn new(period: Period, rules: Vec<Criterion>) -> Self {
        Self { period, rules }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        if self.rules.is_empty() {
            errors
                .entry("criteria".to_string())
                .or_default()
                .push("At least one rule is required".to_string());
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            let key = format!("criteria.{}", rule.field());
            if !seen.insert(rule.field()) {
                errors
                    .entry(key.clone())
                    .or_default()
                    .push("Field appears more than once".to_string());
            }
            for problem in rule.problems() {
                errors.entry(key.clone()).or_default().push(problem.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidFields(errors))
        }
    }

    /// Conjunction of every rule
    pub fn matches(&self, stats: &PurchaseStats, now: DateTime<Utc>) -> bool {
        self.rules.iter().all(|rule| rule.matches(stats, now))
    }

    /// Accept either the typed form or the legacy flat object
    pub fn from_json(value: &Value) -> Result<Self> {
        let criteria = if value.get("rules").is_some() {
            serde_json::from_value(value.clone())
                .map_err(|e| AppError::invalid_field("criteria", e.to_string()))?
        } else {
            Self::from_legacy_json(value)?
        };
        criteria.validate()?;
        Ok(criteria)
    }

    pub fn from_legacy_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AppError::invalid_field("criteria", "Criteria must be an object"))?;

        let mut period = Period::AllTime;
        let mut rules = Vec::new();

        for (key, raw) in object {
            let field = format!("criteria.{}", key);
            let invalid = |e: serde_json::Error| AppError::invalid_field(field.clone(), e.to_string());
            match key.as_str() {
                "period" => {
                    let text = raw
                        .as_str()
                        .ok_or_else(|| AppError::invalid_field(field.clone(), "Period must be a string"))?;
                    period = text
                        .parse()
                        .map_err(|e: String| AppError::invalid_field(field.clone(), e))?;
                }
                "purchaseCount" => rules.push(Criterion::PurchaseCount(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                "averageOrderValue" => rules.push(Criterion::AverageOrderValue(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                "totalSpent" => rules.push(Criterion::TotalSpent(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                "daysSinceLastPurchase" => rules.push(Criterion::DaysSinceLastPurchase(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                "visitCount" => rules.push(Criterion::VisitCount(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                "points" => rules.push(Criterion::Points(
                    serde_json::from_value(raw.clone()).map_err(invalid)?,
                )),
                _ => return Err(AppError::invalid_field(field, "Unknown criteria field")),
            }
        }

        Ok(Self { period, rules })
    }
}

/// Aggregated history of one customer, as seen by the criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurchaseStats {
    pub purchase_count: i64,
    pub total_spent: Money,
    pub average_order_value: Money,
    pub last_purchase_at: Option<DateTime<Utc>>,
    pub visit_count: i64,
    pub points: i64,
}

/// One completed sale as far as segmentation cares
#[derive(Debug, Clone, Copy)]
pub struct PurchaseFact {
    pub final_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

impl PurchaseStats {
    /// Aggregate completed purchases inside the window starting at `since`.
    /// `last_purchase_at` looks at every purchase regardless of window.
    pub fn from_purchases(
        purchases: &[PurchaseFact],
        since: Option<DateTime<Utc>>,
        visit_count: i64,
        points: i64,
    ) -> Self {
        let in_period: Vec<&PurchaseFact> = purchases
            .iter()
            .filter(|p| since.map_or(true, |since| p.occurred_at >= since))
            .collect();
        let purchase_count = in_period.len() as i64;
        let total_spent: Money = in_period.iter().map(|p| p.final_amount).sum();

        Self {
            purchase_count,
            total_spent,
            average_order_value: total_spent.average_over(purchase_count),
            last_purchase_at: purchases.iter().map(|p| p.occurred_at).max(),
            visit_count,
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn purchases(count: usize, amount_units: i64, now: DateTime<Utc>) -> Vec<PurchaseFact> {
        (0..count)
            .map(|i| PurchaseFact {
                final_amount: Money::from_units(amount_units),
                occurred_at: now - Duration::days(i as i64),
            })
            .collect()
    }

    #[test]
    fn purchase_count_min_twenty() {
        let now = Utc::now();
        let criteria = SegmentCriteria::from_json(&json!({ "purchaseCount": { "min": 20 } })).unwrap();

        let nineteen = PurchaseStats::from_purchases(&purchases(19, 50, now), None, 19, 0);
        let twenty = PurchaseStats::from_purchases(&purchases(20, 50, now), None, 20, 0);

        assert!(!criteria.matches(&nineteen, now));
        assert!(criteria.matches(&twenty, now));
    }

    #[test]
    fn legacy_json_converts_period_and_money() {
        let criteria = SegmentCriteria::from_legacy_json(&json!({
            "averageOrderValue": { "min": 150 },
            "period": "last_90_days"
        }))
        .unwrap();

        assert_eq!(criteria.period, Period::Last90Days);
        assert_eq!(
            criteria.rules,
            vec![Criterion::AverageOrderValue(Range::at_least(Money::from_units(150)))]
        );
    }

    #[test]
    fn typed_form_round_trips_through_from_json() {
        let criteria = SegmentCriteria::new(
            Period::Last30Days,
            vec![Criterion::TotalSpent(Range {
                min: Some(Money::from_units(100)),
                max: Some(Money::from_units(500)),
            })],
        );
        let value = serde_json::to_value(&criteria).unwrap();
        assert_eq!(value["rules"][0]["field"], "total_spent");
        assert_eq!(SegmentCriteria::from_json(&value).unwrap(), criteria);
    }

    #[test]
    fn period_limits_aggregation() {
        let now = Utc::now();
        let history = purchases(40, 100, now); // one per day, going back 40 days
        let stats = PurchaseStats::from_purchases(&history, Period::Last7Days.since(now), 40, 0);

        assert_eq!(stats.purchase_count, 8); // days 0..=7
        assert_eq!(stats.total_spent, Money::from_units(800));
        assert_eq!(stats.average_order_value, Money::from_units(100));
    }

    #[test]
    fn days_since_last_purchase_handles_never_purchased() {
        let now = Utc::now();
        let churned = Criterion::DaysSinceLastPurchase(Range::at_least(60));
        let recent = Criterion::DaysSinceLastPurchase(Range { min: None, max: Some(7) });
        let never = PurchaseStats::default();

        assert!(churned.matches(&never, now));
        assert!(!recent.matches(&never, now));
    }

    #[test]
    fn invalid_criteria_are_rejected_on_write() {
        assert!(SegmentCriteria::from_json(&json!({ "purchaseCount": { "min": 5, "max": 2 } })).is_err());
        assert!(SegmentCriteria::from_json(&json!({ "period": "last_90_days" })).is_err());
        assert!(SegmentCriteria::from_json(&json!({ "favouriteColour": { "min": 1 } })).is_err());
        assert!(SegmentCriteria::from_json(&json!({ "visitCount": {} })).is_err());

        let err = SegmentCriteria::from_json(&json!({ "points": { "min": -1 } })).unwrap_err();
        match err {
            AppError::InvalidFields(fields) => assert!(fields.contains_key("criteria.points")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
