use chrono::{DateTime, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domains::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    Discount,
    ProductBased,
    LoyaltyPoints,
    TimeBased,
    BirthdaySpecial,
    ComboDeal,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discount => "DISCOUNT",
            Self::ProductBased => "PRODUCT_BASED",
            Self::LoyaltyPoints => "LOYALTY_POINTS",
            Self::TimeBased => "TIME_BASED",
            Self::BirthdaySpecial => "BIRTHDAY_SPECIAL",
            Self::ComboDeal => "COMBO_DEAL",
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DISCOUNT" => Ok(Self::Discount),
            "PRODUCT_BASED" => Ok(Self::ProductBased),
            "LOYALTY_POINTS" => Ok(Self::LoyaltyPoints),
            "TIME_BASED" => Ok(Self::TimeBased),
            "BIRTHDAY_SPECIAL" => Ok(Self::BirthdaySpecial),
            "COMBO_DEAL" => Ok(Self::ComboDeal),
            other => Err(format!("unknown campaign type {}", other)),
        }
    }
}

/// Shape of the reward a campaign gives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountRule {
    Percentage { percent: Decimal },
    FixedAmount { amount: Money },
    FreeItem,
    BuyOneGetOne,
}

impl DiscountRule {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "PERCENTAGE",
            Self::FixedAmount { .. } => "FIXED_AMOUNT",
            Self::FreeItem => "FREE_ITEM",
            Self::BuyOneGetOne => "BUY_ONE_GET_ONE",
        }
    }
}

/// Daily time window in the business time zone, `HH:MM` on the wire.
/// A window whose end is before its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidHours {
    #[serde(with = "hh_mm")]
    pub start: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end: NaiveTime,
}

impl ValidHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| serde::de::Error::custom(format!("invalid time {}, expected HH:MM", raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub description: String,
    pub campaign_type: CampaignType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub discount: DiscountRule,
    pub min_purchase: Option<Money>,
    pub max_usage: Option<i64>,
    pub max_usage_per_customer: Option<i64>,
    pub valid_hours: Option<ValidHours>,
    pub valid_days: Vec<Weekday>,
    pub target_products: Vec<Uuid>,
    pub free_products: Vec<Uuid>,
    pub points_multiplier: Decimal,
    pub points_required: Option<i64>,
    pub buy_quantity: Option<i32>,
    pub send_notification: bool,
    pub notification_title: Option<String>,
    pub notification_message: Option<String>,
    pub segment_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn is_segment_restricted(&self) -> bool {
        !self.segment_ids.is_empty()
    }
}

/// Campaign plus its global redemption count, as listed in the admin UI
#[derive(Debug, Clone, Serialize)]
pub struct CampaignWithUsage {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub usage_count: i64,
}

/// Usage counters consulted by the eligibility rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounts {
    pub total: i64,
    pub by_customer: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignUsage {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub customer_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignFilters {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub campaign_type: Option<CampaignType>,
    pub status: Option<CampaignStatus>,
}

impl CampaignFilters {
    pub fn matches(&self, campaign: &Campaign) -> bool {
        if let Some(kind) = self.campaign_type {
            if campaign.campaign_type != kind {
                return false;
            }
        }
        match self.status {
            Some(CampaignStatus::Active) if !campaign.is_active => return false,
            Some(CampaignStatus::Inactive) if campaign.is_active => return false,
            _ => {}
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                campaign.name.to_lowercase().contains(&term)
                    || campaign.description.to_lowercase().contains(&term)
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub fn campaign_fixture() -> Campaign {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Campaign {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::nil(),
            name: "Kahve Haftası".to_string(),
            description: "Tüm kahvelerde yüzde yirmi indirim".to_string(),
            campaign_type: CampaignType::Discount,
            start_date: start,
            end_date: start + Duration::days(30),
            discount: DiscountRule::Percentage {
                percent: Decimal::from(20),
            },
            min_purchase: None,
            max_usage: None,
            max_usage_per_customer: None,
            valid_hours: None,
            valid_days: Vec::new(),
            target_products: Vec::new(),
            free_products: Vec::new(),
            points_multiplier: Decimal::ONE,
            points_required: None,
            buy_quantity: None,
            send_notification: false,
            notification_title: None,
            notification_message: None,
            segment_ids: Vec::new(),
            is_active: true,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn discount_rule_is_tagged() {
        let rule: DiscountRule =
            serde_json::from_str(r#"{"type":"FIXED_AMOUNT","amount":"25.00"}"#).unwrap();
        assert_eq!(rule, DiscountRule::FixedAmount { amount: Money::from_units(25) });

        let json = serde_json::to_value(DiscountRule::BuyOneGetOne).unwrap();
        assert_eq!(json["type"], "BUY_ONE_GET_ONE");
    }

    #[test]
    fn valid_hours_parse_and_wrap() {
        let hours: ValidHours = serde_json::from_str(r#"{"start":"22:00","end":"02:00"}"#).unwrap();
        assert!(hours.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(hours.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!hours.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(serde_json::from_str::<ValidHours>(r#"{"start":"25:00","end":"02:00"}"#).is_err());
    }

    #[test]
    fn filters_by_status_and_search() {
        let mut campaign = campaign_fixture();
        let filters = CampaignFilters {
            search: Some("KAHVE".into()),
            campaign_type: None,
            status: Some(CampaignStatus::Active),
        };
        assert!(filters.matches(&campaign));
        campaign.is_active = false;
        assert!(!filters.matches(&campaign));
    }
}
