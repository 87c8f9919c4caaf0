use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domains::customers::models::LoyaltyLevel;
use shared::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Campaign,
    Reward,
    Broadcast,
    Info,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "CAMPAIGN",
            Self::Reward => "REWARD",
            Self::Broadcast => "BROADCAST",
            Self::Info => "INFO",
        }
    }
}

impl Default for NotificationType {
    fn default() -> Self {
        Self::Broadcast
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CAMPAIGN" => Ok(Self::Campaign),
            "REWARD" => Ok(Self::Reward),
            "BROADCAST" => Ok(Self::Broadcast),
            "INFO" => Ok(Self::Info),
            other => Err(format!("unknown notification type {}", other)),
        }
    }
}

/// Who a notification goes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationTarget {
    All,
    Segments(Vec<Uuid>),
    Levels(Vec<LoyaltyLevel>),
    Customers(Vec<Uuid>),
}

impl NotificationTarget {
    pub fn validate(&self) -> Result<()> {
        let empty = match self {
            NotificationTarget::All => false,
            NotificationTarget::Segments(ids) | NotificationTarget::Customers(ids) => ids.is_empty(),
            NotificationTarget::Levels(levels) => levels.is_empty(),
        };
        if empty {
            Err(AppError::invalid_field("target", "Select at least one recipient group"))
        } else {
            Ok(())
        }
    }

    /// Short human readable description stored on the log row
    pub fn describe(&self) -> String {
        match self {
            NotificationTarget::All => "all customers".to_string(),
            NotificationTarget::Segments(ids) => format!("{} segment(s)", ids.len()),
            NotificationTarget::Levels(levels) => {
                let names: Vec<&str> = levels.iter().map(LoyaltyLevel::as_str).collect();
                format!("levels {}", names.join(", "))
            }
            NotificationTarget::Customers(ids) => format!("{} customer(s)", ids.len()),
        }
    }
}

/// Message handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub notification_type: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub sent: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub title: String,
    pub body: String,
    pub notification_type: NotificationType,
    pub target: NotificationTarget,
    pub target_description: String,
    pub recipient_ids: Vec<Uuid>,
    pub sent_count: i64,
    pub failed_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Entry in a customer's mobile notification feed
#[derive(Debug, Clone, Serialize)]
pub struct CustomerNotification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub notification_type: NotificationType,
    pub created_at: DateTime<Utc>,
}

impl From<&NotificationLog> for CustomerNotification {
    fn from(log: &NotificationLog) -> Self {
        Self {
            id: log.id,
            title: log.title.clone(),
            body: log.body.clone(),
            notification_type: log.notification_type,
            created_at: log.created_at,
        }
    }
}

/// Customer row offered in the "send notification" recipient picker
#[derive(Debug, Clone, Serialize)]
pub struct PushTarget {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub level: LoyaltyLevel,
    pub segment_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_adjacently_tagged() {
        let target: NotificationTarget =
            serde_json::from_str(r#"{"kind":"LEVELS","ids":["GOLD","PLATINUM"]}"#).unwrap();
        assert_eq!(
            target,
            NotificationTarget::Levels(vec![LoyaltyLevel::Gold, LoyaltyLevel::Platinum])
        );
        let all: NotificationTarget = serde_json::from_str(r#"{"kind":"ALL"}"#).unwrap();
        assert_eq!(all, NotificationTarget::All);
    }

    #[test]
    fn empty_target_lists_are_rejected() {
        assert!(NotificationTarget::Segments(vec![]).validate().is_err());
        assert!(NotificationTarget::All.validate().is_ok());
        assert_eq!(NotificationTarget::Customers(vec![Uuid::new_v4()]).describe(), "1 customer(s)");
    }
}
