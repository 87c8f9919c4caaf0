use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criteria::SegmentCriteria;

/// Manual segments keep an explicit member list; automatic ones are
/// recomputed from their criteria on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentKind {
    Manual,
    Automatic { criteria: SegmentCriteria },
}

impl SegmentKind {
    pub fn is_automatic(&self) -> bool {
        matches!(self, SegmentKind::Automatic { .. })
    }

    pub fn criteria(&self) -> Option<&SegmentCriteria> {
        match self {
            SegmentKind::Automatic { criteria } => Some(criteria),
            SegmentKind::Manual => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: SegmentKind,
    pub member_count: i64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentMember {
    pub customer_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentDetail {
    #[serde(flatten)]
    pub segment: Segment,
    pub members: Vec<SegmentMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub added: i64,
    pub removed: i64,
    pub total: i64,
}
