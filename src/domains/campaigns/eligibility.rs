//! Which campaigns a customer may redeem right now.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::models::{Campaign, UsageCounts};

/// Everything the rule needs to know about the customer at `now`
#[derive(Debug, Clone, Default)]
pub struct EligibilityContext {
    pub now: DateTime<Utc>,
    pub customer_segments: HashSet<Uuid>,
    /// Keyed by campaign id; campaigns missing here have no usages
    pub usage: HashMap<Uuid, UsageCounts>,
}

impl EligibilityContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: impl IntoIterator<Item = Uuid>) -> Self {
        self.customer_segments = segments.into_iter().collect();
        self
    }

    pub fn with_usage(mut self, campaign_id: Uuid, usage: UsageCounts) -> Self {
        self.usage.insert(campaign_id, usage);
        self
    }

    fn usage_for(&self, campaign_id: Uuid) -> UsageCounts {
        self.usage.get(&campaign_id).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ineligibility {
    Inactive,
    NotStarted,
    Ended,
    NotInSegment,
    CustomerLimitReached { used: i64, max: i64 },
    UsageLimitReached { used: i64, max: i64 },
}

/// First rule the campaign fails, or `None` when it is eligible
pub fn ineligibility_reason(campaign: &Campaign, ctx: &EligibilityContext) -> Option<Ineligibility> {
    if !campaign.is_active {
        return Some(Ineligibility::Inactive);
    }
    if ctx.now < campaign.start_date {
        return Some(Ineligibility::NotStarted);
    }
    if ctx.now > campaign.end_date {
        return Some(Ineligibility::Ended);
    }
    if campaign.is_segment_restricted()
        && !campaign
            .segment_ids
            .iter()
            .any(|segment| ctx.customer_segments.contains(segment))
    {
        return Some(Ineligibility::NotInSegment);
    }

    let usage = ctx.usage_for(campaign.id);
    if let Some(max) = campaign.max_usage_per_customer {
        if usage.by_customer >= max {
            return Some(Ineligibility::CustomerLimitReached {
                used: usage.by_customer,
                max,
            });
        }
    }
    if let Some(max) = campaign.max_usage {
        if usage.total >= max {
            return Some(Ineligibility::UsageLimitReached {
                used: usage.total,
                max,
            });
        }
    }

    None
}

pub fn is_eligible(campaign: &Campaign, ctx: &EligibilityContext) -> bool {
    ineligibility_reason(campaign, ctx).is_none()
}

/// Eligible campaigns in their input order. Overlaps are left for the caller.
pub fn eligible_campaigns<'a>(campaigns: &'a [Campaign], ctx: &EligibilityContext) -> Vec<&'a Campaign> {
    campaigns
        .iter()
        .filter(|campaign| is_eligible(campaign, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::campaigns::models::tests::campaign_fixture;
    use chrono::Duration;

    fn inside(campaign: &Campaign) -> DateTime<Utc> {
        campaign.start_date + Duration::days(1)
    }

    #[test]
    fn outside_window_is_never_eligible() {
        let campaign = campaign_fixture();
        let before = EligibilityContext::new(campaign.start_date - Duration::seconds(1));
        let after = EligibilityContext::new(campaign.end_date + Duration::seconds(1));

        assert_eq!(ineligibility_reason(&campaign, &before), Some(Ineligibility::NotStarted));
        assert_eq!(ineligibility_reason(&campaign, &after), Some(Ineligibility::Ended));

        // boundaries are inclusive
        assert!(is_eligible(&campaign, &EligibilityContext::new(campaign.start_date)));
        assert!(is_eligible(&campaign, &EligibilityContext::new(campaign.end_date)));
    }

    #[test]
    fn outside_window_ignores_everything_else() {
        let mut campaign = campaign_fixture();
        campaign.max_usage = None;
        campaign.max_usage_per_customer = None;
        let ctx = EligibilityContext::new(campaign.end_date + Duration::days(3));
        assert!(!is_eligible(&campaign, &ctx));
    }

    #[test]
    fn inactive_campaign_is_rejected() {
        let mut campaign = campaign_fixture();
        campaign.is_active = false;
        assert_eq!(
            ineligibility_reason(&campaign, &EligibilityContext::new(inside(&campaign))),
            Some(Ineligibility::Inactive)
        );
    }

    #[test]
    fn per_customer_cap_is_exclusive() {
        let mut campaign = campaign_fixture();
        campaign.max_usage_per_customer = Some(3);
        let now = inside(&campaign);

        let below = EligibilityContext::new(now).with_usage(
            campaign.id,
            UsageCounts { total: 2, by_customer: 2 },
        );
        let at_cap = EligibilityContext::new(now).with_usage(
            campaign.id,
            UsageCounts { total: 3, by_customer: 3 },
        );

        assert!(is_eligible(&campaign, &below));
        assert_eq!(
            ineligibility_reason(&campaign, &at_cap),
            Some(Ineligibility::CustomerLimitReached { used: 3, max: 3 })
        );
    }

    #[test]
    fn global_cap_counts_all_customers() {
        let mut campaign = campaign_fixture();
        campaign.max_usage = Some(100);
        let ctx = EligibilityContext::new(inside(&campaign)).with_usage(
            campaign.id,
            UsageCounts { total: 100, by_customer: 0 },
        );
        assert!(!is_eligible(&campaign, &ctx));
    }

    #[test]
    fn null_caps_are_unlimited() {
        let campaign = campaign_fixture();
        let ctx = EligibilityContext::new(inside(&campaign)).with_usage(
            campaign.id,
            UsageCounts { total: 1_000_000, by_customer: 5_000 },
        );
        assert!(is_eligible(&campaign, &ctx));
    }

    #[test]
    fn segment_restriction_hides_campaign_from_outsiders() {
        let segment_a = Uuid::new_v4();
        let mut restricted = campaign_fixture();
        restricted.segment_ids = vec![segment_a];
        let open = campaign_fixture();
        let campaigns = vec![restricted.clone(), open.clone()];
        let now = inside(&open);

        let outsider = EligibilityContext::new(now).with_segments([Uuid::new_v4()]);
        let eligible = eligible_campaigns(&campaigns, &outsider);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, open.id);

        let member = EligibilityContext::new(now).with_segments([segment_a]);
        let eligible: Vec<Uuid> = eligible_campaigns(&campaigns, &member)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(eligible, vec![restricted.id, open.id]);
    }
}
