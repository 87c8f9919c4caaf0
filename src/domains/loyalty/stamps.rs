use serde::Serialize;
use uuid::Uuid;

use crate::domains::campaigns::models::{Campaign, DiscountRule};

/// Progress of one customer on a "buy N, get a reward" stamp card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StampProgress {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub buy_quantity: i64,
    pub reward: DiscountRule,
    pub total_purchased: i64,
    pub stamps_earned: i64,
    pub stamps_used: i64,
    pub stamps_available: i64,
    pub progress_to_next: i64,
    pub remaining_for_next_stamp: i64,
    pub max_usage: Option<i64>,
    pub can_earn_more: bool,
}

/// Stamp card state for a campaign with `buy_quantity`; `None` for campaigns
/// that are not stamp cards.
pub fn stamp_progress(campaign: &Campaign, purchases: i64, stamps_used: i64) -> Option<StampProgress> {
    let buy_quantity = campaign.buy_quantity.filter(|n| *n > 0)? as i64;
    let purchases = purchases.max(0);

    let mut stamps_earned = purchases / buy_quantity;
    if let Some(cap) = campaign.max_usage {
        stamps_earned = stamps_earned.min(cap);
    }
    let stamps_used = stamps_used.max(0);
    let progress_to_next = purchases % buy_quantity;
    let can_earn_more = campaign.max_usage.map_or(true, |cap| stamps_earned < cap);

    Some(StampProgress {
        campaign_id: campaign.id,
        campaign_name: campaign.name.clone(),
        buy_quantity,
        reward: campaign.discount.clone(),
        total_purchased: purchases,
        stamps_earned,
        stamps_used,
        stamps_available: (stamps_earned - stamps_used).max(0),
        progress_to_next,
        remaining_for_next_stamp: buy_quantity - progress_to_next,
        max_usage: campaign.max_usage,
        can_earn_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::campaigns::models::tests::campaign_fixture;

    #[test]
    fn counts_stamps_and_progress() {
        let mut campaign = campaign_fixture();
        campaign.buy_quantity = Some(5);
        campaign.max_usage = None;

        let card = stamp_progress(&campaign, 12, 1).unwrap();
        assert_eq!(card.stamps_earned, 2);
        assert_eq!(card.stamps_available, 1);
        assert_eq!(card.progress_to_next, 2);
        assert_eq!(card.remaining_for_next_stamp, 3);
        assert!(card.can_earn_more);
    }

    #[test]
    fn global_cap_limits_earned_stamps() {
        let mut campaign = campaign_fixture();
        campaign.buy_quantity = Some(3);
        campaign.max_usage = Some(2);

        let card = stamp_progress(&campaign, 10, 0).unwrap();
        assert_eq!(card.stamps_earned, 2);
        assert!(!card.can_earn_more);
    }

    #[test]
    fn campaigns_without_buy_quantity_have_no_card() {
        let mut campaign = campaign_fixture();
        campaign.buy_quantity = None;
        assert!(stamp_progress(&campaign, 10, 0).is_none());
    }
}
