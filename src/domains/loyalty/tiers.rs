use serde::Serialize;

use crate::domains::customers::models::Tier;

/// Highest tier whose threshold the balance has reached
pub fn resolve_tier(tiers: &[Tier], points: i64) -> Option<&Tier> {
    tiers
        .iter()
        .filter(|tier| tier.min_points <= points)
        .max_by_key(|tier| (tier.min_points, tier.level))
}

#[derive(Debug, Clone, Serialize)]
pub struct TierProgress {
    pub next_tier: Tier,
    pub points_needed: i64,
}

/// Cheapest tier above the current balance and how far away it is
pub fn next_tier_progress(tiers: &[Tier], points: i64) -> Option<TierProgress> {
    tiers
        .iter()
        .filter(|tier| tier.min_points > points)
        .min_by_key(|tier| (tier.min_points, tier.level))
        .map(|tier| TierProgress {
            next_tier: tier.clone(),
            points_needed: tier.min_points - points,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn tier(name: &str, level: i32, min_points: i64) -> Tier {
        Tier {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::nil(),
            name: name.to_string(),
            display_name: name.to_string(),
            level,
            min_points,
            point_multiplier: Decimal::ONE,
            discount_percent: Decimal::ZERO,
            color: None,
        }
    }

    fn ladder() -> Vec<Tier> {
        vec![tier("gold", 3, 1000), tier("bronze", 1, 0), tier("silver", 2, 250)]
    }

    #[test]
    fn resolves_highest_reached_threshold() {
        let tiers = ladder();
        assert_eq!(resolve_tier(&tiers, 0).unwrap().name, "bronze");
        assert_eq!(resolve_tier(&tiers, 249).unwrap().name, "bronze");
        assert_eq!(resolve_tier(&tiers, 250).unwrap().name, "silver");
        assert_eq!(resolve_tier(&tiers, 5000).unwrap().name, "gold");
        assert!(resolve_tier(&tiers[..1], 10).is_none());
    }

    #[test]
    fn next_tier_reports_missing_points() {
        let tiers = ladder();
        let progress = next_tier_progress(&tiers, 100).unwrap();
        assert_eq!(progress.next_tier.name, "silver");
        assert_eq!(progress.points_needed, 150);
        assert!(next_tier_progress(&tiers, 1000).is_none());
    }
}
