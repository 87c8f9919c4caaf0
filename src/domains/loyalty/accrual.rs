use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domains::money::Money;

/// One point per ten currency units of the final (post-discount) amount
pub const SPEND_PER_POINT: Money = Money::from_units(10);

/// Base points before any multiplier
pub fn base_points(final_amount: Money) -> i64 {
    if final_amount.is_negative() {
        return 0;
    }
    final_amount.minor() / SPEND_PER_POINT.minor()
}

/// Points earned for a completed sale, with the tier multiplier applied when
/// the customer has a tier. The multiplied value is floored.
pub fn points_for_amount(final_amount: Money, multiplier: Option<Decimal>) -> i64 {
    let base = base_points(final_amount);
    match multiplier {
        None => base,
        Some(multiplier) => floor_points(Decimal::from(base) * multiplier),
    }
}

/// Extra points granted by a LOYALTY_POINTS campaign with multiplier `m`:
/// `floor(base * (m - 1))`, never negative.
pub fn campaign_bonus_points(base: i64, campaign_multiplier: Decimal) -> i64 {
    if campaign_multiplier <= Decimal::ONE {
        return 0;
    }
    floor_points(Decimal::from(base) * (campaign_multiplier - Decimal::ONE))
}

/// Balance change applied to the customer for one sale
pub fn net_delta(earned: i64, used: i64) -> i64 {
    earned - used
}

fn floor_points(value: Decimal) -> i64 {
    value.floor().to_i64().unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ninety_nine_earns_nine() {
        assert_eq!(points_for_amount(Money::from_units(99), None), 9);
    }

    #[test]
    fn hundred_with_double_multiplier_earns_twenty() {
        assert_eq!(points_for_amount(Money::from_units(100), Some(Decimal::from(2))), 20);
    }

    #[test]
    fn fractional_multiplier_is_floored() {
        // 57 points * 1.25 = 71.25
        let multiplier = Decimal::from_str("1.25").unwrap();
        assert_eq!(points_for_amount(Money::from_minor(57_999), Some(multiplier)), 71);
    }

    #[test]
    fn cents_below_threshold_do_not_count() {
        assert_eq!(points_for_amount(Money::from_minor(999), None), 0);
        assert_eq!(points_for_amount(Money::from_minor(1000), None), 1);
        assert_eq!(points_for_amount(Money::from_minor(-5000), None), 0);
    }

    #[test]
    fn campaign_bonus_only_above_one() {
        assert_eq!(campaign_bonus_points(10, Decimal::from(3)), 20);
        assert_eq!(campaign_bonus_points(10, Decimal::ONE), 0);
        assert_eq!(campaign_bonus_points(7, Decimal::from_str("1.5").unwrap()), 3);
    }

    #[test]
    fn net_delta_subtracts_used() {
        assert_eq!(net_delta(12, 50), -38);
    }
}
