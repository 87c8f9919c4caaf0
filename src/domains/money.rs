//! Fixed-point money in minor units (kuruş / cents)
//!
//! All monetary arithmetic in the service goes through [`Money`]. Values are
//! stored as `i64` minor units; the API speaks decimal amounts with at most two
//! fraction digits, e.g. `"129.90"` or `129.9`. Operators saturate; request
//! amounts are bounded by [`MAX_AMOUNT`] before any arithmetic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

pub const MINOR_PER_UNIT: i64 = 100;

/// Largest amount a single request may carry
pub const MAX_AMOUNT: Money = Money::from_units(1_000_000_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub const fn from_units(units: i64) -> Self {
        Money(units * MINOR_PER_UNIT)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whole currency units, rounded toward negative infinity
    pub fn whole_units(self) -> i64 {
        self.0.div_euclid(MINOR_PER_UNIT)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Negative or above [`MAX_AMOUNT`]
    pub fn is_out_of_range(self) -> bool {
        self.0 < 0 || self.0 > MAX_AMOUNT.0
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    pub fn times(self, quantity: i64) -> Money {
        Money(self.0.saturating_mul(quantity))
    }

    /// `percent`% of this amount, rounded down to the minor unit
    pub fn percent_of(self, percent: Decimal) -> Money {
        let value = Decimal::from(self.0) * percent / Decimal::from(100);
        Money(
            value
                .round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity)
                .to_i64()
                .unwrap_or(0),
        )
    }

    /// Integer division into `parts` equal shares, remainder dropped
    pub fn average_over(self, parts: i64) -> Money {
        if parts <= 0 {
            Money::ZERO
        } else {
            Money(self.0 / parts)
        }
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Convert a decimal amount; more than two fraction digits is rejected
    pub fn try_from_decimal(value: Decimal) -> Result<Money, MoneyError> {
        let scaled = value * Decimal::from(MINOR_PER_UNIT);
        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::TooPrecise(value));
        }
        scaled
            .to_i64()
            .map(Money)
            .ok_or(MoneyError::OutOfRange(value))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount {0} has more than two decimal places")]
    TooPrecise(Decimal),
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::try_from_decimal(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn percent_rounds_down_to_minor_unit() {
        // 20% of 33.33 = 6.666 -> 6.66
        assert_eq!(Money::from_minor(3333).percent_of(Decimal::from(20)), Money::from_minor(666));
        assert_eq!(Money::from_units(250).percent_of(Decimal::from(10)), Money::from_units(25));
    }

    #[test]
    fn decimal_conversion_rejects_sub_minor_precision() {
        let ok = Money::try_from_decimal(Decimal::from_str("129.90").unwrap()).unwrap();
        assert_eq!(ok.minor(), 12990);

        let err = Money::try_from_decimal(Decimal::from_str("1.005").unwrap());
        assert!(matches!(err, Err(MoneyError::TooPrecise(_))));
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("99.5").unwrap();
        let from_string: Money = serde_json::from_str("\"99.50\"").unwrap();
        assert_eq!(from_number, Money::from_minor(9950));
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<Money>("0.001").is_err());
    }

    #[test]
    fn serializes_as_decimal() {
        let json = serde_json::to_value(Money::from_minor(12990)).unwrap();
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, Money::from_minor(12990));
    }

    #[test]
    fn range_and_checked_sub_guard_extremes() {
        let huge = Money::from_minor(i64::MAX);
        assert!(huge.is_out_of_range());
        assert!(Money::from_minor(-1).is_out_of_range());
        assert!(!MAX_AMOUNT.is_out_of_range());
        assert_eq!(huge.checked_sub(Money::from_minor(-1)), None);
        assert_eq!(
            Money::from_units(10).checked_sub(Money::from_units(3)),
            Some(Money::from_units(7))
        );
    }

    #[test]
    fn whole_units_floor() {
        assert_eq!(Money::from_minor(9999).whole_units(), 99);
        assert_eq!(Money::from_minor(10000).whole_units(), 100);
        assert_eq!(Money::from_minor(-1).whole_units(), -1);
    }

    #[test]
    fn average_ignores_empty_sets() {
        assert_eq!(Money::from_units(300).average_over(0), Money::ZERO);
        assert_eq!(Money::from_units(300).average_over(4), Money::from_minor(7500));
    }
}
