use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Money type with 8 decimal places of precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.round_dp(8))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(Decimal::from_str_exact(s.trim())?.round_dp(8)))
    }

    /// create from integer amount (dollars, rupiah, etc)
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from minor amount (cents etc)
    pub fn from_minor(amount: i64, scale: u32) -> Self {
        Money(Decimal::new(amount, scale).round_dp(8))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// round to specified decimal places
    pub fn round_dp(&self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `None` when the sum does not fit a `Decimal`
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(|d| Money(d.round_dp(8)))
    }

    /// calculate percentage (e.g., 5% of $100)
    pub fn percentage(&self, percent: Decimal) -> Self {
        Money((self.0 / Decimal::ONE_HUNDRED * percent).round_dp(8))
    }

    /// [`Money::percentage`] that returns `None` on overflow
    pub fn checked_percentage(&self, percent: Decimal) -> Option<Self> {
        (self.0 / Decimal::ONE_HUNDRED)
            .checked_mul(percent)
            .map(|d| Money(d.round_dp(8)))
    }

    /// whether the amount can be expressed in whole minor units of `dp` places
    pub fn fits_minor_unit(&self, dp: u32) -> bool {
        self.0.round_dp(dp) == self.0
    }

    /// Split into `parts` shares at the granularity of `dp` decimal places.
    ///
    /// Each share gets the floor of the even split; the leftover minor units
    /// go one each to the first shares, so the shares always sum back to
    /// `self`. Returns `None` when `parts` is zero, the amount is negative,
    /// it is finer than the requested granularity or its count of minor units
    /// does not fit a `Decimal`.
    pub fn split_even(&self, parts: u32, dp: u32) -> Option<Vec<Money>> {
        if parts == 0 || self.is_negative() || !self.fits_minor_unit(dp) {
            return None;
        }

        let unit = Decimal::new(1, dp);
        let minor_units = self.0.checked_div(unit)?;
        let count = Decimal::from(parts);
        let base = (minor_units / count).floor();
        let leftover = (minor_units - base * count).to_u32()?;

        let shares = (0..parts)
            .map(|i| {
                let extra = if i < leftover { Decimal::ONE } else { Decimal::ZERO };
                Money(((base + extra) * unit).normalize())
            })
            .collect();

        Some(shares)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money((self.0 + other.0).round_dp(8))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = (self.0 + other.0).round_dp(8);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money((self.0 - other.0).round_dp(8))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = (self.0 - other.0).round_dp(8);
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money((self.0 * other).round_dp(8))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money((self.0 / other).round_dp(8))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

/// Interest rate per repayment period, stored as a fraction (0.10 for 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g., 0.05 for 5%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from whole percentage (e.g., 5 for 5%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(Decimal::from(p) / Decimal::ONE_HUNDRED)
    }

    /// create from a decimal percentage (e.g., 2.5 for 2.5%)
    pub fn from_percent_decimal(p: Decimal) -> Self {
        Rate(p / Decimal::ONE_HUNDRED)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        (self.0 * Decimal::ONE_HUNDRED).normalize()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision() {
        let m = Money::from_str_exact("100.123456789").unwrap();
        assert_eq!(m.to_string(), "100.12345679"); // rounded to 8 places
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::from_minor(12_345, 2), Money::from_decimal(dec!(123.45)));
        assert!(Money::from_decimal(dec!(123.45)).fits_minor_unit(2));
        assert!(!Money::from_decimal(dec!(123.45)).fits_minor_unit(0));
    }

    #[test]
    fn test_percentage() {
        let principal = Money::from_major(250);
        assert_eq!(principal.percentage(dec!(10)), Money::from_major(25));
        assert_eq!(
            Money::from_major(333).percentage(dec!(7.5)),
            Money::from_decimal(dec!(24.975))
        );
    }

    #[test]
    fn test_split_even_whole_units() {
        let shares = Money::from_major(1000).split_even(3, 0).unwrap();
        assert_eq!(
            shares,
            vec![Money::from_major(334), Money::from_major(333), Money::from_major(333)]
        );
        assert_eq!(shares.iter().sum::<Money>(), Money::from_major(1000));
    }

    #[test]
    fn test_split_even_cents() {
        let shares = Money::from_major(1000).split_even(3, 2).unwrap();
        assert_eq!(shares[0], Money::from_decimal(dec!(333.34)));
        assert_eq!(shares[1], Money::from_decimal(dec!(333.33)));
        assert_eq!(shares[2], Money::from_decimal(dec!(333.33)));
    }

    #[test]
    fn test_split_even_rejects_bad_input() {
        assert!(Money::from_major(100).split_even(0, 0).is_none());
        assert!(Money::from_major(-100).split_even(2, 0).is_none());
        assert!(Money::from_decimal(dec!(100.5)).split_even(2, 0).is_none());
    }

    #[test]
    fn test_checked_arithmetic_overflow() {
        let max = Money::from_decimal(Decimal::MAX);
        assert_eq!(max.checked_add(Money::ZERO), Some(max));
        assert!(max.checked_add(Money::ONE).is_none());
        assert!(max.checked_percentage(dec!(1000)).is_none());
        assert_eq!(
            Money::from_major(250).checked_percentage(dec!(10)),
            Some(Money::from_major(25))
        );
        // the minor-unit count itself overflows
        assert!(max.split_even(2, 2).is_none());
    }

    #[test]
    fn test_rate_percentages() {
        let rate = Rate::from_percent_decimal(dec!(2.5));
        assert_eq!(rate.as_decimal(), dec!(0.025));
        assert_eq!(rate.as_percentage(), dec!(2.5));
        assert_eq!(Rate::from_percentage(10).to_string(), "10%");
        assert_eq!(Rate::from_percent_decimal(dec!(5)), Rate::from_percentage(5));
    }
}
