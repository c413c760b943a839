//! Money amounts in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a dollar value.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars.saturating_mul(100),
        }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Returns `bps / 10_000` of this amount, rounded half away from zero.
    ///
    /// `percent(10)` is `basis_points(1000)`.
    pub fn basis_points(&self, bps: u32) -> Money {
        let scaled = i128::from(self.cents) * i128::from(bps);
        let half = if scaled < 0 { -5_000 } else { 5_000 };
        let cents = (scaled + half) / 10_000;
        Money {
            cents: i64::try_from(cents).unwrap_or(if cents < 0 { i64::MIN } else { i64::MAX }),
        }
    }

    /// Returns `percent / 100` of this amount, rounded half away from zero.
    pub fn percent(&self, percent: u32) -> Money {
        self.basis_points(percent.saturating_mul(100))
    }

    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money {
            cents: self.cents.saturating_sub(other.cents).max(0),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_and_dollars() {
        let money = Money::from_cents(1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
        assert_eq!(Money::from_dollars(50).cents(), 5000);
    }

    #[test]
    fn display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::from_cents(2000).percent(10).cents(), 200);
        assert_eq!(Money::from_cents(1800).basis_points(1000).cents(), 180);
        // 15% of 3.33 = 0.4995 -> 0.50
        assert_eq!(Money::from_cents(333).percent(15).cents(), 50);
        // 10% of 0.04 = 0.004 -> 0.00
        assert_eq!(Money::from_cents(4).percent(10).cents(), 0);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_cents(100);
        assert_eq!(a.saturating_sub(Money::from_cents(30)).cents(), 70);
        assert_eq!(a.saturating_sub(Money::from_cents(300)), Money::zero());
    }

    #[test]
    fn arithmetic_saturates_instead_of_wrapping() {
        let big = Money::from_cents(i64::MAX / 2);
        assert_eq!(big.multiply(3).cents(), i64::MAX);
        assert_eq!((big + big + big).cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN) - Money::from_cents(1)).cents(), i64::MIN);
        assert_eq!(Money::from_cents(i64::MAX).basis_points(20_000).cents(), i64::MAX);
        let total: Money = [big, big, big].into_iter().sum();
        assert!(total.is_positive());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let big = Money::from_cents(i64::MAX / 2);
        assert_eq!(big.checked_multiply(3), None);
        assert_eq!(big.checked_multiply(2), Some(Money::from_cents(i64::MAX - 1)));
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(1).checked_add(Money::from_cents(2)),
            Some(Money::from_cents(3))
        );
    }

    #[test]
    fn sums_an_iterator() {
        let total: Money = [100, 250, 5].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 355);
    }
}
