//! Monetary amounts in euro cents.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Amount of money expressed in euro cents.
///
/// Prices, deposits and caps all use this type so arithmetic stays exact.
/// Display renders whole euros without decimals (`"200"`) and other
/// amounts with a French decimal comma (`"12,50"`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Build an amount from cents.
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Build an amount from whole euros.
    pub const fn euros(euros: i64) -> Self {
        Self(euros * 100)
    }

    /// Raw number of cents.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// True when the amount is exactly zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// True when the amount is negative.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply by a booking quantity.
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0 * quantity as i64)
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Cents {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        self.times(rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let absolute = self.0.unsigned_abs();
        let euros = absolute.div_euclid(100);
        let cents = absolute.rem_euclid(100);
        if cents == 0 {
            write!(f, "{sign}{euros}")
        } else {
            write!(f, "{sign}{euros},{cents:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Cents::euros(200), "200")]
    #[case(Cents::new(1250), "12,50")]
    #[case(Cents::new(5), "0,05")]
    #[case(Cents::new(-300), "-3")]
    fn displays_in_french_notation(#[case] amount: Cents, #[case] expected: &str) {
        assert_eq!(amount.to_string(), expected);
    }

    #[rstest]
    fn sums_and_multiplies() {
        let total: Cents = [Cents::new(150), Cents::new(250)].into_iter().sum();
        assert_eq!(total * 2, Cents::euros(8));
    }
}
