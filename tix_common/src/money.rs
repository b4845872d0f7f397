use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const TICKET_CURRENCY_CODE: &str = "IDR";
pub const TICKET_CURRENCY_CODE_LOWER: &str = "idr";

//--------------------------------------       Money       -----------------------------------------------------------
/// An amount of money in minor currency units (whole rupiah). Ticket prices, discounts and point
/// balances all share this representation, so the discount arithmetic never mixes units.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rp{}", self.0)
    }
}

impl Money {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Clamps negative amounts to zero. Discount stacking subtracts in a fixed order and the
    /// payable total is floored rather than allowed to go negative.
    pub fn floored(self) -> Self {
        Self(self.0.max(0))
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_on_amounts() {
        let a = Money::from(100_000);
        let b = Money::from(30_000);
        assert_eq!(a - b, Money::from(70_000));
        assert_eq!(a + b, Money::from(130_000));
        assert_eq!(-b, Money::from(-30_000));
        assert_eq!(Money::from(25_000) * 4, a);
    }

    #[test]
    fn floor_clamps_negative_amounts() {
        assert_eq!((Money::from(10) - Money::from(25)).floored(), Money::zero());
        assert_eq!(Money::from(15).floored(), Money::from(15));
    }

    #[test]
    fn sums_over_ledger_style_entries() {
        let entries = [Money::from(10_000), Money::from(-4_000), Money::from(500)];
        let total: Money = entries.into_iter().sum();
        assert_eq!(total, Money::from(6_500));
    }
}
