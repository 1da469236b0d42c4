use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{
    helpers::{parse_fixed_point, DecimalParseError},
    op,
};

pub const USD_CURRENCY_CODE: &str = "USD";

//--------------------------------------     UsdCents       ---------------------------------------------------------
/// A US dollar amount held as an integer number of cents. All ledger arithmetic happens in this type so that sums of
/// commissions and payouts never accumulate floating point error.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct UsdCents(i64);

op!(binary UsdCents, Add, add);
op!(binary UsdCents, Sub, sub);
op!(inplace UsdCents, AddAssign, add_assign);
op!(inplace UsdCents, SubAssign, sub_assign);
op!(unary UsdCents, Neg, neg);

impl Mul<i64> for UsdCents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for UsdCents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a UsdCents> for UsdCents {
    fn sum<I: Iterator<Item = &'a UsdCents>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl From<i64> for UsdCents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for UsdCents {
    type Err = DecimalParseError;

    /// Accepts plain decimal dollar strings, with an optional leading `$`, e.g. `"4.5"`, `"$50"`, `"12.05"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('$').unwrap_or(s);
        parse_fixed_point(s, 2).map(Self)
    }
}

impl Display for UsdCents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl UsdCents {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// A floating point rendering in dollars. Only use this for display projections, never for ledger arithmetic.
    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(UsdCents::from(500).to_string(), "$5.00");
        assert_eq!(UsdCents::from(5).to_string(), "$0.05");
        assert_eq!(UsdCents::from(-1205).to_string(), "-$12.05");
        assert_eq!(UsdCents::from_dollars(50).to_string(), "$50.00");
    }

    #[test]
    fn parse() {
        assert_eq!("4.5".parse::<UsdCents>().unwrap(), UsdCents::from(450));
        assert_eq!("$50".parse::<UsdCents>().unwrap(), UsdCents::from(5000));
        assert!("4.501".parse::<UsdCents>().is_err());
    }

    #[test]
    fn arithmetic() {
        let total: UsdCents = [500, 400, 300].into_iter().map(UsdCents::from).sum();
        assert_eq!(total, UsdCents::from(1200));
        let mut balance = total - UsdCents::from(500);
        assert_eq!(balance, UsdCents::from(700));
        balance -= UsdCents::from(700);
        assert_eq!(balance, UsdCents::default());
        assert_eq!(-UsdCents::from(3), UsdCents::from(-3));
        assert_eq!(UsdCents::from(3) * 4, UsdCents::from(12));
    }
}
