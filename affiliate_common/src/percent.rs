use std::{
    fmt::Display,
    ops::{Add, Mul, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{
    helpers::{parse_fixed_point, DecimalParseError},
    op,
    UsdCents,
};

const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// A percentage held in basis points (1 bp = 0.01%), so `Percent::from_bps(1000)` is 10%.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Percent(i64);

op!(binary Percent, Add, add);
op!(binary Percent, Sub, sub);

impl Mul<i64> for Percent {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub const fn from_bps(bps: i64) -> Self {
        Self(bps)
    }

    pub const fn from_whole(percent: i64) -> Self {
        Self(percent * 100)
    }

    pub fn bps(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Clamps negative values to zero.
    pub fn floor_zero(self) -> Self {
        Self(self.0.max(0))
    }

    /// Applies this percentage to `amount`, rounding half away from zero to the nearest cent.
    pub fn of(&self, amount: UsdCents) -> UsdCents {
        let n = amount.value() as i128 * self.0 as i128;
        let d = BASIS_POINTS_PER_UNIT as i128;
        let q = n / d;
        let r = n % d;
        let rounded = if r.abs() * 2 >= d { q + n.signum() } else { q };
        #[allow(clippy::cast_possible_truncation)]
        UsdCents::from(rounded as i64)
    }
}

impl FromStr for Percent {
    type Err = DecimalParseError;

    /// Parses `"10"`, `"2.5"` or `"12.25%"` into basis points.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_suffix('%').unwrap_or(s);
        parse_fixed_point(s, 2).map(Self)
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}%", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn apply_to_amount() {
        let fee = UsdCents::from_dollars(50);
        assert_eq!(Percent::from_whole(10).of(fee), UsdCents::from(500));
        assert_eq!(Percent::from_whole(8).of(fee), UsdCents::from(400));
        assert_eq!(Percent::ZERO.of(fee), UsdCents::default());
        // 2.5% of $0.99 = 2.475c
        assert_eq!(Percent::from_bps(250).of(UsdCents::from(99)), UsdCents::from(2));
        // 5% of $0.50 = 2.5c, rounds half away from zero
        assert_eq!(Percent::from_whole(5).of(UsdCents::from(50)), UsdCents::from(3));
        assert_eq!(Percent::from_whole(5).of(UsdCents::from(-50)), UsdCents::from(-3));
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("10".parse::<Percent>().unwrap(), Percent::from_bps(1000));
        assert_eq!("2.5%".parse::<Percent>().unwrap(), Percent::from_bps(250));
        assert_eq!(Percent::from_bps(650).to_string(), "6.50%");
        assert_eq!((Percent::from_whole(2) - Percent::from_whole(5)).floor_zero(), Percent::ZERO);
    }
}
