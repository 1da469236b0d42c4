//! The commission waterfall schedule.
//!
//! An activation pays a decaying percentage of the activation fee to each ancestor on the *sponsor* chain:
//!
//! ```text
//! percent(L) = max(0, base - decay * (L - 1))
//! amount(L)  = fee * percent(L), rounded half away from zero to the cent
//! ```
//!
//! The walk stops at the first level whose percentage is zero, when the sponsor chain runs out, or after
//! `max_levels`, whichever comes first. This module only does the arithmetic. Walking the chain and writing the rows
//! happens in the storage backend, inside the same transaction that activates the member.
use affiliate_common::{Percent, UsdCents};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LEVELS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionLevel {
    pub level: u32,
    pub percent: Percent,
    pub amount: UsdCents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSchedule {
    pub activation_fee: UsdCents,
    pub base: Percent,
    pub decay: Percent,
    pub max_levels: u32,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self {
            activation_fee: UsdCents::from_dollars(50),
            base: Percent::from_whole(10),
            decay: Percent::from_whole(2),
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

impl CommissionSchedule {
    pub fn new(activation_fee: UsdCents, base: Percent, decay: Percent) -> Self {
        Self { activation_fee, base, decay, max_levels: DEFAULT_MAX_LEVELS }
    }

    /// Limits the waterfall depth. The depth can never exceed [`DEFAULT_MAX_LEVELS`].
    pub fn with_max_levels(mut self, max_levels: u32) -> Self {
        self.max_levels = max_levels.min(DEFAULT_MAX_LEVELS);
        self
    }

    /// The percentage paid at `level` (1-based). Never negative.
    pub fn percent_for_level(&self, level: u32) -> Percent {
        if level == 0 {
            return Percent::ZERO;
        }
        (self.base - self.decay * i64::from(level - 1)).floor_zero()
    }

    pub fn level(&self, level: u32) -> Option<CommissionLevel> {
        if level == 0 || level > self.max_levels.min(DEFAULT_MAX_LEVELS) {
            return None;
        }
        let percent = self.percent_for_level(level);
        if percent.is_zero() {
            return None;
        }
        Some(CommissionLevel { level, percent, amount: percent.of(self.activation_fee) })
    }

    /// Every level that pays out, assuming the sponsor chain is long enough.
    pub fn levels(&self) -> Vec<CommissionLevel> {
        (1..=DEFAULT_MAX_LEVELS).map_while(|l| self.level(l)).collect()
    }

    /// The most that one activation can pay out in commissions.
    pub fn total_payout(&self) -> UsdCents {
        self.levels().iter().map(|l| l.amount).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_waterfall() {
        let schedule = CommissionSchedule::default();
        let amounts = schedule.levels().into_iter().map(|l| l.amount.value()).collect::<Vec<_>>();
        assert_eq!(amounts, vec![500, 400, 300, 200, 100]);
        let percents = schedule.levels().into_iter().map(|l| l.percent).collect::<Vec<_>>();
        assert_eq!(percents[0], Percent::from_whole(10));
        assert_eq!(percents[3], Percent::from_whole(4));
        assert_eq!(schedule.total_payout(), UsdCents::from(1500));
    }

    #[test]
    fn level_six_pays_nothing() {
        let schedule = CommissionSchedule::default();
        assert_eq!(schedule.percent_for_level(6), Percent::ZERO);
        assert_eq!(schedule.percent_for_level(9), Percent::ZERO);
        assert!(schedule.level(6).is_none());
        assert!(schedule.level(0).is_none());
    }

    #[test]
    fn hard_cap_on_levels() {
        let schedule =
            CommissionSchedule::new(UsdCents::from_dollars(100), Percent::from_whole(12), Percent::from_whole(1));
        assert_eq!(schedule.levels().len(), 10);
        assert_eq!(schedule.levels().last().map(|l| l.percent), Some(Percent::from_whole(3)));
        assert_eq!(schedule.with_max_levels(3).levels().len(), 3);
        assert_eq!(schedule.with_max_levels(25).levels().len(), 10);
    }

    #[test]
    fn no_decay_is_capped_too() {
        let schedule = CommissionSchedule::new(UsdCents::from_dollars(10), Percent::from_whole(1), Percent::ZERO);
        assert_eq!(schedule.levels().len(), DEFAULT_MAX_LEVELS as usize);
        assert!(schedule.levels().iter().all(|l| l.amount == UsdCents::from(10)));
    }

    #[test]
    fn fractional_amounts_round_to_the_cent() {
        // 3.33% of $12.50 = 41.625c
        let schedule = CommissionSchedule::new(UsdCents::from(1250), Percent::from_bps(333), Percent::from_bps(100));
        assert_eq!(schedule.level(1).map(|l| l.amount), Some(UsdCents::from(42)));
        // 2.33% of $12.50 = 29.125c
        assert_eq!(schedule.level(2).map(|l| l.amount), Some(UsdCents::from(29)));
    }
}
