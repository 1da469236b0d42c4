use std::{env, str::FromStr};

use affiliate_common::{Percent, UsdCents};
use chrono::Duration;
use log::*;
use thiserror::Error;

use crate::{
    affiliate_api::commission::CommissionSchedule,
    events::{EventHandlers, EventHooks},
    traits::{ActivationPolicy, PayoutRules},
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/affiliate.db";
pub const DEFAULT_ACTIVATION_FEE: UsdCents = UsdCents::from_dollars(50);
pub const DEFAULT_MIN_WITHDRAW: UsdCents = UsdCents::from_cents(450);
pub const DEFAULT_ACTIVATION_DAYS: i64 = 150;
pub const DEFAULT_PAYOUT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_CURRENCY_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_COMMISSION_BASE: Percent = Percent::from_whole(10);
pub const DEFAULT_COMMISSION_DECAY: Percent = Percent::from_whole(2);
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

/// Engine-wide settings, usually loaded from `AFF_*` environment variables.
///
/// Callers that use a `.env` file should load it (e.g. with `dotenvy`) before calling
/// [`EngineConfig::from_env_or_default`]. Values that fail to parse or fall outside their allowed range are logged
/// and replaced by the default.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub activation_fee: UsdCents,
    pub commission_base: Percent,
    pub commission_decay: Percent,
    pub min_withdraw: UsdCents,
    /// How long a confirmed activation lasts
    pub activation_days: i64,
    /// Only one payout request is allowed per member within this many days
    pub payout_window_days: i64,
    pub currency_cache_ttl_secs: u64,
    /// Base URL used to build referral links
    pub frontend_url: String,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            activation_fee: DEFAULT_ACTIVATION_FEE,
            commission_base: DEFAULT_COMMISSION_BASE,
            commission_decay: DEFAULT_COMMISSION_DECAY,
            min_withdraw: DEFAULT_MIN_WITHDRAW,
            activation_days: DEFAULT_ACTIVATION_DAYS,
            payout_window_days: DEFAULT_PAYOUT_WINDOW_DAYS,
            currency_cache_ttl_secs: DEFAULT_CURRENCY_CACHE_TTL_SECS,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let database_url = env::var("AFF_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ AFF_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            defaults.database_url.clone()
        });
        let frontend_url = env::var("AFF_FRONTEND_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| defaults.frontend_url.clone());
        let config = Self {
            database_url,
            activation_fee: env_or_default("AFF_ACTIVATION_FEE_USD", defaults.activation_fee, POSITIVE, |v| {
                v.is_positive()
            }),
            commission_base: env_or_default("AFF_COMMISSION_BASE_PERCENT", defaults.commission_base, PERCENT, |p| {
                *p > Percent::ZERO && *p <= Percent::from_whole(100)
            }),
            commission_decay: env_or_default("AFF_COMMISSION_DECAY_PERCENT", defaults.commission_decay, PERCENT, |p| {
                *p >= Percent::ZERO && *p <= Percent::from_whole(100)
            }),
            min_withdraw: env_or_default("AFF_MIN_WITHDRAW_USD", defaults.min_withdraw, POSITIVE, |v| v.is_positive()),
            activation_days: env_or_default("AFF_ACTIVATION_DAYS", defaults.activation_days, POSITIVE, |d| *d > 0),
            payout_window_days: env_or_default("AFF_PAYOUT_WINDOW_DAYS", defaults.payout_window_days, POSITIVE, |d| {
                *d > 0
            }),
            currency_cache_ttl_secs: env_or_default(
                "AFF_CURRENCY_CACHE_TTL",
                defaults.currency_cache_ttl_secs,
                POSITIVE,
                |t| *t > 0,
            ),
            frontend_url,
            event_buffer_size: env_or_default("AFF_EVENT_BUFFER_SIZE", defaults.event_buffer_size, POSITIVE, |n| {
                *n > 0
            }),
        };
        config.with_sound_schedule()
    }

    /// Checks the settings that depend on each other. Single values are range-checked when they are read.
    ///
    /// The decay may not exceed the base rate, so each level pays no more than the one above it, and one activation
    /// may never pay out more in commissions than its fee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commission_decay > self.commission_base {
            return Err(ConfigError::DecayExceedsBase { base: self.commission_base, decay: self.commission_decay });
        }
        let total = self.commission_schedule().total_payout();
        if total > self.activation_fee {
            return Err(ConfigError::WaterfallExceedsFee { total, fee: self.activation_fee });
        }
        Ok(())
    }

    fn with_sound_schedule(mut self) -> Self {
        if let Err(e) = self.validate() {
            warn!(
                "🪛️ {e} Using the default commission rates, {DEFAULT_COMMISSION_BASE} less {DEFAULT_COMMISSION_DECAY} \
                 per level, instead."
            );
            self.commission_base = DEFAULT_COMMISSION_BASE;
            self.commission_decay = DEFAULT_COMMISSION_DECAY;
        }
        self
    }

    pub fn commission_schedule(&self) -> CommissionSchedule {
        CommissionSchedule::new(self.activation_fee, self.commission_base, self.commission_decay)
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        ActivationPolicy {
            schedule: self.commission_schedule(),
            activation_window: Duration::days(self.activation_days),
        }
    }

    pub fn payout_rules(&self) -> PayoutRules {
        PayoutRules { minimum: self.min_withdraw, window: Duration::days(self.payout_window_days) }
    }

    pub fn rate_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.currency_cache_ttl_secs)
    }

    /// Builds the event handlers for `hooks` with the configured channel capacity.
    pub fn event_handlers(&self, hooks: EventHooks) -> EventHandlers {
        EventHandlers::new(self.event_buffer_size, hooks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("The commission decay ({decay}) is larger than the base rate ({base}).")]
    DecayExceedsBase { base: Percent, decay: Percent },
    #[error("The commission waterfall pays out {total}, which is more than the activation fee of {fee}.")]
    WaterfallExceedsFee { total: UsdCents, fee: UsdCents },
}

const POSITIVE: &str = "greater than zero";
const PERCENT: &str = "a percentage between 0 and 100 (the base rate must be above 0)";

fn env_or_default<T, F>(var: &str, default: T, rule: &str, valid: F) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
    F: Fn(&T) -> bool,
{
    let Ok(s) = env::var(var) else {
        return default;
    };
    match s.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            error!("🪛️ {value} is out of range for {var}. It must be {rule}. Using the default, {default}, instead.");
            default
        },
        Err(e) => {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        },
    }
}
