//! A TTL cache in front of an external [`RateFeed`].
//!
//! Local currency amounts are display-only projections of USD ledger values, so a missing or stale rate is never an
//! error for the caller. When a refresh fails, the last good set of rates is kept and lookups stop asking the feed
//! until the retry delay has passed.
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use affiliate_common::{UsdCents, USD_CURRENCY_CODE};
use log::*;
use tokio::sync::RwLock;

use crate::traits::{ExchangeRateError, RateFeed};

pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct RateState {
    rates: HashMap<String, f64>,
    fetched_at: Option<Instant>,
    /// Set after a failed refresh. Lookups do not call the feed before this time.
    retry_after: Option<Instant>,
}

pub struct RateCache<F> {
    feed: F,
    ttl: Duration,
    retry_delay: Duration,
    state: Arc<RwLock<RateState>>,
}

impl<F> Debug for RateCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RateCache (ttl: {:?})", self.ttl)
    }
}

impl<F: Clone> Clone for RateCache<F> {
    fn clone(&self) -> Self {
        Self { feed: self.feed.clone(), ttl: self.ttl, retry_delay: self.retry_delay, state: Arc::clone(&self.state) }
    }
}

impl<F> RateCache<F>
where F: RateFeed
{
    pub fn new(feed: F, ttl: Duration) -> Self {
        Self { feed, ttl, retry_delay: DEFAULT_RETRY_DELAY, state: Arc::new(RwLock::new(RateState::default())) }
    }

    /// How long lookups wait before asking the feed again after a failed refresh.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn is_stale(&self) -> bool {
        let state = self.state.read().await;
        state.fetched_at.map(|t| t.elapsed() >= self.ttl).unwrap_or(true)
    }

    async fn is_backing_off(&self) -> bool {
        self.state.read().await.retry_after.is_some_and(|t| Instant::now() < t)
    }

    /// Fetches a fresh set of rates from the feed, regardless of the cache age. Returns the number of usable rates.
    ///
    /// Non-finite, zero and negative rates are discarded. On error the cached rates are left untouched, and lookups
    /// back off for the retry delay.
    pub async fn refresh(&self) -> Result<usize, ExchangeRateError> {
        let fetched = match self.feed.fetch_rates().await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.state.write().await.retry_after = Some(Instant::now() + self.retry_delay);
                return Err(e);
            },
        };
        let mut rates = HashMap::with_capacity(fetched.len() + 1);
        for (code, rate) in fetched {
            let code = code.trim().to_ascii_uppercase();
            if !rate.is_finite() || rate <= 0.0 {
                warn!("💱️ Ignoring invalid rate for {code}: {rate}");
                continue;
            }
            rates.insert(code, rate);
        }
        rates.insert(USD_CURRENCY_CODE.to_string(), 1.0);
        let count = rates.len();
        let mut state = self.state.write().await;
        state.rates = rates;
        state.fetched_at = Some(Instant::now());
        state.retry_after = None;
        debug!("💱️ Exchange rates refreshed. {count} currencies available");
        Ok(count)
    }

    /// The number of `currency` units that one US dollar buys, refreshing the cache first if it is stale.
    ///
    /// USD is always 1.0. Returns `None` when the currency has no known rate.
    pub async fn current_rate(&self, currency: &str) -> Option<f64> {
        let code = currency.trim().to_ascii_uppercase();
        if code == USD_CURRENCY_CODE {
            return Some(1.0);
        }
        if self.is_stale().await && !self.is_backing_off().await {
            if let Err(e) = self.refresh().await {
                warn!("💱️ Could not refresh exchange rates, using the cached values for {:?}. {e}", self.retry_delay);
            }
        }
        self.state.read().await.rates.get(&code).copied()
    }

    /// Converts a USD amount to `currency`, rounded to 2 decimal places. For display only.
    pub async fn usd_to_local(&self, amount: UsdCents, currency: &str) -> Option<f64> {
        let rate = self.current_rate(currency).await?;
        Some((amount.as_dollars() * rate * 100.0).round() / 100.0)
    }

    /// A copy of the rates currently held, without triggering a refresh.
    pub async fn cached_rates(&self) -> HashMap<String, f64> {
        self.state.read().await.rates.clone()
    }
}

/// A [`RateFeed`] serving a fixed table. Useful for operators pinning rates, and for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedRateFeed {
    rates: HashMap<String, f64>,
}

impl FixedRateFeed {
    pub fn new<I, S>(rates: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self { rates: rates.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

impl RateFeed for FixedRateFeed {
    async fn fetch_rates(&self) -> Result<HashMap<String, f64>, ExchangeRateError> {
        Ok(self.rates.clone())
    }
}
