use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeRateError {
    #[error("The rate feed is unavailable: {0}")]
    FeedUnavailable(String),
    #[error("The requested exchange rate does not exist: {0}")]
    RateDoesNotExist(String),
    #[error("Invalid exchange rate for {currency}: {rate}")]
    InvalidRate { currency: String, rate: f64 },
}

impl ExchangeRateError {
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeRateError::FeedUnavailable(_) => "RATE_FEED_UNAVAILABLE",
            ExchangeRateError::RateDoesNotExist(_) => "RATE_NOT_FOUND",
            ExchangeRateError::InvalidRate { .. } => "INVALID_RATE",
        }
    }
}

/// An external source of USD exchange rates.
///
/// Implementations return the number of units of each currency that one US dollar buys, keyed by upper-case ISO-4217
/// code. The engine never calls this directly during a domain operation; it goes through a
/// [`crate::RateCache`], which owns the refresh policy.
#[allow(async_fn_in_trait)]
pub trait RateFeed {
    async fn fetch_rates(&self) -> Result<HashMap<String, f64>, ExchangeRateError>;
}
