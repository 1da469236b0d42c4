mod percent;
mod usd;

pub mod helpers;
pub mod op;

pub use helpers::DecimalParseError;
pub use percent::Percent;
pub use usd::{UsdCents, USD_CURRENCY_CODE};
