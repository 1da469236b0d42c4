mod currency;
mod referral_code;

pub use currency::{detect_currency_from_country, normalize_currency_code};
pub use referral_code::generate_referral_code;
