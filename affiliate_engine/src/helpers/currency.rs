use affiliate_common::USD_CURRENCY_CODE;

// ISO 3166-1 alpha-2 to ISO 4217
const COUNTRY_CURRENCIES: &[(&str, &str)] = &[
    // Africa
    ("KE", "KES"),
    ("UG", "UGX"),
    ("TZ", "TZS"),
    ("RW", "RWF"),
    ("BI", "BIF"),
    ("ET", "ETB"),
    ("NG", "NGN"),
    ("GH", "GHS"),
    ("ZA", "ZAR"),
    ("ZM", "ZMW"),
    ("MW", "MWK"),
    ("BW", "BWP"),
    ("CM", "XAF"),
    ("SN", "XOF"),
    ("CI", "XOF"),
    ("ML", "XOF"),
    ("NE", "XOF"),
    ("BF", "XOF"),
    ("TG", "XOF"),
    ("BJ", "XOF"),
    ("GN", "GNF"),
    ("LR", "LRD"),
    ("SL", "SLL"),
    // Europe
    ("GB", "GBP"),
    ("IE", "EUR"),
    ("FR", "EUR"),
    ("DE", "EUR"),
    ("IT", "EUR"),
    ("ES", "EUR"),
    ("NL", "EUR"),
    ("BE", "EUR"),
    ("PT", "EUR"),
    ("FI", "EUR"),
    ("AT", "EUR"),
    ("GR", "EUR"),
    ("PL", "PLN"),
    ("RO", "RON"),
    // Americas
    ("US", "USD"),
    ("CA", "CAD"),
    ("MX", "MXN"),
    ("BR", "BRL"),
    ("AR", "ARS"),
    // Asia
    ("AE", "AED"),
    ("SA", "SAR"),
    ("IN", "INR"),
    ("PK", "PKR"),
    ("CN", "CNY"),
    ("JP", "JPY"),
    ("KR", "KRW"),
];

// Upper-cased country names with spaces removed
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("KENYA", "KE"),
    ("UGANDA", "UG"),
    ("TANZANIA", "TZ"),
    ("RWANDA", "RW"),
    ("BURUNDI", "BI"),
    ("ETHIOPIA", "ET"),
    ("NIGERIA", "NG"),
    ("GHANA", "GH"),
    ("SOUTHAFRICA", "ZA"),
    ("UNITEDSTATES", "US"),
    ("USA", "US"),
    ("UNITEDKINGDOM", "GB"),
    ("UK", "GB"),
    ("GERMANY", "DE"),
    ("FRANCE", "FR"),
    ("ITALY", "IT"),
    ("SPAIN", "ES"),
    ("UAE", "AE"),
    ("SAUDIARABIA", "SA"),
    ("INDIA", "IN"),
    ("PAKISTAN", "PK"),
    ("CHINA", "CN"),
    ("JAPAN", "JP"),
    ("KOREA", "KR"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Guesses the local currency from a country, given either as a two-letter code (`"KE"`) or a common English name
/// (`"South Africa"`). Returns `None` for anything unrecognised.
pub fn detect_currency_from_country(country: &str) -> Option<&'static str> {
    let code = country.trim().to_ascii_uppercase();
    // Aliases first: "UK" is two letters but not an ISO code
    let name = code.replace(' ', "");
    if let Some(alpha2) = lookup(COUNTRY_ALIASES, &name) {
        return lookup(COUNTRY_CURRENCIES, alpha2);
    }
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        return lookup(COUNTRY_CURRENCIES, &code);
    }
    None
}

/// Settles on the currency code to store for a member.
///
/// An explicit three-letter alphabetic code wins. Otherwise the currency is detected from the country, and if that
/// fails too, USD is used.
pub fn normalize_currency_code(currency: Option<&str>, country: Option<&str>) -> String {
    if let Some(code) = currency.map(|c| c.trim().to_ascii_uppercase()) {
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            return code;
        }
    }
    country.and_then(detect_currency_from_country).unwrap_or(USD_CURRENCY_CODE).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect_from_codes_and_names() {
        assert_eq!(detect_currency_from_country("ke"), Some("KES"));
        assert_eq!(detect_currency_from_country(" NG "), Some("NGN"));
        assert_eq!(detect_currency_from_country("South Africa"), Some("ZAR"));
        assert_eq!(detect_currency_from_country("uk"), Some("GBP"));
        assert_eq!(detect_currency_from_country(" U K "), Some("GBP"));
        assert_eq!(detect_currency_from_country("gb"), Some("GBP"));
        assert_eq!(detect_currency_from_country("Usa"), Some("USD"));
        assert_eq!(detect_currency_from_country("Atlantis"), None);
        assert_eq!(detect_currency_from_country("ZZ"), None);
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_currency_code(Some("eur"), Some("KE")), "EUR");
        assert_eq!(normalize_currency_code(Some("euro"), Some("KE")), "KES");
        assert_eq!(normalize_currency_code(Some("E1"), None), "USD");
        assert_eq!(normalize_currency_code(None, Some("Japan")), "JPY");
        assert_eq!(normalize_currency_code(Some("??"), Some("UK")), "GBP");
        assert_eq!(normalize_currency_code(None, None), "USD");
    }
}
