use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot parse '{0}' as a fixed-point decimal value")]
pub struct DecimalParseError(pub String);

/// Parses a decimal string such as `"4.5"` or `"-12.05"` into an integer scaled by `10^places`.
///
/// More fractional digits than `places` is an error rather than a silent truncation, so `"4.555"` cannot be read as
/// cents.
pub fn parse_fixed_point(value: &str, places: u32) -> Result<i64, DecimalParseError> {
    let err = || DecimalParseError(value.to_string());
    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    if frac.len() > places as usize || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(err());
    }
    let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| err())? };
    if whole < 0 {
        return Err(err());
    }
    let scale = 10i64.pow(places);
    let frac_value = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = places as usize);
        padded.parse::<i64>().map_err(|_| err())?
    };
    let value = whole.checked_mul(scale).and_then(|w| w.checked_add(frac_value)).ok_or_else(err)?;
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_point() {
        assert_eq!(parse_fixed_point("4.5", 2), Ok(450));
        assert_eq!(parse_fixed_point("50", 2), Ok(5000));
        assert_eq!(parse_fixed_point("-12.05", 2), Ok(-1205));
        assert_eq!(parse_fixed_point(".75", 2), Ok(75));
        assert!(parse_fixed_point("4.555", 2).is_err());
        assert!(parse_fixed_point("abc", 2).is_err());
        assert!(parse_fixed_point("", 2).is_err());
        assert!(parse_fixed_point("1.-5", 2).is_err());
    }
}
