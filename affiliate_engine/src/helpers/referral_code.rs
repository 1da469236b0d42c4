use rand::Rng;

/// Creates a shareable referral code of the form `<first-name>-<8 hex digits>`, e.g. `alice-0f3a9c1e`.
///
/// The name part is the lowercased first word of `name`, with anything other than ASCII letters and digits removed.
/// If nothing is left, `user` is used instead. Uniqueness is enforced by the database, so callers retry on a clash.
pub fn generate_referral_code(name: &str) -> String {
    let base = name
        .split_whitespace()
        .next()
        .map(|w| w.chars().filter(char::is_ascii_alphanumeric).collect::<String>().to_ascii_lowercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "user".to_string());
    let suffix: u32 = rand::thread_rng().gen();
    format!("{base}-{suffix:08x}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_shape() {
        let code = generate_referral_code("Alice Wonderland");
        let (name, suffix) = code.split_once('-').unwrap();
        assert_eq!(name, "alice");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_names() {
        assert!(generate_referral_code("").starts_with("user-"));
        assert!(generate_referral_code("   ").starts_with("user-"));
        assert!(generate_referral_code("@@@ Bob").starts_with("user-"));
        assert!(generate_referral_code("O'Brien").starts_with("obrien-"));
    }

    #[test]
    fn codes_differ() {
        let a = generate_referral_code("carol");
        let b = generate_referral_code("carol");
        assert_ne!(a, b);
    }
}
