//! Phone number helpers shared by the WhatsApp providers

/// Strip everything that is not an ASCII digit.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strip the `@s.whatsapp.net` / `@c.us` suffix from a WhatsApp JID and keep digits.
pub fn normalize_jid(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or(jid);
    // Multi-device JIDs carry a `:device` suffix before the `@`.
    let user = user.split(':').next().unwrap_or(user);
    digits_only(user)
}

/// Spellings a contact's phone may have been stored with.
///
/// Contacts are typed in by the professional, so the same number can show up as
/// `353871234567`, `+353871234567` or with spaces and dashes. Lookups try the
/// digits-only and `+`-prefixed forms; punctuation is compared after stripping.
pub fn phone_variants(phone: &str) -> Vec<String> {
    let digits = digits_only(phone);
    if digits.is_empty() {
        return Vec::new();
    }
    vec![digits.clone(), format!("+{}", digits)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("+353 (87) 123-4567"), "353871234567");
        assert_eq!(digits_only(""), "");
    }

    #[test]
    fn test_normalize_jid() {
        assert_eq!(normalize_jid("353871234567@s.whatsapp.net"), "353871234567");
        assert_eq!(normalize_jid("5511999998888:12@s.whatsapp.net"), "5511999998888");
        assert_eq!(normalize_jid("353871234567"), "353871234567");
    }

    #[test]
    fn test_phone_variants() {
        assert_eq!(
            phone_variants("+353 87 123 4567"),
            vec!["353871234567".to_string(), "+353871234567".to_string()]
        );
        assert!(phone_variants("abc").is_empty());
    }
}
