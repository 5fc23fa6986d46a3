use regex::Regex;
use std::sync::LazyLock;
use validator::ValidationError;

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0?9[0-9]{9}$").expect("mobile pattern compiles"));

pub const CODE_LENGTH: usize = 4;
pub const MIN_FULL_NAME_CHARS: usize = 2;

/// Iranian mobile number, with or without the leading zero: `09xxxxxxxxx` or `9xxxxxxxxx`.
pub fn is_valid_mobile(phone: &str) -> bool {
    MOBILE_RE.is_match(phone.trim())
}

/// Canonical local form used as the store identity: trimmed, with a leading `0`.
pub fn normalize_mobile(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.starts_with('0') {
        trimmed.to_string()
    } else {
        format!("0{}", trimmed)
    }
}

pub fn is_valid_full_name(full_name: &str) -> bool {
    full_name.trim().chars().count() >= MIN_FULL_NAME_CHARS
}

/// Exactly four ASCII digits.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Masks the middle of a phone number for logs: `0912****789`.
pub fn mask_mobile(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 7 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 7), tail)
}

pub fn validate_mobile(phone: &str) -> Result<(), ValidationError> {
    if is_valid_mobile(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_mobile"))
    }
}

pub fn validate_full_name(full_name: &str) -> Result<(), ValidationError> {
    if is_valid_full_name(full_name) {
        Ok(())
    } else {
        Err(ValidationError::new("full_name_too_short"))
    }
}

pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if is_valid_code(code) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_mobiles_with_and_without_leading_zero() {
        assert!(is_valid_mobile("09123456789"));
        assert!(is_valid_mobile("9123456789"));
        assert!(is_valid_mobile(" 09123456789 "));
    }

    #[test]
    fn rejects_other_shapes() {
        for phone in ["", "0912345678", "091234567890", "08123456789", "+989123456789", "0912345678a", "۰۹۱۲۳۴۵۶۷۸۹"] {
            assert!(!is_valid_mobile(phone), "{phone} should be rejected");
        }
    }

    #[test]
    fn normalization_adds_missing_zero() {
        assert_eq!(normalize_mobile("9123456789"), "09123456789");
        assert_eq!(normalize_mobile("09123456789"), "09123456789");
        assert_eq!(normalize_mobile(" 9123456789\n"), "09123456789");
    }

    #[test]
    fn full_name_needs_two_characters() {
        assert!(is_valid_full_name("Ali"));
        assert!(is_valid_full_name("علی"));
        assert!(!is_valid_full_name("A"));
        assert!(!is_valid_full_name("   "));
    }

    #[test]
    fn code_must_be_four_ascii_digits() {
        assert!(is_valid_code("1234"));
        assert!(is_valid_code("0000"));
        assert!(!is_valid_code("123"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("12a4"));
        assert!(!is_valid_code("۱۲۳۴"));
    }

    #[test]
    fn masking_keeps_prefix_and_suffix() {
        assert_eq!(mask_mobile("09123456789"), "0912****789");
        assert_eq!(mask_mobile("123"), "***");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(with_zero in any::<bool>(), digits in "[0-9]{9}") {
            let phone = if with_zero { format!("09{}", digits) } else { format!("9{}", digits) };
            prop_assert!(is_valid_mobile(&phone));

            let once = normalize_mobile(&phone);
            prop_assert_eq!(normalize_mobile(&once), once.clone());
            prop_assert!(is_valid_mobile(&once));
            prop_assert_eq!(once.len(), 11);
        }
    }
}
