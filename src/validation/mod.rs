use bigdecimal::BigDecimal;
use std::fmt;

pub const TITLE_MAX_LEN: usize = 64;
pub const ACCOUNT_NUMBER_MIN_LEN: usize = 6;
pub const ACCOUNT_NUMBER_MAX_LEN: usize = 20;
pub const PHONE_MIN_DIGITS: usize = 9;
pub const PHONE_MAX_DIGITS: usize = 15;
pub const NOTIFY_URL_MAX_LEN: usize = 2048;
pub const MONEY_SCALE: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Positive and representable in minor units. Partners take two decimal
/// places, so anything finer would be debited differently than it is recorded.
pub fn validate_money_amount(amount: &BigDecimal) -> ValidationResult {
    validate_positive_amount(amount)?;
    if amount.with_scale(MONEY_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", MONEY_SCALE),
        ));
    }

    Ok(())
}

pub fn validate_phone(phone: &str) -> ValidationResult {
    let phone = sanitize_string(phone);
    validate_required("phone", &phone)?;

    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }
    if digits.len() < PHONE_MIN_DIGITS || digits.len() > PHONE_MAX_DIGITS {
        return Err(ValidationError::new(
            "phone",
            format!(
                "must have between {} and {} digits",
                PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
            ),
        ));
    }

    Ok(())
}

pub fn validate_account_number(number: &str) -> ValidationResult {
    validate_required("account_number", number)?;

    if !number.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("account_number", "must contain only digits"));
    }
    if number.len() < ACCOUNT_NUMBER_MIN_LEN || number.len() > ACCOUNT_NUMBER_MAX_LEN {
        return Err(ValidationError::new(
            "account_number",
            format!(
                "must be between {} and {} digits",
                ACCOUNT_NUMBER_MIN_LEN, ACCOUNT_NUMBER_MAX_LEN
            ),
        ));
    }

    Ok(())
}

pub fn validate_notify_url(notify_url: &str) -> ValidationResult {
    validate_max_len("notify_url", notify_url, NOTIFY_URL_MAX_LEN)?;

    let parsed = url::Url::parse(notify_url)
        .map_err(|e| ValidationError::new("notify_url", format!("is not a valid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new("notify_url", "must use http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(ValidationError::new("notify_url", "must have a host"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");

        assert!(validate_positive_amount(&positive).is_ok());
        assert!(validate_positive_amount(&BigDecimal::from(0)).is_err());
        assert!(validate_positive_amount(&BigDecimal::from(-1)).is_err());
    }

    #[test]
    fn validates_money_scale() {
        assert!(validate_money_amount(&BigDecimal::from_str("2.99").unwrap()).is_ok());
        assert!(validate_money_amount(&BigDecimal::from_str("2.50").unwrap()).is_ok());
        assert!(validate_money_amount(&BigDecimal::from_str("2.500").unwrap()).is_ok());
        assert!(validate_money_amount(&BigDecimal::from(100)).is_ok());

        let err = validate_money_amount(&BigDecimal::from_str("2.999").unwrap()).unwrap_err();
        assert_eq!(err.field, "amount");
        assert!(validate_money_amount(&BigDecimal::from(0)).is_err());
    }

    #[test]
    fn validates_phone() {
        assert!(validate_phone("+251911223344").is_ok());
        assert!(validate_phone("0911223344").is_ok());
        assert!(validate_phone("+2519-11").is_err());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("").is_err());
    }

    #[test]
    fn validates_account_number() {
        assert!(validate_account_number("1000123456789").is_ok());
        assert!(validate_account_number("12345").is_err());
        assert!(validate_account_number("12345abc").is_err());
    }

    #[test]
    fn validates_notify_url() {
        assert!(validate_notify_url("https://merchant.example/hooks/pay").is_ok());
        assert!(validate_notify_url("ftp://merchant.example").is_err());
        assert!(validate_notify_url("not a url").is_err());
    }
}
