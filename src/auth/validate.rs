use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref UAE_PHONE_RE: Regex = Regex::new(r"^\+971\d{9}$").unwrap();
    static ref OTP_RE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_otp(code: &str) -> bool {
    OTP_RE.is_match(code)
}

/// Normalizes a UAE phone number to the canonical `+971XXXXXXXXX` form.
/// Accepts local (`05X...`), bare (`5X...`) and already-prefixed input;
/// a foreign country code is rejected.
pub fn normalize_uae_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(*c, ' ' | '-' | '(' | ')'))
        .collect();
    let candidate = if cleaned.starts_with("+971") {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+971{rest}")
    } else if cleaned.starts_with('+') {
        return None;
    } else {
        format!("+971{cleaned}")
    };
    UAE_PHONE_RE.is_match(&candidate).then_some(candidate)
}

/// Validates an Emirates ID and formats it as `784-XXXX-XXXXXXX-X`.
/// 15 digits, UAE prefix 784; dashes and spaces in the input are ignored.
pub fn normalize_emirates_id(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(*c, '-' | ' ')).collect();
    if cleaned.len() != 15
        || !cleaned.chars().all(|c| c.is_ascii_digit())
        || !cleaned.starts_with("784")
    {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}",
        &cleaned[..3],
        &cleaned[3..7],
        &cleaned[7..14],
        &cleaned[14..]
    ))
}

/// Parses a `YYYY-MM-DD` date string.
pub fn parse_date_ymd(raw: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(raw, &format).ok()
}

/// Password policy: minimum length plus one uppercase, one lowercase,
/// one digit and one special character. The message names the first
/// rule the password breaks.
pub fn check_password_strength(plain: &str, min_length: usize) -> Result<(), String> {
    if plain.len() < min_length {
        return Err(format!(
            "Password must be at least {min_length} characters long"
        ));
    }
    if !plain.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !plain.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !plain.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    if !plain.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}
