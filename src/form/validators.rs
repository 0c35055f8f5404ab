use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;

use super::validation::Validator;
use crate::value::{FieldKey, FieldValue};

pub const REQUIRED_MESSAGE: &str = "This field is required";
pub const EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const PHONE_MESSAGE: &str = "Please enter a valid phone number";
pub const URL_MESSAGE: &str = "Please enter a valid URL";
pub const NUMBER_MESSAGE: &str = "Please enter a valid number";
pub const DATE_MESSAGE: &str = "Please enter a valid date";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("email pattern compiles")
});

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern compiles"));

const PASSWORD_SPECIALS: &[char] = &['!', '@', '#', '$', '%', '^', '&', '*'];
const DATE_DISPLAY_FORMAT: &str = "%-m/%-d/%Y";

/// The only rule that rejects empty input.
pub fn required() -> Validator {
    Validator::new(|value| value.is_blank().then(|| REQUIRED_MESSAGE.to_string()))
}

pub fn email() -> Validator {
    Validator::new(|value| {
        if value.is_empty() {
            return None;
        }
        (!EMAIL_PATTERN.is_match(&value.to_text())).then(|| EMAIL_MESSAGE.to_string())
    })
}

pub fn phone() -> Validator {
    Validator::new(|value| {
        if value.is_empty() {
            return None;
        }
        (!PHONE_PATTERN.is_match(&value.to_text())).then(|| PHONE_MESSAGE.to_string())
    })
}

pub fn password() -> Validator {
    Validator::new(|value| {
        if value.is_empty() {
            return None;
        }
        let password = value.to_text();
        let mut missing = Vec::new();
        if password.chars().count() < 8 {
            missing.push("at least 8 characters");
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            missing.push("one uppercase letter");
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            missing.push("one lowercase letter");
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            missing.push("one number");
        }
        if !password.chars().any(|c| PASSWORD_SPECIALS.contains(&c)) {
            missing.push("one special character");
        }
        (!missing.is_empty()).then(|| format!("Password must contain {}", missing.join(", ")))
    })
}

/// Bounds of zero are treated as absent.
pub fn length(min: Option<usize>, max: Option<usize>) -> Validator {
    Validator::new(move |value| {
        if value.is_empty() {
            return None;
        }
        let len = value.len();
        match (min.filter(|min| *min > 0), max.filter(|max| *max > 0)) {
            (Some(min), _) if len < min => Some(format!("Must be at least {min} characters")),
            (_, Some(max)) if len > max => Some(format!("Must be no more than {max} characters")),
            _ => None,
        }
    })
}

pub fn number(min: Option<Decimal>, max: Option<Decimal>) -> Validator {
    Validator::new(move |value| {
        if value.is_empty() {
            return None;
        }
        let Some(parsed) = parse_number(value) else {
            return Some(NUMBER_MESSAGE.to_string());
        };
        if let Some(min) = min.filter(|min| parsed < *min) {
            return Some(format!("Must be at least {}", min.normalize()));
        }
        if let Some(max) = max.filter(|max| parsed > *max) {
            return Some(format!("Must be no more than {}", max.normalize()));
        }
        None
    })
}

pub fn url() -> Validator {
    Validator::new(|value| {
        if value.is_empty() {
            return None;
        }
        url::Url::parse(&value.to_text())
            .is_err()
            .then(|| URL_MESSAGE.to_string())
    })
}

pub fn date(min: Option<NaiveDateTime>, max: Option<NaiveDateTime>) -> Validator {
    Validator::new(move |value| {
        if value.is_empty() {
            return None;
        }
        let Some(parsed) = parse_date(&value.to_text()) else {
            return Some(DATE_MESSAGE.to_string());
        };
        if let Some(min) = min.filter(|min| parsed < *min) {
            return Some(format!(
                "Date must be after {}",
                min.format(DATE_DISPLAY_FORMAT)
            ));
        }
        if let Some(max) = max.filter(|max| parsed > *max) {
            return Some(format!(
                "Date must be before {}",
                max.format(DATE_DISPLAY_FORMAT)
            ));
        }
        None
    })
}

/// Fails unless the value equals `other`. Applies to empty values too.
pub fn matches(other: impl Into<FieldValue>, label: impl Into<String>) -> Validator {
    let other = other.into();
    let label = label.into();
    Validator::new(move |value| (value != &other).then(|| format!("{label} must match")))
}

/// Like [`matches`], but compares against another field of the same form.
pub fn matches_field(other: impl Into<FieldKey>, label: impl Into<String>) -> Validator {
    let other = other.into();
    let label = label.into();
    Validator::with_form(move |value, form| {
        let expected = form.get(other.as_str()).unwrap_or(&FieldValue::Null);
        (value != expected).then(|| format!("{label} must match"))
    })
}

fn parse_number(value: &FieldValue) -> Option<Decimal> {
    match value {
        FieldValue::Number(number) => Some(*number),
        FieldValue::Text(text) => {
            let text = text.trim();
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .ok()
        }
        _ => None,
    }
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
