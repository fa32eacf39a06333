use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::contract::{ValidationError, ALLOWED_LINK_DURATIONS_HOURS, DEFAULT_LINK_DURATION_HOURS};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// `local@domain.tld` where the TLD has at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

/// Loose check used by the public deletion request form.
pub fn looks_like_email(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Rules are checked in order; the first failing rule's message is returned.
pub fn check_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "La contraseña debe tener al menos 8 caracteres",
        ));
    }
    if length > MAX_PASSWORD_LEN {
        return Err(ValidationError::new(
            "La contraseña no puede exceder 128 caracteres",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "La contraseña debe contener al menos una letra mayúscula",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::new(
            "La contraseña debe contener al menos una letra minúscula",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "La contraseña debe contener al menos un número",
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(ValidationError::new(
            "La contraseña debe contener al menos un carácter especial",
        ));
    }
    Ok(())
}

/// Registration link lifetime in hours; absent means the default.
pub fn link_duration(value: Option<&Value>) -> Result<u32, ValidationError> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(DEFAULT_LINK_DURATION_HOURS);
    };
    value
        .as_f64()
        .and_then(|hours| {
            ALLOWED_LINK_DURATIONS_HOURS
                .iter()
                .copied()
                .find(|allowed| f64::from(*allowed) == hours)
        })
        .ok_or_else(|| ValidationError::new("Duración inválida. Debe ser 12 o 24 horas"))
}

/// Loose truthiness of a JSON request value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text field of a request body. Numbers are accepted and rendered as text;
/// empty strings count as missing.
pub fn text_field(body: &Value, name: &str) -> Option<String> {
    match body.get(name)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Positive whole number field, accepting integral floats and numeric text.
pub fn count_field(body: &Value, name: &str) -> Option<u32> {
    match body.get(name)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0 && *value >= 0.0)
                    .map(|value| value as u64)
            })
            .and_then(|value| u32::try_from(value).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn amount_field(body: &Value, name: &str) -> Option<f64> {
    match body.get(name)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
