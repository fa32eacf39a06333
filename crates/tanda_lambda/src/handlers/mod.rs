//! One module per resource; [`router`] maps API Gateway route keys onto them.

use serde::Serialize;
use serde_json::Value;
use tanda_core::validation::{is_truthy, text_field};

use crate::http::ApiError;

pub mod auth;
pub mod authorizer;
pub mod backup;
pub mod links;
pub mod notifications;
pub mod participants;
pub mod payments;
pub mod recovery;
pub mod restore;
pub mod router;
pub mod statistics;
pub mod tandas;

pub(crate) fn to_value(record: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(record).map_err(|error| ApiError::Internal(error.to_string()))
}

fn not_text(name: &str) -> ApiError {
    ApiError::bad_request("INVALID_FIELD", format!("{name} debe ser texto"))
}

/// Text value for a partial update of a field that must stay present.
/// Numbers are rendered as text; `null`, empty text and other shapes are rejected.
pub(crate) fn required_text_change(body: &Value, name: &str) -> Result<Option<Value>, ApiError> {
    if body.get(name).is_none() {
        return Ok(None);
    }
    text_field(body, name)
        .map(|text| Some(Value::String(text)))
        .ok_or_else(|| not_text(name))
}

/// Like [`required_text_change`], but `null` or empty text clears the field.
pub(crate) fn optional_text_change(body: &Value, name: &str) -> Result<Option<Value>, ApiError> {
    match body.get(name) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(Value::Null)),
        Some(Value::String(text)) if text.is_empty() => Ok(Some(Value::Null)),
        Some(_) => required_text_change(body, name),
    }
}

pub(crate) fn flag_change(body: &Value, name: &str) -> Option<Value> {
    body.get(name).map(|value| Value::Bool(is_truthy(value)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_changes_coerce_numbers_and_reject_other_shapes() {
        let body = json!({"nombre": 42, "notas": null, "email": "", "telefono": [1]});
        assert_eq!(required_text_change(&body, "nombre").ok(), Some(Some(json!("42"))));
        assert_eq!(required_text_change(&body, "ausente").ok(), Some(None));
        assert!(required_text_change(&body, "notas").is_err());
        assert!(required_text_change(&body, "telefono").is_err());
        assert_eq!(optional_text_change(&body, "notas").ok(), Some(Some(Value::Null)));
        assert_eq!(optional_text_change(&body, "email").ok(), Some(Some(Value::Null)));
        assert!(optional_text_change(&body, "telefono").is_err());
    }

    #[test]
    fn flag_changes_follow_truthiness() {
        let body = json!({"pagado": "si", "exentoPago": 0});
        assert_eq!(flag_change(&body, "pagado"), Some(json!(true)));
        assert_eq!(flag_change(&body, "exentoPago"), Some(json!(false)));
        assert_eq!(flag_change(&body, "comprobante"), None);
    }
}
