//! API Gateway HTTP API plumbing: request descriptor, response envelope and
//! the error type every handler returns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tanda_core::contract::ValidationError;
use tanda_core::numbers::normalize_value;

use crate::adapters::kv_store::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

fn cors_headers() -> Value {
    json!({
        "Content-Type": "application/json",
        "Access-Control-Allow-Origin": "*",
        "Access-Control-Allow-Headers": "Content-Type,Authorization",
        "Access-Control-Allow-Methods": "GET,POST,PUT,DELETE,OPTIONS",
    })
}

pub fn json_response(status_code: u16, mut payload: Value) -> ApiGatewayResponse {
    normalize_value(&mut payload);
    ApiGatewayResponse {
        status_code,
        headers: cors_headers(),
        body: payload.to_string(),
    }
}

/// `{success: true, data, message?}`.
pub fn success(status_code: u16, data: impl Serialize) -> Result<ApiGatewayResponse, ApiError> {
    success_with_message(status_code, data, None)
}

pub fn success_with_message(
    status_code: u16,
    data: impl Serialize,
    message: Option<&str>,
) -> Result<ApiGatewayResponse, ApiError> {
    let data = serde_json::to_value(data)
        .map_err(|error| ApiError::Internal(format!("response serialization failed: {error}")))?;
    let mut envelope = json!({"success": true, "data": data});
    if let Some(message) = message {
        envelope["message"] = Value::from(message);
    }
    Ok(json_response(status_code, envelope))
}

/// `{success: true, message}` for operations without a payload.
pub fn acknowledged(message: &str) -> ApiGatewayResponse {
    json_response(200, json!({"success": true, "message": message}))
}

pub fn invalid_route() -> ApiGatewayResponse {
    json_response(
        400,
        json!({"error_code": "0001", "error_msg": "Recurso invalido"}),
    )
}

pub fn preflight() -> ApiGatewayResponse {
    json_response(200, json!({"message": "OK"}))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{code}: {message}")]
    Client {
        status: u16,
        code: &'static str,
        message: String,
        details: Option<Value>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn client(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(400, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::client(401, "UNAUTHORIZED", message)
    }

    pub fn forbidden() -> Self {
        Self::client(403, "FORBIDDEN", "Sin permisos")
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(404, code, message)
    }

    pub fn tanda_not_found() -> Self {
        Self::not_found("TANDA_NOT_FOUND", "Tanda no encontrada")
    }

    pub fn with_details(self, details: Value) -> Self {
        match self {
            Self::Client {
                status,
                code,
                message,
                ..
            } => Self::Client {
                status,
                code,
                message,
                details: Some(details),
            },
            other => other,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Client { status, .. } => *status,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Client { code, .. } => code,
            Self::Store(_) | Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Renders the `{success: false, error: {code, message}}` envelope. Server
    /// side failures are logged and reported with a generic message.
    pub fn into_response(self, route: &str) -> ApiGatewayResponse {
        let status = self.status();
        let code = self.code();
        let (message, details) = match self {
            Self::Client {
                message, details, ..
            } => (message, details),
            other => {
                tracing::error!(
                    component = "http",
                    event = "request_failed",
                    route,
                    error = %other
                );
                ("Error interno del servidor".to_string(), None)
            }
        };
        let mut error = json!({"code": code, "message": message});
        if let Some(details) = details {
            error["details"] = details;
        }
        json_response(status, json!({"success": false, "error": error}))
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::Internal(error.message().to_string())
    }
}

/// Parsed API Gateway v2 event.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub route_key: String,
    pub method: String,
    pub path_parameters: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

fn string_map(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(name, value)| {
                    value.as_str().map(|text| (name.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Request bodies arrive as a JSON string, an inline object or null.
pub fn normalize_body(body: Option<&Value>) -> Result<Value, String> {
    match body {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(Value::Object(_)) => Ok(body.cloned().unwrap_or_default()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        Some(Value::String(text)) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        Some(_) => Err("Request body must be a JSON object".to_string()),
    }
}

impl ApiRequest {
    pub fn from_event(event: &Value) -> Result<Self, ApiError> {
        if !event.is_object() {
            return Err(ApiError::bad_request(
                "INVALID_REQUEST",
                "Request payload must be a JSON object",
            ));
        }
        let route_key = event
            .get("routeKey")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let method = event
            .pointer("/requestContext/http/method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| route_key.split_whitespace().next().map(str::to_string))
            .unwrap_or_default()
            .to_ascii_uppercase();
        let headers = string_map(event.get("headers"))
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let body = normalize_body(event.get("body"))
            .map_err(|message| ApiError::bad_request("INVALID_BODY", message))?;

        Ok(Self {
            route_key,
            method,
            path_parameters: string_map(event.get("pathParameters")),
            query: string_map(event.get("queryStringParameters")),
            headers,
            body,
        })
    }

    pub fn path_param(&self, name: &str) -> Result<&str, ApiError> {
        self.path_parameters
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::bad_request("MISSING_FIELDS", format!("{name} es requerido")))
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        bearer_from_header(self.headers.get("authorization").map(String::as_str))
    }
}

pub fn bearer_from_header(header: Option<&str>) -> Option<&str> {
    let header = header?.trim();
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header)
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_api_event() {
        let event = json!({
            "routeKey": "POST /tandas/{tandaId}/pagos",
            "pathParameters": {"tandaId": "abc123xyz"},
            "queryStringParameters": {"ronda": "2"},
            "headers": {"Authorization": "Bearer token-1"},
            "body": "{\"participanteId\":\"part_1\"}"
        });
        let request = ApiRequest::from_event(&event).expect("request");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path_param("tandaId").expect("param"), "abc123xyz");
        assert_eq!(request.query_param("ronda"), Some("2"));
        assert_eq!(request.bearer_token(), Some("token-1"));
        assert_eq!(request.body["participanteId"], "part_1");
    }

    #[test]
    fn accepts_null_and_object_bodies() {
        assert_eq!(normalize_body(None).expect("empty"), json!({}));
        assert_eq!(normalize_body(Some(&Value::Null)).expect("null"), json!({}));
        assert_eq!(
            normalize_body(Some(&json!({"a": 1}))).expect("object"),
            json!({"a": 1})
        );
        assert!(normalize_body(Some(&json!("{not json"))).is_err());
        assert!(normalize_body(Some(&json!(5))).is_err());
    }

    #[test]
    fn renders_error_envelope() {
        let response = ApiError::tanda_not_found().into_response("GET /tandas/{tandaId}");
        assert_eq!(response.status_code, 404);
        assert_eq!(
            response.json_body(),
            json!({"success": false, "error": {"code": "TANDA_NOT_FOUND", "message": "Tanda no encontrada"}})
        );
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
    }

    #[test]
    fn hides_store_failures_behind_internal_error() {
        let error = ApiError::from(StoreError::backend("tandas", "get_item", "throttled"));
        let response = error.into_response("GET /tandas");
        assert_eq!(response.status_code, 500);
        assert_eq!(response.json_body()["error"]["code"], "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn success_envelope_normalizes_integral_numbers() {
        let response = success(200, json!({"monto": 1500.0})).expect("response");
        assert_eq!(response.body, r#"{"data":{"monto":1500},"success":true}"#);
    }

    #[test]
    fn strips_bearer_prefix() {
        assert_eq!(bearer_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_from_header(Some("abc")), Some("abc"));
        assert_eq!(bearer_from_header(Some("Bearer ")), None);
        assert_eq!(bearer_from_header(None), None);
    }
}
