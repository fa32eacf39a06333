//! HTTP API simple-response authorizer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::tokens::verify_access_token;
use crate::http::bearer_from_header;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerContext {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub is_authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AuthorizerContext>,
}

impl AuthorizerResponse {
    fn deny() -> Self {
        Self {
            is_authorized: false,
            context: None,
        }
    }
}

fn authorization_header(event: &Value) -> Option<&str> {
    event
        .get("headers")?
        .as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .and_then(|(_, value)| value.as_str())
}

pub fn handle_authorizer_event(event: &Value, secret: &str, now: DateTime<Utc>) -> AuthorizerResponse {
    let Some(token) = bearer_from_header(authorization_header(event)) else {
        tracing::info!(component = "authorizer", event = "missing_token");
        return AuthorizerResponse::deny();
    };
    match verify_access_token(secret, token, now) {
        Ok(claims) => AuthorizerResponse {
            is_authorized: true,
            context: Some(AuthorizerContext {
                user_id: claims.id,
                email: claims.email,
            }),
        },
        Err(error) => {
            tracing::info!(component = "authorizer", event = "token_rejected", error = %error);
            AuthorizerResponse::deny()
        }
    }
}
