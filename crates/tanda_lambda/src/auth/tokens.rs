use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tanda_core::contract::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_DAYS};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

trait Expiring {
    fn exp(&self) -> i64;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub id: String,
    pub email: String,
    pub exp: i64,
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub id: String,
    pub exp: i64,
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

/// Access and refresh tokens issued together after register, login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

fn sign(secret: &[u8], claims: &impl Serialize) -> Result<String, TokenError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|error| TokenError::Signing(error.to_string()))
}

/// Signature is checked by the library; expiry against `now`.
fn verify<C: DeserializeOwned + Expiring>(
    secret: &[u8],
    token: &str,
    now: DateTime<Utc>,
) -> Result<C, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    let data = decode::<C>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|error| TokenError::Invalid(error.to_string()))?;
    if data.claims.exp() < now.timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(data.claims)
}

pub fn verify_access_token(
    secret: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<AccessClaims, TokenError> {
    verify(secret.as_bytes(), token, now)
}

pub struct TokenService<'a> {
    access_secret: &'a str,
    refresh_secret: &'a str,
}

impl<'a> TokenService<'a> {
    pub fn new(access_secret: &'a str, refresh_secret: &'a str) -> Self {
        Self {
            access_secret,
            refresh_secret,
        }
    }

    pub fn issue(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let access = AccessClaims {
            id: user_id.to_string(),
            email: email.to_string(),
            exp: now.timestamp() + ACCESS_TOKEN_TTL_SECS,
        };
        let refresh = RefreshClaims {
            id: user_id.to_string(),
            exp: (now + Duration::days(REFRESH_TOKEN_TTL_DAYS)).timestamp(),
        };
        Ok(TokenPair {
            token: sign(self.access_secret.as_bytes(), &access)?,
            refresh_token: sign(self.refresh_secret.as_bytes(), &refresh)?,
            expires_in: ACCESS_TOKEN_TTL_SECS,
        })
    }

    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        verify_access_token(self.access_secret, token, now)
    }

    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshClaims, TokenError> {
        verify(self.refresh_secret.as_bytes(), token, now)
    }
}
