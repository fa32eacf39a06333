use chrono::{DateTime, NaiveDateTime, Utc};
use tanda_core::calendar::format_timestamp;

use crate::adapters::kv_store::KeyValueStore;
use crate::adapters::messaging::{EmailSender, SmsSender};
use crate::auth::password::PasswordHasher;
use crate::auth::tokens::{AccessClaims, TokenService};
use crate::config::ApiConfig;
use crate::http::{ApiError, ApiRequest};
use crate::repository::Repository;

/// Collaborators and clock of one API invocation.
pub struct ApiContext<'a> {
    pub config: &'a ApiConfig,
    pub store: &'a dyn KeyValueStore,
    pub sms: &'a dyn SmsSender,
    pub mailer: &'a dyn EmailSender,
    pub passwords: &'a dyn PasswordHasher,
    pub now: DateTime<Utc>,
}

impl<'a> ApiContext<'a> {
    pub fn repo(&self) -> Repository<'a> {
        Repository::new(self.store, &self.config.tables)
    }

    pub fn tokens(&self) -> TokenService<'a> {
        TokenService::new(&self.config.jwt_secret, &self.config.jwt_refresh_secret)
    }

    pub fn timestamp(&self) -> String {
        format_timestamp(self.now)
    }

    pub fn naive_now(&self) -> NaiveDateTime {
        self.now.naive_utc()
    }

    /// Claims of the bearer access token, or 401.
    pub fn authenticate(&self, request: &ApiRequest) -> Result<AccessClaims, ApiError> {
        let token = request
            .bearer_token()
            .ok_or_else(|| ApiError::unauthorized("Token inválido"))?;
        self.tokens().verify_access(token, self.now).map_err(|error| {
            tracing::debug!(component = "auth", event = "token_rejected", error = %error);
            ApiError::unauthorized("Token inválido o expirado")
        })
    }
}
