//! Environment-driven settings for the binaries. Every struct builds either
//! from the process environment or from an injected lookup so handlers can be
//! exercised without touching global state.

use tanda_core::backup::{parse_tables_config, TableConfig};

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_TOKEN_EXPIRATION_HOURS: i64 = 24;
const DEFAULT_ENVIRONMENT: &str = "production";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn or_default(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional(lookup, name).unwrap_or_else(|| default.to_string())
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub tandas: String,
    pub usuarios: String,
    pub participantes: String,
    pub pagos: String,
    pub notificaciones: String,
    pub links: String,
    pub reset_tokens: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            tandas: "tandas".to_string(),
            usuarios: "usuarios_admin".to_string(),
            participantes: "participantes".to_string(),
            pagos: "pagos".to_string(),
            notificaciones: "notificaciones".to_string(),
            links: "links_registro".to_string(),
            reset_tokens: "auth-password-reset-tokens".to_string(),
        }
    }
}

impl TableNames {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            tandas: or_default(lookup, "TANDAS_TABLE", &defaults.tandas),
            usuarios: or_default(lookup, "USUARIOS_TABLE", &defaults.usuarios),
            participantes: or_default(lookup, "PARTICIPANTES_TABLE", &defaults.participantes),
            pagos: or_default(lookup, "PAGOS_TABLE", &defaults.pagos),
            notificaciones: or_default(lookup, "NOTIFICACIONES_TABLE", &defaults.notificaciones),
            links: or_default(lookup, "LINKS_TABLE", &defaults.links),
            reset_tokens: or_default(lookup, "RESET_TOKENS_TABLE", &defaults.reset_tokens),
        }
    }
}

/// Settings of the HTTP API handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub tables: TableNames,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub app_url: String,
    pub frontend_url: String,
    pub support_email: Option<String>,
    pub token_expiration_hours: i64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token_expiration_hours = match optional(&lookup, "TOKEN_EXPIRATION_HOURS") {
            Some(text) => text.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "TOKEN_EXPIRATION_HOURS",
                message: format!("expected whole hours, got {text:?}"),
            })?,
            None => DEFAULT_TOKEN_EXPIRATION_HOURS,
        };
        Ok(Self {
            tables: TableNames::from_lookup(&lookup),
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            jwt_refresh_secret: required(&lookup, "JWT_REFRESH_SECRET")?,
            app_url: or_default(&lookup, "APP_URL", DEFAULT_APP_URL),
            frontend_url: or_default(&lookup, "FRONTEND_URL", DEFAULT_APP_URL),
            support_email: optional(&lookup, "SUPPORT_EMAIL"),
            token_expiration_hours,
        })
    }
}

/// Settings of the request authorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerConfig {
    pub jwt_secret: String,
}

impl AuthorizerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            jwt_secret: required(&lookup, "JWT_SECRET")?,
        })
    }
}

/// Settings of the scheduled backup.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub tables: Vec<TableConfig>,
    pub bucket: String,
    pub environment: String,
    pub topic_arn: Option<String>,
    pub region: String,
}

impl BackupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_tables = required(&lookup, "TABLES_CONFIG")?;
        let tables = parse_tables_config(&raw_tables).map_err(|error| ConfigError::Invalid {
            name: "TABLES_CONFIG",
            message: error.message().to_string(),
        })?;
        Ok(Self {
            tables,
            bucket: required(&lookup, "BACKUP_BUCKET")?,
            environment: or_default(&lookup, "ENVIRONMENT", DEFAULT_ENVIRONMENT),
            topic_arn: optional(&lookup, "SNS_TOPIC_ARN"),
            region: or_default(&lookup, "AWS_REGION", DEFAULT_REGION),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn api_config_applies_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
        ]))
        .expect("config");
        assert_eq!(config.tables, TableNames::default());
        assert_eq!(config.app_url, "http://localhost:3000");
        assert_eq!(config.token_expiration_hours, 24);
        assert_eq!(config.support_email, None);
    }

    #[test]
    fn api_config_requires_secrets() {
        let error = ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "access")]))
            .expect_err("refresh secret missing");
        assert_eq!(error, ConfigError::Missing("JWT_REFRESH_SECRET"));
    }

    #[test]
    fn table_names_follow_overrides() {
        let names = TableNames::from_lookup(&lookup(&[("PAGOS_TABLE", "pagos-dev")]));
        assert_eq!(names.pagos, "pagos-dev");
        assert_eq!(names.tandas, "tandas");
    }

    #[test]
    fn backup_config_parses_tables() {
        let config = BackupConfig::from_lookup(lookup(&[
            ("TABLES_CONFIG", r#"[{"name":"tandas","pk":"id"}]"#),
            ("BACKUP_BUCKET", "tandas-backups"),
        ]))
        .expect("config");
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.environment, "production");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn backup_config_rejects_malformed_tables() {
        let error = BackupConfig::from_lookup(lookup(&[
            ("TABLES_CONFIG", "not json"),
            ("BACKUP_BUCKET", "tandas-backups"),
        ]))
        .expect_err("invalid tables");
        assert!(matches!(error, ConfigError::Invalid { name: "TABLES_CONFIG", .. }));
    }
}
