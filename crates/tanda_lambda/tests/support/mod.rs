#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tanda_lambda::adapters::memory::{MemoryStore, RecordingMailer, RecordingSms};
use tanda_lambda::auth::password::Sha256PasswordHasher;
use tanda_lambda::config::{ApiConfig, TableNames};
use tanda_lambda::context::ApiContext;
use tanda_lambda::handlers::router::handle_api_event;

pub const PASSWORD: &str = "Secreta123";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 24, 10, 0, 0)
        .single()
        .expect("valid time")
}

/// Creates every API table with its production key schema.
pub fn api_store(tables: &TableNames) -> MemoryStore {
    MemoryStore::new()
        .with_table(&tables.tandas, "id", None)
        .with_table(&tables.usuarios, "id", None)
        .with_table(&tables.participantes, "id", Some("participanteId"))
        .with_table(&tables.pagos, "id", Some("pagoId"))
        .with_table(&tables.notificaciones, "id", Some("notificacionId"))
        .with_table(&tables.links, "token", None)
        .with_table(&tables.reset_tokens, "token", None)
}

/// API Gateway HTTP API v2 event under construction.
pub struct ApiEvent {
    route_key: String,
    path: Map<String, Value>,
    query: Map<String, Value>,
    headers: Map<String, Value>,
    body: Option<Value>,
}

impl ApiEvent {
    pub fn new(route_key: &str) -> Self {
        Self {
            route_key: route_key.to_string(),
            path: Map::new(),
            query: Map::new(),
            headers: Map::new(),
            body: None,
        }
    }

    pub fn path(mut self, name: &str, value: &str) -> Self {
        self.path.insert(name.to_string(), Value::from(value));
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), Value::from(value));
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.headers
            .insert("Authorization".to_string(), Value::from(format!("Bearer {token}")));
        self
    }

    /// Bodies travel as a JSON string, the way API Gateway delivers them.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(Value::from(body.to_string()));
        self
    }

    pub fn build(self) -> Value {
        let method = self
            .route_key
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        json!({
            "routeKey": self.route_key,
            "requestContext": {"http": {"method": method}},
            "pathParameters": self.path,
            "queryStringParameters": self.query,
            "headers": self.headers,
            "body": self.body.unwrap_or(Value::Null),
        })
    }
}

pub struct TestApp {
    pub config: ApiConfig,
    pub store: MemoryStore,
    pub sms: RecordingSms,
    pub mailer: RecordingMailer,
    pub now: DateTime<Utc>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let config = ApiConfig::from_lookup(|name| match name {
            "JWT_SECRET" => Some("test-access-secret".to_string()),
            "JWT_REFRESH_SECRET" => Some("test-refresh-secret".to_string()),
            "SUPPORT_EMAIL" => Some("soporte@tandas.test".to_string()),
            "FRONTEND_URL" => Some("https://app.tandas.test/".to_string()),
            _ => None,
        })
        .expect("test config");
        Self {
            store: api_store(&config.tables),
            config,
            sms: RecordingSms::default(),
            mailer: RecordingMailer::default(),
            now: fixed_now(),
        }
    }

    pub fn send(&self, event: ApiEvent) -> (u16, Value) {
        let ctx = ApiContext {
            config: &self.config,
            store: &self.store,
            sms: &self.sms,
            mailer: &self.mailer,
            passwords: &Sha256PasswordHasher,
            now: self.now,
        };
        let response = handle_api_event(&event.build(), &ctx);
        (response.status_code, response.json_body())
    }

    /// Registers an admin and returns `(user id, access token)`.
    pub fn register_admin(&self, email: &str) -> (String, String) {
        let (status, body) = self.send(ApiEvent::new("POST /auth/register").body(json!({
            "email": email,
            "password": PASSWORD,
            "nombre": "Admin",
        })));
        assert_eq!(status, 201, "register failed: {body}");
        (
            body["data"]["id"].as_str().expect("user id").to_string(),
            body["data"]["token"].as_str().expect("token").to_string(),
        )
    }

    pub fn create_tanda(&self, token: &str, body: Value) -> String {
        let (status, response) = self.send(ApiEvent::new("POST /tandas").bearer(token).body(body));
        assert_eq!(status, 201, "create tanda failed: {response}");
        response["data"]["tandaId"]
            .as_str()
            .expect("tanda id")
            .to_string()
    }

    pub fn normal_tanda(&self, token: &str, total_rondas: u32) -> String {
        self.create_tanda(
            token,
            json!({
                "nombre": "Oficina",
                "montoPorRonda": 500,
                "totalRondas": total_rondas,
                "frecuencia": "semanal",
                "fechaInicio": "2025-01-06",
            }),
        )
    }

    pub fn birthday_tanda(&self, token: &str) -> String {
        self.create_tanda(
            token,
            json!({
                "nombre": "Cumpleañeros",
                "montoPorRonda": 1000,
                "totalRondas": 12,
                "frecuencia": "cumpleaños",
            }),
        )
    }

    pub fn add_participant(&self, token: &str, tanda_id: &str, body: Value) -> String {
        let (status, response) = self.send(
            ApiEvent::new("POST /tandas/{tandaId}/participantes")
                .path("tandaId", tanda_id)
                .bearer(token)
                .body(body),
        );
        assert_eq!(status, 201, "add participant failed: {response}");
        response["data"]["participanteId"]
            .as_str()
            .expect("participant id")
            .to_string()
    }

    /// Slot of every participant keyed by name, read through the public list.
    pub fn slots(&self, tanda_id: &str) -> Vec<(String, u64)> {
        let (status, body) = self.send(
            ApiEvent::new("GET /tandas/{tandaId}/participantes").path("tandaId", tanda_id),
        );
        assert_eq!(status, 200);
        body["data"]["participantes"]
            .as_array()
            .expect("participants")
            .iter()
            .map(|participant| {
                (
                    participant["nombre"].as_str().unwrap_or_default().to_string(),
                    participant["numeroAsignado"].as_u64().unwrap_or_default(),
                )
            })
            .collect()
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
