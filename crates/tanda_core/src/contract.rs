use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::calendar::parse_utc;

pub const BIRTHDAY_FREQUENCY: &str = "cumpleaños";
pub const DEFAULT_PAYMENT_METHOD: &str = "Transferencia / Efectivo";
pub const DEFAULT_REMINDER_DAYS: u32 = 3;
pub const ACTIVE_STATUS: &str = "active";
pub const ADMIN_ROLE: &str = "admin";

pub const ACCESS_TOKEN_TTL_SECS: i64 = 3_600;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

pub const ALLOWED_LINK_DURATIONS_HOURS: [u32; 2] = [12, 24];
pub const DEFAULT_LINK_DURATION_HOURS: u32 = 24;
pub const LINK_TTL_GRACE_SECS: i64 = 86_400;

pub const DELETION_GRACE_DAYS: i64 = 30;
pub const DELETION_PENDING: &str = "PENDIENTE";
pub const ACCOUNT_PENDING_DELETION: &str = "PENDIENTE_ELIMINACION";
pub const DEFAULT_DELETION_REASON: &str = "No proporcionado";

pub const REMINDER_KIND: &str = "recordatorio_pago";
pub const DEFAULT_CHANNEL: &str = "sms";

pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Raw attribute map as stored in the key-value store.
pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Payout cadence of a tanda. Unknown values are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Birthday,
    Other(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Weekly => "semanal",
            Self::Biweekly => "quincenal",
            Self::Monthly => "mensual",
            Self::Birthday => BIRTHDAY_FREQUENCY,
            Self::Other(value) => value,
        }
    }
}

impl From<String> for Frequency {
    fn from(value: String) -> Self {
        match value.as_str() {
            "semanal" => Self::Weekly,
            "quincenal" => Self::Biweekly,
            "mensual" => Self::Monthly,
            BIRTHDAY_FREQUENCY => Self::Birthday,
            _ => Self::Other(value),
        }
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TandaSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recordatorios_dias: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metodo_pago: Option<Value>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl TandaSettings {
    pub fn with_defaults() -> Self {
        Self {
            recordatorios_dias: Some(Value::from(DEFAULT_REMINDER_DAYS)),
            metodo_pago: Some(Value::from(DEFAULT_PAYMENT_METHOD)),
            extra: Attributes::new(),
        }
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.metodo_pago.as_ref().and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tanda {
    pub id: String,
    pub nombre: String,
    pub monto_por_ronda: f64,
    pub total_rondas: u32,
    #[serde(default = "first_round")]
    pub ronda_actual: u32,
    #[serde(default)]
    pub fecha_inicio: String,
    pub admin_id: String,
    #[serde(default)]
    pub configuracion: TandaSettings,
    #[serde(default = "active_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frecuencia: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dias_recordatorio: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metodo_pago: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl Tanda {
    pub fn is_birthday(&self) -> bool {
        matches!(self.frecuencia, Some(Frequency::Birthday))
    }

    pub fn frequency_label(&self) -> &str {
        self.frecuencia
            .as_ref()
            .map(Frequency::as_str)
            .unwrap_or("semanal")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "id")]
    pub tanda_id: String,
    pub participante_id: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub telefono: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub numero_asignado: u32,
    #[serde(
        rename = "fechaCumpleaños",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fecha_cumpleanos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_registro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comentarios: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrado_por_link: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl Participant {
    /// Timestamp used to break ties between equal birthdays.
    pub fn registered_at(&self) -> Option<&str> {
        self.fecha_registro
            .as_deref()
            .or(self.created_at.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "id")]
    pub tanda_id: String,
    pub pago_id: String,
    pub participante_id: String,
    pub ronda: u32,
    #[serde(default)]
    pub pagado: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monto: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_pago: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metodo_pago: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comprobante: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notas: Option<String>,
    #[serde(default)]
    pub exento_pago: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Enviado,
    Fallido,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "id")]
    pub tanda_id: String,
    pub notificacion_id: String,
    pub participante_id: String,
    pub tipo: String,
    pub mensaje: String,
    pub canal: String,
    pub estado: DeliveryState,
    pub fecha_envio: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLink {
    pub token: String,
    pub tanda_id: String,
    pub user_id: String,
    #[serde(default = "default_link_duration")]
    pub duracion_horas: u32,
    /// Epoch seconds. Older rows may hold an ISO string instead.
    #[serde(default, deserialize_with = "epoch_or_iso")]
    pub expiracion: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default = "enabled")]
    pub activo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl RegistrationLink {
    /// Usable strictly before `expiracion`.
    pub fn is_expired(&self, now_epoch: i64) -> bool {
        now_epoch >= self.expiracion
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequest {
    pub estado: String,
    pub fecha_solicitud: String,
    pub fecha_eliminacion_programada: String,
    pub email: String,
    pub motivo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub tandas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solicitud_eliminacion: Option<DeletionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado_cuenta: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl User {
    pub fn has_pending_deletion(&self) -> bool {
        self.solicitud_eliminacion
            .as_ref()
            .map(|request| request.estado == DELETION_PENDING)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResetToken {
    pub token: String,
    pub email: String,
    pub user_id: String,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

pub fn record_to_attributes(record: &impl Serialize) -> Result<Attributes, ValidationError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::new("record must serialize to an object")),
        Err(error) => Err(ValidationError::new(format!(
            "record serialization failed: {error}"
        ))),
    }
}

pub fn record_from_attributes<T: DeserializeOwned>(
    attributes: Attributes,
) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(attributes))
        .map_err(|error| ValidationError::new(format!("malformed stored record: {error}")))
}

fn first_round() -> u32 {
    1
}

fn active_status() -> String {
    ACTIVE_STATUS.to_string()
}

fn default_link_duration() -> u32 {
    DEFAULT_LINK_DURATION_HOURS
}

fn enabled() -> bool {
    true
}

fn epoch_or_iso<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .ok_or_else(|| de::Error::custom("expiracion is not a valid epoch")),
        Value::String(text) => parse_utc(&text)
            .map(|at| at.timestamp())
            .ok_or_else(|| de::Error::custom(format!("unparseable expiracion: {text}"))),
        Value::Null => Ok(0),
        other => Err(de::Error::custom(format!(
            "unsupported expiracion value: {other}"
        ))),
    }
}
