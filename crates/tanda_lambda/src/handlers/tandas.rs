//! Tanda CRUD and the cascade delete.

use serde::Serialize;
use serde_json::{json, Value};
use tanda_core::calendar::{biweekly_start, default_start_date, format_date, parse_date};
use tanda_core::contract::{Frequency, Tanda, TandaSettings, ACTIVE_STATUS};
use tanda_core::ids;
use tanda_core::ledger::{rounds_by_participant, sort_by_slot};
use tanda_core::validation::{amount_field, count_field, is_truthy, text_field};

use super::{required_text_change, to_value};
use crate::adapters::kv_store::Item;
use crate::context::ApiContext;
use crate::http::{success, success_with_message, ApiError, ApiGatewayResponse, ApiRequest};

fn start_date(ctx: &ApiContext, requested: Option<String>, frequency: Option<&Frequency>) -> String {
    let today = ctx.now.date_naive();
    match requested {
        Some(text) => match (frequency, parse_date(&text)) {
            (Some(Frequency::Biweekly), Some(date)) => format_date(biweekly_start(date)),
            _ => text,
        },
        None => format_date(default_start_date(today, frequency)),
    }
}

pub fn create(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let body = &request.body;
    let present = |name: &str| body.get(name).map(is_truthy).unwrap_or(false);
    if !(present("nombre") && present("montoPorRonda") && present("totalRondas")) {
        return Err(ApiError::bad_request(
            "MISSING_REQUIRED_FIELDS",
            "Faltan campos requeridos",
        ));
    }
    let invalid = || ApiError::bad_request("MISSING_REQUIRED_FIELDS", "Faltan campos requeridos");
    let nombre = text_field(body, "nombre").ok_or_else(invalid)?;
    let monto_por_ronda = amount_field(body, "montoPorRonda").ok_or_else(invalid)?;
    let total_rondas = count_field(body, "totalRondas").ok_or_else(invalid)?;

    let frecuencia = body
        .get("frecuencia")
        .and_then(Value::as_str)
        .map(|text| Frequency::from(text.to_string()));
    let configuracion = match body.get("configuracion") {
        Some(value @ Value::Object(_)) => serde_json::from_value::<TandaSettings>(value.clone())
            .map_err(|error| ApiError::bad_request("INVALID_CONFIGURATION", error.to_string()))?,
        _ => TandaSettings::with_defaults(),
    };
    let optional = |name: &str| body.get(name).filter(|value| !value.is_null()).cloned();

    let timestamp = ctx.timestamp();
    let tanda = Tanda {
        id: ids::tanda_id(),
        nombre,
        monto_por_ronda,
        total_rondas,
        ronda_actual: 1,
        fecha_inicio: start_date(ctx, text_field(body, "fechaInicio"), frecuencia.as_ref()),
        admin_id: claims.id.clone(),
        configuracion,
        status: ACTIVE_STATUS.to_string(),
        frecuencia,
        dias_recordatorio: optional("diasRecordatorio"),
        metodo_pago: optional("metodoPago"),
        created_at: Some(timestamp.clone()),
        updated_at: Some(timestamp),
        extra: Item::new(),
    };

    let repo = ctx.repo();
    repo.put_tanda(&tanda)?;
    let mut owned = repo
        .user(&claims.id)?
        .map(|user| user.tandas)
        .unwrap_or_default();
    owned.push(tanda.id.clone());
    let mut changes = Item::new();
    changes.insert("tandas".to_string(), json!(owned));
    repo.update_user(&claims.id, &changes)?;
    tracing::info!(component = "tandas", event = "tanda_created", tanda_id = %tanda.id, admin_id = %claims.id);

    let mut data = to_value(&tanda)?;
    data["tandaId"] = Value::from(tanda.id.clone());
    data["urlPublica"] = Value::from(format!("{}?tanda={}", ctx.config.app_url, tanda.id));
    success(201, data)
}

/// Public read of a tanda with every participant's payments keyed by round.
pub fn get(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.tanda(tanda_id)?.ok_or_else(ApiError::tanda_not_found)?;
    let participants = repo.participants(tanda_id)?;
    let mut rounds = rounds_by_participant(&repo.payments(tanda_id)?);

    let mut listed = Vec::with_capacity(participants.len());
    for participant in &participants {
        let mut entry = to_value(participant)?;
        let pagos = rounds.remove(&participant.participante_id).unwrap_or_default();
        entry["pagos"] = to_value(&pagos)?;
        listed.push(entry);
    }

    let mut data = to_value(&tanda)?;
    data["participantes"] = Value::Array(listed);
    data["tandaId"] = Value::from(tanda_id);
    success(200, data)
}

pub fn update(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    repo.owned_tanda(tanda_id, &claims.id)?;

    let body = &request.body;
    let updated_at = ctx.timestamp();
    let mut changes = Item::new();
    changes.insert("updatedAt".to_string(), Value::from(updated_at.clone()));
    for name in ["nombre", "fechaInicio"] {
        if let Some(value) = required_text_change(body, name)? {
            changes.insert(name.to_string(), value);
        }
    }
    if let Some(value) = body.get("configuracion") {
        let settings = match value {
            Value::Object(_) => serde_json::from_value::<TandaSettings>(value.clone()).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ApiError::bad_request("INVALID_FIELD", "configuracion debe ser un objeto")
        })?;
        changes.insert("configuracion".to_string(), to_value(&settings)?);
    }
    for name in ["rondaActual", "totalRondas"] {
        if body.get(name).is_some() {
            let count = count_field(body, name).ok_or_else(|| {
                ApiError::bad_request("INVALID_FIELD", format!("{name} debe ser un número entero"))
            })?;
            changes.insert(name.to_string(), Value::from(count));
        }
    }
    if body.get("montoPorRonda").is_some() {
        let amount = amount_field(body, "montoPorRonda").ok_or_else(|| {
            ApiError::bad_request("INVALID_FIELD", "montoPorRonda debe ser numérico")
        })?;
        changes.insert("montoPorRonda".to_string(), json!(amount));
    }
    repo.update_tanda(tanda_id, &changes)?;

    success(
        200,
        json!({"id": tanda_id, "tandaId": tanda_id, "updatedAt": updated_at}),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantSummary {
    participante_id: String,
    nombre: String,
    telefono: String,
    email: Option<String>,
    numero_asignado: u32,
    #[serde(rename = "fechaCumpleaños")]
    fecha_cumpleanos: String,
    fecha_registro: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TandaSummary {
    tanda_id: String,
    nombre: String,
    monto_por_ronda: f64,
    total_rondas: u32,
    ronda_actual: u32,
    fecha_inicio: String,
    frecuencia: Option<Frequency>,
    dias_recordatorio: Option<Value>,
    metodo_pago: Option<Value>,
    status: String,
    participantes: Vec<ParticipantSummary>,
}

pub fn list(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let repo = ctx.repo();
    let mut summaries = Vec::new();
    for tanda in repo.tandas_by_admin(&claims.id)? {
        let mut participants = repo.participants(&tanda.id)?;
        sort_by_slot(&mut participants);
        summaries.push(TandaSummary {
            participantes: participants
                .into_iter()
                .map(|participant| ParticipantSummary {
                    participante_id: participant.participante_id,
                    nombre: participant.nombre,
                    telefono: participant.telefono,
                    email: participant.email,
                    numero_asignado: participant.numero_asignado,
                    fecha_cumpleanos: participant.fecha_cumpleanos.unwrap_or_default(),
                    fecha_registro: participant.fecha_registro.unwrap_or_default(),
                })
                .collect(),
            tanda_id: tanda.id,
            nombre: tanda.nombre,
            monto_por_ronda: tanda.monto_por_ronda,
            total_rondas: tanda.total_rondas,
            ronda_actual: tanda.ronda_actual,
            fecha_inicio: tanda.fecha_inicio,
            frecuencia: tanda.frecuencia,
            dias_recordatorio: tanda.dias_recordatorio,
            metodo_pago: tanda.metodo_pago,
            status: tanda.status,
        });
    }
    success(200, json!({"tandas": summaries}))
}

#[derive(Debug, Default, Serialize)]
struct CascadeCounts {
    participantes: usize,
    pagos: usize,
    notificaciones: usize,
    tanda: bool,
    usuario: bool,
}

/// Deletes a tanda with its participants, payments and notifications and
/// detaches it from the owner's list.
pub fn delete(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    repo.owned_tanda(tanda_id, &claims.id)?;

    let mut counts = CascadeCounts::default();
    for participant in repo.participants(tanda_id)? {
        repo.delete_participant(tanda_id, &participant.participante_id)?;
        counts.participantes += 1;
    }
    for payment in repo.payments(tanda_id)? {
        repo.delete_payment(tanda_id, &payment.pago_id)?;
        counts.pagos += 1;
    }
    for notification in repo.notifications(tanda_id)? {
        repo.delete_notification(tanda_id, &notification.notificacion_id)?;
        counts.notificaciones += 1;
    }

    if let Some(user) = repo.user(&claims.id)? {
        if user.tandas.iter().any(|owned| owned == tanda_id) {
            let remaining: Vec<String> = user
                .tandas
                .into_iter()
                .filter(|owned| owned != tanda_id)
                .collect();
            let mut changes = Item::new();
            changes.insert("tandas".to_string(), json!(remaining));
            changes.insert("updatedAt".to_string(), Value::from(ctx.timestamp()));
            repo.update_user(&claims.id, &changes)?;
            counts.usuario = true;
        }
    }
    repo.delete_tanda(tanda_id)?;
    counts.tanda = true;
    tracing::info!(
        component = "tandas",
        event = "tanda_deleted",
        tanda_id,
        participantes = counts.participantes,
        pagos = counts.pagos,
        notificaciones = counts.notificaciones
    );

    success_with_message(
        200,
        json!({"tandaId": tanda_id, "estadisticas": counts}),
        Some("Tanda eliminada exitosamente"),
    )
}
