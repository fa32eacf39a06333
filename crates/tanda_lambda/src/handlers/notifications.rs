//! SMS payment reminders and the per-tanda notification log.

use serde::Serialize;
use serde_json::{json, Value};
use tanda_core::contract::{
    DeliveryState, Notification, Participant, Tanda, DEFAULT_CHANNEL, REMINDER_KIND,
};
use tanda_core::ids;
use tanda_core::numbers::group_thousands;
use tanda_core::validation::text_field;

use crate::adapters::kv_store::Item;
use crate::adapters::messaging::to_e164;
use crate::context::ApiContext;
use crate::http::{success, ApiError, ApiGatewayResponse, ApiRequest};

fn reminder_text(participant: &Participant, tanda: &Tanda) -> String {
    format!(
        "Hola {}, recordatorio de {}. Ronda {}. Monto: ${}",
        participant.nombre,
        tanda.nombre,
        tanda.ronda_actual,
        group_thousands(tanda.monto_por_ronda)
    )
}

fn broadcast_text(tanda: &Tanda) -> String {
    format!(
        "Recordatorio: La ronda {} de {} está activa. Monto: ${}. Método: {}",
        tanda.ronda_actual,
        tanda.nombre,
        group_thousands(tanda.monto_por_ronda),
        tanda.configuracion.payment_method().unwrap_or("N/A")
    )
}

/// Sends one SMS and logs the attempt whatever its outcome.
fn deliver(
    ctx: &ApiContext,
    tanda_id: &str,
    participant: &Participant,
    message: &str,
    channel: &str,
) -> Result<Notification, ApiError> {
    let (estado, error) = match ctx.sms.send_sms(&to_e164(&participant.telefono), message) {
        Ok(message_id) => {
            tracing::info!(
                component = "notifications",
                event = "sms_sent",
                tanda_id,
                participant_id = %participant.participante_id,
                message_id = %message_id
            );
            (DeliveryState::Enviado, None)
        }
        Err(error) => {
            tracing::warn!(
                component = "notifications",
                event = "sms_failed",
                tanda_id,
                participant_id = %participant.participante_id,
                error = %error
            );
            (DeliveryState::Fallido, Some(error.to_string()))
        }
    };

    let timestamp = ctx.timestamp();
    let notification = Notification {
        tanda_id: tanda_id.to_string(),
        notificacion_id: ids::notification_id(),
        participante_id: participant.participante_id.clone(),
        tipo: REMINDER_KIND.to_string(),
        mensaje: message.to_string(),
        canal: channel.to_string(),
        estado,
        fecha_envio: timestamp.clone(),
        created_at: timestamp,
        error,
        extra: Item::new(),
    };
    ctx.repo().put_notification(&notification)?;
    Ok(notification)
}

fn channel(body: &Value) -> String {
    text_field(body, "canal").unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
}

pub fn remind(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;

    let body = &request.body;
    let participant_id = text_field(body, "participanteId")
        .ok_or_else(|| ApiError::bad_request("MISSING_FIELDS", "participanteId requerido"))?;
    let participant = repo.participant(tanda_id, &participant_id)?.ok_or_else(|| {
        ApiError::not_found("PARTICIPANTE_NOT_FOUND", "Participante no encontrado")
    })?;

    let message = text_field(body, "mensaje").unwrap_or_else(|| reminder_text(&participant, &tanda));
    let notification = deliver(ctx, tanda_id, &participant, &message, &channel(body))?;
    if let Some(error) = notification.error {
        return Err(
            ApiError::client(500, "SMS_SEND_ERROR", "Error al enviar SMS")
                .with_details(Value::from(error)),
        );
    }

    success(
        200,
        json!({
            "notificacionId": notification.notificacion_id,
            "participanteId": participant_id,
            "estado": notification.estado,
            "fechaEnvio": notification.fecha_envio,
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryDetail {
    participante_id: String,
    estado: DeliveryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    notificacion_id: Option<String>,
    error: Option<String>,
}

/// Reminds each listed participant, personalizing the shared message.
pub fn remind_all(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;

    let body = &request.body;
    let participant_ids: Vec<&str> = body
        .get("participanteIds")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if participant_ids.is_empty() {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "participanteIds requerido",
        ));
    }
    let message = text_field(body, "mensaje").unwrap_or_else(|| broadcast_text(&tanda));
    let channel = channel(body);

    let mut sent = 0usize;
    let mut failed = 0usize;
    let mut details = Vec::with_capacity(participant_ids.len());
    for participant_id in participant_ids {
        let Some(participant) = repo.participant(tanda_id, participant_id)? else {
            failed += 1;
            details.push(DeliveryDetail {
                participante_id: participant_id.to_string(),
                estado: DeliveryState::Fallido,
                notificacion_id: None,
                error: Some("Participante no encontrado".to_string()),
            });
            continue;
        };
        let personalized = format!("Hola {}, {message}", participant.nombre);
        let notification = deliver(ctx, tanda_id, &participant, &personalized, &channel)?;
        match notification.estado {
            DeliveryState::Enviado => sent += 1,
            DeliveryState::Fallido => failed += 1,
        }
        details.push(DeliveryDetail {
            participante_id: participant_id.to_string(),
            estado: notification.estado,
            notificacion_id: Some(notification.notificacion_id),
            error: notification.error,
        });
    }
    tracing::info!(
        component = "notifications",
        event = "bulk_reminder",
        tanda_id,
        sent,
        failed
    );

    success(
        200,
        json!({
            "notificacionesEnviadas": sent,
            "notificacionesFallidas": failed,
            "detalles": details,
        }),
    )
}

/// Notification log, newest first.
pub fn list(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    repo.owned_tanda(tanda_id, &claims.id)?;

    let mut notifications: Vec<Notification> = repo
        .notifications(tanda_id)?
        .into_iter()
        .filter(|notification| {
            request
                .query_param("participanteId")
                .map_or(true, |id| notification.participante_id == id)
        })
        .collect();
    notifications.sort_by(|left, right| right.fecha_envio.cmp(&left.fecha_envio));
    let total = notifications.len();

    success(200, json!({"notificaciones": notifications, "total": total}))
}
