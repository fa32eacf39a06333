//! Payment registration, corrections, history and the round matrix.

use serde_json::{json, Value};
use tanda_core::contract::Payment;
use tanda_core::ledger::{filter_history, paid_total, payment_id, payment_matrix};
use tanda_core::validation::{amount_field, count_field, is_truthy, text_field};

use super::{flag_change, optional_text_change, to_value};
use crate::adapters::kv_store::Item;
use crate::context::ApiContext;
use crate::http::{success, ApiError, ApiGatewayResponse, ApiRequest};

fn missing_fields() -> ApiError {
    ApiError::bad_request("MISSING_FIELDS", "Campos requeridos faltantes")
}

/// Creates or overwrites the payment of one participant for one round.
pub fn create(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;

    let body = &request.body;
    let participant_id = text_field(body, "participanteId").ok_or_else(missing_fields)?;
    if body.get("ronda").is_none() || body.get("pagado").is_none() {
        return Err(missing_fields());
    }
    let ronda = count_field(body, "ronda").ok_or_else(missing_fields)?;
    repo.participant(tanda_id, &participant_id)?.ok_or_else(|| {
        ApiError::not_found("PARTICIPANTE_NOT_FOUND", "Participante no encontrado")
    })?;

    let timestamp = ctx.timestamp();
    let payment = Payment {
        tanda_id: tanda_id.to_string(),
        pago_id: payment_id(&participant_id, ronda),
        participante_id: participant_id,
        ronda,
        pagado: body.get("pagado").map(is_truthy).unwrap_or(false),
        monto: Some(amount_field(body, "monto").unwrap_or(tanda.monto_por_ronda)),
        fecha_pago: Some(text_field(body, "fechaPago").unwrap_or_else(|| timestamp.clone())),
        metodo_pago: Some(text_field(body, "metodoPago").unwrap_or_else(|| {
            tanda
                .configuracion
                .payment_method()
                .unwrap_or_default()
                .to_string()
        })),
        comprobante: Some(text_field(body, "comprobante").unwrap_or_default()),
        notas: Some(text_field(body, "notas").unwrap_or_default()),
        exento_pago: body.get("exentoPago").map(is_truthy).unwrap_or(false),
        created_at: Some(timestamp.clone()),
        updated_at: Some(timestamp),
        extra: Item::new(),
    };
    repo.put_payment(&payment)?;
    tracing::info!(
        component = "payments",
        event = "payment_recorded",
        tanda_id,
        pago_id = %payment.pago_id,
        pagado = payment.pagado
    );

    let mut data = to_value(&payment)?;
    data["tandaId"] = Value::from(tanda_id);
    success(201, data)
}

pub fn update(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let pago_id = request.path_param("pagoId")?;
    let repo = ctx.repo();
    repo.owned_tanda(tanda_id, &claims.id)?;
    repo.payment(tanda_id, pago_id)?
        .ok_or_else(|| ApiError::not_found("PAGO_NOT_FOUND", "Pago no encontrado"))?;

    let updated_at = ctx.timestamp();
    let mut changes = Item::new();
    changes.insert("updatedAt".to_string(), Value::from(updated_at.clone()));
    for name in ["pagado", "exentoPago"] {
        if let Some(value) = flag_change(&request.body, name) {
            changes.insert(name.to_string(), value);
        }
    }
    for name in ["fechaPago", "notas", "comprobante"] {
        if let Some(value) = optional_text_change(&request.body, name)? {
            changes.insert(name.to_string(), value);
        }
    }
    repo.update_payment(tanda_id, pago_id, &changes)?;
    tracing::info!(component = "payments", event = "payment_updated", tanda_id, pago_id);

    success(200, json!({"pagoId": pago_id, "updatedAt": updated_at}))
}

/// Payment history, optionally narrowed to one participant and/or round.
pub fn history(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    repo.owned_tanda(tanda_id, &claims.id)?;

    let round = match request.query_param("ronda") {
        Some(text) => Some(text.trim().parse::<u32>().map_err(|_| {
            ApiError::bad_request("INVALID_FIELD", "ronda debe ser un número entero")
        })?),
        None => None,
    };
    let payments = filter_history(
        repo.payments(tanda_id)?,
        request.query_param("participanteId"),
        round,
    );
    let total_monto = paid_total(&payments);

    success(
        200,
        json!({
            "pagos": payments,
            "total": payments.len(),
            "totalMonto": total_monto,
            "tandaId": tanda_id,
        }),
    )
}

pub fn matrix(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    let participants = repo.participants(tanda_id)?;
    let payments = repo.payments(tanda_id)?;
    success(200, payment_matrix(&tanda, &participants, &payments))
}
