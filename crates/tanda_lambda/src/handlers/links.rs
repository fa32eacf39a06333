//! Time-limited public registration links.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tanda_core::calendar::format_timestamp;
use tanda_core::contract::{RegistrationLink, Tanda, LINK_TTL_GRACE_SECS};
use tanda_core::ids;
use tanda_core::validation::link_duration;

use crate::adapters::kv_store::Item;
use crate::context::ApiContext;
use crate::http::{success, ApiError, ApiGatewayResponse, ApiRequest};

pub fn link_not_found() -> ApiError {
    ApiError::not_found("LINK_NOT_FOUND", "Link de registro no encontrado")
}

/// Resolves a public registration token to its link and tanda, rejecting
/// disabled and expired links.
pub fn usable_link(ctx: &ApiContext, token: &str) -> Result<(RegistrationLink, Tanda), ApiError> {
    let repo = ctx.repo();
    let link = repo.link(token)?.ok_or_else(link_not_found)?;
    if !link.activo {
        return Err(ApiError::client(403, "LINK_INACTIVE", "Link de registro desactivado"));
    }
    if link.is_expired(ctx.now.timestamp()) {
        return Err(ApiError::client(403, "LINK_EXPIRED", "Link de registro expirado"));
    }
    let tanda = repo
        .tanda(&link.tanda_id)?
        .ok_or_else(ApiError::tanda_not_found)?;
    Ok((link, tanda))
}

pub fn create(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let hours = link_duration(request.body.get("duracionHoras"))
        .map_err(|error| ApiError::bad_request("INVALID_DURATION", error.message()))?;

    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    let expires_at: DateTime<Utc> = ctx.now + Duration::hours(i64::from(hours));
    let expiracion = expires_at.timestamp();
    let link = RegistrationLink {
        token: ids::registration_token(),
        tanda_id: tanda_id.to_string(),
        user_id: claims.id.clone(),
        duracion_horas: hours,
        expiracion,
        created_at: Some(ctx.timestamp()),
        activo: true,
        ttl: Some(expiracion + LINK_TTL_GRACE_SECS),
        tipo: Some(if tanda.is_birthday() { "cumpleañera" } else { "normal" }.to_string()),
        extra: Item::new(),
    };
    repo.put_link(&link)?;
    tracing::info!(component = "links", event = "link_created", tanda_id, hours);

    success(
        200,
        json!({
            "token": link.token,
            "expiracion": format_timestamp(expires_at),
            "duracionHoras": hours,
        }),
    )
}

/// First unexpired link the caller created for the tanda.
pub fn active(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let now = ctx.now.timestamp();

    let link = ctx
        .repo()
        .links_for_tanda(tanda_id)?
        .into_iter()
        .filter(|link| link.user_id == claims.id)
        .find(|link| !link.is_expired(now))
        .ok_or_else(|| ApiError::not_found("LINK_NOT_FOUND", "No hay links vigentes para esta tanda"))?;

    success(
        200,
        json!({
            "token": link.token,
            "expiracion": link.expiracion,
            "duracionHoras": link.duracion_horas,
        }),
    )
}

/// Public tanda data behind a registration token.
pub fn registration_info(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let token = request.path_param("token")?;
    let (link, tanda) = usable_link(ctx, token)?;
    let participantes: Vec<_> = ctx
        .repo()
        .participants(&tanda.id)?
        .into_iter()
        .map(|participant| {
            json!({
                "numeroAsignado": participant.numero_asignado,
                "nombre": participant.nombre,
            })
        })
        .collect();

    success(
        200,
        json!({
            "tandaId": tanda.id,
            "nombre": tanda.nombre,
            "montoPorRonda": tanda.monto_por_ronda,
            "totalRondas": tanda.total_rondas,
            "frecuencia": tanda.frequency_label(),
            "fechaInicio": tanda.fecha_inicio,
            "participantes": participantes,
            "expiracion": link.expiracion,
        }),
    )
}
