//! Account lifecycle: register, login, refresh, deletion requests and full
//! account removal.

use chrono::Duration;
use serde::Serialize;
use serde_json::{json, Value};
use tanda_core::calendar::{format_date, format_timestamp};
use tanda_core::contract::{
    DeletionRequest, User, ACCOUNT_PENDING_DELETION, ADMIN_ROLE, DELETION_GRACE_DAYS,
    DELETION_PENDING, DEFAULT_DELETION_REASON,
};
use tanda_core::ids;
use tanda_core::validation::{looks_like_email, normalize_email, text_field};

use crate::adapters::kv_store::Item;
use crate::auth::tokens::{TokenError, TokenPair};
use crate::context::ApiContext;
use crate::http::{success, success_with_message, ApiError, ApiGatewayResponse, ApiRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    email: String,
    nombre: String,
    token: String,
    refresh_token: String,
    expires_in: i64,
}

impl SessionResponse {
    fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            nombre: user.nombre.clone(),
            token: tokens.token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        }
    }
}

fn issue_tokens(ctx: &ApiContext, user: &User) -> Result<TokenPair, ApiError> {
    ctx.tokens()
        .issue(&user.id, &user.email, ctx.now)
        .map_err(|error| ApiError::Internal(error.to_string()))
}

pub fn register(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let body = &request.body;
    let (Some(email), Some(password), Some(nombre)) = (
        text_field(body, "email"),
        text_field(body, "password"),
        text_field(body, "nombre"),
    ) else {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "Email, password y nombre son requeridos",
        ));
    };

    let repo = ctx.repo();
    if repo.user_by_email(&email)?.is_some() {
        return Err(ApiError::bad_request("EMAIL_EXISTS", "El email ya está registrado"));
    }

    let timestamp = ctx.timestamp();
    let user = User {
        id: ids::user_id(),
        email,
        nombre,
        telefono: Some(text_field(body, "telefono").unwrap_or_default()),
        password_hash: Some(ctx.passwords.hash(&password)),
        role: Some(ADMIN_ROLE.to_string()),
        tandas: Vec::new(),
        created_at: Some(timestamp.clone()),
        updated_at: Some(timestamp.clone()),
        last_login: Some(timestamp),
        solicitud_eliminacion: None,
        estado_cuenta: None,
        extra: Item::new(),
    };
    repo.put_user(&user)?;
    tracing::info!(component = "auth", event = "user_registered", user_id = %user.id);

    let tokens = issue_tokens(ctx, &user)?;
    success(201, SessionResponse::new(&user, tokens))
}

pub fn login(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let (Some(email), Some(password)) = (
        text_field(&request.body, "email"),
        text_field(&request.body, "password"),
    ) else {
        return Err(ApiError::bad_request(
            "MISSING_CREDENTIALS",
            "Email y password son requeridos",
        ));
    };
    let invalid = || ApiError::client(401, "INVALID_CREDENTIALS", "Email o contraseña incorrectos");

    let repo = ctx.repo();
    let user = repo.user_by_email(&email)?.ok_or_else(invalid)?;
    let matches = user
        .password_hash
        .as_deref()
        .map(|stored| ctx.passwords.verify(&password, stored))
        .unwrap_or(false);
    if !matches {
        tracing::info!(component = "auth", event = "login_rejected", user_id = %user.id);
        return Err(invalid());
    }

    let tokens = issue_tokens(ctx, &user)?;
    let mut changes = Item::new();
    changes.insert("lastLogin".to_string(), Value::from(ctx.timestamp()));
    repo.update_user(&user.id, &changes)?;

    success(200, SessionResponse::new(&user, tokens))
}

pub fn refresh(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let refresh_token = text_field(&request.body, "refreshToken")
        .ok_or_else(|| ApiError::bad_request("MISSING_TOKEN", "Refresh token es requerido"))?;
    let claims = ctx
        .tokens()
        .verify_refresh(&refresh_token, ctx.now)
        .map_err(|error| match error {
            TokenError::Expired => ApiError::client(401, "TOKEN_EXPIRED", "Refresh token expirado"),
            _ => ApiError::client(401, "INVALID_TOKEN", "Refresh token inválido"),
        })?;

    let user = ctx
        .repo()
        .user(&claims.id)?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", "Usuario no encontrado"))?;
    let tokens = issue_tokens(ctx, &user)?;
    success(
        200,
        json!({
            "token": tokens.token,
            "refreshToken": tokens.refresh_token,
            "expiresIn": tokens.expires_in,
        }),
    )
}

/// `PUT /auth/register`: schedules the account for deletion.
pub fn request_deletion(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let body = &request.body;
    let email = normalize_email(body.get("email").and_then(Value::as_str).unwrap_or_default());
    if email.is_empty() {
        return Err(ApiError::bad_request(
            "MISSING_EMAIL",
            "El correo electrónico es requerido",
        ));
    }
    if !looks_like_email(&email) {
        return Err(ApiError::bad_request(
            "INVALID_EMAIL",
            "Por favor ingresa un correo electrónico válido",
        ));
    }
    let trimmed = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let repo = ctx.repo();
    let user = repo.user_by_email(&email)?.ok_or_else(|| {
        ApiError::not_found(
            "USER_NOT_FOUND",
            "No se encontró una cuenta asociada a este correo electrónico",
        )
    })?;
    if user.has_pending_deletion() {
        return Err(ApiError::bad_request(
            "DELETION_ALREADY_REQUESTED",
            "Ya existe una solicitud de eliminación activa para esta cuenta",
        ));
    }

    let deletion_at = ctx.now + Duration::days(DELETION_GRACE_DAYS);
    let deletion = DeletionRequest {
        estado: DELETION_PENDING.to_string(),
        fecha_solicitud: ctx.timestamp(),
        fecha_eliminacion_programada: format_timestamp(deletion_at),
        email: email.clone(),
        motivo: trimmed("reason").unwrap_or_else(|| DEFAULT_DELETION_REASON.to_string()),
        telefono: trimmed("phone"),
    };
    let mut changes = Item::new();
    changes.insert(
        "solicitudEliminacion".to_string(),
        serde_json::to_value(&deletion)
            .map_err(|error| ApiError::Internal(error.to_string()))?,
    );
    changes.insert("estadoCuenta".to_string(), Value::from(ACCOUNT_PENDING_DELETION));
    changes.insert("fechaActualizacion".to_string(), Value::from(ctx.timestamp()));
    repo.update_user(&user.id, &changes)?;
    tracing::info!(component = "auth", event = "deletion_requested", user_id = %user.id);

    success_with_message(
        200,
        json!({
            "email": email,
            "deletionDate": format_date(deletion_at.date_naive()),
            "daysRemaining": DELETION_GRACE_DAYS,
        }),
        Some("Tu solicitud de eliminación ha sido procesada exitosamente. Tu cuenta será eliminada en un plazo máximo de 30 días."),
    )
}

#[derive(Debug, Default, Serialize)]
struct DeletedCounts {
    tandas_eliminadas: usize,
    participantes_eliminados: usize,
    pagos_eliminados: usize,
    links_eliminados: usize,
    notificaciones_eliminadas: usize,
}

/// `DELETE /auth/account`: removes the caller and everything they own.
pub fn delete_account(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let repo = ctx.repo();
    let mut counts = DeletedCounts::default();

    for tanda in repo.tandas_by_admin(&claims.id)? {
        for participant in repo.participants(&tanda.id)? {
            repo.delete_participant(&tanda.id, &participant.participante_id)?;
            counts.participantes_eliminados += 1;
        }
        for payment in repo.payments(&tanda.id)? {
            repo.delete_payment(&tanda.id, &payment.pago_id)?;
            counts.pagos_eliminados += 1;
        }
        for notification in repo.notifications(&tanda.id)? {
            repo.delete_notification(&tanda.id, &notification.notificacion_id)?;
            counts.notificaciones_eliminadas += 1;
        }
        for link in repo.links_for_tanda(&tanda.id)? {
            repo.delete_link(&link.token)?;
            counts.links_eliminados += 1;
        }
        repo.delete_tanda(&tanda.id)?;
        counts.tandas_eliminadas += 1;
    }
    repo.delete_user(&claims.id)?;
    tracing::info!(
        component = "auth",
        event = "account_deleted",
        user_id = %claims.id,
        tandas = counts.tandas_eliminadas,
        participantes = counts.participantes_eliminados,
        pagos = counts.pagos_eliminados
    );

    success_with_message(
        200,
        json!({
            "userId": claims.id,
            "eliminados": counts,
            "timestamp": ctx.timestamp(),
        }),
        Some("Cuenta eliminada exitosamente"),
    )
}
