//! Password recovery: reset-link requests, token redemption and in-session
//! password changes.

use chrono::Duration;
use serde_json::Value;
use tanda_core::contract::ResetToken;
use tanda_core::ids;
use tanda_core::validation::{check_password_strength, is_valid_email, normalize_email, text_field};

use crate::adapters::kv_store::Item;
use crate::adapters::messaging::EmailMessage;
use crate::context::ApiContext;
use crate::http::{acknowledged, ApiError, ApiGatewayResponse, ApiRequest};

const RESET_SUBJECT: &str = "Recuperación de Contraseña - TandasMX";
const RESET_REQUESTED: &str =
    "Si el correo existe en nuestro sistema, recibirás instrucciones para resetear tu contraseña";
const PASSWORD_UPDATED: &str = "Contraseña actualizada exitosamente";

fn reset_email_html(reset_url: &str, hours: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Recuperación de Contraseña</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #f8f9fa; padding: 20px; border-radius: 5px;">
        <h2 style="color: #2c3e50;">Recuperación de Contraseña</h2>
        <p>Hola,</p>
        <p>Recibimos una solicitud para restablecer la contraseña de tu cuenta en TandasMX.</p>
        <p>Para crear una nueva contraseña, haz clic en el siguiente botón:</p>
        <div style="text-align: center; margin: 30px 0;">
            <a href="{reset_url}" style="background-color: #007bff; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px; display: inline-block; font-weight: bold;">Restablecer Contraseña</a>
        </div>
        <p>O copia y pega este enlace en tu navegador:</p>
        <p style="background-color: #e9ecef; padding: 10px; border-radius: 3px; word-break: break-all;">{reset_url}</p>
        <p><strong>Este enlace expirará en {hours} horas.</strong></p>
        <p style="font-size: 14px; color: #666;">Si no solicitaste restablecer tu contraseña, puedes ignorar este correo de forma segura.</p>
        <p style="font-size: 14px; color: #666;">Saludos,<br>El equipo de TandasMX</p>
    </div>
</body>
</html>"#
    )
}

fn reset_email_text(reset_url: &str, hours: i64) -> String {
    format!(
        "Recuperación de Contraseña - TandasMX\n\n\
         Hola,\n\n\
         Recibimos una solicitud para restablecer la contraseña de tu cuenta en TandasMX.\n\n\
         Para crear una nueva contraseña, visita el siguiente enlace:\n\
         {reset_url}\n\n\
         Este enlace expirará en {hours} horas.\n\n\
         Si no solicitaste restablecer tu contraseña, puedes ignorar este correo de forma segura.\n\n\
         Saludos,\n\
         El equipo de TandasMX\n"
    )
}

pub fn forgot_password(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let email = normalize_email(
        request
            .body
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    );
    if email.is_empty() || !is_valid_email(&email) {
        return Err(ApiError::bad_request("INVALID_EMAIL", "Email inválido"));
    }

    let repo = ctx.repo();
    let Some(user) = repo.user_by_email(&email)? else {
        tracing::info!(component = "recovery", event = "unknown_email");
        return Ok(acknowledged(RESET_REQUESTED));
    };
    let sender = ctx
        .config
        .support_email
        .clone()
        .ok_or_else(|| ApiError::Internal("SUPPORT_EMAIL must be configured".to_string()))?;

    let hours = ctx.config.token_expiration_hours;
    let token = ResetToken {
        token: ids::reset_token(),
        email: email.clone(),
        user_id: user.id.clone(),
        expires_at: (ctx.now + Duration::hours(hours)).timestamp(),
        created_at: Some(ctx.timestamp()),
    };
    repo.put_reset_token(&token)?;

    let reset_url = format!(
        "{}/reset-password/{}",
        ctx.config.frontend_url.trim_end_matches('/'),
        token.token
    );
    ctx.mailer
        .send_email(&EmailMessage {
            from: sender,
            to: email,
            subject: RESET_SUBJECT.to_string(),
            html: reset_email_html(&reset_url, hours),
            text: reset_email_text(&reset_url, hours),
        })
        .map_err(|error| ApiError::Internal(error.to_string()))?;
    tracing::info!(component = "recovery", event = "reset_link_sent", user_id = %user.id);

    Ok(acknowledged(RESET_REQUESTED))
}

fn password_changes(ctx: &ApiContext, new_password: &str) -> Item {
    let mut changes = Item::new();
    changes.insert(
        "passwordHash".to_string(),
        Value::from(ctx.passwords.hash(new_password)),
    );
    changes.insert("updatedAt".to_string(), Value::from(ctx.timestamp()));
    changes
}

pub fn reset_password(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let token = request
        .body
        .get("token")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let new_password = request
        .body
        .get("newPassword")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if token.is_empty() || new_password.is_empty() {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "Token y nueva contraseña son requeridos",
        ));
    }
    check_password_strength(new_password)
        .map_err(|error| ApiError::bad_request("WEAK_PASSWORD", error.message()))?;

    let repo = ctx.repo();
    let stored = repo
        .reset_token(token)?
        .ok_or_else(|| ApiError::bad_request("INVALID_TOKEN", "Token inválido o expirado"))?;
    if ctx.now.timestamp() > stored.expires_at {
        repo.delete_reset_token(token)?;
        return Err(ApiError::bad_request(
            "TOKEN_EXPIRED",
            "El token ha expirado. Solicita un nuevo enlace de recuperación",
        ));
    }

    repo.update_user(&stored.user_id, &password_changes(ctx, new_password))?;
    repo.delete_reset_token(token)?;
    tracing::info!(component = "recovery", event = "password_reset", user_id = %stored.user_id);
    Ok(acknowledged(PASSWORD_UPDATED))
}

pub fn change_password(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let (Some(current), Some(new_password)) = (
        text_field(&request.body, "currentPassword"),
        text_field(&request.body, "newPassword"),
    ) else {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "Contraseña actual y nueva contraseña son requeridas",
        ));
    };
    if current == new_password {
        return Err(ApiError::bad_request(
            "SAME_PASSWORD",
            "La nueva contraseña debe ser diferente a la actual",
        ));
    }

    let repo = ctx.repo();
    let user = repo
        .user(&claims.id)?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", "Usuario no encontrado"))?;
    let verified = user
        .password_hash
        .as_deref()
        .map(|stored| ctx.passwords.verify(&current, stored))
        .unwrap_or(false);
    if !verified {
        return Err(ApiError::client(
            401,
            "INVALID_PASSWORD",
            "La contraseña actual es incorrecta",
        ));
    }

    repo.update_user(&user.id, &password_changes(ctx, &new_password))?;
    tracing::info!(component = "recovery", event = "password_changed", user_id = %user.id);
    Ok(acknowledged(PASSWORD_UPDATED))
}
