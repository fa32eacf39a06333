mod support;

use chrono::Duration;
use serde_json::{json, Value};
use support::{error_code, ApiEvent, TestApp, PASSWORD};

#[test]
fn register_login_and_refresh_issue_sessions() {
    let app = TestApp::new();
    let (user_id, _) = app.register_admin("ana@example.com");

    let (status, body) = app.send(ApiEvent::new("POST /auth/register").body(json!({
        "email": "ana@example.com",
        "password": "Otra1234",
        "nombre": "Ana",
    })));
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "EMAIL_EXISTS");

    let (status, body) = app.send(ApiEvent::new("POST /auth/login").body(json!({
        "email": "ana@example.com",
        "password": "incorrecta",
    })));
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "INVALID_CREDENTIALS");

    let (status, body) = app.send(ApiEvent::new("POST /auth/login").body(json!({
        "email": "ana@example.com",
        "password": PASSWORD,
    })));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], Value::from(user_id.clone()));
    assert_eq!(body["data"]["expiresIn"], json!(3600));
    let refresh_token = body["data"]["refreshToken"].as_str().expect("refresh").to_string();

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/refresh").body(json!({"refreshToken": refresh_token})),
    );
    assert_eq!(status, 200);
    assert!(body["data"]["token"].is_string());

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/refresh").body(json!({"refreshToken": "not-a-jwt"})),
    );
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "INVALID_TOKEN");
}

#[test]
fn protected_routes_require_a_valid_bearer() {
    let mut app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");

    let (status, body) = app.send(ApiEvent::new("GET /tandas"));
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "UNAUTHORIZED");

    app.now += Duration::hours(25);
    let (status, _) = app.send(ApiEvent::new("GET /tandas").bearer(&token));
    assert_eq!(status, 401);
}

#[test]
fn unknown_routes_and_preflight() {
    let app = TestApp::new();

    let (status, body) = app.send(ApiEvent::new("GET /desconocido"));
    assert_eq!(status, 400);
    assert_eq!(body, json!({"error_code": "0001", "error_msg": "Recurso invalido"}));

    let (status, body) = app.send(ApiEvent::new("OPTIONS /tandas"));
    assert_eq!(status, 200);
    assert_eq!(body, json!({"message": "OK"}));
}

#[test]
fn password_reset_round_trip() {
    let app = TestApp::new();
    app.register_admin("ana@example.com");

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/forgot-password").body(json!({"email": "  ANA@example.com "})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, "soporte@tandas.test");

    let stored = app.store.items(&app.config.tables.reset_tokens);
    assert_eq!(stored.len(), 1);
    let token = stored[0]["token"].as_str().expect("token").to_string();
    assert_eq!(token.len(), 64);
    assert!(sent[0]
        .text
        .contains(&format!("https://app.tandas.test/reset-password/{token}")));

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/reset-password")
            .body(json!({"token": token, "newPassword": "debil"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "WEAK_PASSWORD");

    let (status, _) = app.send(
        ApiEvent::new("POST /auth/reset-password")
            .body(json!({"token": token, "newPassword": "NuevaClave9"})),
    );
    assert_eq!(status, 200);
    assert!(app.store.items(&app.config.tables.reset_tokens).is_empty());

    let (status, _) = app.send(ApiEvent::new("POST /auth/login").body(json!({
        "email": "ana@example.com",
        "password": "NuevaClave9",
    })));
    assert_eq!(status, 200);
}

#[test]
fn forgot_password_hides_unknown_emails() {
    let app = TestApp::new();
    let (status, body) = app.send(
        ApiEvent::new("POST /auth/forgot-password").body(json!({"email": "nadie@example.com"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
    assert!(app.mailer.sent().is_empty());

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/forgot-password").body(json!({"email": "sin-arroba"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "INVALID_EMAIL");
}

#[test]
fn change_password_checks_the_current_one() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/change-password")
            .bearer(&token)
            .body(json!({"currentPassword": "Equivocada1", "newPassword": "NuevaClave9"})),
    );
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "INVALID_PASSWORD");

    let (status, body) = app.send(
        ApiEvent::new("POST /auth/change-password")
            .bearer(&token)
            .body(json!({"currentPassword": PASSWORD, "newPassword": PASSWORD})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "SAME_PASSWORD");

    let (status, _) = app.send(
        ApiEvent::new("POST /auth/change-password")
            .bearer(&token)
            .body(json!({"currentPassword": PASSWORD, "newPassword": "NuevaClave9"})),
    );
    assert_eq!(status, 200);
}

#[test]
fn deletion_request_is_recorded_once() {
    let app = TestApp::new();
    app.register_admin("ana@example.com");

    let (status, body) = app.send(
        ApiEvent::new("PUT /auth/register")
            .body(json!({"email": " Ana@Example.com", "reason": "  "})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["deletionDate"], json!("2025-02-23"));
    assert_eq!(body["data"]["daysRemaining"], json!(30));

    let users = app.store.items(&app.config.tables.usuarios);
    assert_eq!(users[0]["estadoCuenta"], json!("PENDIENTE_ELIMINACION"));
    assert_eq!(
        users[0]["solicitudEliminacion"]["motivo"],
        json!("No proporcionado")
    );

    let (status, body) = app.send(
        ApiEvent::new("PUT /auth/register").body(json!({"email": "ana@example.com"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "DELETION_ALREADY_REQUESTED");
}

#[test]
fn account_deletion_cascades_owned_data() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let participant_id = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Luis", "telefono": "5512345678", "numeroAsignado": 1}),
    );
    let (status, _) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/pagos")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"participanteId": participant_id, "ronda": 1, "pagado": true})),
    );
    assert_eq!(status, 201);
    let (status, _) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/registro-link")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"duracionHoras": 24})),
    );
    assert_eq!(status, 200);

    let (status, body) = app.send(ApiEvent::new("DELETE /auth/account").bearer(&token));
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["eliminados"],
        json!({
            "tandas_eliminadas": 1,
            "participantes_eliminados": 1,
            "pagos_eliminados": 1,
            "links_eliminados": 1,
            "notificaciones_eliminadas": 0,
        })
    );
    let tables = &app.config.tables;
    for table in [&tables.usuarios, &tables.tandas, &tables.participantes, &tables.pagos, &tables.links] {
        assert!(app.store.items(table).is_empty(), "{table} should be empty");
    }
}
