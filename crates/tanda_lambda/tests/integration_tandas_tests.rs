mod support;

use chrono::Duration;
use serde_json::json;
use support::{error_code, ApiEvent, TestApp};

#[test]
fn creates_and_reads_a_tanda() {
    let app = TestApp::new();
    let (user_id, token) = app.register_admin("ana@example.com");

    let (status, body) = app.send(ApiEvent::new("POST /tandas").bearer(&token).body(json!({
        "nombre": "Oficina",
        "montoPorRonda": "1500",
        "totalRondas": 10,
        "frecuencia": "semanal",
        "fechaInicio": "2025-02-03",
    })));
    assert_eq!(status, 201);
    let data = &body["data"];
    let tanda_id = data["tandaId"].as_str().expect("tanda id").to_string();
    assert_eq!(data["montoPorRonda"], json!(1500));
    assert_eq!(data["rondaActual"], json!(1));
    assert_eq!(data["adminId"], json!(user_id));
    assert_eq!(data["fechaInicio"], json!("2025-02-03"));
    assert_eq!(
        data["urlPublica"],
        json!(format!("http://localhost:3000?tanda={tanda_id}"))
    );

    let users = app.store.items(&app.config.tables.usuarios);
    assert_eq!(users[0]["tandas"], json!([tanda_id]));

    let (status, body) = app.send(ApiEvent::new("GET /tandas/{tandaId}").path("tandaId", &tanda_id));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["nombre"], json!("Oficina"));
    assert_eq!(body["data"]["participantes"], json!([]));
}

#[test]
fn create_requires_name_amount_and_rounds() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas")
            .bearer(&token)
            .body(json!({"nombre": "Oficina", "montoPorRonda": 0, "totalRondas": 10})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "MISSING_REQUIRED_FIELDS");
}

#[test]
fn ownership_is_enforced_on_updates() {
    let app = TestApp::new();
    let (_, owner) = app.register_admin("ana@example.com");
    let (_, intruder) = app.register_admin("beto@example.com");
    let tanda_id = app.normal_tanda(&owner, 10);

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}")
            .path("tandaId", &tanda_id)
            .bearer(&intruder)
            .body(json!({"nombre": "Mía"})),
    );
    assert_eq!(status, 403);
    assert_eq!(error_code(&body), "FORBIDDEN");

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}")
            .path("tandaId", "tanda_missing")
            .bearer(&owner)
            .body(json!({"nombre": "Mía"})),
    );
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "TANDA_NOT_FOUND");

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}")
            .path("tandaId", &tanda_id)
            .bearer(&owner)
            .body(json!({"rondaActual": "tres"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "INVALID_FIELD");

    let (status, _) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}")
            .path("tandaId", &tanda_id)
            .bearer(&owner)
            .body(json!({"rondaActual": 3, "nombre": "Oficina 2025"})),
    );
    assert_eq!(status, 200);
    let stored = app.store.items(&app.config.tables.tandas);
    assert_eq!(stored[0]["rondaActual"], json!(3));
    assert_eq!(stored[0]["nombre"], json!("Oficina 2025"));
}

#[test]
fn list_summarizes_owned_tandas_with_sorted_participants() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let (_, other) = app.register_admin("beto@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    app.normal_tanda(&other, 5);
    for (nombre, slot) in [("Carla", 3), ("Luis", 1)] {
        app.add_participant(
            &token,
            &tanda_id,
            json!({"nombre": nombre, "telefono": "5512345678", "numeroAsignado": slot}),
        );
    }

    let (status, body) = app.send(ApiEvent::new("GET /tandas").bearer(&token));
    assert_eq!(status, 200);
    let tandas = body["data"]["tandas"].as_array().expect("tandas");
    assert_eq!(tandas.len(), 1);
    let names: Vec<&str> = tandas[0]["participantes"]
        .as_array()
        .expect("participants")
        .iter()
        .filter_map(|participant| participant["nombre"].as_str())
        .collect();
    assert_eq!(names, vec!["Luis", "Carla"]);
}

#[test]
fn delete_cascades_and_detaches_from_owner() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let participant_id = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Luis", "telefono": "5512345678", "numeroAsignado": 1}),
    );
    app.send(
        ApiEvent::new("POST /tandas/{tandaId}/pagos")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"participanteId": participant_id, "ronda": 1, "pagado": true})),
    );

    let (status, body) = app.send(
        ApiEvent::new("DELETE /tandas/{tandaId}")
            .path("tandaId", &tanda_id)
            .bearer(&token),
    );
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["estadisticas"],
        json!({"participantes": 1, "pagos": 1, "notificaciones": 0, "tanda": true, "usuario": true})
    );
    assert!(app.store.items(&app.config.tables.tandas).is_empty());
    let users = app.store.items(&app.config.tables.usuarios);
    assert_eq!(users[0]["tandas"], json!([]));
}

#[test]
fn registration_links_expire() {
    let mut app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/registro-link")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"duracionHoras": 6})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "INVALID_DURATION");

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/registro-link")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"duracionHoras": 12})),
    );
    assert_eq!(status, 200);
    let link_token = body["data"]["token"].as_str().expect("token").to_string();
    assert_eq!(body["data"]["expiracion"], json!("2025-01-24T22:00:00.000000"));

    let (status, body) = app.send(
        ApiEvent::new("GET /tandas/{tandaId}/registro-link/activo")
            .path("tandaId", &tanda_id)
            .bearer(&token),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["token"], json!(link_token));

    let (status, body) = app.send(ApiEvent::new("GET /registro/{token}").path("token", &link_token));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["nombre"], json!("Oficina"));
    assert_eq!(body["data"]["frecuencia"], json!("semanal"));

    app.now += Duration::hours(12);
    let (status, body) = app.send(ApiEvent::new("GET /registro/{token}").path("token", &link_token));
    assert_eq!(status, 403);
    assert_eq!(error_code(&body), "LINK_EXPIRED");
    let (status, body) = app.send(
        ApiEvent::new("GET /tandas/{tandaId}/registro-link/activo")
            .path("tandaId", &tanda_id)
            .bearer(&token),
    );
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "LINK_NOT_FOUND");

    let (status, body) = app.send(ApiEvent::new("GET /registro/{token}").path("token", "desconocido"));
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "LINK_NOT_FOUND");
}

#[test]
fn updates_keep_the_tanda_readable() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let put = |body| {
        app.send(
            ApiEvent::new("PUT /tandas/{tandaId}")
                .path("tandaId", &tanda_id)
                .bearer(&token)
                .body(body),
        )
    };

    for body in [
        json!({"nombre": null}),
        json!({"nombre": ""}),
        json!({"fechaInicio": ["2025-01-06"]}),
        json!({"configuracion": "semanal"}),
        json!({"configuracion": {"metodoPago": 3}, "nombre": null}),
    ] {
        let (status, response) = put(body.clone());
        assert_eq!(status, 400, "{body}");
        assert_eq!(error_code(&response), "INVALID_FIELD");
    }

    let (status, _) = put(json!({
        "nombre": 2025,
        "fechaInicio": 20250106,
        "configuracion": {"recordatoriosDias": 2},
    }));
    assert_eq!(status, 200);

    let (status, body) = app.send(ApiEvent::new("GET /tandas/{tandaId}").path("tandaId", &tanda_id));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["nombre"], json!("2025"));
    assert_eq!(body["data"]["fechaInicio"], json!("20250106"));
    assert_eq!(body["data"]["configuracion"]["recordatoriosDias"], json!(2));

    let (status, body) = app.send(ApiEvent::new("GET /tandas").bearer(&token));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["tandas"][0]["nombre"], json!("2025"));
}
