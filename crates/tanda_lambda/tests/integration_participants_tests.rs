mod support;

use serde_json::json;
use support::{error_code, ApiEvent, TestApp};

fn slots(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
    pairs
        .iter()
        .map(|(name, slot)| (name.to_string(), *slot))
        .collect()
}

#[test]
fn normal_tanda_slots_are_unique() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let luis = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Luis", "telefono": "5512345678", "numeroAsignado": 1}),
    );

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/participantes")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"nombre": "Carla", "telefono": "5587654321", "numeroAsignado": 1})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "NUMERO_DUPLICADO");

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/participantes")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"nombre": "Carla"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "MISSING_FIELDS");

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &luis)
            .bearer(&token)
            .body(json!({"numeroAsignado": 4, "telefono": "5500000000"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["numeroAnterior"], json!(1));
    assert_eq!(body["data"]["numeroNuevo"], json!(4));
    assert_eq!(body["data"]["numerosRecalculados"], json!(false));
    assert_eq!(app.slots(&tanda_id), slots(&[("Luis", 4)]));
}

#[test]
fn birthday_tanda_orders_by_month_and_day() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.birthday_tanda(&token);

    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/participantes")
            .path("tandaId", &tanda_id)
            .bearer(&token)
            .body(json!({"nombre": "Sin fecha", "telefono": "5512345678"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "MISSING_BIRTHDAY");

    app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Mayo", "telefono": "5511111111", "fechaCumpleaños": "1990-05-10"}),
    );
    let marzo = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Marzo", "telefono": "5522222222", "fechaCumpleaños": "1985-03-02"}),
    );
    app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Diciembre", "telefono": "5533333333", "fechaCumpleaños": "2000-12-25"}),
    );
    assert_eq!(
        app.slots(&tanda_id),
        slots(&[("Marzo", 1), ("Mayo", 2), ("Diciembre", 3)])
    );

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &marzo)
            .bearer(&token)
            .body(json!({"numeroAsignado": 3})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "NUMERO_NO_EDITABLE");

    let (status, body) = app.send(
        ApiEvent::new("PUT /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &marzo)
            .bearer(&token)
            .body(json!({"fechaCumpleaños": "1985-06-01"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["numeroAnterior"], json!(1));
    assert_eq!(body["data"]["numeroNuevo"], json!(2));
    assert_eq!(body["data"]["numerosRecalculados"], json!(true));
    assert_eq!(
        app.slots(&tanda_id),
        slots(&[("Mayo", 1), ("Marzo", 2), ("Diciembre", 3)])
    );

    let (status, body) = app.send(
        ApiEvent::new("DELETE /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &marzo)
            .bearer(&token),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["numerosRecalculados"], json!(true));
    assert_eq!(app.slots(&tanda_id), slots(&[("Mayo", 1), ("Diciembre", 2)]));
}

#[test]
fn delete_removes_the_participants_payments() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let luis = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Luis", "telefono": "5512345678", "numeroAsignado": 1}),
    );
    let carla = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Carla", "telefono": "5587654321", "numeroAsignado": 2}),
    );
    for (participant, ronda) in [(&luis, 1), (&luis, 2), (&carla, 1)] {
        let (status, _) = app.send(
            ApiEvent::new("POST /tandas/{tandaId}/pagos")
                .path("tandaId", &tanda_id)
                .bearer(&token)
                .body(json!({"participanteId": participant, "ronda": ronda, "pagado": true})),
        );
        assert_eq!(status, 201);
    }

    let (status, body) = app.send(
        ApiEvent::new("DELETE /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &luis)
            .bearer(&token),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["pagosEliminados"], json!(2));
    assert_eq!(body["data"]["numerosRecalculados"], json!(false));

    let remaining = app.store.items(&app.config.tables.pagos);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["participanteId"], json!(carla));

    let (status, body) = app.send(
        ApiEvent::new("DELETE /tandas/{tandaId}/participantes/{participanteId}")
            .path("tandaId", &tanda_id)
            .path("participanteId", &luis)
            .bearer(&token),
    );
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "PARTICIPANTE_NOT_FOUND");
}

fn registration_link(app: &TestApp, token: &str, tanda_id: &str) -> String {
    let (status, body) = app.send(
        ApiEvent::new("POST /tandas/{tandaId}/registro-link")
            .path("tandaId", tanda_id)
            .bearer(token)
            .body(json!({})),
    );
    assert_eq!(status, 200);
    body["data"]["token"].as_str().expect("link token").to_string()
}

#[test]
fn public_registration_claims_chosen_numbers() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let link = registration_link(&app, &token, &tanda_id);

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "  Rosa ", "telefono": "5512345678", "numeros": [2, "5"]})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["participantes"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"]["esCumpleañera"], json!(false));
    assert_eq!(
        body["data"]["mensaje"],
        json!("2 participante(s) registrado(s) exitosamente")
    );
    assert_eq!(app.slots(&tanda_id), slots(&[("Rosa", 2), ("Rosa", 5)]));

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "Pepe", "telefono": "5599999999", "numeros": [5]})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "NUMERO_OCUPADO");

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "Pepe", "telefono": "5599999999", "numeros": [1, 3, 4, 6, 7, 8]})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "TOO_MANY_NUMBERS");

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "Pepe", "numeros": [1]})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "MISSING_FIELDS");
}

#[test]
fn public_registration_in_birthday_tanda_derives_the_slot() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.birthday_tanda(&token);
    app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Marzo", "telefono": "5522222222", "fechaCumpleaños": "1985-03-02"}),
    );
    let link = registration_link(&app, &token, &tanda_id);

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "Enero", "telefono": "5512345678", "fechaCumpleaños": "15/01/1992"})),
    );
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "INVALID_DATE");

    let (status, body) = app.send(
        ApiEvent::new("POST /registro/{token}")
            .path("token", &link)
            .body(json!({"nombre": "Enero", "telefono": "5512345678", "fechaCumpleaños": "1992-01-15"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["esCumpleañera"], json!(true));
    assert_eq!(body["data"]["numeroAsignado"], json!(1));
    assert_eq!(app.slots(&tanda_id), slots(&[("Enero", 1), ("Marzo", 2)]));
}

#[test]
fn participant_updates_coerce_or_reject_field_types() {
    let app = TestApp::new();
    let (_, token) = app.register_admin("ana@example.com");
    let tanda_id = app.normal_tanda(&token, 10);
    let luis = app.add_participant(
        &token,
        &tanda_id,
        json!({"nombre": "Luis", "telefono": "5512345678", "numeroAsignado": 1, "email": "luis@example.com"}),
    );
    let put = |body| {
        app.send(
            ApiEvent::new("PUT /tandas/{tandaId}/participantes/{participanteId}")
                .path("tandaId", &tanda_id)
                .path("participanteId", &luis)
                .bearer(&token)
                .body(body),
        )
    };

    for body in [
        json!({"telefono": null}),
        json!({"nombre": {"primero": "Luis"}}),
        json!({"email": 7.5, "telefono": true}),
    ] {
        let (status, response) = put(body.clone());
        assert_eq!(status, 400, "{body}");
        assert_eq!(error_code(&response), "INVALID_FIELD");
    }

    let (status, _) = put(json!({"telefono": 5599999999u64, "email": null}));
    assert_eq!(status, 200);

    let (status, body) = app.send(
        ApiEvent::new("GET /tandas/{tandaId}/participantes")
            .path("tandaId", &tanda_id)
            .bearer(&token),
    );
    assert_eq!(status, 200);
    let listed = &body["data"]["participantes"][0];
    assert_eq!(listed["telefono"], json!("5599999999"));
    assert!(listed["email"].is_null());

    let (status, _) = app.send(ApiEvent::new("GET /tandas/{tandaId}").path("tandaId", &tanda_id));
    assert_eq!(status, 200);
}
