//! Participant management by the tanda owner and public self-registration
//! through a registration link.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};
use tanda_core::calendar::parse_date;
use tanda_core::contract::{Participant, Tanda};
use tanda_core::ids;
use tanda_core::ledger::{payment_prefix, sort_by_slot};
use tanda_core::rotation::{provisional_slot, SlotAssignment};
use tanda_core::validation::{count_field, text_field};

use super::links::usable_link;
use super::{optional_text_change, required_text_change, to_value};
use crate::adapters::kv_store::Item;
use crate::context::ApiContext;
use crate::http::{success, success_with_message, ApiError, ApiGatewayResponse, ApiRequest};

fn participant_not_found() -> ApiError {
    ApiError::not_found("PARTICIPANTE_NOT_FOUND", "Participante no encontrado")
}

fn duplicate_slot(slot: u32) -> ApiError {
    ApiError::bad_request("NUMERO_DUPLICADO", format!("El número {slot} ya está asignado"))
}

fn missing_birthday() -> ApiError {
    ApiError::bad_request(
        "MISSING_BIRTHDAY",
        "La fecha de cumpleaños es obligatoria para tandas cumpleañeras",
    )
}

fn slot_of(assignments: &[SlotAssignment], participant_id: &str) -> Option<u32> {
    assignments
        .iter()
        .find(|assignment| assignment.participant_id == participant_id)
        .map(|assignment| assignment.slot)
}

fn trimmed(body: &Value, name: &str) -> Option<String> {
    text_field(body, name)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub fn create(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;

    let body = &request.body;
    let (Some(nombre), Some(telefono)) = (text_field(body, "nombre"), text_field(body, "telefono"))
    else {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "Nombre y teléfono son requeridos",
        ));
    };
    let birthday = text_field(body, "fechaCumpleaños");
    let existing = repo.participants(tanda_id)?;
    let registered_at = ctx.naive_now();

    let slot = if tanda.is_birthday() {
        let birthday = birthday.as_deref().ok_or_else(missing_birthday)?;
        provisional_slot(birthday, &existing, registered_at)
    } else {
        let slot = count_field(body, "numeroAsignado")
            .filter(|slot| *slot > 0)
            .ok_or_else(|| {
                ApiError::bad_request("MISSING_FIELDS", "El número asignado es requerido")
            })?;
        if existing.iter().any(|other| other.numero_asignado == slot) {
            return Err(duplicate_slot(slot));
        }
        slot
    };

    let timestamp = ctx.timestamp();
    let mut participant = Participant {
        tanda_id: tanda_id.to_string(),
        participante_id: ids::participant_id(),
        nombre,
        telefono,
        email: Some(text_field(body, "email").unwrap_or_default()),
        numero_asignado: slot,
        fecha_cumpleanos: birthday,
        fecha_registro: Some(timestamp.clone()),
        created_at: Some(timestamp.clone()),
        updated_at: Some(timestamp.clone()),
        comentarios: None,
        registrado_por_link: None,
        user_id: None,
        extra: Item::new(),
    };
    repo.put_participant(&participant)?;

    if tanda.is_birthday() {
        let assignments = repo.renumber_participants(tanda_id, &timestamp)?;
        if let Some(slot) = slot_of(&assignments, &participant.participante_id) {
            participant.numero_asignado = slot;
        }
    }
    tracing::info!(
        component = "participants",
        event = "participant_added",
        tanda_id,
        participant_id = %participant.participante_id,
        slot = participant.numero_asignado
    );

    let mut data = to_value(&participant)?;
    data["tandaId"] = Value::from(tanda_id);
    success(201, data)
}

/// Public listing ordered by slot.
pub fn list(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let tanda_id = request.path_param("tandaId")?;
    let mut participants = ctx.repo().participants(tanda_id)?;
    sort_by_slot(&mut participants);
    let total = participants.len();
    success(200, json!({"participantes": participants, "total": total}))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantUpdate {
    participante_id: String,
    updated_at: String,
    numero_anterior: u32,
    numero_nuevo: u32,
    numeros_recalculados: bool,
}

pub fn update(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let participant_id = request.path_param("participanteId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    let current = repo
        .participant(tanda_id, participant_id)?
        .ok_or_else(participant_not_found)?;

    let body = &request.body;
    let requested_slot = if body.get("numeroAsignado").is_some() {
        if tanda.is_birthday() && body.get("fechaCumpleaños").is_none() {
            return Err(ApiError::bad_request(
                "NUMERO_NO_EDITABLE",
                "En tandas cumpleañeras el número se asigna automáticamente por fecha de cumpleaños",
            ));
        }
        if tanda.is_birthday() {
            None
        } else {
            let slot = count_field(body, "numeroAsignado")
                .filter(|slot| *slot > 0)
                .ok_or_else(|| {
                    ApiError::bad_request("INVALID_FIELD", "numeroAsignado debe ser un número entero")
                })?;
            let taken = repo.participants(tanda_id)?.iter().any(|other| {
                other.participante_id != participant_id && other.numero_asignado == slot
            });
            if taken {
                return Err(duplicate_slot(slot));
            }
            Some(slot)
        }
    } else {
        None
    };

    let updated_at = ctx.timestamp();
    let mut changes = Item::new();
    changes.insert("updatedAt".to_string(), Value::from(updated_at.clone()));
    for name in ["nombre", "telefono", "fechaCumpleaños"] {
        if let Some(value) = required_text_change(body, name)? {
            changes.insert(name.to_string(), value);
        }
    }
    for name in ["email", "comentarios"] {
        if let Some(value) = optional_text_change(body, name)? {
            changes.insert(name.to_string(), value);
        }
    }
    let birthday_changed = tanda.is_birthday()
        && changes
            .get("fechaCumpleaños")
            .is_some_and(|value| value.as_str() != current.fecha_cumpleanos.as_deref());
    if let Some(slot) = requested_slot {
        changes.insert("numeroAsignado".to_string(), Value::from(slot));
    }
    repo.update_participant(tanda_id, participant_id, &changes)?;

    let previous = current.numero_asignado;
    let mut numero_nuevo = requested_slot.unwrap_or(previous);
    let mut recalculated = false;
    if birthday_changed {
        let assignments = repo.renumber_participants(tanda_id, &updated_at)?;
        numero_nuevo = slot_of(&assignments, participant_id).unwrap_or(previous);
        recalculated = numero_nuevo != previous;
    }
    tracing::info!(
        component = "participants",
        event = "participant_updated",
        tanda_id,
        participant_id,
        previous,
        slot = numero_nuevo,
        birthday_changed
    );

    success(
        200,
        ParticipantUpdate {
            participante_id: participant_id.to_string(),
            updated_at,
            numero_anterior: previous,
            numero_nuevo,
            numeros_recalculados: recalculated,
        },
    )
}

/// Removes a participant together with every payment keyed under it.
pub fn delete(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let participant_id = request.path_param("participanteId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    repo.participant(tanda_id, participant_id)?
        .ok_or_else(participant_not_found)?;

    let payments = repo.payments_with_prefix(tanda_id, &payment_prefix(participant_id))?;
    for payment in &payments {
        repo.delete_payment(tanda_id, &payment.pago_id)?;
    }
    repo.delete_participant(tanda_id, participant_id)?;
    if tanda.is_birthday() {
        repo.renumber_participants(tanda_id, &ctx.timestamp())?;
    }
    tracing::info!(
        component = "participants",
        event = "participant_deleted",
        tanda_id,
        participant_id,
        payments = payments.len()
    );

    success_with_message(
        200,
        json!({
            "participanteId": participant_id,
            "pagosEliminados": payments.len(),
            "numerosRecalculados": tanda.is_birthday(),
        }),
        Some("Participante eliminado exitosamente"),
    )
}

fn requested_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers a registrant asked for, checked against capacity and occupancy.
fn chosen_numbers(body: &Value, tanda: &Tanda, existing: &[Participant]) -> Result<Vec<u32>, ApiError> {
    let requested = match body.get("numeros") {
        Some(Value::Array(values)) if !values.is_empty() => values,
        _ => {
            return Err(ApiError::bad_request(
                "MISSING_NUMBERS",
                "Debe seleccionar al menos un número",
            ))
        }
    };
    let max = tanda.total_rondas / 2;
    if requested.len() > max as usize {
        return Err(ApiError::bad_request(
            "TOO_MANY_NUMBERS",
            format!("Solo puedes seleccionar hasta {max} números (50% del total)"),
        ));
    }

    let mut occupied: HashSet<u32> = existing
        .iter()
        .map(|participant| participant.numero_asignado)
        .collect();
    let mut numbers = Vec::with_capacity(requested.len());
    for value in requested {
        let out_of_range = || {
            ApiError::bad_request(
                "NUMERO_FUERA_DE_RANGO",
                format!("Número {value} fuera de rango (1-{})", tanda.total_rondas),
            )
        };
        let number = requested_number(value).ok_or_else(out_of_range)?;
        if occupied.contains(&number) {
            return Err(ApiError::bad_request(
                "NUMERO_OCUPADO",
                format!("El número {number} ya está ocupado"),
            ));
        }
        if number < 1 || number > tanda.total_rondas {
            return Err(out_of_range());
        }
        occupied.insert(number);
        numbers.push(number);
    }
    Ok(numbers)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Registered {
    participante_id: String,
    nombre: String,
    telefono: String,
    numero_asignado: u32,
    #[serde(rename = "fechaCumpleaños")]
    fecha_cumpleanos: Option<String>,
}

/// `POST /registro/{token}`: self-registration of one participant per chosen
/// number, or a single birthday-ordered participant.
pub fn register(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let token = request.path_param("token")?;
    let body = &request.body;
    let (Some(nombre), Some(telefono)) = (trimmed(body, "nombre"), trimmed(body, "telefono")) else {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            "Nombre y teléfono son obligatorios",
        ));
    };
    let email = trimmed(body, "email");
    let birthday = trimmed(body, "fechaCumpleaños");

    let (link, tanda) = usable_link(ctx, token)?;
    let birthday_tanda = tanda.is_birthday();
    if birthday_tanda {
        let text = birthday.as_deref().ok_or_else(missing_birthday)?;
        if parse_date(text).is_none() {
            return Err(ApiError::bad_request(
                "INVALID_DATE",
                "Formato de fecha inválido. Use YYYY-MM-DD",
            ));
        }
    }

    let repo = ctx.repo();
    let existing = repo.participants(&tanda.id)?;
    let registered_at = ctx.naive_now();
    let numbers = match birthday.as_deref() {
        Some(text) if birthday_tanda => vec![provisional_slot(text, &existing, registered_at)],
        _ => chosen_numbers(body, &tanda, &existing)?,
    };

    let timestamp = ctx.timestamp();
    let mut registered = Vec::with_capacity(numbers.len());
    for number in &numbers {
        let mut extra = Item::new();
        extra.insert("tandaId".to_string(), Value::from(tanda.id.clone()));
        let participant = Participant {
            tanda_id: tanda.id.clone(),
            participante_id: ids::linked_participant_id(),
            nombre: nombre.clone(),
            telefono: telefono.clone(),
            email: email.clone(),
            numero_asignado: *number,
            fecha_cumpleanos: birthday.clone(),
            fecha_registro: Some(timestamp.clone()),
            created_at: Some(timestamp.clone()),
            updated_at: Some(timestamp.clone()),
            comentarios: None,
            registrado_por_link: Some(true),
            user_id: Some(link.user_id.clone()),
            extra,
        };
        repo.put_participant(&participant)?;
        registered.push(Registered {
            participante_id: participant.participante_id,
            nombre: participant.nombre,
            telefono: participant.telefono,
            numero_asignado: participant.numero_asignado,
            fecha_cumpleanos: participant.fecha_cumpleanos,
        });
    }

    let mut numero_asignado = None;
    if birthday_tanda {
        repo.renumber_participants(&tanda.id, &timestamp)?;
        if let Some(entry) = registered.first_mut() {
            if let Some(stored) = repo.participant(&tanda.id, &entry.participante_id)? {
                entry.numero_asignado = stored.numero_asignado;
            }
            numero_asignado = Some(entry.numero_asignado);
        }
    }
    tracing::info!(
        component = "participants",
        event = "registered_via_link",
        tanda_id = %tanda.id,
        registered = registered.len(),
        birthday = birthday_tanda
    );

    success(
        200,
        json!({
            "participantes": registered,
            "tandaId": tanda.id,
            "mensaje": format!("{} participante(s) registrado(s) exitosamente", numbers.len()),
            "esCumpleañera": birthday_tanda,
            "numeroAsignado": numero_asignado,
        }),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tanda(total_rondas: u32) -> Tanda {
        serde_json::from_value(json!({
            "id": "t1",
            "nombre": "Oficina",
            "montoPorRonda": 500,
            "totalRondas": total_rondas,
            "adminId": "user_1"
        }))
        .expect("tanda")
    }

    fn holder(slot: u32) -> Participant {
        serde_json::from_value(json!({
            "id": "t1",
            "participanteId": format!("part_{slot}"),
            "numeroAsignado": slot
        }))
        .expect("participant")
    }

    fn error_code(result: Result<Vec<u32>, ApiError>) -> &'static str {
        result.expect_err("rejected").code()
    }

    #[test]
    fn accepts_free_numbers_within_half_capacity() {
        let numbers = chosen_numbers(&json!({"numeros": [2, "4"]}), &tanda(10), &[holder(1)])
            .expect("accepted");
        assert_eq!(numbers, vec![2, 4]);
    }

    #[test]
    fn rejects_empty_selection_and_excess() {
        assert_eq!(error_code(chosen_numbers(&json!({"numeros": []}), &tanda(10), &[])), "MISSING_NUMBERS");
        assert_eq!(
            error_code(chosen_numbers(&json!({"numeros": [1, 2, 3]}), &tanda(5), &[])),
            "TOO_MANY_NUMBERS"
        );
    }

    #[test]
    fn rejects_taken_repeated_and_out_of_range_numbers() {
        assert_eq!(
            error_code(chosen_numbers(&json!({"numeros": [1]}), &tanda(10), &[holder(1)])),
            "NUMERO_OCUPADO"
        );
        assert_eq!(
            error_code(chosen_numbers(&json!({"numeros": [3, 3]}), &tanda(10), &[])),
            "NUMERO_OCUPADO"
        );
        assert_eq!(
            error_code(chosen_numbers(&json!({"numeros": [11]}), &tanda(10), &[])),
            "NUMERO_FUERA_DE_RANGO"
        );
        assert_eq!(
            error_code(chosen_numbers(&json!({"numeros": [0]}), &tanda(10), &[])),
            "NUMERO_FUERA_DE_RANGO"
        );
    }
}
