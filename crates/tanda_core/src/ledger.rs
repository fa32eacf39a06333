//! Payment bookkeeping: payment keys, the participant × round matrix and the
//! per-participant round summaries served with a tanda.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::contract::{Participant, Payment, Tanda};

pub fn payment_id(participant_id: &str, round: u32) -> String {
    format!("{participant_id}_{round}")
}

/// Key prefix shared by every payment of one participant.
pub fn payment_prefix(participant_id: &str) -> String {
    format!("{participant_id}_")
}

pub fn sort_by_slot(participants: &mut [Participant]) {
    participants.sort_by_key(|participant| participant.numero_asignado);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    AlCorriente,
    Atrasado,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub pagado: bool,
    pub fecha_pago: Option<String>,
    pub es_futuro: bool,
    pub exento_pago: bool,
    pub metodo_pago: Option<String>,
    pub monto: Option<f64>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    pub participante_id: String,
    pub nombre: String,
    pub numero_asignado: u32,
    pub pagos: BTreeMap<String, MatrixCell>,
    pub estado_general: Standing,
    pub pagos_adelantados: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMatrix {
    pub ronda_actual: u32,
    pub total_rondas: u32,
    pub tanda_id: String,
    pub matriz: Vec<MatrixRow>,
}

pub fn payment_matrix(tanda: &Tanda, participants: &[Participant], payments: &[Payment]) -> PaymentMatrix {
    let by_round: HashMap<(&str, u32), &Payment> = payments
        .iter()
        .map(|payment| ((payment.participante_id.as_str(), payment.ronda), payment))
        .collect();

    let mut ordered: Vec<&Participant> = participants.iter().collect();
    ordered.sort_by_key(|participant| participant.numero_asignado);

    let current = tanda.ronda_actual;
    let expected = current.saturating_sub(1);
    let matriz = ordered
        .into_iter()
        .map(|participant| {
            let mut pagos = BTreeMap::new();
            let mut made = 0;
            let mut advance = 0;
            for round in 1..=tanda.total_rondas {
                let payment = by_round.get(&(participant.participante_id.as_str(), round));
                let cell = MatrixCell {
                    pagado: payment.map(|p| p.pagado).unwrap_or(false),
                    fecha_pago: payment.and_then(|p| p.fecha_pago.clone()),
                    es_futuro: round > current,
                    exento_pago: payment.map(|p| p.exento_pago).unwrap_or(false),
                    metodo_pago: payment.and_then(|p| p.metodo_pago.clone()),
                    monto: payment.and_then(|p| p.monto),
                    notas: payment.and_then(|p| p.notas.clone()),
                };
                if cell.pagado {
                    if round <= current {
                        made += 1;
                    } else {
                        advance += 1;
                    }
                }
                pagos.insert(round.to_string(), cell);
            }
            MatrixRow {
                participante_id: participant.participante_id.clone(),
                nombre: participant.nombre.clone(),
                numero_asignado: participant.numero_asignado,
                pagos,
                estado_general: if made >= expected {
                    Standing::AlCorriente
                } else {
                    Standing::Atrasado
                },
                pagos_adelantados: advance,
            }
        })
        .collect();

    PaymentMatrix {
        ronda_actual: current,
        total_rondas: tanda.total_rondas,
        tanda_id: tanda.id.clone(),
        matriz,
    }
}

/// Round summary attached to each participant when a tanda is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPayment {
    pub pagado: bool,
    pub fecha_pago: String,
    pub monto: f64,
    pub exento_pago: bool,
    pub metodo_pago: Option<String>,
    pub notas: Option<String>,
}

pub fn rounds_by_participant(payments: &[Payment]) -> HashMap<String, BTreeMap<String, RoundPayment>> {
    let mut grouped: HashMap<String, BTreeMap<String, RoundPayment>> = HashMap::new();
    for payment in payments {
        grouped
            .entry(payment.participante_id.clone())
            .or_default()
            .insert(
                payment.ronda.to_string(),
                RoundPayment {
                    pagado: payment.pagado,
                    fecha_pago: payment.fecha_pago.clone().unwrap_or_default(),
                    monto: payment.monto.unwrap_or(0.0),
                    exento_pago: payment.exento_pago,
                    metodo_pago: payment.metodo_pago.clone(),
                    notas: payment.notas.clone(),
                },
            );
    }
    grouped
}

pub fn filter_history(payments: Vec<Payment>, participant_id: Option<&str>, round: Option<u32>) -> Vec<Payment> {
    payments
        .into_iter()
        .filter(|payment| participant_id.map_or(true, |id| payment.participante_id == id))
        .filter(|payment| round.map_or(true, |round| payment.ronda == round))
        .collect()
}

/// Sum of `monto` over paid payments.
pub fn paid_total(payments: &[Payment]) -> f64 {
    payments
        .iter()
        .filter(|payment| payment.pagado)
        .filter_map(|payment| payment.monto)
        .sum()
}
