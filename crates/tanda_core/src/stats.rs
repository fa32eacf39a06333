//! Per-tanda statistics and the exportable report.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::calendar::{
    estimated_round_date, format_date, format_timestamp, next_birthday, parse_date, parse_timestamp,
};
use crate::contract::{Participant, Payment, Tanda, ValidationError};
use crate::numbers::round2;
use crate::rotation::sort_by_rotation;

const RECENT_PAYMENT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingPayout {
    pub participante_id: String,
    pub nombre: String,
    pub numero_asignado: u32,
    pub fecha_estimada: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dias_faltantes: Option<i64>,
    #[serde(rename = "esCumpleaños")]
    pub es_cumpleanos: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_participantes: usize,
    pub participantes_al_corriente: usize,
    pub participantes_atrasados: usize,
    pub ronda_actual: u32,
    pub total_rondas: u32,
    pub progreso_tanda: i64,
    pub total_recaudado: f64,
    pub total_esperado: f64,
    pub porcentaje_recaudacion: f64,
    pub proximo_numero: Option<UpcomingPayout>,
    pub pagos_ultimo_mes: f64,
    pub pagos_promedio_por_ronda: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentDistribution {
    pub al_corriente: usize,
    pub atrasados: usize,
    pub adelantados: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub id: String,
    pub tanda_id: String,
    pub nombre: String,
    #[serde(rename = "esCumpleañera")]
    pub es_cumpleanera: bool,
    pub estadisticas: Statistics,
    pub distribucion_pagos: PaymentDistribution,
}

pub fn tanda_statistics(
    tanda: &Tanda,
    participants: &[Participant],
    payments: &[Payment],
    now: DateTime<Utc>,
) -> StatisticsReport {
    let is_birthday = tanda.is_birthday();
    let mut ordered = participants.to_vec();
    if is_birthday {
        sort_by_rotation(&mut ordered);
    } else {
        ordered.sort_by_key(|participant| participant.numero_asignado);
    }

    let current = tanda.ronda_actual;
    let expected = i64::from(current) - 1;
    let paid: Vec<&Payment> = payments.iter().filter(|payment| payment.pagado).collect();

    let mut distribution = PaymentDistribution {
        al_corriente: 0,
        atrasados: 0,
        adelantados: 0,
    };
    for participant in &ordered {
        let made = paid
            .iter()
            .filter(|payment| payment.participante_id == participant.participante_id)
            .count() as i64;
        if made >= expected {
            distribution.al_corriente += 1;
        } else {
            distribution.atrasados += 1;
        }
        if made > expected {
            distribution.adelantados += 1;
        }
    }

    let collected: f64 = paid
        .iter()
        .map(|payment| payment.monto.unwrap_or(tanda.monto_por_ronda))
        .sum();
    let target = tanda.monto_por_ronda * ordered.len() as f64 * expected as f64;
    let collection_rate = if target > 0.0 {
        collected / target * 100.0
    } else {
        0.0
    };
    let progress = if tanda.total_rondas == 0 {
        0
    } else {
        (f64::from(current) / f64::from(tanda.total_rondas) * 100.0).round_ties_even() as i64
    };

    let upcoming = if is_birthday {
        next_birthday_payout(&ordered, now)
    } else {
        next_round_payout(tanda, &ordered)
    };

    let window_start = now.naive_utc() - Duration::days(RECENT_PAYMENT_WINDOW_DAYS);
    let recent: f64 = paid
        .iter()
        .filter(|payment| {
            payment
                .fecha_pago
                .as_deref()
                .and_then(parse_timestamp)
                .map(|paid_at| paid_at > window_start)
                .unwrap_or(false)
        })
        .map(|payment| payment.monto.unwrap_or(0.0))
        .sum();
    let average = collected / expected.max(1) as f64;

    StatisticsReport {
        id: tanda.id.clone(),
        tanda_id: tanda.id.clone(),
        nombre: tanda.nombre.clone(),
        es_cumpleanera: is_birthday,
        estadisticas: Statistics {
            total_participantes: ordered.len(),
            participantes_al_corriente: distribution.al_corriente,
            participantes_atrasados: distribution.atrasados,
            ronda_actual: current,
            total_rondas: tanda.total_rondas,
            progreso_tanda: progress,
            total_recaudado: round2(collected),
            total_esperado: round2(target),
            porcentaje_recaudacion: round2(collection_rate),
            proximo_numero: upcoming,
            pagos_ultimo_mes: round2(recent),
            pagos_promedio_por_ronda: round2(average),
        },
        distribucion_pagos: distribution,
    }
}

fn next_birthday_payout(ordered: &[Participant], now: DateTime<Utc>) -> Option<UpcomingPayout> {
    let today = now.date_naive();
    let mut best: Option<(i64, &Participant, chrono::NaiveDate)> = None;
    for participant in ordered {
        let Some(birthday) = participant.fecha_cumpleanos.as_deref().and_then(parse_date) else {
            continue;
        };
        let upcoming = next_birthday(birthday, today);
        let days = (upcoming - today).num_days();
        if best.map_or(true, |(best_days, _, _)| days < best_days) {
            best = Some((days, participant, upcoming));
        }
    }
    best.map(|(days, participant, date)| UpcomingPayout {
        participante_id: participant.participante_id.clone(),
        nombre: participant.nombre.clone(),
        numero_asignado: participant.numero_asignado,
        fecha_estimada: format_date(date),
        dias_faltantes: Some(days),
        es_cumpleanos: true,
    })
}

fn next_round_payout(tanda: &Tanda, ordered: &[Participant]) -> Option<UpcomingPayout> {
    let start = parse_date(&tanda.fecha_inicio)?;
    let participant = ordered
        .iter()
        .find(|participant| participant.numero_asignado == tanda.ronda_actual)?;
    let date = estimated_round_date(start, tanda.frecuencia.as_ref(), tanda.ronda_actual);
    Some(UpcomingPayout {
        participante_id: participant.participante_id.clone(),
        nombre: participant.nombre.clone(),
        numero_asignado: participant.numero_asignado,
        fecha_estimada: format_date(date),
        dias_faltantes: None,
        es_cumpleanos: false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Pdf,
    Excel,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "excel" => Ok(Self::Excel),
            _ => Err(ValidationError::new(
                "Formato no soportado. Usa: json, pdf, excel",
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Excel => "excel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTanda {
    pub id: String,
    pub nombre: String,
    pub monto_por_ronda: f64,
    pub total_rondas: u32,
    pub ronda_actual: u32,
    pub fecha_inicio: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParticipant {
    pub participante_id: String,
    pub nombre: String,
    pub telefono: String,
    pub email: String,
    pub numero_asignado: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayment {
    pub pago_id: String,
    pub participante_id: String,
    pub ronda: u32,
    pub pagado: bool,
    pub monto: f64,
    pub fecha_pago: String,
    pub metodo_pago: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TandaReport {
    pub tanda: ReportTanda,
    pub participantes: Vec<ReportParticipant>,
    pub pagos: Vec<ReportPayment>,
    pub fecha_generacion: String,
}

pub fn tanda_report(
    tanda: &Tanda,
    participants: &[Participant],
    payments: &[Payment],
    now: DateTime<Utc>,
) -> TandaReport {
    TandaReport {
        tanda: ReportTanda {
            id: tanda.id.clone(),
            nombre: tanda.nombre.clone(),
            monto_por_ronda: tanda.monto_por_ronda,
            total_rondas: tanda.total_rondas,
            ronda_actual: tanda.ronda_actual,
            fecha_inicio: tanda.fecha_inicio.clone(),
            status: tanda.status.clone(),
        },
        participantes: participants
            .iter()
            .map(|participant| ReportParticipant {
                participante_id: participant.participante_id.clone(),
                nombre: participant.nombre.clone(),
                telefono: participant.telefono.clone(),
                email: participant.email.clone().unwrap_or_default(),
                numero_asignado: participant.numero_asignado,
            })
            .collect(),
        pagos: payments
            .iter()
            .map(|payment| ReportPayment {
                pago_id: payment.pago_id.clone(),
                participante_id: payment.participante_id.clone(),
                ronda: payment.ronda,
                pagado: payment.pagado,
                monto: payment.monto.unwrap_or(0.0),
                fecha_pago: payment.fecha_pago.clone().unwrap_or_default(),
                metodo_pago: payment.metodo_pago.clone().unwrap_or_default(),
            })
            .collect(),
        fecha_generacion: format_timestamp(now),
    }
}
