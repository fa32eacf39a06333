//! Birthday rotation: participants of a birthday tanda are paid out in
//! calendar order of their birthdays, ties broken by registration time.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::calendar::{parse_date, parse_timestamp};
use crate::contract::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RotationKey {
    month: u32,
    day: u32,
    registered_at: NaiveDateTime,
}

impl RotationKey {
    pub fn new(birthday: NaiveDate, registered_at: NaiveDateTime) -> Self {
        Self {
            month: birthday.month(),
            day: birthday.day(),
            registered_at,
        }
    }
}

/// `None` when the participant has no usable birthday or registration time.
pub fn rotation_key(participant: &Participant) -> Option<RotationKey> {
    let birthday = parse_date(participant.fecha_cumpleanos.as_deref()?)?;
    let registered_at = parse_timestamp(participant.registered_at()?)?;
    Some(RotationKey::new(birthday, registered_at))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    pub participant_id: String,
    pub previous_slot: u32,
    pub slot: u32,
}

impl SlotAssignment {
    pub fn changed(&self) -> bool {
        self.previous_slot != self.slot
    }
}

/// Slot a new participant would take before the full renumbering runs.
pub fn provisional_slot(birthday: &str, existing: &[Participant], registered_at: NaiveDateTime) -> u32 {
    if existing.is_empty() {
        return 1;
    }
    let Some(birthday) = parse_date(birthday) else {
        return 1;
    };
    let candidate = RotationKey::new(birthday, registered_at);
    let ahead = existing
        .iter()
        .filter_map(rotation_key)
        .filter(|key| *key <= candidate)
        .count();
    ahead as u32 + 1
}

/// Assigns slots 1..=N to every ranked participant. Unranked participants are
/// left out and keep whatever slot they hold.
pub fn renumber(participants: &[Participant]) -> Vec<SlotAssignment> {
    let mut ranked: Vec<(RotationKey, &Participant)> = participants
        .iter()
        .filter_map(|participant| rotation_key(participant).map(|key| (key, participant)))
        .collect();
    ranked.sort_by(|(left_key, left), (right_key, right)| {
        left_key
            .cmp(right_key)
            .then_with(|| left.participante_id.cmp(&right.participante_id))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (_, participant))| SlotAssignment {
            participant_id: participant.participante_id.clone(),
            previous_slot: participant.numero_asignado,
            slot: index as u32 + 1,
        })
        .collect()
}

/// Orders participants by rotation key; unranked participants go last.
pub fn sort_by_rotation(participants: &mut [Participant]) {
    participants.sort_by_cached_key(|participant| {
        let key = rotation_key(participant);
        (key.is_none(), key)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Attributes;

    fn participant(id: &str, slot: u32, birthday: Option<&str>, registered: &str) -> Participant {
        Participant {
            tanda_id: "tanda0001".to_string(),
            participante_id: id.to_string(),
            nombre: id.to_uppercase(),
            telefono: "5500000000".to_string(),
            email: None,
            numero_asignado: slot,
            fecha_cumpleanos: birthday.map(str::to_string),
            fecha_registro: Some(registered.to_string()),
            created_at: None,
            updated_at: None,
            comentarios: None,
            registrado_por_link: None,
            user_id: None,
            extra: Attributes::new(),
        }
    }

    fn at(text: &str) -> NaiveDateTime {
        parse_timestamp(text).expect("timestamp")
    }

    #[test]
    fn renumber_orders_by_month_then_day_ignoring_year() {
        let participants = vec![
            participant("part_a", 1, Some("1980-12-01"), "2025-01-01T00:00:00"),
            participant("part_b", 2, Some("2001-03-15"), "2025-01-02T00:00:00"),
            participant("part_c", 3, Some("1995-03-02"), "2025-01-03T00:00:00"),
        ];

        let assignments = renumber(&participants);
        let order: Vec<(&str, u32)> = assignments
            .iter()
            .map(|a| (a.participant_id.as_str(), a.slot))
            .collect();
        assert_eq!(order, vec![("part_c", 1), ("part_b", 2), ("part_a", 3)]);
        assert!(assignments.iter().all(SlotAssignment::changed));
    }

    #[test]
    fn equal_birthdays_are_ordered_by_registration_then_id() {
        let participants = vec![
            participant("part_z", 1, Some("1990-05-05"), "2025-01-02T00:00:00"),
            participant("part_y", 2, Some("1991-05-05"), "2025-01-01T00:00:00"),
            participant("part_b", 3, Some("1992-05-05"), "2025-01-02T00:00:00"),
        ];

        let ids: Vec<String> = renumber(&participants)
            .into_iter()
            .map(|a| a.participant_id)
            .collect();
        assert_eq!(ids, vec!["part_y", "part_b", "part_z"]);
    }

    #[test]
    fn participants_without_birthday_are_not_ranked() {
        let participants = vec![
            participant("part_a", 7, None, "2025-01-01T00:00:00"),
            participant("part_b", 2, Some("1990-01-01"), "2025-01-01T00:00:00"),
            participant("part_c", 4, Some("no-date"), "2025-01-01T00:00:00"),
        ];

        let assignments = renumber(&participants);
        assert_eq!(
            assignments,
            vec![SlotAssignment {
                participant_id: "part_b".to_string(),
                previous_slot: 2,
                slot: 1,
            }]
        );
    }

    #[test]
    fn registration_falls_back_to_created_at() {
        let mut legacy = participant("part_a", 1, Some("1990-01-01"), "");
        legacy.fecha_registro = None;
        legacy.created_at = Some("2024-12-01T00:00:00".to_string());
        assert!(rotation_key(&legacy).is_some());

        legacy.created_at = None;
        assert!(rotation_key(&legacy).is_none());
    }

    #[test]
    fn provisional_slot_places_new_entry_after_equal_keys() {
        let existing = vec![
            participant("part_a", 1, Some("1990-02-01"), "2025-01-01T00:00:00"),
            participant("part_b", 2, Some("1990-08-20"), "2025-01-01T00:00:00"),
        ];

        assert_eq!(provisional_slot("2000-01-15", &existing, at("2025-02-01T00:00:00")), 1);
        assert_eq!(provisional_slot("2000-05-15", &existing, at("2025-02-01T00:00:00")), 2);
        assert_eq!(provisional_slot("2000-12-15", &existing, at("2025-02-01T00:00:00")), 3);
        assert_eq!(provisional_slot("bad", &existing, at("2025-02-01T00:00:00")), 1);
        assert_eq!(provisional_slot("2000-12-15", &[], at("2025-02-01T00:00:00")), 1);
    }

    #[test]
    fn sort_by_rotation_puts_unranked_last() {
        let mut participants = vec![
            participant("part_a", 1, None, "2025-01-01T00:00:00"),
            participant("part_b", 2, Some("1990-09-01"), "2025-01-01T00:00:00"),
            participant("part_c", 3, Some("1990-02-01"), "2025-01-01T00:00:00"),
        ];
        sort_by_rotation(&mut participants);
        let ids: Vec<&str> = participants
            .iter()
            .map(|p| p.participante_id.as_str())
            .collect();
        assert_eq!(ids, vec!["part_c", "part_b", "part_a"]);
    }
}
