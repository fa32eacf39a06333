use chrono::{NaiveDate, NaiveDateTime};

use crate::calendar::DATE_FORMAT;
use crate::contract::ValidationError;

pub const BACKUP_SUFFIX: &str = ".json.gz";

pub fn parse_backup_date(date: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| ValidationError::new(format!("fecha de backup inválida: {date}")))
}

/// `{env}/{year}/week-{WW}` where the week counts Mondays (`%W`).
pub fn backup_week_prefix(environment: &str, date: NaiveDate) -> String {
    format!(
        "{environment}/{}/week-{}",
        date.format("%Y"),
        date.format("%W")
    )
}

pub fn backup_object_key(environment: &str, table_name: &str, date: NaiveDate) -> String {
    format!(
        "{}/{table_name}-{}{BACKUP_SUFFIX}",
        backup_week_prefix(environment, date),
        date.format(DATE_FORMAT),
    )
}

pub fn manifest_object_key(environment: &str, date: NaiveDate) -> String {
    format!(
        "{environment}/metadata/{}/week-{}/manifest-{}.json",
        date.format("%Y"),
        date.format("%W"),
        date.format(DATE_FORMAT),
    )
}

pub fn environment_prefix(environment: &str) -> String {
    format!("{}/", environment.trim_matches('/'))
}

pub fn is_backup_object(key: &str) -> bool {
    key.ends_with(BACKUP_SUFFIX)
}

pub fn failed_items_file_name(table_name: &str, at: NaiveDateTime) -> String {
    format!("failed_items_{table_name}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        parse_backup_date(text).expect("valid date")
    }

    #[test]
    fn builds_table_backup_key_with_monday_week() {
        let key = backup_object_key("production", "tandas", date("2025-01-24"));
        assert_eq!(key, "production/2025/week-03/tandas-2025-01-24.json.gz");
    }

    #[test]
    fn days_before_first_monday_fall_in_week_zero() {
        let key = backup_object_key("staging", "pagos", date("2023-01-01"));
        assert_eq!(key, "staging/2023/week-00/pagos-2023-01-01.json.gz");
    }

    #[test]
    fn builds_manifest_key() {
        let key = manifest_object_key("production", date("2025-01-24"));
        assert_eq!(key, "production/metadata/2025/week-03/manifest-2025-01-24.json");
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_backup_date("2025-13-01").is_err());
        assert!(parse_backup_date("24/01/2025").is_err());
    }

    #[test]
    fn builds_failed_items_file_name() {
        let at = date("2025-01-24").and_hms_opt(9, 5, 7).expect("time");
        assert_eq!(
            failed_items_file_name("usuarios_admin", at),
            "failed_items_usuarios_admin_20250124_090507.json"
        );
    }

    #[test]
    fn recognizes_backup_objects_under_environment() {
        assert_eq!(environment_prefix("production"), "production/");
        assert!(is_backup_object("production/2025/week-03/tandas-2025-01-24.json.gz"));
        assert!(!is_backup_object("production/metadata/2025/week-03/manifest-2025-01-24.json"));
    }
}
