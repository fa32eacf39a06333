//! Scheduled export of every configured table to the object store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tanda_core::backup::{
    encode_archive, BackupMetadata, BackupRunReport, CriticalError, TableBackupResult, TableConfig,
};
use tanda_core::calendar::{format_date, format_timestamp};
use tanda_core::storage_keys::{backup_object_key, manifest_object_key, parse_backup_date};

use crate::adapters::kv_store::{scan_all, KeyValueStore};
use crate::adapters::messaging::TopicPublisher;
use crate::adapters::object_store::ObjectStore;
use crate::config::BackupConfig;

const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";
const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Optional overrides carried by the triggering event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupEvent {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub tables: Option<Vec<TableConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

/// Invocation scoped inputs of a backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    pub now: DateTime<Utc>,
    pub request_id: String,
}

pub struct BackupTargets<'a> {
    pub store: &'a dyn KeyValueStore,
    pub objects: &'a dyn ObjectStore,
    pub publisher: Option<&'a dyn TopicPublisher>,
}

fn backup_table(
    table: &TableConfig,
    backup_date: &str,
    config: &BackupConfig,
    run: &BackupRun,
    targets: &BackupTargets,
) -> Result<TableBackupResult, String> {
    let date = parse_backup_date(backup_date).map_err(|error| error.message().to_string())?;
    let items = scan_all(targets.store, &table.name, table.projection())
        .map_err(|error| error.to_string())?;
    tracing::info!(
        component = "backup",
        event = "table_scanned",
        table = %table.name,
        items = items.len()
    );

    let metadata = BackupMetadata {
        table_name: table.name.clone(),
        backup_date: backup_date.to_string(),
        item_count: items.len(),
        environment: config.environment.clone(),
        pk: table.pk.clone(),
        sk: table.sk.clone(),
        region: config.region.clone(),
        timestamp: format_timestamp(run.now),
        lambda_request_id: run.request_id.clone(),
        ..BackupMetadata::default()
    };
    let item_count = metadata.item_count;
    let archive = encode_archive(metadata, items).map_err(|error| error.to_string())?;

    let key = backup_object_key(&config.environment, &table.name, date);
    let object_metadata = HashMap::from([
        ("table-name".to_string(), table.name.clone()),
        ("backup-date".to_string(), backup_date.to_string()),
        ("item-count".to_string(), item_count.to_string()),
        ("checksum".to_string(), archive.checksum().to_string()),
        (
            "compression-ratio".to_string(),
            archive.compression_ratio().to_string(),
        ),
    ]);
    targets
        .objects
        .put_object(&key, &archive.body, ARCHIVE_CONTENT_TYPE, &object_metadata)
        .map_err(|error| error.to_string())?;
    tracing::info!(
        component = "backup",
        event = "table_uploaded",
        table = %table.name,
        key = %key,
        compression_ratio = archive.compression_ratio()
    );

    Ok(TableBackupResult {
        table_name: table.name.clone(),
        item_count,
        s3_key: key,
        s3_bucket: config.bucket.clone(),
        checksum: archive.checksum().to_string(),
        size_compressed_mb: archive.compressed_mb(),
        size_uncompressed_mb: archive.uncompressed_mb(),
        compression_ratio: archive.compression_ratio(),
    })
}

fn save_manifest(
    report: &BackupRunReport,
    config: &BackupConfig,
    objects: &dyn ObjectStore,
) -> Result<(), String> {
    let date = parse_backup_date(&report.date).map_err(|error| error.message().to_string())?;
    let key = manifest_object_key(&config.environment, date);
    let body = serde_json::to_vec_pretty(report).map_err(|error| error.to_string())?;
    objects
        .put_object(&key, &body, MANIFEST_CONTENT_TYPE, &HashMap::new())
        .map_err(|error| error.to_string())?;
    tracing::info!(component = "backup", event = "manifest_saved", key = %key);
    Ok(())
}

fn notify(report: &BackupRunReport, config: &BackupConfig, publisher: Option<&dyn TopicPublisher>) {
    let Some(publisher) = publisher else {
        tracing::info!(component = "backup", event = "notification_skipped");
        return;
    };
    let subject = report.notification_subject();
    let message = report.notification_message(&config.bucket);
    if let Err(error) = publisher.publish(&subject, &message) {
        tracing::warn!(component = "backup", event = "notification_failed", error = %error);
    }
}

/// Backs up each table, records per-table failures and keeps going, then
/// stores the manifest and publishes a summary. A manifest failure turns the
/// run critical.
pub fn handle_backup_event(
    event: &Value,
    config: &BackupConfig,
    run: &BackupRun,
    targets: &BackupTargets,
) -> BackupResponse {
    let start_time = format_timestamp(run.now);
    let parsed: Result<BackupEvent, _> = match event {
        Value::Object(_) => serde_json::from_value(event.clone()),
        _ => Ok(BackupEvent::default()),
    };
    let default_date = format_date(run.now.date_naive());

    let mut report = match &parsed {
        Ok(overrides) => BackupRunReport::new(
            overrides.date.clone().unwrap_or(default_date),
            config.environment.clone(),
            start_time,
        ),
        Err(_) => BackupRunReport::new(default_date, config.environment.clone(), start_time),
    };

    let outcome = parsed
        .map_err(|error| format!("invalid backup event: {error}"))
        .and_then(|overrides| {
            let tables = overrides.tables.unwrap_or_else(|| config.tables.clone());
            for table in &tables {
                match backup_table(table, &report.date, config, run, targets) {
                    Ok(result) => report.tables.push(result),
                    Err(error) => {
                        tracing::error!(
                            component = "backup",
                            event = "table_failed",
                            table = %table.name,
                            error = %error
                        );
                        report.errors.push(format!("Error en {}: {error}", table.name));
                    }
                }
            }
            report.end_time = Some(format_timestamp(run.now));
            save_manifest(&report, config, targets.objects)
        });

    if let Err(error) = outcome {
        tracing::error!(component = "backup", event = "run_failed", error = %error);
        report.critical_error = Some(CriticalError { error });
        report.end_time = Some(format_timestamp(run.now));
    }
    notify(&report, config, targets.publisher);

    tracing::info!(
        component = "backup",
        event = "run_completed",
        date = %report.date,
        tables = report.tables.len(),
        errors = report.errors.len(),
        status = report.status_code()
    );
    BackupResponse {
        status_code: report.status_code(),
        body: serde_json::to_string_pretty(&report).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::adapters::memory::{MemoryObjectStore, MemoryStore, RecordingPublisher};

    fn config() -> BackupConfig {
        BackupConfig {
            tables: vec![TableConfig {
                name: "tandas".to_string(),
                pk: Some("id".to_string()),
                sk: None,
                attributes: None,
                target_name: None,
            }],
            bucket: "tandas-backups".to_string(),
            environment: "staging".to_string(),
            topic_arn: None,
            region: "us-east-1".to_string(),
        }
    }

    fn run() -> BackupRun {
        BackupRun {
            now: Utc.with_ymd_and_hms(2025, 1, 24, 3, 0, 0).single().expect("time"),
            request_id: "req-1".to_string(),
        }
    }

    #[test]
    fn invalid_event_overrides_make_the_run_critical() {
        let store = MemoryStore::new().with_table("tandas", "id", None);
        let objects = MemoryObjectStore::new();
        let publisher = RecordingPublisher::default();
        let targets = BackupTargets {
            store: &store,
            objects: &objects,
            publisher: Some(&publisher),
        };

        let response = handle_backup_event(&json!({"tables": "tandas"}), &config(), &run(), &targets);

        assert_eq!(response.status_code, 500);
        assert!(objects.keys().is_empty());
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "[CRÍTICO] Fallo en backup DynamoDB - staging");
    }

    #[test]
    fn malformed_date_fails_each_table_and_the_manifest() {
        let store = MemoryStore::new().with_table("tandas", "id", None);
        let objects = MemoryObjectStore::new();
        let targets = BackupTargets {
            store: &store,
            objects: &objects,
            publisher: None,
        };

        let response = handle_backup_event(&json!({"date": "24-01-2025"}), &config(), &run(), &targets);
        let body: Value = serde_json::from_str(&response.body).expect("body");

        assert_eq!(response.status_code, 500);
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(1));
        assert!(body["critical_error"]["error"].is_string());
    }
}
