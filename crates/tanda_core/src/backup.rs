//! Backup archive codec and run reports.
//!
//! An archive is the JSON document `{metadata, items}` compressed with gzip.
//! The SHA-256 checksum covers the compressed bytes, so a restore can verify
//! the object before inflating it.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::contract::{Attributes, ValidationError};
use crate::numbers::round2;
use crate::storage_keys::{backup_week_prefix, parse_backup_date};

pub const RESTORE_BATCH_SIZE: usize = 25;
pub const PREVIEW_ITEMS: usize = 3;
pub const PREVIEW_CHARS: usize = 100;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to serialize backup archive: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to compress backup archive: {0}")]
    Compress(#[source] std::io::Error),
    #[error("failed to decompress backup archive: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("failed to parse backup archive: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// One table entry of `TABLES_CONFIG` or of a restore table list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl TableConfig {
    pub fn projection(&self) -> Option<&[String]> {
        self.attributes
            .as_deref()
            .filter(|attributes| !attributes.is_empty())
    }

    pub fn restore_target(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }
}

pub fn parse_tables_config(text: &str) -> Result<Vec<TableConfig>, ValidationError> {
    serde_json::from_str(text)
        .map_err(|error| ValidationError::new(format!("invalid tables configuration: {error}")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub backup_date: String,
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub pk: Option<String>,
    #[serde(default)]
    pub sk: Option<String>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub lambda_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncompressed_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArchive {
    #[serde(default)]
    pub metadata: BackupMetadata,
    #[serde(default)]
    pub items: Vec<Attributes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArchive {
    pub body: Vec<u8>,
    /// Metadata extended with checksum and size fields.
    pub metadata: BackupMetadata,
}

impl EncodedArchive {
    pub fn checksum(&self) -> &str {
        self.metadata.checksum.as_deref().unwrap_or_default()
    }

    pub fn compression_ratio(&self) -> f64 {
        self.metadata.compression_ratio.unwrap_or_default()
    }

    pub fn compressed_mb(&self) -> f64 {
        round2(self.body.len() as f64 / BYTES_PER_MB)
    }

    pub fn uncompressed_mb(&self) -> f64 {
        round2(self.metadata.uncompressed_size.unwrap_or_default() as f64 / BYTES_PER_MB)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Serializes and compresses an archive. The embedded metadata carries no
/// checksum; the returned metadata does.
pub fn encode_archive(metadata: BackupMetadata, items: Vec<Attributes>) -> Result<EncodedArchive, ArchiveError> {
    let archive = BackupArchive { metadata, items };
    let json = serde_json::to_vec(&archive).map_err(ArchiveError::Serialize)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(ArchiveError::Compress)?;
    let body = encoder.finish().map_err(ArchiveError::Compress)?;

    let mut metadata = archive.metadata;
    let ratio = if json.is_empty() {
        0.0
    } else {
        (1.0 - body.len() as f64 / json.len() as f64) * 100.0
    };
    metadata.checksum = Some(sha256_hex(&body));
    metadata.compressed_size = Some(body.len());
    metadata.uncompressed_size = Some(json.len());
    metadata.compression_ratio = Some(round2(ratio));

    Ok(EncodedArchive { body, metadata })
}

/// Verifies the checksum when one is known, then inflates and parses.
pub fn decode_archive(body: &[u8], expected_checksum: Option<&str>) -> Result<BackupArchive, ArchiveError> {
    if let Some(expected) = expected_checksum.filter(|checksum| !checksum.is_empty()) {
        let actual = sha256_hex(body);
        if actual != expected {
            return Err(ArchiveError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let mut json = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut json)
        .map_err(ArchiveError::Decompress)?;
    serde_json::from_slice(&json).map_err(ArchiveError::Parse)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBackupResult {
    pub table_name: String,
    pub item_count: usize,
    pub s3_key: String,
    pub s3_bucket: String,
    pub checksum: String,
    pub size_compressed_mb: f64,
    pub size_uncompressed_mb: f64,
    pub compression_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalError {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSeverity {
    Ok,
    Partial,
    Critical,
}

/// Manifest of a backup run; also the body returned by the backup handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRunReport {
    pub date: String,
    pub environment: String,
    pub tables: Vec<TableBackupResult>,
    pub errors: Vec<String>,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_error: Option<CriticalError>,
}

impl BackupRunReport {
    pub fn new(date: impl Into<String>, environment: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            environment: environment.into(),
            tables: Vec::new(),
            errors: Vec::new(),
            start_time: start_time.into(),
            end_time: None,
            critical_error: None,
        }
    }

    pub fn severity(&self) -> RunSeverity {
        if self.critical_error.is_some() {
            RunSeverity::Critical
        } else if !self.errors.is_empty() {
            RunSeverity::Partial
        } else {
            RunSeverity::Ok
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.severity() {
            RunSeverity::Ok => 200,
            RunSeverity::Partial => 207,
            RunSeverity::Critical => 500,
        }
    }

    pub fn notification_subject(&self) -> String {
        let environment = &self.environment;
        match self.severity() {
            RunSeverity::Ok => format!("[OK] Backup DynamoDB completado - {environment}"),
            RunSeverity::Partial => {
                format!("[ADVERTENCIA] Backup DynamoDB parcial - {environment}")
            }
            RunSeverity::Critical => format!("[CRÍTICO] Fallo en backup DynamoDB - {environment}"),
        }
    }

    pub fn notification_message(&self, bucket: &str) -> String {
        let status = match self.severity() {
            RunSeverity::Ok => "EXITOSO",
            RunSeverity::Partial => "PARCIALMENTE EXITOSO",
            RunSeverity::Critical => "ERROR CRÍTICO",
        };
        let mut lines = vec![
            format!("Estado: {status}"),
            format!("Ambiente: {}", self.environment),
            format!("Fecha backup: {}", self.date),
            format!("Hora inicio: {}", self.start_time),
            format!("Hora fin: {}", self.end_time.as_deref().unwrap_or("N/A")),
            String::new(),
            format!("Tablas procesadas ({}):", self.tables.len()),
        ];
        lines.extend(self.tables.iter().map(|table| {
            format!(
                "  • {}: {} items ({} MB comprimido)",
                table.table_name, table.item_count, table.size_compressed_mb
            )
        }));

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errores ({}):", self.errors.len()));
            lines.extend(self.errors.iter().map(|error| format!("  • {error}")));
        }

        if let Some(critical) = &self.critical_error {
            lines.push(String::new());
            lines.push("ERROR CRÍTICO:".to_string());
            lines.push(format!("  {}", critical.error));
            lines.push(String::new());
            lines.push("Ver CloudWatch Logs para detalles completos.".to_string());
        }

        if !self.tables.is_empty() {
            if let Ok(date) = parse_backup_date(&self.date) {
                lines.push(String::new());
                lines.push(format!("Bucket S3: {bucket}"));
                lines.push(format!(
                    "Ruta: {}/",
                    backup_week_prefix(&self.environment, date)
                ));
            }
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupListing {
    pub key: String,
    pub size: u64,
    pub size_mb: f64,
    pub last_modified: String,
    pub storage_class: String,
}

impl BackupListing {
    pub fn new(key: String, size: u64, last_modified: String, storage_class: Option<String>) -> Self {
        Self {
            key,
            size,
            size_mb: round2(size as f64 / BYTES_PER_MB),
            last_modified,
            storage_class: storage_class.unwrap_or_else(|| "STANDARD".to_string()),
        }
    }
}

/// Newest first, optionally keeping only keys that mention `table_name`.
pub fn select_backups(mut listings: Vec<BackupListing>, table_name: Option<&str>) -> Vec<BackupListing> {
    listings.retain(|listing| table_name.map_or(true, |name| listing.key.contains(name)));
    listings.sort_by(|left, right| right.last_modified.cmp(&left.last_modified));
    listings
}

pub fn success_rate(restored: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        round2(restored as f64 / total as f64 * 100.0)
    }
}

/// First characters of an item's JSON text, suffixed with `...` when cut.
pub fn preview_item(item: &Attributes) -> String {
    let text = Value::Object(item.clone()).to_string();
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableRestoreOutcome {
    DryRun {
        dry_run: bool,
        table_name: String,
        items_to_restore: usize,
        validation: String,
        preview: Vec<String>,
    },
    Written {
        table_name: String,
        total_items: usize,
        restored_items: usize,
        failed_items: usize,
        success_rate: f64,
    },
}

impl TableRestoreOutcome {
    pub fn dry_run(table_name: &str, items: &[Attributes]) -> Self {
        Self::DryRun {
            dry_run: true,
            table_name: table_name.to_string(),
            items_to_restore: items.len(),
            validation: "passed".to_string(),
            preview: items.iter().take(PREVIEW_ITEMS).map(preview_item).collect(),
        }
    }

    pub fn written(table_name: &str, total: usize, restored: usize, failed: usize) -> Self {
        Self::Written {
            table_name: table_name.to_string(),
            total_items: total,
            restored_items: restored,
            failed_items: failed,
            success_rate: success_rate(restored, total),
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            Self::DryRun { table_name, .. } | Self::Written { table_name, .. } => table_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreRunReport {
    pub backup_date: String,
    pub environment: String,
    pub dry_run: bool,
    pub tables: Vec<TableRestoreOutcome>,
    pub errors: Vec<String>,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalRestoreStatus {
    Ok,
    Partial,
    NoFile,
    ReadError,
    RestoreError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRestoreResult {
    pub table: String,
    pub status: LocalRestoreStatus,
    pub restored: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
}

impl LocalRestoreResult {
    pub fn failed(table: &str, status: LocalRestoreStatus) -> Self {
        Self {
            table: table.to_string(),
            status,
            restored: 0,
            errors: None,
        }
    }

    pub fn completed(table: &str, restored: usize, errors: usize) -> Self {
        Self {
            table: table.to_string(),
            status: if errors == 0 {
                LocalRestoreStatus::Ok
            } else {
                LocalRestoreStatus::Partial
            },
            restored,
            errors: Some(errors),
        }
    }
}
