//! Operator restore of backup archives into the key-value store, either from
//! the object store or from archives downloaded to a local folder.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tanda_core::backup::{
    decode_archive, select_backups, ArchiveError, BackupArchive, BackupListing, LocalRestoreResult,
    LocalRestoreStatus, RestoreRunReport, TableConfig, TableRestoreOutcome, RESTORE_BATCH_SIZE,
};
use tanda_core::calendar::format_timestamp;
use tanda_core::contract::{Attributes, ValidationError};
use tanda_core::storage_keys::{
    backup_object_key, environment_prefix, failed_items_file_name, is_backup_object,
    parse_backup_date, BACKUP_SUFFIX,
};

use crate::adapters::kv_store::{KeyValueStore, StoreError};
use crate::adapters::object_store::{ObjectStore, ObjectStoreError};
use crate::config::TableNames;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("backup not found: {key}")]
    BackupNotFound { key: String },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("table {table} does not exist in the target account; create it before restoring")]
    TableMissing { table: String },
    #[error(transparent)]
    ObjectStore(ObjectStoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{}", .0.message())]
    Validation(#[from] ValidationError),
    #[error("folder {0} does not exist")]
    FolderMissing(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ObjectStoreError> for RestoreError {
    fn from(error: ObjectStoreError) -> Self {
        match error {
            ObjectStoreError::NotFound { key } => Self::BackupNotFound { key },
            other => Self::ObjectStore(other),
        }
    }
}

/// Tables of a full local restore, parents before children.
pub fn local_restore_tables() -> Vec<String> {
    let names = TableNames::default();
    vec![
        names.tandas,
        names.participantes,
        names.pagos,
        names.notificaciones,
        names.usuarios,
        names.links,
        names.reset_tokens,
    ]
}

/// Items written and items left behind by one table restore.
#[derive(Debug, Default)]
struct WriteTally {
    restored: usize,
    failed: Vec<Attributes>,
}

fn write_items(store: &dyn KeyValueStore, table: &str, items: &[Attributes]) -> WriteTally {
    let mut tally = WriteTally::default();
    let batches = items.len().div_ceil(RESTORE_BATCH_SIZE);
    for (index, batch) in items.chunks(RESTORE_BATCH_SIZE).enumerate() {
        match store.batch_put(table, batch) {
            Ok(unprocessed) => {
                tally.restored += batch.len() - unprocessed.len();
                tally.failed.extend(unprocessed);
            }
            Err(error) => {
                tracing::error!(
                    component = "restore",
                    event = "batch_failed",
                    table,
                    batch = index + 1,
                    batches,
                    error = %error
                );
                tally.failed.extend(batch.iter().cloned());
            }
        }
    }
    tally
}

pub struct RestoreService<'a> {
    objects: &'a dyn ObjectStore,
    store: &'a dyn KeyValueStore,
    failed_items_dir: PathBuf,
    now: DateTime<Utc>,
}

impl<'a> RestoreService<'a> {
    pub fn new(
        objects: &'a dyn ObjectStore,
        store: &'a dyn KeyValueStore,
        failed_items_dir: impl Into<PathBuf>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            objects,
            store,
            failed_items_dir: failed_items_dir.into(),
            now,
        }
    }

    /// Archives under `{environment}/`, newest first.
    pub fn list_backups(
        &self,
        environment: &str,
        table_name: Option<&str>,
    ) -> Result<Vec<BackupListing>, RestoreError> {
        let listings = self
            .objects
            .list_objects(&environment_prefix(environment))?
            .into_iter()
            .filter(|object| is_backup_object(&object.key))
            .map(|object| {
                BackupListing::new(
                    object.key,
                    object.size,
                    object.last_modified.to_rfc3339(),
                    object.storage_class,
                )
            })
            .collect();
        Ok(select_backups(listings, table_name))
    }

    /// Fetches an archive and verifies it against the stored checksum, when
    /// the object carries one.
    pub fn download(&self, key: &str) -> Result<BackupArchive, RestoreError> {
        let object = self.objects.get_object(key)?;
        let checksum = object.metadata.get("checksum").map(String::as_str);
        if checksum.is_none() {
            tracing::warn!(component = "restore", event = "checksum_missing", key);
        }
        let archive = decode_archive(&object.body, checksum)?;
        tracing::info!(
            component = "restore",
            event = "backup_downloaded",
            key,
            table = %archive.metadata.table_name,
            items = archive.items.len(),
            bytes = object.body.len()
        );
        Ok(archive)
    }

    /// Dumps items that could not be written next to the other restore output.
    pub fn write_failed_items(&self, table: &str, items: &[Attributes]) -> Result<PathBuf, RestoreError> {
        let path = self
            .failed_items_dir
            .join(failed_items_file_name(table, self.now.naive_utc()));
        let io_error = |source| RestoreError::Io {
            path: path.clone(),
            source,
        };
        let body = serde_json::to_vec_pretty(items)
            .map_err(|error| io_error(std::io::Error::other(error)))?;
        fs::write(&path, body).map_err(io_error)?;
        tracing::warn!(
            component = "restore",
            event = "failed_items_saved",
            table,
            items = items.len(),
            path = %path.display()
        );
        Ok(path)
    }

    pub fn restore_table(
        &self,
        archive: &BackupArchive,
        target: Option<&str>,
        dry_run: bool,
    ) -> Result<TableRestoreOutcome, RestoreError> {
        let table = target.unwrap_or(&archive.metadata.table_name);
        if dry_run {
            tracing::info!(
                component = "restore",
                event = "dry_run_validated",
                table,
                items = archive.items.len()
            );
            return Ok(TableRestoreOutcome::dry_run(table, &archive.items));
        }
        if !self.store.table_exists(table)? {
            return Err(RestoreError::TableMissing {
                table: table.to_string(),
            });
        }

        let tally = write_items(self.store, table, &archive.items);
        if !tally.failed.is_empty() {
            self.write_failed_items(table, &tally.failed)?;
        }
        tracing::info!(
            component = "restore",
            event = "table_restored",
            table,
            restored = tally.restored,
            failed = tally.failed.len()
        );
        Ok(TableRestoreOutcome::written(
            table,
            archive.items.len(),
            tally.restored,
            tally.failed.len(),
        ))
    }

    /// Restores every listed table from the archives of `backup_date`.
    /// Failures are collected per table.
    pub fn restore_from_date(
        &self,
        backup_date: &str,
        tables: &[TableConfig],
        environment: &str,
        dry_run: bool,
    ) -> RestoreRunReport {
        let mut report = RestoreRunReport {
            backup_date: backup_date.to_string(),
            environment: environment.to_string(),
            dry_run,
            tables: Vec::new(),
            errors: Vec::new(),
            start_time: format_timestamp(self.now),
            end_time: None,
        };

        match parse_backup_date(backup_date) {
            Ok(date) => {
                for table in tables {
                    let key = backup_object_key(environment, &table.name, date);
                    let outcome = self.download(&key).and_then(|archive| {
                        self.restore_table(&archive, table.target_name.as_deref(), dry_run)
                    });
                    match outcome {
                        Ok(outcome) => report.tables.push(outcome),
                        Err(error) => {
                            tracing::error!(
                                component = "restore",
                                event = "table_failed",
                                table = %table.name,
                                error = %error
                            );
                            report
                                .errors
                                .push(format!("Error restaurando {}: {error}", table.name));
                        }
                    }
                }
            }
            Err(error) => report.errors.push(error.message().to_string()),
        }

        report.end_time = Some(format_timestamp(self.now));
        report
    }
}

fn find_local_backup(folder: &Path, table: &str) -> Result<Option<PathBuf>, RestoreError> {
    let entries = fs::read_dir(folder).map_err(|source| RestoreError::Io {
        path: folder.to_path_buf(),
        source,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(table) && name.ends_with(BACKUP_SUFFIX))
        .collect();
    names.sort();
    Ok(names.into_iter().next().map(|name| folder.join(name)))
}

fn read_local_backup(path: &Path) -> Result<BackupArchive, RestoreError> {
    let body = fs::read(path).map_err(|source| RestoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_archive(&body, None)?)
}

/// Restores each table from the first `{table}*.json.gz` found in
/// `folder`, writing into the table of the same name.
pub fn restore_from_folder(
    store: &dyn KeyValueStore,
    folder: &Path,
    tables: &[String],
) -> Result<Vec<LocalRestoreResult>, RestoreError> {
    if !folder.is_dir() {
        return Err(RestoreError::FolderMissing(folder.to_path_buf()));
    }

    let mut results = Vec::with_capacity(tables.len());
    for table in tables {
        let Some(path) = find_local_backup(folder, table)? else {
            tracing::warn!(component = "restore", event = "local_file_missing", table = %table);
            results.push(LocalRestoreResult::failed(table, LocalRestoreStatus::NoFile));
            continue;
        };
        let archive = match read_local_backup(&path) {
            Ok(archive) => archive,
            Err(error) => {
                tracing::error!(
                    component = "restore",
                    event = "local_read_failed",
                    table = %table,
                    path = %path.display(),
                    error = %error
                );
                results.push(LocalRestoreResult::failed(table, LocalRestoreStatus::ReadError));
                continue;
            }
        };

        let result = match store.table_exists(table) {
            Ok(true) => {
                let tally = write_items(store, table, &archive.items);
                LocalRestoreResult::completed(table, tally.restored, tally.failed.len())
            }
            Ok(false) => {
                tracing::error!(component = "restore", event = "local_table_missing", table = %table);
                LocalRestoreResult::failed(table, LocalRestoreStatus::RestoreError)
            }
            Err(error) => {
                tracing::error!(
                    component = "restore",
                    event = "local_restore_failed",
                    table = %table,
                    error = %error
                );
                LocalRestoreResult::failed(table, LocalRestoreStatus::RestoreError)
            }
        };
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;
    use serde_json::json;
    use tanda_core::backup::{encode_archive, BackupMetadata};

    use super::*;
    use crate::adapters::memory::{MemoryObjectStore, MemoryStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 24, 9, 5, 7).single().expect("time")
    }

    fn archive(table: &str, count: usize) -> BackupArchive {
        BackupArchive {
            metadata: BackupMetadata {
                table_name: table.to_string(),
                backup_date: "2025-01-24".to_string(),
                item_count: count,
                ..BackupMetadata::default()
            },
            items: (0..count)
                .map(|index| {
                    json!({"id": format!("t{index}"), "nombre": "x"})
                        .as_object()
                        .cloned()
                        .expect("object")
                })
                .collect(),
        }
    }

    #[test]
    fn local_restore_covers_every_table() {
        let tables = local_restore_tables();
        assert_eq!(tables.len(), 7);
        assert_eq!(tables[0], "tandas");
        assert!(tables.contains(&"auth-password-reset-tokens".to_string()));
    }

    #[test]
    fn dry_run_previews_without_touching_the_store() {
        let store = MemoryStore::new();
        let objects = MemoryObjectStore::new();
        let service = RestoreService::new(&objects, &store, ".", now());

        let outcome = service
            .restore_table(&archive("tandas", 5), None, true)
            .expect("dry run");
        match outcome {
            TableRestoreOutcome::DryRun {
                items_to_restore,
                preview,
                ..
            } => {
                assert_eq!(items_to_restore, 5);
                assert_eq!(preview.len(), 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn missing_target_table_is_rejected() {
        let store = MemoryStore::new();
        let objects = MemoryObjectStore::new();
        let service = RestoreService::new(&objects, &store, ".", now());

        let error = service
            .restore_table(&archive("tandas", 1), Some("tandas-copy"), false)
            .expect_err("missing table");
        assert!(matches!(error, RestoreError::TableMissing { table } if table == "tandas-copy"));
    }

    #[test]
    fn failed_batches_are_counted_and_dumped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::new().with_table("tandas", "id", None);
        store.defer_batch_items("tandas", 2);
        let objects = MemoryObjectStore::new();
        let service = RestoreService::new(&objects, &store, dir.path(), now());

        let outcome = service
            .restore_table(&archive("tandas", 30), None, false)
            .expect("restore");
        assert_eq!(
            outcome,
            TableRestoreOutcome::written("tandas", 30, 26, 4)
        );
        let dump = dir.path().join("failed_items_tandas_20250124_090507.json");
        let dumped: Vec<Attributes> =
            serde_json::from_slice(&fs::read(dump).expect("dump")).expect("json");
        assert_eq!(dumped.len(), 4);
    }

    #[test]
    fn tampered_archives_fail_checksum_validation() {
        let store = MemoryStore::new();
        let objects = MemoryObjectStore::new();
        let encoded = encode_archive(archive("pagos", 2).metadata, archive("pagos", 2).items)
            .expect("encode");
        let metadata = HashMap::from([("checksum".to_string(), "0".repeat(64))]);
        objects
            .put_object("production/x/pagos.json.gz", &encoded.body, "application/gzip", &metadata)
            .expect("put");
        let service = RestoreService::new(&objects, &store, ".", now());

        let error = service
            .download("production/x/pagos.json.gz")
            .expect_err("mismatch");
        assert!(matches!(
            error,
            RestoreError::Archive(ArchiveError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            service.download("production/none.json.gz"),
            Err(RestoreError::BackupNotFound { .. })
        ));
    }
}
