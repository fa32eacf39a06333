//! In-process adapter implementations used by tests and local runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::kv_store::{Item, KeyValueStore, Query, ScanPage, StoreError};
use super::messaging::{DeliveryError, EmailMessage, EmailSender, SmsSender, TopicPublisher};
use super::object_store::{ObjectStore, ObjectStoreError, ObjectSummary, StoredObject};

const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

type RowKey = (String, String);

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemoryTable {
    partition_key: String,
    sort_key: Option<String>,
    rows: BTreeMap<RowKey, Item>,
}

impl MemoryTable {
    fn row_key(&self, table: &str, item: &Item) -> Result<RowKey, StoreError> {
        let part = |name: &str| {
            item.get(name)
                .map(key_text)
                .ok_or_else(|| StoreError::backend(table, "key", format!("missing key attribute {name}")))
        };
        let partition = part(&self.partition_key)?;
        let sort = match &self.sort_key {
            Some(name) => part(name)?,
            None => String::new(),
        };
        Ok((partition, sort))
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Default)]
struct Faults {
    failing_tables: HashSet<String>,
    deferred_per_batch: HashMap<String, usize>,
}

/// Table-keyed store with DynamoDB-like key semantics. Global index queries
/// match on the indexed attribute directly.
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    faults: Mutex<Faults>,
    scan_page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    pub fn with_table(self, name: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        self.create_table(name, partition_key, sort_key);
        self
    }

    pub fn create_table(&self, name: &str, partition_key: &str, sort_key: Option<&str>) {
        let mut tables = locked(&self.tables);
        tables.entry(name.to_string()).or_insert_with(|| MemoryTable {
            partition_key: partition_key.to_string(),
            sort_key: sort_key.map(str::to_string),
            rows: BTreeMap::new(),
        });
    }

    /// Every batch write to `table` fails.
    pub fn fail_batch_writes(&self, table: &str) {
        locked(&self.faults)
            .failing_tables
            .insert(table.to_string());
    }

    /// The last `count` items of every batch to `table` come back unprocessed.
    pub fn defer_batch_items(&self, table: &str, count: usize) {
        locked(&self.faults)
            .deferred_per_batch
            .insert(table.to_string(), count);
    }

    pub fn items(&self, table: &str) -> Vec<Item> {
        locked(&self.tables)
            .get(table)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_table_mut<T>(
        &self,
        table: &str,
        apply: impl FnOnce(&mut MemoryTable) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = locked(&self.tables);
        let entry = tables.get_mut(table).ok_or_else(|| StoreError::TableMissing {
            table: table.to_string(),
        })?;
        apply(entry)
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError> {
        self.with_table_mut(table, |entry| {
            let row_key = entry.row_key(table, key)?;
            Ok(entry.rows.get(&row_key).cloned())
        })
    }

    fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError> {
        self.with_table_mut(table, |entry| {
            let row_key = entry.row_key(table, item)?;
            entry.rows.insert(row_key, item.clone());
            Ok(())
        })
    }

    fn update_item(&self, table: &str, key: &Item, changes: &Item) -> Result<Item, StoreError> {
        self.with_table_mut(table, |entry| {
            let row_key = entry.row_key(table, key)?;
            let row = entry.rows.entry(row_key).or_insert_with(|| key.clone());
            for (name, value) in changes {
                row.insert(name.clone(), value.clone());
            }
            Ok(row.clone())
        })
    }

    fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError> {
        self.with_table_mut(table, |entry| {
            let row_key = entry.row_key(table, key)?;
            entry.rows.remove(&row_key);
            Ok(())
        })
    }

    fn query(&self, table: &str, query: &Query) -> Result<Vec<Item>, StoreError> {
        self.with_table_mut(table, |entry| {
            Ok(entry
                .rows
                .values()
                .filter(|item| query.matches(item))
                .cloned()
                .collect())
        })
    }

    fn scan_page(
        &self,
        table: &str,
        projection: Option<&[String]>,
        start_key: Option<&Item>,
    ) -> Result<ScanPage, StoreError> {
        let page_size = self.scan_page_size;
        self.with_table_mut(table, |entry| {
            let lower = match start_key {
                Some(key) => Bound::Excluded(entry.row_key(table, key)?),
                None => Bound::Unbounded,
            };
            let mut rows = entry.rows.range((lower, Bound::Unbounded));
            let page: Vec<(&RowKey, &Item)> = rows.by_ref().take(page_size).collect();
            let has_more = rows.next().is_some();

            let last_evaluated_key = match page.last() {
                Some((_, item)) if has_more => {
                    let mut key = Item::new();
                    for name in std::iter::once(&entry.partition_key).chain(entry.sort_key.as_ref()) {
                        if let Some(value) = item.get(name) {
                            key.insert(name.clone(), value.clone());
                        }
                    }
                    Some(key)
                }
                _ => None,
            };
            let items = page
                .into_iter()
                .map(|(_, item)| match projection {
                    Some(attributes) => item
                        .iter()
                        .filter(|(name, _)| attributes.contains(name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect(),
                    None => item.clone(),
                })
                .collect();
            Ok(ScanPage {
                items,
                last_evaluated_key,
            })
        })
    }

    fn batch_put(&self, table: &str, items: &[Item]) -> Result<Vec<Item>, StoreError> {
        let (failing, deferred) = {
            let faults = locked(&self.faults);
            (
                faults.failing_tables.contains(table),
                faults.deferred_per_batch.get(table).copied().unwrap_or(0),
            )
        };
        if failing {
            return Err(StoreError::backend(table, "batch_write_item", "throughput exceeded"));
        }
        let split = items.len().saturating_sub(deferred);
        let (written, unprocessed) = items.split_at(split);
        for item in written {
            self.put_item(table, item)?;
        }
        Ok(unprocessed.to_vec())
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(locked(&self.tables).contains_key(table))
    }
}

struct MemoryObject {
    body: Vec<u8>,
    content_type: String,
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

/// Object store keyed by full object key. Each write advances a fake clock by
/// one second so listings have a stable newest-first order.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    failing_fragments: Mutex<Vec<String>>,
    clock: Mutex<DateTime<Utc>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failing_fragments: Mutex::new(Vec::new()),
            clock: Mutex::new(DateTime::<Utc>::default()),
        }
    }

    /// Writes to any key containing `fragment` fail.
    pub fn fail_writes_containing(&self, fragment: &str) {
        locked(&self.failing_fragments).push(fragment.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        locked(&self.objects)
            .keys()
            .cloned()
            .collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        locked(&self.objects)
            .get(key)
            .map(|object| object.content_type.clone())
    }

    fn tick(&self) -> DateTime<Utc> {
        let mut clock = locked(&self.clock);
        *clock += Duration::seconds(1);
        *clock
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), ObjectStoreError> {
        let failing = locked(&self.failing_fragments)
            .iter()
            .any(|fragment| key.contains(fragment.as_str()));
        if failing {
            return Err(ObjectStoreError::Backend(format!("access denied writing {key}")));
        }
        let last_modified = self.tick();
        locked(&self.objects).insert(
            key.to_string(),
            MemoryObject {
                body: body.to_vec(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                last_modified,
            },
        );
        Ok(())
    }

    fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        locked(&self.objects)
            .get(key)
            .map(|object| StoredObject {
                body: object.body.clone(),
                metadata: object.metadata.clone(),
            })
            .ok_or_else(|| ObjectStoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ObjectStoreError> {
        Ok(locked(&self.objects)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: object.last_modified,
                storage_class: None,
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub phone: String,
    pub message: String,
}

/// Records outgoing SMS. Numbers registered with `fail_for` are rejected.
#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<SentSms>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSms {
    pub fn fail_for(&self, phone: &str) {
        locked(&self.failing).insert(phone.to_string());
    }

    pub fn sent(&self) -> Vec<SentSms> {
        locked(&self.sent).clone()
    }
}

impl SmsSender for RecordingSms {
    fn send_sms(&self, phone: &str, message: &str) -> Result<String, DeliveryError> {
        if locked(&self.failing).contains(phone) {
            return Err(DeliveryError::Sms(format!("invalid parameter: {phone}")));
        }
        let mut sent = locked(&self.sent);
        sent.push(SentSms {
            phone: phone.to_string(),
            message: message.to_string(),
        });
        Ok(format!("msg-{}", sent.len()))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        locked(&self.sent).clone()
    }
}

impl EmailSender for RecordingMailer {
    fn send_email(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        locked(&self.sent).push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub subject: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedMessage>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<PublishedMessage> {
        locked(&self.published).clone()
    }
}

impl TopicPublisher for RecordingPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), DeliveryError> {
        locked(&self.published).push(PublishedMessage {
            subject: subject.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
