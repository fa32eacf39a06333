use serde_json::{Map, Value};

/// Attribute map as exchanged with the store, numbers already normalized.
pub type Item = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table {table} does not exist")]
    TableMissing { table: String },
    #[error("{operation} on {table} failed: {message}")]
    Backend {
        table: String,
        operation: &'static str,
        message: String,
    },
    #[error("unsupported attribute value: {0}")]
    Conversion(String),
}

impl StoreError {
    pub fn backend(table: &str, operation: &'static str, message: impl ToString) -> Self {
        Self::Backend {
            table: table.to_string(),
            operation,
            message: message.to_string(),
        }
    }
}

/// Partition-key query against a table or one of its global indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub index: Option<String>,
    pub key_name: String,
    pub key_value: Value,
    pub sort_prefix: Option<(String, String)>,
}

impl Query {
    pub fn partition(key_name: &str, key_value: &str) -> Self {
        Self {
            index: None,
            key_name: key_name.to_string(),
            key_value: Value::from(key_value),
            sort_prefix: None,
        }
    }

    pub fn on_index(index: &str, key_name: &str, key_value: &str) -> Self {
        Self {
            index: Some(index.to_string()),
            ..Self::partition(key_name, key_value)
        }
    }

    pub fn with_sort_prefix(mut self, sort_key: &str, prefix: &str) -> Self {
        self.sort_prefix = Some((sort_key.to_string(), prefix.to_string()));
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        if item.get(&self.key_name) != Some(&self.key_value) {
            return false;
        }
        match &self.sort_prefix {
            Some((sort_key, prefix)) => item
                .get(sort_key)
                .and_then(Value::as_str)
                .map(|value| value.starts_with(prefix.as_str()))
                .unwrap_or(false),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

pub trait KeyValueStore {
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError>;

    fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError>;

    /// Sets every attribute of `changes` on the keyed item and returns the
    /// item as stored afterwards.
    fn update_item(&self, table: &str, key: &Item, changes: &Item) -> Result<Item, StoreError>;

    fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError>;

    /// All matching items; implementations follow pagination.
    fn query(&self, table: &str, query: &Query) -> Result<Vec<Item>, StoreError>;

    fn scan_page(
        &self,
        table: &str,
        projection: Option<&[String]>,
        start_key: Option<&Item>,
    ) -> Result<ScanPage, StoreError>;

    /// Writes up to 25 items and returns the ones the store left unprocessed.
    fn batch_put(&self, table: &str, items: &[Item]) -> Result<Vec<Item>, StoreError>;

    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
}

pub fn scan_all(
    store: &dyn KeyValueStore,
    table: &str,
    projection: Option<&[String]>,
) -> Result<Vec<Item>, StoreError> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;
    loop {
        let page = store.scan_page(table, projection, start_key.as_ref())?;
        items.extend(page.items);
        tracing::debug!(
            component = "kv_store",
            event = "scan_page",
            table,
            scanned = items.len()
        );
        match page.last_evaluated_key {
            Some(next) => start_key = Some(next),
            None => return Ok(items),
        }
    }
}

/// Builds a key map from string-valued key attributes.
pub fn key(pairs: &[(&str, &str)]) -> Item {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(*value)))
        .collect()
}
