use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object {key} not found")]
    NotFound { key: String },
    #[error("object store request failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub storage_class: Option<String>,
}

pub trait ObjectStore {
    fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), ObjectStoreError>;

    fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError>;

    /// Every object under `prefix`, across all listing pages.
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ObjectStoreError>;
}
