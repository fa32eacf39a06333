//! Shared tanda domain primitives.
//!
//! This crate owns the records, the birthday rotation, the payment ledger,
//! statistics and the backup archive codec. It stays free of AWS SDK and
//! Lambda runtime concerns so every rule can be exercised in plain unit tests.

pub mod backup;
pub mod calendar;
pub mod contract;
pub mod ids;
pub mod ledger;
pub mod numbers;
pub mod rotation;
pub mod stats;
pub mod storage_keys;
pub mod validation;
