//! AWS runtime side of the tanda backend.
//!
//! Storage and messaging sit behind the synchronous traits in [`adapters`],
//! with AWS SDK and in-memory implementations. [`handlers`] holds the HTTP
//! resources, the authorizer, the scheduled backup and the restore service;
//! the binaries under `src/bin` wire them to the Lambda runtime and the CLI.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod context;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod repository;
