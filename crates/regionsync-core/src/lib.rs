//! regionsync-core: Core library for regionsync
//!
//! Two independent components share one document collection:
//!
//! ```text
//! batch file -> Ingestor --insert_many(unordered)--> collection <--count-- Reporter
//!                  |                                                  (every 30s)
//!                  +-- rejected? remap location to region fallback, retry once
//! ```
//!
//! # Modules
//!
//! - `config`: Configuration loading (TOML file, environment overlay)
//! - `error`: Error taxonomy with remediation guidance
//! - `ingest`: Batch ingestion state machine with the fallback retry
//! - `logging`: `tracing` subscriber setup
//! - `record`: Records, batches and batch-file loading
//! - `region`: Region selectors, location sets and fallback locations
//! - `reporter`: Periodic per-region count loop
//! - `store`: Store seam and the MongoDB implementation
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod record;
pub mod region;
pub mod reporter;
pub mod store;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
