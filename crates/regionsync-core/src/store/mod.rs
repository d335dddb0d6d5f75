//! Shared data store access.
//!
//! The ingestor only appends and the reporter only counts, so the store seam
//! is two operations. [`MongoStore`] is the production implementation;
//! tests supply scripted stores.

mod mongo;

pub use mongo::MongoStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::record::Record;

/// A single record the store refused during a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Position of the record within the submitted batch.
    pub index: usize,
    /// Store error code.
    pub code: i32,
    pub message: String,
}

/// Result of one unordered bulk-insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Every record was accepted.
    Success { inserted: u64 },
    /// The store rejected some (or all) records and kept going with the rest.
    PartialFailure {
        inserted: u64,
        failed: Vec<RejectedRecord>,
    },
    /// The store reported a bulk-write failure without per-record
    /// rejections (write concern not satisfied). No record is confirmed.
    Unconfirmed { cause: String },
    /// The request itself failed after the driver's own transient retries.
    TransportFailure { cause: String },
}

impl InsertOutcome {
    /// True when the store rejected every record of the attempt.
    #[must_use]
    pub const fn is_total_rejection(&self) -> bool {
        matches!(self, Self::PartialFailure { inserted: 0, .. })
    }

    /// Short label used in structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            _ if self.is_total_rejection() => "total_failure",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Unconfirmed { .. } => "unconfirmed",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }

    /// Human-readable detail for logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Success { inserted } => format!("{inserted} inserted"),
            Self::PartialFailure { inserted, failed } => {
                let mut detail = format!("{} rejected, {inserted} inserted", failed.len());
                if let Some(first) = failed.first() {
                    detail.push_str(&format!(
                        "; first rejection at index {} (code {}): {}",
                        first.index, first.code, first.message
                    ));
                }
                detail
            }
            Self::Unconfirmed { cause } => format!("write not confirmed: {cause}"),
            Self::TransportFailure { cause } => cause.clone(),
        }
    }
}

/// Append-and-count access to the collection shared by ingestor and reporter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert all records without stopping at the first per-record failure.
    async fn insert_unordered(&self, records: &[Record]) -> InsertOutcome;

    /// Exact count of records whose `location` is one of `locations`.
    async fn count_where_location_in(&self, locations: &[&str]) -> Result<u64, StoreError>;

    /// Collection name, for log context.
    fn collection_name(&self) -> &str;
}

/// Strip credentials from a connection string before it is logged.
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    match rest[..host_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &uri[..scheme_end], &rest[at + 1..]),
        None => uri.to_string(),
    }
}
