//! Batch ingestion with a single region-aware fallback retry.
//!
//! Per run:
//!
//! ```text
//! Loading -> Inserting -> DoneOk
//!                      -> FallbackRemap -> RetryInserting -> DoneOk | DoneFail
//!                      -> DoneFail (no fallback for region, or transport failure)
//!         -> DoneFail (load error)
//!         -> DoneOk   (empty batch, nothing inserted)
//! ```
//!
//! A run never makes more than two insert calls. The fallback is reserved
//! for records the store rejected; a transport failure has already been
//! retried by the driver and ends the run.

use std::fmt;
use std::future::Future;
use std::path::Path;

use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::{IngestError, StoreError};
use crate::record::{Batch, LoadedBatch, load_batch};
use crate::region::Region;
use crate::store::{InsertOutcome, RecordStore};

/// Upper bound on insert calls per run (first attempt plus one retry).
pub const MAX_INSERT_ATTEMPTS: u32 = 2;

/// Phase of the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    Loading,
    Inserting,
    FallbackRemap,
    RetryInserting,
    DoneOk,
    DoneFail,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Inserting => "inserting",
            Self::FallbackRemap => "fallback_remap",
            Self::RetryInserting => "retry_inserting",
            Self::DoneOk => "done_ok",
            Self::DoneFail => "done_fail",
        };
        f.write_str(name)
    }
}

/// Successful ingestion of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records accepted by the final (successful) attempt.
    pub inserted: u64,
    /// Insert calls made (1 or 2).
    pub attempts: u32,
    /// Location applied to every record before the retry, if one happened.
    pub fallback_location: Option<&'static str>,
    /// Records the rejected first attempt still accepted. These are written
    /// again by the retry.
    pub accepted_before_fallback: u64,
}

/// Terminal result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSummary {
    Inserted(IngestReport),
    /// The batch source was a well-formed empty array.
    NothingToDo,
}

/// Drives one batch through insert and, when needed, the fallback retry.
#[derive(Debug)]
pub struct Ingestor<S> {
    store: S,
    region: Region,
}

impl<S: RecordStore> Ingestor<S> {
    pub fn new(store: S, region: Region) -> Self {
        Self { store, region }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert `batch`, remapping and retrying once on store-side rejection.
    pub async fn run(&self, batch: Batch) -> Result<IngestReport, IngestError> {
        let span = info_span!(
            "ingest",
            region = %self.region,
            collection = %self.store.collection_name(),
            records = batch.len(),
        );
        self.run_inner(batch).instrument(span).await
    }

    async fn run_inner(&self, mut batch: Batch) -> Result<IngestReport, IngestError> {
        enter(IngestPhase::Inserting);
        let (accepted_before_fallback, rejected) = match self.attempt_insert(&batch, 1).await {
            InsertOutcome::Success { inserted } => {
                enter(IngestPhase::DoneOk);
                return Ok(IngestReport {
                    inserted,
                    attempts: 1,
                    fallback_location: None,
                    accepted_before_fallback: 0,
                });
            }
            InsertOutcome::TransportFailure { cause } => {
                enter(IngestPhase::DoneFail);
                return Err(IngestError::Transport { cause });
            }
            InsertOutcome::PartialFailure { inserted, failed } => (inserted, failed.len()),
            // Nothing confirmed: treat the whole batch as rejected.
            InsertOutcome::Unconfirmed { .. } => (0, batch.len()),
        };

        let Some(location) = self.region.fallback_location() else {
            error!(rejected, "No fallback location defined for region");
            enter(IngestPhase::DoneFail);
            return Err(IngestError::UnmappedRegion {
                region: self.region.clone(),
                rejected,
            });
        };

        enter(IngestPhase::FallbackRemap);
        if let Some(partition) = Region::partition_of(location) {
            if partition != self.region {
                warn!(
                    fallback_location = location,
                    counted_under = %partition,
                    "Fallback location is counted under another region's partition"
                );
            }
        }
        info!(fallback_location = location, "Retrying with fallback location");
        batch.remap(location);

        enter(IngestPhase::RetryInserting);
        match self.attempt_insert(&batch, MAX_INSERT_ATTEMPTS).await {
            InsertOutcome::Success { inserted } => {
                enter(IngestPhase::DoneOk);
                Ok(IngestReport {
                    inserted,
                    attempts: MAX_INSERT_ATTEMPTS,
                    fallback_location: Some(location),
                    accepted_before_fallback,
                })
            }
            other => {
                enter(IngestPhase::DoneFail);
                Err(IngestError::FallbackFailed {
                    location,
                    detail: other.describe(),
                })
            }
        }
    }

    async fn attempt_insert(&self, batch: &Batch, attempt: u32) -> InsertOutcome {
        info!(attempt, records = batch.len(), "Bulk insert starting");
        let outcome = self.store.insert_unordered(batch.records()).await;
        match &outcome {
            InsertOutcome::Success { inserted } => {
                info!(attempt, inserted, "Bulk insert succeeded");
            }
            InsertOutcome::PartialFailure { inserted, failed } => {
                warn!(
                    attempt,
                    inserted,
                    rejected = failed.len(),
                    total = outcome.is_total_rejection(),
                    detail = %outcome.describe(),
                    "Bulk write error"
                );
            }
            InsertOutcome::Unconfirmed { cause } => {
                warn!(attempt, cause = %cause, kind = outcome.kind(), "Bulk write not confirmed");
            }
            InsertOutcome::TransportFailure { cause } => {
                error!(attempt, cause = %cause, "Insert failed");
            }
        }
        outcome
    }
}

fn enter(phase: IngestPhase) {
    tracing::debug!(%phase, "Ingest phase");
}

/// Load the batch at `path`, connect only if there is something to insert,
/// then run the ingestor.
pub async fn run_batch_file<S, F, Fut>(
    path: &Path,
    region: &Region,
    connect: F,
) -> Result<IngestSummary, IngestError>
where
    S: RecordStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S, StoreError>>,
{
    enter(IngestPhase::Loading);
    let batch = match load_batch(path) {
        Ok(LoadedBatch::Batch(batch)) => batch,
        Ok(LoadedBatch::Empty) => {
            info!(path = %path.display(), "Batch file is empty; nothing to insert");
            enter(IngestPhase::DoneOk);
            return Ok(IngestSummary::NothingToDo);
        }
        Err(err) => {
            error!(error = %err, "Failed to read batch file");
            enter(IngestPhase::DoneFail);
            return Err(err.into());
        }
    };
    info!(path = %path.display(), records = batch.len(), region = %region, "Batch loaded");

    let store = connect().await?;
    let ingestor = Ingestor::new(store, region.clone());
    ingestor.run(batch).await.map(IngestSummary::Inserted)
}
