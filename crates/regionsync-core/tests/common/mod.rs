//! Shared test infrastructure for regionsync-core integration tests.
//!
//! Import from integration test files with:
//! ```ignore
//! mod common;
//! use common::ScriptedStore;
//! ```

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regionsync_core::error::StoreError;
use regionsync_core::record::Record;
use regionsync_core::store::{InsertOutcome, RecordStore, RejectedRecord};

/// In-memory store that replays scripted insert outcomes.
///
/// Once the script is exhausted every insert succeeds. Each submitted batch
/// is recorded so tests can assert on attempt counts and remapped locations.
/// Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    script: Arc<Mutex<VecDeque<InsertOutcome>>>,
    inserts: Arc<Mutex<Vec<Vec<Record>>>>,
    stored: Arc<Mutex<Vec<Record>>>,
}

impl ScriptedStore {
    pub fn new(script: impl IntoIterator<Item = InsertOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Every batch passed to `insert_unordered`, in call order.
    pub fn inserts(&self) -> Vec<Vec<Record>> {
        self.inserts.lock().unwrap().clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }

    /// Records the store accepted across all attempts.
    pub fn stored(&self) -> Vec<Record> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn insert_unordered(&self, records: &[Record]) -> InsertOutcome {
        self.inserts.lock().unwrap().push(records.to_vec());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InsertOutcome::Success {
                inserted: records.len() as u64,
            });

        let mut stored = self.stored.lock().unwrap();
        match &outcome {
            InsertOutcome::Success { .. } => stored.extend(records.iter().cloned()),
            InsertOutcome::PartialFailure { failed, .. } => {
                for (index, record) in records.iter().enumerate() {
                    if !failed.iter().any(|f| f.index == index) {
                        stored.push(record.clone());
                    }
                }
            }
            InsertOutcome::Unconfirmed { .. } | InsertOutcome::TransportFailure { .. } => {}
        }
        outcome
    }

    async fn count_where_location_in(&self, locations: &[&str]) -> Result<u64, StoreError> {
        let stored = self.stored.lock().unwrap();
        Ok(stored
            .iter()
            .filter(|r| r.location().is_some_and(|loc| locations.contains(&loc)))
            .count() as u64)
    }

    fn collection_name(&self) -> &str {
        "aaColl"
    }
}

/// Partial failure rejecting the records at `indices` out of `submitted`.
pub fn rejecting(indices: &[usize], submitted: usize) -> InsertOutcome {
    InsertOutcome::PartialFailure {
        inserted: (submitted - indices.len()) as u64,
        failed: indices
            .iter()
            .map(|&index| RejectedRecord {
                index,
                code: 121,
                message: "Document failed validation".to_string(),
            })
            .collect(),
    }
}

/// Write a batch file named for `region_tag` into `dir`.
pub fn write_batch_file(dir: &std::path::Path, region_tag: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("mongo_batch_{region_tag}.json.arr"));
    std::fs::write(&path, body).unwrap();
    path
}
