//! MongoDB-backed [`RecordStore`].

use async_trait::async_trait;
use mongodb::bson::{Bson, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, InsertManyOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, Collection};
use tracing::debug;

use super::{InsertOutcome, RecordStore, RejectedRecord, redact_uri};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::record::Record;

/// Store bound to one database and collection.
///
/// Reads prefer the primary and fall back to a secondary; writes use the
/// driver's retryable-write policy for transient transport failures.
#[derive(Clone)]
pub struct MongoStore {
    collection: Collection<Record>,
    collection_name: String,
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("collection", &self.collection_name)
            .finish_non_exhaustive()
    }
}

impl MongoStore {
    /// Build a client for `config.uri`. The driver connects lazily, so this
    /// only fails on an unparsable URI or unresolvable SRV record.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let redacted = redact_uri(&config.uri);

        let mut options =
            ClientOptions::parse(&config.uri)
                .await
                .map_err(|err| StoreError::InvalidUri {
                    uri: redacted.clone(),
                    message: err.to_string(),
                })?;
        options.app_name = Some(config.app_name.clone());
        options.retry_writes = Some(true);
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::PrimaryPreferred {
                options: Default::default(),
            },
        ));

        let client = Client::with_options(options).map_err(|err| StoreError::Connect {
            uri: redacted.clone(),
            message: err.to_string(),
        })?;
        let collection = client
            .database(&config.database)
            .collection::<Record>(&config.collection);

        debug!(
            uri = %redacted,
            database = %config.database,
            collection = %config.collection,
            "Store client configured"
        );

        Ok(Self {
            collection,
            collection_name: config.collection.clone(),
        })
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn insert_unordered(&self, records: &[Record]) -> InsertOutcome {
        let mut options = InsertManyOptions::default();
        options.ordered = Some(false);

        match self.collection.insert_many(records, options).await {
            Ok(result) => InsertOutcome::Success {
                inserted: result.inserted_ids.len() as u64,
            },
            Err(err) => classify_insert_error(&err, records.len()),
        }
    }

    async fn count_where_location_in(&self, locations: &[&str]) -> Result<u64, StoreError> {
        let set: Vec<Bson> = locations
            .iter()
            .map(|location| Bson::String((*location).to_string()))
            .collect();
        let filter = doc! { "location": { "$in": set } };

        self.collection
            .count_documents(filter, None)
            .await
            .map_err(|err| StoreError::Query {
                collection: self.collection_name.clone(),
                message: err.to_string(),
            })
    }

    fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

/// Split driver errors into store-side write failures and request failures.
///
/// Every bulk-write error is a write failure: per-record rejections become
/// [`InsertOutcome::PartialFailure`], a bulk error carrying none of them
/// (write concern only) becomes [`InsertOutcome::Unconfirmed`].
fn classify_insert_error(err: &MongoError, submitted: usize) -> InsertOutcome {
    let ErrorKind::BulkWrite(failure) = err.kind.as_ref() else {
        return InsertOutcome::TransportFailure {
            cause: err.to_string(),
        };
    };

    match failure.write_errors.as_deref() {
        Some(write_errors) if !write_errors.is_empty() => {
            let failed: Vec<RejectedRecord> = write_errors
                .iter()
                .map(|we| RejectedRecord {
                    index: we.index,
                    code: we.code,
                    message: we.message.clone(),
                })
                .collect();
            InsertOutcome::PartialFailure {
                inserted: submitted.saturating_sub(failed.len()) as u64,
                failed,
            }
        }
        _ => InsertOutcome::Unconfirmed {
            cause: failure.write_concern_error.as_ref().map_or_else(
                || err.to_string(),
                |wce| format!("code {}: {}", wce.code, wce.message),
            ),
        },
    }
}
