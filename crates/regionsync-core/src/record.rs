//! Records, batches and batch-file loading.
//!
//! A batch file is plain JSON text holding an array of objects, despite the
//! `.json.arr` extension. Loading is all-or-nothing: either every record is
//! parsed into a [`Batch`] or the run aborts before any write is attempted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SourceLoadError;

/// Field inspected and rewritten by the ingestion pipeline.
pub const LOCATION_FIELD: &str = "location";

/// One structured document. Only `location` is interpreted; every other
/// field is passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The record's region tag, when present and a string.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.0.get(LOCATION_FIELD).and_then(Value::as_str)
    }

    /// Overwrite (or insert) the region tag.
    pub fn set_location(&mut self, location: &str) {
        self.0
            .insert(LOCATION_FIELD.to_string(), Value::String(location.to_string()));
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Ordered, non-empty sequence of records owned by one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    /// Returns `None` for an empty record list.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self { records })
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Overwrite every record's `location` with `location`.
    pub fn remap(&mut self, location: &str) {
        for record in &mut self.records {
            record.set_location(location);
        }
    }
}

/// Result of reading a batch source.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedBatch {
    Batch(Batch),
    /// Well-formed empty array: nothing to do.
    Empty,
}

/// Read and parse a batch file fully into memory.
pub fn load_batch(path: &Path) -> Result<LoadedBatch, SourceLoadError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceLoadError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(SourceLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_batch(&text, path)
}

/// Parse batch text. `path` is only used for error context.
pub fn parse_batch(text: &str, path: &Path) -> Result<LoadedBatch, SourceLoadError> {
    let value: Value = serde_json::from_str(text).map_err(|source| SourceLoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let Value::Array(items) = value else {
        return Err(SourceLoadError::WrongShape {
            path: path.to_path_buf(),
            reason: format!("expected a JSON array, found {}", json_kind(&value)),
        });
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(fields) => records.push(Record(fields)),
            other => {
                return Err(SourceLoadError::WrongShape {
                    path: path.to_path_buf(),
                    reason: format!(
                        "element {index} is {}, expected an object",
                        json_kind(&other)
                    ),
                });
            }
        }
    }

    Ok(Batch::new(records).map_or(LoadedBatch::Empty, LoadedBatch::Batch))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn path() -> PathBuf {
        PathBuf::from("mongo_batch_TEST.json.arr")
    }

    #[test]
    fn remap_overwrites_every_location() {
        let mut batch = Batch::new(vec![
            record(json!({"location": "US", "n": 1})),
            record(json!({"location": "XX"})),
            record(json!({"n": 3})),
        ])
        .unwrap();
        batch.remap("BE");
        assert!(batch.records().iter().all(|r| r.location() == Some("BE")));
        assert_eq!(batch.records()[0].fields()["n"], json!(1));
    }

    #[test]
    fn remap_is_idempotent() {
        let mut once = Batch::new(vec![record(json!({"location": "DE"}))]).unwrap();
        once.remap("CA");
        let mut twice = once.clone();
        twice.remap("CA");
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_record_list_is_not_a_batch() {
        assert!(Batch::new(Vec::new()).is_none());
    }

    #[test]
    fn parse_empty_array_is_empty() {
        assert_eq!(parse_batch("[]", &path()).unwrap(), LoadedBatch::Empty);
        assert_eq!(parse_batch(" [ ]\n", &path()).unwrap(), LoadedBatch::Empty);
    }

    #[test]
    fn parse_array_of_objects() {
        let loaded = parse_batch(r#"[{"location":"US"},{"location":"CA","v":true}]"#, &path())
            .unwrap();
        let LoadedBatch::Batch(batch) = loaded else {
            panic!("expected a batch");
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[1].location(), Some("CA"));
    }

    #[test]
    fn parse_rejects_non_array() {
        let err = parse_batch(r#"{"location":"US"}"#, &path()).unwrap_err();
        assert!(matches!(err, SourceLoadError::WrongShape { .. }));
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn parse_rejects_non_object_element() {
        let err = parse_batch(r#"[{"location":"US"}, 7]"#, &path()).unwrap_err();
        match err {
            SourceLoadError::WrongShape { reason, .. } => assert!(reason.contains("element 1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = parse_batch("[{\"location\": }", &path()).unwrap_err();
        assert!(matches!(err, SourceLoadError::Malformed { .. }));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_batch(&dir.path().join("absent.json.arr")).unwrap_err();
        assert!(matches!(err, SourceLoadError::Missing { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("mongo_batch_AMER.json.arr");
        std::fs::write(&file, r#"[{"location":"US"}]"#).unwrap();
        assert!(matches!(load_batch(&file).unwrap(), LoadedBatch::Batch(_)));
    }

    #[test]
    fn record_serializes_transparently() {
        let rec = record(json!({"location": "US", "sku": "a-1"}));
        let out = serde_json::to_value(&rec).unwrap();
        assert_eq!(out, json!({"location": "US", "sku": "a-1"}));
    }
}
