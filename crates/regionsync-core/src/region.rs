//! Region selectors and their location mappings.
//!
//! A [`Region`] is the partition selector supplied to a run (usually via the
//! `REGION` environment variable). It is distinct from the per-record
//! `location` tag: each known region maps to a set of expected locations
//! (used by the reporter's count queries) and to one fallback location (used
//! by the ingestor when a batch write is rejected).
//!
//! The fallback table crosses partitions: `AMER` falls back to `BE`, which
//! the reporter counts under `EMEA`, and `EMEA` falls back to `CA`, which is
//! counted under `AMER`. The mapping is kept literally for compatibility with
//! existing batch producers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Locations counted under the AMER partition.
pub const AMER_LOCATIONS: &[&str] = &["US", "CA"];
/// Locations counted under the EMEA partition.
pub const EMEA_LOCATIONS: &[&str] = &["DE", "BE"];

/// Partition selector for one ingestion run or one reporter query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    Amer,
    Emea,
    /// Any other selector. Kept verbatim so it still names a batch file.
    Other(String),
}

impl Region {
    /// Regions counted by the reporter, in report order.
    pub const REPORTED: [Self; 2] = [Self::Amer, Self::Emea];

    /// Parse a selector. Total: unknown tags become [`Region::Other`].
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "AMER" => Self::Amer,
            "EMEA" => Self::Emea,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Amer => "AMER",
            Self::Emea => "EMEA",
            Self::Other(tag) => tag,
        }
    }

    /// Replacement `location` applied to every record before the single retry.
    #[must_use]
    pub const fn fallback_location(&self) -> Option<&'static str> {
        match self {
            Self::Amer => Some("BE"),
            Self::Emea => Some("CA"),
            Self::Other(_) => None,
        }
    }

    /// Locations counted under this region by the reporter.
    #[must_use]
    pub const fn location_set(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Amer => Some(AMER_LOCATIONS),
            Self::Emea => Some(EMEA_LOCATIONS),
            Self::Other(_) => None,
        }
    }

    /// Reporting partition a location falls in, if any.
    #[must_use]
    pub fn partition_of(location: &str) -> Option<Self> {
        Self::REPORTED.into_iter().find(|region| {
            region
                .location_set()
                .is_some_and(|set| set.contains(&location))
        })
    }

    /// Batch file name read for this region (`mongo_batch_<REGION>.json.arr`).
    #[must_use]
    pub fn batch_file_name(&self) -> String {
        format!("mongo_batch_{}.json.arr", self.as_str())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}
