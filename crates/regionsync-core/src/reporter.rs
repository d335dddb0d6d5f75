//! Periodic per-region record counts.
//!
//! Every interval the reporter runs one count query per reported region
//! against the collection the ingestor writes to, then hands the result to a
//! sink. Query failures are reported and the loop carries on at the next
//! interval. Iterations never overlap: a slow query pushes the next tick back
//! instead of bunching ticks up.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::error::StoreError;
use crate::region::Region;
use crate::store::RecordStore;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Counts for every reported region at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCounts {
    pub at: DateTime<Local>,
    pub counts: Vec<(Region, u64)>,
}

impl PartitionCounts {
    #[must_use]
    pub fn get(&self, region: &Region) -> Option<u64> {
        self.counts
            .iter()
            .find(|(r, _)| r == region)
            .map(|(_, count)| *count)
    }
}

impl fmt::Display for PartitionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.at.format(TIMESTAMP_FORMAT))?;
        for (i, (region, count)) in self.counts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{region}: {count}")?;
        }
        Ok(())
    }
}

/// Outcome of one reporter iteration.
#[derive(Debug)]
pub enum TickReport {
    Counts(PartitionCounts),
    Failed {
        at: DateTime<Local>,
        error: StoreError,
    },
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counts(counts) => counts.fmt(f),
            Self::Failed { at, error } => write!(
                f,
                "[{}] Error during read: {error}",
                at.format(TIMESTAMP_FORMAT)
            ),
        }
    }
}

/// Runs the count queries for the reported regions.
#[derive(Debug)]
pub struct Reporter<S> {
    store: S,
}

impl<S: RecordStore> Reporter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Exact count of records whose `location` is in `locations`.
    pub async fn count_where_location_in(&self, locations: &[&str]) -> Result<u64, StoreError> {
        self.store.count_where_location_in(locations).await
    }

    /// Count every reported region; the first failing query aborts the tick.
    pub async fn tick(&self) -> Result<PartitionCounts, StoreError> {
        let mut counts = Vec::with_capacity(Region::REPORTED.len());
        for region in Region::REPORTED {
            let Some(locations) = region.location_set() else {
                continue;
            };
            let count = self.count_where_location_in(locations).await?;
            counts.push((region, count));
        }
        Ok(PartitionCounts {
            at: Local::now(),
            counts,
        })
    }

    /// One iteration: query, log, and wrap the result for the sink.
    pub async fn report_once(&self) -> TickReport {
        match self.tick().await {
            Ok(counts) => {
                info!(
                    collection = %self.store.collection_name(),
                    counts = ?counts.counts,
                    "Partition counts"
                );
                TickReport::Counts(counts)
            }
            Err(error) => {
                error!(
                    collection = %self.store.collection_name(),
                    error = %error,
                    "Count query failed; retrying next interval"
                );
                TickReport::Failed {
                    at: Local::now(),
                    error,
                }
            }
        }
    }
}

/// Iteration totals returned when the reporter stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReporterStats {
    pub ticks: u64,
    pub failures: u64,
}

/// Handle returned by [`spawn_reporter`] to control the reporter task.
pub struct ReporterHandle {
    task: JoinHandle<ReporterStats>,
    shutdown: watch::Sender<bool>,
}

impl ReporterHandle {
    /// Signal the reporter to stop after the current iteration.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the reporter task to finish.
    pub async fn join(self) -> ReporterStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "Reporter task ended abnormally");
                ReporterStats::default()
            }
        }
    }
}

/// Spawn the reporter loop.
///
/// The first query runs one full `interval` after spawning. Each
/// [`TickReport`] is passed to `sink`. The loop runs until
/// [`ReporterHandle::signal_shutdown`] is called or the handle is dropped.
#[must_use]
pub fn spawn_reporter<S, F>(reporter: Reporter<S>, interval: Duration, mut sink: F) -> ReporterHandle
where
    S: RecordStore + 'static,
    F: FnMut(&TickReport) + Send + 'static,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut stats = ReporterStats::default();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Reporter: shutdown signal received");
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = reporter.report_once().await;
            stats.ticks += 1;
            if matches!(report, TickReport::Failed { .. }) {
                stats.failures += 1;
            }
            sink(&report);
        }

        stats
    });

    ReporterHandle { task, shutdown }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::store::InsertOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts by location; fails the calls whose (0-based) index is listed.
    struct CountingStore {
        calls: Arc<AtomicU32>,
        fail_calls: Vec<u32>,
        queried: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl CountingStore {
        fn new(fail_calls: Vec<u32>) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                fail_calls,
                queried: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn insert_unordered(&self, records: &[Record]) -> InsertOutcome {
            InsertOutcome::Success {
                inserted: records.len() as u64,
            }
        }

        async fn count_where_location_in(&self, locations: &[&str]) -> Result<u64, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.queried
                .lock()
                .unwrap()
                .push(locations.iter().map(ToString::to_string).collect());
            if self.fail_calls.contains(&call) {
                return Err(StoreError::Query {
                    collection: "aaColl".to_string(),
                    message: "not primary and secondaryOk=false".to_string(),
                });
            }
            Ok(locations.len() as u64 * 10)
        }

        fn collection_name(&self) -> &str {
            "aaColl"
        }
    }

    #[tokio::test]
    async fn tick_queries_amer_then_emea() {
        let store = CountingStore::new(vec![]);
        let queried = Arc::clone(&store.queried);
        let counts = Reporter::new(store).tick().await.unwrap();

        assert_eq!(counts.get(&Region::Amer), Some(20));
        assert_eq!(counts.get(&Region::Emea), Some(20));
        let queried = queried.lock().unwrap();
        assert_eq!(*queried, vec![vec!["US", "CA"], vec!["DE", "BE"]]);
    }

    #[tokio::test]
    async fn tick_fails_on_first_query_error() {
        let store = CountingStore::new(vec![0]);
        let calls = Arc::clone(&store.calls);
        let err = Reporter::new(store).tick().await.unwrap_err();
        assert!(matches!(err, StoreError::Query { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn counts_line_format() {
        let at = Local::now();
        let counts = PartitionCounts {
            at,
            counts: vec![(Region::Amer, 4), (Region::Emea, 7)],
        };
        let line = counts.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] AMER: 4, EMEA: 7"));
    }

    #[test]
    fn failure_line_format() {
        let report = TickReport::Failed {
            at: Local::now(),
            error: StoreError::Query {
                collection: "aaColl".into(),
                message: "timeout".into(),
            },
        };
        assert!(report.to_string().contains("] Error during read: "));
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_waits_one_interval() {
        let store = CountingStore::new(vec![]);
        let calls = Arc::clone(&store.calls);
        let handle = spawn_reporter(Reporter::new(store), Duration::from_secs(30), |_| {});

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.signal_shutdown();
        let stats = handle.join().await;
        assert_eq!(stats, ReporterStats { ticks: 1, failures: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_stop_the_loop() {
        let store = CountingStore::new(vec![0]);
        let calls = Arc::clone(&store.calls);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let handle = spawn_reporter(Reporter::new(store), Duration::from_secs(30), move |r| {
            sink_lines.lock().unwrap().push(r.to_string());
        });

        tokio::time::sleep(Duration::from_secs(65)).await;
        handle.signal_shutdown();
        let stats = handle.join().await;

        assert_eq!(stats, ReporterStats { ticks: 2, failures: 1 });
        // One failed query, then both queries on the next tick; no busy loop.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let lines = lines.lock().unwrap();
        assert!(lines[0].contains("Error during read"));
        assert!(lines[1].ends_with("AMER: 20, EMEA: 20"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick() {
        let handle = spawn_reporter(
            Reporter::new(CountingStore::new(vec![])),
            Duration::from_secs(30),
            |_| {},
        );
        handle.signal_shutdown();
        assert_eq!(handle.join().await, ReporterStats::default());
    }
}
