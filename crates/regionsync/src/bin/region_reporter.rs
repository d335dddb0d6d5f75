//! region-reporter: print per-region record counts on a fixed interval.
//!
//! Runs until interrupted (Ctrl-C). A failed count query is reported and the
//! loop continues at the next interval.

use std::process::ExitCode;

use clap::Parser;
use regionsync::{CommonArgs, EXIT_FAILURE, init_logging, load_config, report_anyhow, report_failure, stamp};
use regionsync_core::config::Config;
use regionsync_core::reporter::{Reporter, spawn_reporter};
use regionsync_core::store::{MongoStore, redact_uri};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "region-reporter")]
#[command(version, about = "Report AMER and EMEA record counts every interval")]
struct Cli {
    /// Seconds between count queries
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Database name
    #[arg(long, value_name = "NAME")]
    database: Option<String>,

    /// Collection name
    #[arg(long, value_name = "NAME")]
    collection: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = load_config(&self.common, |key| std::env::var(key).ok())?;
        if let Some(secs) = self.interval_secs {
            config.reporter.interval_secs = secs;
        }
        if let Some(database) = self.database {
            config.store.database = database;
        }
        if let Some(collection) = self.collection {
            config.store.collection = collection;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return regionsync::exit_for_clap_error(&err),
    };

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            report_anyhow(&err);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    init_logging(&config);

    let store = match MongoStore::connect(&config.store).await {
        Ok(store) => store,
        Err(err) => {
            report_failure(&regionsync_core::Error::from(err));
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let interval = config.reporter.interval();
    println!(
        "{} Reporting {}.{} every {}s from {}",
        stamp(),
        config.store.database,
        config.store.collection,
        interval.as_secs(),
        redact_uri(&config.store.uri)
    );

    let handle = spawn_reporter(Reporter::new(store), interval, |report| {
        println!("{report}");
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for Ctrl-C; stopping");
    }
    handle.signal_shutdown();
    let stats = handle.join().await;
    info!(ticks = stats.ticks, failures = stats.failures, "Reporter stopped");

    ExitCode::SUCCESS
}
