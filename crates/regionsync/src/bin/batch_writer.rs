//! batch-writer: insert one region's batch file into the shared collection.
//!
//! ```text
//! batch-writer [OPTIONS] [URI] <DATABASE> <COLLECTION>
//! ```
//!
//! The batch is read from `<batch-dir>/mongo_batch_<REGION>.json.arr`. Records
//! rejected by the store trigger a single retry of the whole batch with the
//! region's fallback location. Exit code is 0 on success (including an empty
//! batch) and 1 on any failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use clap::Parser;
use regionsync::{CommonArgs, EXIT_FAILURE, init_logging, load_config, report_anyhow, report_failure, stamp};
use regionsync_core::config::Config;
use regionsync_core::ingest::{IngestSummary, run_batch_file};
use regionsync_core::region::Region;
use regionsync_core::store::MongoStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "batch-writer")]
#[command(version, about = "Insert a region's batch file, retrying rejected batches with the region's fallback location")]
struct Cli {
    /// [URI] DATABASE COLLECTION; a URI given here overrides MONGO_URI
    #[arg(value_name = "ARGS", num_args = 2..=3, required = true)]
    positionals: Vec<String>,

    /// Region selector (AMER, EMEA, ...); overrides REGION
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Directory holding the batch files
    #[arg(long, value_name = "DIR")]
    batch_dir: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = load_config(&self.common, |key| std::env::var(key).ok())?;

        let (uri, database, collection) = match self.positionals.as_slice() {
            [uri, database, collection] => (Some(uri), database, collection),
            [database, collection] => (None, database, collection),
            other => bail!("expected [URI] DATABASE COLLECTION, got {} arguments", other.len()),
        };
        if let Some(uri) = uri {
            config.store.uri.clone_from(uri);
        }
        config.store.database.clone_from(database);
        config.store.collection.clone_from(collection);

        if let Some(region) = &self.region {
            config.ingest.region = Region::parse(region);
        }
        if let Some(dir) = self.batch_dir {
            config.ingest.batch_dir = dir;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn run(config: Config) -> ExitCode {
    let path = config.ingest.batch_path();
    let region = config.ingest.region.clone();

    println!(
        "{} Bulk insert starting for REGION={region} from {}",
        stamp(),
        path.display()
    );

    let result = run_batch_file(&path, &region, || MongoStore::connect(&config.store)).await;
    match result {
        Ok(IngestSummary::NothingToDo) => {
            println!("{} No documents to insert: {} is empty", stamp(), path.display());
            ExitCode::SUCCESS
        }
        Ok(IngestSummary::Inserted(report)) => {
            match report.fallback_location {
                Some(location) => println!(
                    "{} Fallback insert successful with location={location}: {} documents inserted",
                    stamp(),
                    report.inserted
                ),
                None => println!(
                    "{} Inserted {} documents successfully",
                    stamp(),
                    report.inserted
                ),
            }
            info!(
                region = %region,
                inserted = report.inserted,
                attempts = report.attempts,
                "Batch writer finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err.exit_code();
            report_failure(&regionsync_core::Error::from(err));
            ExitCode::from(code)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
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

    run(config).await
}
