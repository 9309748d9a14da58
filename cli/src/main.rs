//! Bluechip command line.
//!
//! Loads the configuration, wires the HTTP collaborators and the SQLite store
//! into the ingestion pipeline and runs one subcommand. Ctrl-C cancels the
//! pipeline at its next suspension point.

use anyhow::{bail, Context};
use bluechip_core::{AppConfig, ExistenceBackend};
use bluechip_db::{companies, Database};
use bluechip_ingest::clients::{
    CompaniesHouseClient, CompaniesHouseSearch, HttpExistenceOracle, HttpPostcodeSource,
    OpenCageGeocoder,
};
use bluechip_ingest::{
    discover_query_keys, ExistenceOracle, IngestPipeline, PipelineLimits, PipelineSources,
    RetryPolicy, RunReport, ValidationCache,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "bluechip", version, about = "Bluechip company ingestion")]
struct Cli {
    #[arg(long, global = true, help = "Configuration file (defaults to the platform config dir)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print the run report as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan, validate, geocode and store new companies
    Run {
        /// Query keys to scan; discovered from the configured postcode areas when omitted
        query_keys: Vec<String>,
    },
    /// Store every cached acceptance without re-validating it
    ReprocessCache,
    /// Drop non-valid entries from the validation cache
    PurgeCache,
    /// List the query keys the configured postcode areas expand to
    Discover,
    /// List stored companies with missing fields
    Incomplete,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bluechip=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_with_env(cli.config.as_deref()).context("loading configuration")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    match cli.command {
        Commands::Run { query_keys } => {
            let query_keys = if query_keys.is_empty() {
                discover(&config, &cancel).await?
            } else {
                query_keys
            };
            if query_keys.is_empty() {
                bail!("no query keys given and none discovered from the configured postcode areas");
            }

            let db = open_database(&config).await?;
            let mut cache = ValidationCache::load(&config.cache.path).await?;
            let pipeline = build_pipeline(&config, &db, cancel)?;
            let result = pipeline.run(&query_keys, &mut cache).await;
            db.close().await;
            print_report(&result?, cli.json)?;
        }
        Commands::ReprocessCache => {
            let db = open_database(&config).await?;
            let mut cache = ValidationCache::load(&config.cache.path).await?;
            let pipeline = build_pipeline(&config, &db, cancel)?;
            let result = pipeline.reprocess_cache(&mut cache).await;
            db.close().await;
            print_report(&result?, cli.json)?;
        }
        Commands::PurgeCache => {
            let mut cache = ValidationCache::load(&config.cache.path).await?;
            let removed = cache.purge_non_valid().await?;
            println!("Removed {removed} entries, {} remain", cache.len());
        }
        Commands::Discover => {
            for key in discover(&config, &cancel).await? {
                println!("{key}");
            }
        }
        Commands::Incomplete => {
            let db = open_database(&config).await?;
            let incomplete = companies::find_incomplete(db.pool()).await;
            db.close().await;
            for number in incomplete? {
                println!("{number}");
            }
        }
    }

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            cancel.cancel();
        }
    });
}

async fn open_database(config: &AppConfig) -> anyhow::Result<Arc<Database>> {
    let db = Database::new(&config.store.database_path)
        .await
        .with_context(|| {
            format!(
                "opening company store at {}",
                config.store.database_path.display()
            )
        })?;
    db.run_migrations().await?;
    Ok(Arc::new(db))
}

async fn discover(config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<Vec<String>> {
    let source = HttpPostcodeSource::new(&config.postcodes, config.companies_house.timeout_secs)?;
    let retry = RetryPolicy::from_config(&config.retry);
    let keys = discover_query_keys(&source, &config.postcodes.areas, &retry, cancel).await?;
    tracing::info!(
        "Discovered {} query keys from {} postcode areas",
        keys.len(),
        config.postcodes.areas.len()
    );
    Ok(keys)
}

fn build_pipeline(
    config: &AppConfig,
    db: &Arc<Database>,
    cancel: CancellationToken,
) -> anyhow::Result<IngestPipeline> {
    let api = Arc::new(CompaniesHouseClient::new(&config.companies_house)?);
    let search = CompaniesHouseSearch::new(&config.companies_house, config.search.clone())?;

    let oracle: Arc<dyn ExistenceOracle> = match config.store.existence {
        ExistenceBackend::Database => db.clone(),
        ExistenceBackend::Http => {
            let base_url = config
                .store
                .existence_base_url
                .as_deref()
                .context("store.existence_base_url is required for the http existence backend")?;
            Arc::new(HttpExistenceOracle::new(
                base_url,
                config.companies_house.timeout_secs,
            )?)
        }
    };

    let sources = PipelineSources {
        search: Arc::new(search),
        officers: api.clone(),
        filings: api.clone(),
        details: api,
        geocoder: Arc::new(OpenCageGeocoder::new(&config.geocoding)?),
        oracle,
        store: db.clone(),
    };

    Ok(IngestPipeline::new(
        sources,
        PipelineLimits::from_config(config),
        cancel,
    ))
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        tracing::info!(
            "Run complete: {} scanned, {} accepted ({} cached), {} rejected, {} geocoded, \
             {} without coordinates, {} inserted, {} already stored",
            report.scanned,
            report.accepted,
            report.cache_hits,
            report.rejected,
            report.geocoded,
            report.geocode_misses,
            report.inserted,
            report.already_stored
        );
    }
    Ok(())
}
