mod output;

use clap::Parser;
use color_eyre::eyre;
use mongodb_collectors::config::MongoDbConfig;
use mongodb_collectors::declarations::DECLARATIONS_VERSION;
use mongodb_collectors::Exporter;
use mongodb_exporter_component::config::Config;
use mongodb_exporter_component::ext::NumSamples;
use mongodb_exporter_component::prometheus::{encode_text, gather};
use opentelemetry::trace::TracerProvider as TracerProviderTrait;
use opentelemetry_sdk::trace::TracerProvider;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Options {
    #[arg(long = "uri", env = "MONGODB_URI", help = "MongoDB connection URI")]
    pub connection_uri: Option<String>,
    #[arg(long = "interval", help = "Scrape interval in seconds")]
    pub interval_secs: Option<u64>,
    #[arg(short = 'c', long = "config", aliases = ["conf"], help = "Path to YAML config file")]
    pub config_path: Option<PathBuf>,
    #[arg(
        short = 'o',
        long = "output",
        help = "Write the exposition to this file instead of stdout"
    )]
    pub output: Option<PathBuf>,
    #[arg(long = "once", help = "Scrape once and exit")]
    pub once: bool,
    #[arg(
        long = "compatible-mode",
        help = "Emit the metric names of the legacy exporter where they exist"
    )]
    pub compatible_mode: bool,
    #[arg(long = "global-conn-pool", help = "Keep one connection pool across scrapes")]
    pub global_conn_pool: bool,
    #[arg(long = "discover-collections", help = "Collect stats of all user collections")]
    pub discover_collections: bool,
}

pub const APPLICATION_NAME: &str = "mongodb-exporter";

fn setup_telemetry() -> eyre::Result<()> {
    let provider = TracerProvider::builder().build();
    let tracer = provider.tracer(APPLICATION_NAME);

    // create a tracing layer with the configured tracer
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    // stdout may carry the exposition
    let subscriber = tracing_subscriber::registry()
        .with(telemetry)
        .with(
            tracing_subscriber::fmt::Layer::new()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::filter::EnvFilter::from_default_env());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn mongodb_config(options: &Options, config: &Config) -> eyre::Result<MongoDbConfig> {
    let mut mongodb = MongoDbConfig::from_value(config.mongodb.clone())?;
    if let Some(uri) = &options.connection_uri {
        mongodb.uri = uri.clone();
    }
    mongodb.compatible_mode |= options.compatible_mode;
    mongodb.global_conn_pool |= options.global_conn_pool;
    mongodb.discover_collections |= options.discover_collections;
    Ok(mongodb)
}

async fn export(exporter: &Exporter, config: &Config) -> eyre::Result<String> {
    let start = Instant::now();
    let scrape = exporter.scrape().await;
    let families = gather(&scrape, &config.exporter)?;
    debug!(
        "gathered {} families with {} samples in {:?}",
        families.len(),
        families.num_samples(),
        start.elapsed()
    );
    encode_text(&families)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    setup_telemetry()?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            return;
        }
        warn!("received ctr-c");
        info!("initiate graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    // parse config
    let options = Options::parse();
    let config = match &options.config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mongodb = mongodb_config(&options, &config)?;
    let interval = options
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.scrape.interval());

    let exporter = tokio::select! {
        exporter = Exporter::from_config(mongodb, config.scrape.timeout()) => exporter?,
        _ = shutdown_rx.changed() => return Ok(()),
    };
    info!(
        ?interval,
        compatible_mode = exporter.config().compatible_mode,
        declarations = DECLARATIONS_VERSION,
        "starting exporter"
    );

    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => (),
            _ = shutdown_rx.changed() => break,
        };
        match export(&exporter, &config).await {
            Ok(text) => {
                if let Err(err) = output::write(options.output.as_deref(), &text) {
                    error!("failed to write metrics: {err}");
                }
            }
            Err(err) => error!("failed to export metrics: {err}"),
        }
        if options.once {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() -> eyre::Result<()> {
        let options = Options::parse_from([
            APPLICATION_NAME,
            "--uri",
            "mongodb://db:27017",
            "--compatible-mode",
            "--once",
        ]);
        assert!(options.once);
        let config = Config::from_reader(std::io::Cursor::new(
            "mongodb:\n  uri: mongodb://other:27017\n  discover_collections: true\n",
        ))?;
        let mongodb = mongodb_config(&options, &config)?;
        assert_eq!(mongodb.uri, "mongodb://db:27017");
        assert!(mongodb.compatible_mode);
        assert!(mongodb.discover_collections);
        assert!(!mongodb.global_conn_pool);
        Ok(())
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Options::command().debug_assert();
    }

    #[test]
    fn compatible_mode_help() {
        use clap::CommandFactory;
        let command = Options::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "compatible_mode")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string);
        assert_eq!(
            help.as_deref(),
            Some("Emit the metric names of the legacy exporter where they exist")
        );
    }
}
