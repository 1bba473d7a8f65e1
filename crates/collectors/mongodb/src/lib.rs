pub mod attributes;
pub mod collectors;
pub mod compat;
pub mod config;
pub mod declarations;
pub mod dispatch;
pub mod flatten;
pub mod metrics;
pub mod path;
pub mod source;
pub mod value;

use collectors::Context;
use color_eyre::eyre;
use config::MongoDbConfig;
use mongodb::bson;
use mongodb_exporter_component::registry::{Registry, Scrape};
use mongodb_exporter_component::suppress::{SuppressionKey, SuppressionLedger};
use mongodb_exporter_component::{Descriptor, Error, MetricKind, MetricSample};
use source::{DocumentSource, MongoSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const UP: &str = "up";

const CONNECTION_SCOPE: &str = "connection";

/// Process lifetime state of the exporter.
///
/// Collectors are built for every scrape and hold no values across scrapes.
#[derive(Debug)]
pub struct Exporter {
    config: MongoDbConfig,
    timeout: Duration,
    ledger: Arc<SuppressionLedger>,
    field_ledger: Arc<SuppressionLedger>,
    pool: Option<Arc<dyn DocumentSource>>,
}

impl Exporter {
    /// Creates the exporter, connecting right away when a global pool is configured.
    pub async fn from_config(config: MongoDbConfig, timeout: Duration) -> eyre::Result<Self> {
        let pool: Option<Arc<dyn DocumentSource>> = if config.global_conn_pool {
            let source = MongoSource::connect(&config.uri, config.direct_connection).await?;
            Some(Arc::new(source))
        } else {
            None
        };
        Ok(Self {
            config,
            timeout,
            ledger: Arc::new(SuppressionLedger::new()),
            field_ledger: Arc::new(SuppressionLedger::new()),
            pool,
        })
    }

    /// Creates an exporter that scrapes `source` on every scrape.
    pub fn with_source(
        config: MongoDbConfig,
        timeout: Duration,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            config,
            timeout,
            ledger: Arc::new(SuppressionLedger::new()),
            field_ledger: Arc::new(SuppressionLedger::new()),
            pool: Some(source),
        }
    }

    pub fn config(&self) -> &MongoDbConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SuppressionLedger {
        &self.ledger
    }

    fn context(&self, source: Arc<dyn DocumentSource>) -> Context {
        Context {
            source,
            compatible: self.config.compatible_mode,
            ledger: self.ledger.clone(),
            field_ledger: self.field_ledger.clone(),
        }
    }

    /// Builds the collectors enabled by the config, each bounded by `timeout`.
    pub fn registry(&self, source: Arc<dyn DocumentSource>, timeout: Duration) -> Registry {
        let ctx = self.context(source);
        let enabled = &self.config.collectors;
        let mut registry = Registry::new(timeout);
        if enabled.server_status {
            registry.register(Box::new(collectors::ServerStatus::new(ctx.clone())));
        }
        if enabled.diagnostic_data {
            registry.register(Box::new(collectors::DiagnosticData::new(ctx.clone())));
        }
        if enabled.replset_status {
            registry.register(Box::new(collectors::ReplSetStatus::new(ctx.clone())));
        }
        if enabled.replset_config {
            registry.register(Box::new(collectors::ReplSetConfig::new(ctx.clone())));
        }
        if self.config.collstats_enabled() {
            registry.register(Box::new(collectors::CollStats::new(
                ctx.clone(),
                self.config.collstats_collections.clone(),
            )));
        }
        if self.config.indexstats_enabled() {
            registry.register(Box::new(collectors::IndexStats::new(
                ctx,
                self.config.indexstats_collections.clone(),
            )));
        }
        registry
    }

    async fn source(&self) -> Result<Arc<dyn DocumentSource>, Error> {
        match &self.pool {
            Some(pool) => {
                pool.run_command("admin", bson::doc! { "ping": 1 }).await?;
                Ok(pool.clone())
            }
            None => {
                let source =
                    MongoSource::connect(&self.config.uri, self.config.direct_connection).await?;
                Ok(Arc::new(source))
            }
        }
    }

    /// Runs one scrape.
    ///
    /// When the server cannot be reached, only `up` is reported.
    /// The connection check and the collectors share one deadline of `timeout`.
    pub async fn scrape(&self) -> Scrape {
        let key = SuppressionKey::server(CONNECTION_SCOPE);
        let deadline = tokio::time::Instant::now() + self.timeout;
        let source = match tokio::time::timeout_at(deadline, self.source()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        };
        let (mut scrape, up) = match source {
            Ok(source) => {
                self.ledger.succeeded(&key);
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                let registry = self.registry(source, remaining);
                debug!("scraping {} collectors", registry.len());
                (registry.scrape(&self.ledger).await, true)
            }
            Err(err) => {
                self.ledger.report(&key, &err);
                (Scrape::default(), false)
            }
        };

        scrape.descriptors.push(Descriptor::new(
            UP,
            "Whether the server answered the connection check",
            Vec::<String>::new(),
            MetricKind::Gauge,
        ));
        let up = MetricSample::gauge(UP, if up { 1.0 } else { 0.0 });
        if let Err(err) = scrape.samples.insert(up) {
            error!("{err}");
        }
        scrape
    }
}
