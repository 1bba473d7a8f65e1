use super::Context;
use crate::config::Namespace;
use crate::declarations::COLL_STATS;
use crate::flatten::flatten_labeled;
use crate::value::{Document, Number, Value};
use mongodb::bson;
use mongodb_exporter_component::suppress::SuppressionKey;
use mongodb_exporter_component::{Descriptor, Error, MetricKind, Sink};
use tracing::debug;

/// Per collection storage statistics from `collStats`.
#[derive(Debug)]
pub struct CollStats {
    ctx: Context,
    collections: Vec<Namespace>,
}

impl CollStats {
    pub const NAME: &'static str = "collstats";

    /// Discovers all user collections on every scrape when `collections` is empty.
    pub fn new(ctx: Context, collections: Vec<Namespace>) -> Self {
        Self { ctx, collections }
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>, Error> {
        if self.collections.is_empty() {
            super::discover(Self::NAME, &self.ctx).await
        } else {
            Ok(self.collections.clone())
        }
    }
}

/// Adds `totalIndexSize` as the sum of `indexSizes` when the server omits it.
fn with_total_index_size(mut document: Document) -> Document {
    if document.contains_key("totalIndexSize") {
        return document;
    }
    let total: Option<f64> = match document.get("indexSizes") {
        Some(Value::Map(sizes)) => sizes.iter().map(|(_, size)| size.as_f64()).sum(),
        _ => None,
    };
    if let Some(total) = total {
        document.insert("totalIndexSize", Value::Number(Number::Float(total)));
    }
    document
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for CollStats {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<Descriptor> {
        vec![
            Descriptor::new(
                "index_size",
                "source = collStats indexSizes",
                ["db", "coll", "index"],
                MetricKind::Gauge,
            ),
            Descriptor::new(
                "indexes_size",
                "source = collStats totalIndexSize",
                ["db", "coll"],
                MetricKind::Gauge,
            ),
        ]
    }

    /// A collection that cannot be read is reported under its own scope and skipped.
    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
        for Namespace {
            database,
            collection,
        } in self.namespaces().await?
        {
            let key = SuppressionKey::collection(Self::NAME, &database, &collection);
            let command = bson::doc! { "collStats": collection.as_str(), "scale": 1 };
            let response = match self.ctx.source.run_command(&database, command).await {
                Ok(response) => {
                    self.ctx.ledger.succeeded(&key);
                    response
                }
                Err(err) => {
                    self.ctx.ledger.report(&key, &err);
                    continue;
                }
            };
            super::dump(Self::NAME, &response);

            let document = with_total_index_size(Document::from(response));
            let flattened = flatten_labeled(
                &document,
                &COLL_STATS,
                self.ctx.compatible,
                &[("db", database.as_str()), ("coll", collection.as_str())],
            );
            debug!(
                collector = Self::NAME,
                "{}.{}: {} samples",
                database,
                collection,
                flattened.samples.len()
            );
            self.ctx.emit(Self::NAME, flattened, sink);
        }
        Ok(())
    }
}
