use super::Context;
use crate::config::Namespace;
use crate::declarations::INDEX_STATS;
use crate::flatten::flatten_labeled;
use crate::value::{Document, Value};
use mongodb_exporter_component::suppress::SuppressionKey;
use mongodb_exporter_component::{Descriptor, Error, MetricKind, Sink};

/// Index usage from the `$indexStats` aggregation stage.
#[derive(Debug)]
pub struct IndexStats {
    ctx: Context,
    collections: Vec<Namespace>,
}

impl IndexStats {
    pub const NAME: &'static str = "indexstats";

    pub fn new(ctx: Context, collections: Vec<Namespace>) -> Self {
        Self { ctx, collections }
    }
}

#[async_trait::async_trait]
impl mongodb_exporter_component::Collector for IndexStats {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<Descriptor> {
        vec![
            Descriptor::new(
                "indexstats.accesses.ops",
                "source = $indexStats accesses.ops",
                ["db", "coll", "index"],
                MetricKind::Counter,
            ),
            Descriptor::new(
                "indexstats.accesses.since",
                "source = $indexStats accesses.since",
                ["db", "coll", "index"],
                MetricKind::Gauge,
            ),
        ]
    }

    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
        let namespaces = if self.collections.is_empty() {
            super::discover(Self::NAME, &self.ctx).await?
        } else {
            self.collections.clone()
        };
        for Namespace {
            database,
            collection,
        } in namespaces
        {
            let key = SuppressionKey::collection(Self::NAME, &database, &collection);
            let indexes = match self.ctx.source.index_stats(&database, &collection).await {
                Ok(indexes) => {
                    self.ctx.ledger.succeeded(&key);
                    indexes
                }
                Err(err) => {
                    self.ctx.ledger.report(&key, &err);
                    continue;
                }
            };
            for (idx, index) in indexes.into_iter().enumerate() {
                let document = Document::from(index);
                let name = document
                    .get("name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| idx.to_string());
                let flattened = flatten_labeled(
                    &document,
                    &INDEX_STATS,
                    self.ctx.compatible,
                    &[
                        ("db", database.as_str()),
                        ("coll", collection.as_str()),
                        ("index", name.as_str()),
                    ],
                );
                self.ctx.emit(Self::NAME, flattened, sink);
            }
        }
        Ok(())
    }
}
