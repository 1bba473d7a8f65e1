pub mod coll_stats;
pub mod diagnostic_data;
pub mod index_stats;
pub mod replset_config;
pub mod replset_status;
pub mod server_status;

pub use coll_stats::CollStats;
pub use diagnostic_data::DiagnosticData;
pub use index_stats::IndexStats;
pub use replset_config::ReplSetConfig;
pub use replset_status::ReplSetStatus;
pub use server_status::ServerStatus;

use crate::attributes::{is_system_collection, SystemDatabase};
use crate::config::Namespace;
use crate::flatten::Flattened;
use crate::source::DocumentSource;
use crate::value::{Document, Value};
use mongodb::bson;
use mongodb_exporter_component::suppress::{SuppressionKey, SuppressionLedger};
use mongodb_exporter_component::{Error, Sink};
use std::sync::Arc;
use tracing::trace;

/// State shared by the collectors of one scrape.
#[derive(Debug, Clone)]
pub struct Context {
    pub source: Arc<dyn DocumentSource>,
    pub compatible: bool,
    /// Failures of fetch scopes below the server level.
    pub ledger: Arc<SuppressionLedger>,
    /// Per field warnings, never cleared.
    pub field_ledger: Arc<SuppressionLedger>,
}

impl Context {
    pub fn emit(&self, collector: &'static str, flattened: Flattened, sink: &mut dyn Sink) {
        flattened.report(collector, &self.field_ledger);
        flattened.emit(sink);
    }
}

pub fn omit_values(mut value: bson::Bson, depth: usize) -> bson::Bson {
    omit_values_visitor(&mut value, depth);
    value
}

fn omit_values_visitor(value: &mut bson::Bson, depth: usize) {
    match value {
        bson::Bson::Document(value) => {
            if depth == 0 {
                *value = bson::doc! {"omitted": true};
            } else {
                for (_, v) in value.iter_mut() {
                    omit_values_visitor(v, depth - 1);
                }
            }
        }
        bson::Bson::Array(value) => {
            if depth == 0 {
                *value = bson::Array::from_iter([bson::Bson::String("omitted".to_string())]);
            } else {
                for v in value.iter_mut() {
                    omit_values_visitor(v, depth - 1);
                }
            }
        }
        _ => {}
    };
}

pub(crate) fn dump(collector: &'static str, document: &bson::Document) {
    if tracing::enabled!(tracing::Level::TRACE) {
        trace!(
            collector,
            "{:#}",
            omit_values(bson::Bson::Document(document.clone()), 2)
        );
    }
}

/// Returns the map stored under `key`.
pub(crate) fn take_map(mut document: Document, key: &str) -> Result<Document, Error> {
    match document.remove(key) {
        Some(Value::Map(map)) => Ok(map),
        other => Err(Error::Schema {
            path: key.to_string(),
            expected: "document",
            found: other
                .as_ref()
                .map_or("nothing", Value::type_name)
                .to_string(),
        }),
    }
}

/// Lists user collections, skipping system databases and collections.
///
/// A database whose collections cannot be listed is reported and skipped.
pub(crate) async fn discover(
    collector: &'static str,
    ctx: &Context,
) -> Result<Vec<Namespace>, Error> {
    let mut namespaces = Vec::new();
    for database in ctx.source.list_databases().await? {
        if SystemDatabase::contains(&database) {
            continue;
        }
        let key = SuppressionKey::database(collector, &database);
        match ctx.source.list_collections(&database).await {
            Ok(collections) => {
                ctx.ledger.succeeded(&key);
                namespaces.extend(
                    collections
                        .into_iter()
                        .filter(|collection| !is_system_collection(collection))
                        .map(|collection| Namespace {
                            database: database.clone(),
                            collection,
                        }),
                );
            }
            Err(err) => {
                ctx.ledger.report(&key, &err);
            }
        }
    }
    namespaces.sort();
    Ok(namespaces)
}
