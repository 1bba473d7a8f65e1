use crate::dispatch::{dispatch, Dispatch};
use crate::path::{DeclarationTable, TraversalContext};
use crate::value::{Document, Value};
use mongodb_exporter_component::suppress::{SuppressionKey, SuppressionLedger};
use mongodb_exporter_component::{Error, InvariantViolation, MetricSample, SeriesKey, Sink};
use std::collections::HashSet;
use tracing::warn;

/// Field level problem found while flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    NonFinite { path: String },
    Unsupported { path: String, found: &'static str },
    Invariant(InvariantViolation),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    pub samples: Vec<MetricSample>,
    pub issues: Vec<Issue>,
}

impl Flattened {
    /// Logs the issues.
    ///
    /// Field warnings are logged once per path of `source` for the lifetime of
    /// `ledger`. Invariant violations are always logged.
    pub fn report(&self, source: &'static str, ledger: &SuppressionLedger) {
        for issue in &self.issues {
            match issue {
                Issue::NonFinite { path } => {
                    if ledger.should_log(&SuppressionKey::field(source, path)) {
                        warn!(
                            path,
                            "dropping non-finite value. This log message will be suppressed from now."
                        );
                    }
                }
                Issue::Unsupported { path, found } => {
                    ledger.report(
                        &SuppressionKey::field(source, path),
                        &Error::Schema {
                            path: path.clone(),
                            expected: "number, boolean or timestamp",
                            found: (*found).to_string(),
                        },
                    );
                }
                Issue::Invariant(violation) => {
                    ledger.report(
                        &SuppressionKey::field(source, &violation.to_string()),
                        &Error::from(violation.clone()),
                    );
                }
            }
        }
    }

    pub fn emit(self, sink: &mut dyn Sink) {
        for sample in self.samples {
            sink.emit(sample);
        }
    }
}

struct Flattener<'a> {
    table: &'a DeclarationTable,
    compatible: bool,
    seen: HashSet<SeriesKey>,
    out: Flattened,
}

impl<'a> Flattener<'a> {
    fn visit_map(&mut self, document: &Document, ctx: &TraversalContext, skip: Option<&str>) {
        for (key, value) in document.iter() {
            if skip == Some(key) {
                continue;
            }
            let mut path = ctx.segments().to_vec();
            path.push(key.to_string());
            let policy = self.table.policy(&path.join("."));
            if policy.is_some_and(|policy| policy.drop) {
                continue;
            }
            let child = ctx.child(key, policy);
            self.visit(value, &child, true);
        }
    }

    /// Visits `value` at `ctx`.
    ///
    /// `apply_label` is false for nodes that were reached through their own
    /// path's label policy, which must not be applied twice.
    fn visit(&mut self, value: &Value, ctx: &TraversalContext, apply_label: bool) {
        if ctx.depth() > self.table.depth_limit() {
            self.out
                .issues
                .push(Issue::Invariant(InvariantViolation::DepthExceeded {
                    path: ctx.path(),
                    limit: self.table.depth_limit(),
                }));
            return;
        }
        let label = if apply_label {
            self.table
                .policy(&ctx.path())
                .and_then(|policy| policy.label.as_ref())
        } else {
            None
        };

        match dispatch(value, label, ctx.timestamp_unit()) {
            Dispatch::Numeric(value) | Dispatch::Timestamp(value) => self.leaf(value, ctx),
            Dispatch::Map(document) => self.visit_map(document, ctx, None),
            Dispatch::LabeledMap { document, label } => {
                for (key, value) in document.iter() {
                    self.visit(value, &ctx.labeled(label, key), false);
                }
            }
            Dispatch::IndexedArray(values) => {
                for (idx, value) in values.iter().enumerate() {
                    let idx = idx.to_string();
                    let mut path = ctx.segments().to_vec();
                    path.push(idx.clone());
                    let child = ctx.child(&idx, self.table.policy(&path.join(".")));
                    self.visit(value, &child, true);
                }
            }
            Dispatch::LabeledArray {
                values,
                label,
                field,
            } => {
                for (idx, value) in values.iter().enumerate() {
                    let label_value = value
                        .as_map()
                        .and_then(|record| record.get(field))
                        .and_then(Value::as_label_value);
                    let has_field = label_value.is_some();
                    let child = ctx.labeled(label, label_value.unwrap_or_else(|| idx.to_string()));
                    match value {
                        Value::Map(record) if has_field => {
                            self.visit_map(record, &child, Some(field));
                        }
                        value => self.visit(value, &child, false),
                    }
                }
            }
            Dispatch::Drop => {}
            Dispatch::NonFinite => self.out.issues.push(Issue::NonFinite { path: ctx.path() }),
            Dispatch::Unsupported(found) => self.out.issues.push(Issue::Unsupported {
                path: ctx.path(),
                found,
            }),
        }
    }

    fn leaf(&mut self, value: f64, ctx: &TraversalContext) {
        let translation = if self.compatible {
            self.table.compat_table().translate(ctx.segments())
        } else {
            None
        };
        let sample = match translation {
            Some(translation) => MetricSample::new(
                translation.name,
                value,
                translation.kind.unwrap_or(ctx.kind()),
            )
            .with_labels(ctx.labels())
            .with_labels(&translation.labels),
            None => {
                let name = self
                    .table
                    .policy(&ctx.path())
                    .and_then(|policy| policy.rename.clone())
                    .unwrap_or_else(|| ctx.name());
                MetricSample::new(name, value, ctx.kind()).with_labels(ctx.labels())
            }
        };

        if sample.name.is_empty() {
            self.out
                .issues
                .push(Issue::Invariant(InvariantViolation::EmptyName {
                    path: ctx.path(),
                }));
            return;
        }
        let series = sample.series();
        if !self.seen.insert(series.clone()) {
            self.out
                .issues
                .push(Issue::Invariant(InvariantViolation::DuplicateSeries(series)));
            return;
        }
        self.out.samples.push(sample);
    }
}

/// Flattens `document` into samples, depth first in document order.
///
/// With `compatible` set, leaves matched by a rename rule of `table` are named
/// after the rule instead of their canonical path.
pub fn flatten(document: &Document, table: &DeclarationTable, compatible: bool) -> Flattened {
    flatten_from(document, table, compatible, TraversalContext::root(table))
}

/// Like [`flatten`], but seeds every sample with `labels`.
pub fn flatten_labeled(
    document: &Document,
    table: &DeclarationTable,
    compatible: bool,
    labels: &[(&str, &str)],
) -> Flattened {
    let ctx = labels
        .iter()
        .fold(TraversalContext::root(table), |ctx, (key, value)| {
            ctx.with_label(key, *value)
        });
    flatten_from(document, table, compatible, ctx)
}

fn flatten_from(
    document: &Document,
    table: &DeclarationTable,
    compatible: bool,
    ctx: TraversalContext,
) -> Flattened {
    let mut flattener = Flattener {
        table,
        compatible,
        seen: HashSet::new(),
        out: Flattened::default(),
    };
    flattener.visit_map(document, &ctx, None);
    flattener.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::RenameRule;
    use crate::path::TimestampUnit;
    use mongodb::bson::{self, doc, Bson};
    use mongodb_exporter_component::{Labels, MetricKind};

    fn decode(document: bson::Document) -> Document {
        Document::from(document)
    }

    fn names(flattened: &Flattened) -> Vec<String> {
        flattened
            .samples
            .iter()
            .map(|sample| sample.series().to_string())
            .collect()
    }

    fn find<'a>(
        flattened: &'a Flattened,
        name: &str,
        labels: &[(&str, &str)],
    ) -> Option<&'a MetricSample> {
        let labels: Labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        flattened
            .samples
            .iter()
            .find(|sample| sample.name == name && sample.labels == labels)
    }

    #[test]
    fn undeclared_map_yields_dotted_names_without_labels() {
        let document = decode(doc! { "mem": { "resident": 512, "virtual": 1024 } });
        let flattened = flatten(&document, &DeclarationTable::new(""), false);
        assert_eq!(names(&flattened), vec!["mem.resident", "mem.virtual"]);
        assert_eq!(find(&flattened, "mem.resident", &[]).unwrap().value, 512.0);
        assert_eq!(find(&flattened, "mem.virtual", &[]).unwrap().value, 1024.0);
        assert!(flattened.issues.is_empty());
    }

    #[test]
    fn prefix_is_prepended() {
        let document = decode(doc! { "uptime": 10 });
        let flattened = flatten(&document, &DeclarationTable::new("ss"), false);
        assert_eq!(names(&flattened), vec!["ss.uptime"]);
    }

    #[test]
    fn index_sizes_become_one_labeled_metric() {
        let table = DeclarationTable::new("collstats")
            .label_keys("indexSizes", "index")
            .rename("indexSizes", "index_size")
            .rename("totalIndexSize", "indexes_size");
        let document = decode(doc! {
            "indexSizes": { "_id_": 4096, "name_1": 2048 },
            "totalIndexSize": 6144,
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(flattened.samples.len(), 3);
        assert_eq!(
            find(&flattened, "index_size", &[("index", "_id_")]).unwrap().value,
            4096.0
        );
        assert_eq!(
            find(&flattened, "index_size", &[("index", "name_1")]).unwrap().value,
            2048.0
        );
        assert_eq!(find(&flattened, "indexes_size", &[]).unwrap().value, 6144.0);
    }

    #[test]
    fn nested_label_keys() {
        let table = DeclarationTable::new("ss")
            .label_keys("locks", "resource")
            .label_keys("locks.acquireCount", "mode")
            .counter("locks");
        let document = decode(doc! {
            "locks": {
                "Global": { "acquireCount": { "r": 5, "w": 3 } },
                "Database": { "acquireCount": { "r": 1 } },
            }
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(
            names(&flattened),
            vec![
                r#"ss.locks.acquireCount{mode="r",resource="Global"}"#,
                r#"ss.locks.acquireCount{mode="w",resource="Global"}"#,
                r#"ss.locks.acquireCount{mode="r",resource="Database"}"#,
            ]
        );
        assert!(flattened
            .samples
            .iter()
            .all(|sample| sample.kind == MetricKind::Counter));
    }

    #[test]
    fn labeled_records() {
        let table = DeclarationTable::new("rs").label_field("members", "member_idx", "name");
        let document = decode(doc! {
            "members": [
                { "name": "a:27017", "health": 1, "stateStr": "PRIMARY", "state": 1 },
                { "name": "b:27017", "health": 0, "stateStr": "SECONDARY", "state": 2 },
                { "health": 1 },
            ]
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(
            names(&flattened),
            vec![
                r#"rs.members.health{member_idx="a:27017"}"#,
                r#"rs.members.state{member_idx="a:27017"}"#,
                r#"rs.members.health{member_idx="b:27017"}"#,
                r#"rs.members.state{member_idx="b:27017"}"#,
                r#"rs.members.health{member_idx="2"}"#,
            ]
        );
    }

    #[test]
    fn histogram_records_inside_label_keys() {
        let table = DeclarationTable::new("ss")
            .label_keys("opLatencies", "op_type")
            .label_field("opLatencies.histogram", "micros", "micros");
        let document = decode(doc! {
            "opLatencies": {
                "reads": {
                    "histogram": [ { "micros": 128_i64, "count": 3_i64 } ],
                    "latency": 100_i64,
                    "ops": 5_i64,
                }
            }
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(
            find(
                &flattened,
                "ss.opLatencies.histogram.count",
                &[("op_type", "reads"), ("micros", "128")]
            )
            .unwrap()
            .value,
            3.0
        );
        assert!(find(&flattened, "ss.opLatencies.latency", &[("op_type", "reads")]).is_some());
        assert!(find(&flattened, "ss.opLatencies.ops", &[("op_type", "reads")]).is_some());
        assert_eq!(flattened.samples.len(), 3);
    }

    #[test]
    fn scalar_arrays_are_indexed() {
        let document = decode(doc! { "a": [1, 2.5, true], "b": ["x", "y"] });
        let flattened = flatten(&document, &DeclarationTable::new(""), false);
        assert_eq!(names(&flattened), vec!["a.0", "a.1", "a.2"]);
    }

    #[test]
    fn timestamps_and_noise() {
        let table = DeclarationTable::new("").timestamp("optimes", TimestampUnit::Nanoseconds);
        let document = decode(doc! {
            "start": bson::DateTime::from_millis(3_000),
            "optimes": { "lastCommitted": bson::Timestamp { time: 2, increment: 1 } },
            "host": "localhost",
            "id": bson::oid::ObjectId::new(),
            "nothing": Bson::Null,
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(names(&flattened), vec!["start", "optimes.lastCommitted"]);
        assert_eq!(flattened.samples[0].value, 3.0);
        assert_eq!(flattened.samples[1].value, 2_000_000_000.0);
        assert!(flattened.issues.is_empty());
    }

    #[test]
    fn non_finite_and_unsupported_values_are_reported() {
        let document = decode(doc! {
            "ok": 1,
            "ratio": f64::NAN,
            "inf": f64::INFINITY,
            "code": Bson::JavaScriptCode("x".to_string()),
            "negative": -5,
        });
        let flattened = flatten(&document, &DeclarationTable::new(""), false);
        assert_eq!(names(&flattened), vec!["ok", "negative"]);
        assert_eq!(find(&flattened, "negative", &[]).unwrap().value, -5.0);
        assert_eq!(
            flattened.issues,
            vec![
                Issue::NonFinite {
                    path: "ratio".to_string()
                },
                Issue::NonFinite {
                    path: "inf".to_string()
                },
                Issue::Unsupported {
                    path: "code".to_string(),
                    found: "javascript"
                },
            ]
        );

        let ledger = SuppressionLedger::new();
        flattened.report("test", &ledger);
        assert!(ledger.is_suppressed(&SuppressionKey::field("test", "ratio")));
        assert!(ledger.is_suppressed(&SuppressionKey::field("test", "code")));
        // a second report does not log again
        assert!(!ledger.should_log(&SuppressionKey::field("test", "inf")));
        // the same path of another source is tracked separately
        assert!(!ledger.is_suppressed(&SuppressionKey::field("other", "ratio")));
    }

    #[test]
    fn drops_declared_subtrees() {
        let table = DeclarationTable::new("")
            .drop("wiredTiger")
            .drop("connections.current");
        let document = decode(doc! {
            "wiredTiger": { "cache": { "bytes": 1 } },
            "connections": { "current": 5, "active": 2 },
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(names(&flattened), vec!["connections.active"]);
    }

    #[test]
    fn depth_ceiling_keeps_siblings() {
        let table = DeclarationTable::new("").max_depth(3);
        let document = decode(doc! {
            "a": {
                "b": { "c": { "d": { "e": 1 } } },
                "x": 2,
            },
            "y": 3,
        });
        let flattened = flatten(&document, &table, false);
        assert_eq!(names(&flattened), vec!["a.x", "y"]);
        assert_eq!(
            flattened.issues,
            vec![Issue::Invariant(InvariantViolation::DepthExceeded {
                path: "a.b.c.d".to_string(),
                limit: 3
            })]
        );
    }

    #[test]
    fn very_deep_documents_do_not_overflow() {
        let mut nested = doc! { "leaf": 1 };
        for _ in 0..500 {
            nested = doc! { "n": nested };
        }
        let document = decode(doc! { "deep": nested, "sibling": 1 });
        let flattened = flatten(&document, &DeclarationTable::new(""), false);
        assert_eq!(names(&flattened), vec!["sibling"]);
        assert_eq!(flattened.issues.len(), 1);
    }

    #[test]
    fn duplicates_are_dropped_and_reported() {
        let table = DeclarationTable::new("")
            .rename("a", "same")
            .rename("b", "same");
        let document = decode(doc! { "a": 1, "b": 2 });
        let flattened = flatten(&document, &table, false);
        assert_eq!(flattened.samples.len(), 1);
        assert_eq!(flattened.samples[0].value, 1.0);
        assert!(matches!(
            flattened.issues.as_slice(),
            [Issue::Invariant(InvariantViolation::DuplicateSeries(_))]
        ));
    }

    fn compat_table() -> DeclarationTable {
        DeclarationTable::new("ss")
            .counter("opcounters")
            .compat(RenameRule::prefix("mem", "memory", "type"))
            .compat(
                RenameRule::prefix("opcounters", "mongod_op_counters_total", "type")
                    .with_kind(MetricKind::Counter),
            )
            .compat(
                RenameRule::exact("network.bytesIn", "network_bytes_total")
                    .with_label("state", "in_bytes"),
            )
            .compat(
                RenameRule::exact("network.bytesOut", "network_bytes_total")
                    .with_label("state", "out_bytes"),
            )
    }

    fn compat_document() -> Document {
        decode(doc! {
            "mem": { "resident": 512, "virtual": 1024 },
            "opcounters": { "insert": 1_i64, "query": 2_i64 },
            "network": { "bytesIn": 10_i64, "bytesOut": 20_i64, "numRequests": 3_i64 },
            "uptime": 100,
        })
    }

    #[test]
    fn compatible_mode_uses_legacy_names_only() {
        let table = compat_table();
        let document = compat_document();

        let legacy = flatten(&document, &table, true);
        assert_eq!(
            names(&legacy),
            vec![
                r#"memory{type="resident"}"#,
                r#"memory{type="virtual"}"#,
                r#"mongod_op_counters_total{type="insert"}"#,
                r#"mongod_op_counters_total{type="query"}"#,
                r#"network_bytes_total{state="in_bytes"}"#,
                r#"network_bytes_total{state="out_bytes"}"#,
                "ss.network.numRequests",
                "ss.uptime",
            ]
        );
        assert!(legacy
            .samples
            .iter()
            .all(|sample| !sample.name.starts_with("ss.mem")
                && !sample.name.starts_with("ss.opcounters")));
        assert_eq!(
            find(&legacy, "mongod_op_counters_total", &[("type", "insert")])
                .unwrap()
                .kind,
            MetricKind::Counter
        );

        let canonical = flatten(&document, &table, false);
        assert_eq!(
            names(&canonical),
            vec![
                "ss.mem.resident",
                "ss.mem.virtual",
                "ss.opcounters.insert",
                "ss.opcounters.query",
                "ss.network.bytesIn",
                "ss.network.bytesOut",
                "ss.network.numRequests",
                "ss.uptime",
            ]
        );
        assert_eq!(legacy.samples.len(), canonical.samples.len());
    }

    #[test]
    fn translation_takes_precedence_over_rename() {
        let table = DeclarationTable::new("")
            .rename("totalIndexSize", "indexes_size")
            .compat(RenameRule::exact("totalIndexSize", "db_coll_indexes_size"));
        let document = decode(doc! { "totalIndexSize": 1 });
        assert_eq!(
            names(&flatten(&document, &table, true)),
            vec!["db_coll_indexes_size"]
        );
        assert_eq!(
            names(&flatten(&document, &table, false)),
            vec!["indexes_size"]
        );
    }

    #[test]
    fn flatten_is_idempotent() {
        let table = compat_table();
        let document = compat_document();
        for compatible in [false, true] {
            let first = flatten(&document, &table, compatible);
            let second = flatten(&document, &table, compatible);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn seeded_labels() {
        let document = decode(doc! { "count": 3, "size": 100 });
        let flattened = flatten_labeled(
            &document,
            &DeclarationTable::new("collstats"),
            false,
            &[("db", "test"), ("coll", "users")],
        );
        assert_eq!(
            names(&flattened),
            vec![
                r#"collstats.count{coll="users",db="test"}"#,
                r#"collstats.size{coll="users",db="test"}"#,
            ]
        );
    }
}
