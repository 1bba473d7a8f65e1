use crate::attributes::ConnectionState;
use crate::value::{QueryError, Value};
use mongodb_exporter_component::{Descriptor, MetricKind, MetricSample, Sink};
use strum::IntoEnumIterator;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("failed to collect metric {metric:?}")]
    CollectMetric {
        metric: &'static str,
        #[source]
        source: QueryError,
    },
    #[error("metric {metric:?} read non-finite value {value} at {path:?}")]
    NonFinite {
        metric: &'static str,
        path: String,
        value: f64,
    },
}

impl Error {
    pub fn path(&self) -> &str {
        match self {
            Self::CollectMetric { source, .. } => source.path(),
            Self::NonFinite { path, .. } => path,
        }
    }
}

impl From<Error> for mongodb_exporter_component::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::CollectMetric { source, .. } => source.into(),
            Error::NonFinite { path, value, .. } => Self::Schema {
                path,
                expected: "finite number",
                found: value.to_string(),
            },
        }
    }
}

fn finite(
    metric: &'static str,
    path: &[&str],
    value: Result<f64, QueryError>,
) -> Result<f64, Error> {
    match value {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(Error::NonFinite {
            metric,
            path: path.join("."),
            value,
        }),
        Err(source) => Err(Error::CollectMetric { metric, source }),
    }
}

/// A metric declared by hand instead of flattened from the document.
///
/// The paths it reads are excluded from generic flattening.
pub trait Record: std::fmt::Debug + Send + Sync {
    fn descriptor(&self) -> Descriptor;

    fn source_paths(&self) -> &'static [&'static str];

    fn record(&self, document: &Value, sink: &mut dyn Sink, errors: &mut Vec<Error>);
}

#[derive(Debug, Default)]
pub struct ConnectionCount;

impl ConnectionCount {
    pub const NAME: &'static str = "connections";
}

impl Record for ConnectionCount {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(
            Self::NAME,
            "source = serverStatus connections.[current|available]",
            ["state"],
            MetricKind::Gauge,
        )
    }

    fn source_paths(&self) -> &'static [&'static str] {
        &["connections.current", "connections.available"]
    }

    fn record(&self, document: &Value, sink: &mut dyn Sink, errors: &mut Vec<Error>) {
        for state in ConnectionState::iter() {
            let path = ["connections", state.as_str()];
            let value = crate::get_f64!(document, "connections", state.as_str());
            match finite(Self::NAME, &path, value) {
                Ok(value) => {
                    let sample = MetricSample::gauge(Self::NAME, value);
                    sink.emit(sample.with_label("state", state.as_str()));
                }
                Err(err) => errors.push(err),
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionsCreated;

impl ConnectionsCreated {
    pub const NAME: &'static str = "connections_metrics_created_total";
}

impl Record for ConnectionsCreated {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(
            Self::NAME,
            "source = serverStatus connections.totalCreated",
            Vec::<String>::new(),
            MetricKind::Counter,
        )
    }

    fn source_paths(&self) -> &'static [&'static str] {
        &["connections.totalCreated"]
    }

    fn record(&self, document: &Value, sink: &mut dyn Sink, errors: &mut Vec<Error>) {
        let value = crate::get_f64!(document, "connections", "totalCreated");
        match finite(Self::NAME, &["connections", "totalCreated"], value) {
            Ok(value) => sink.emit(MetricSample::counter(Self::NAME, value)),
            Err(err) => errors.push(err),
        }
    }
}
