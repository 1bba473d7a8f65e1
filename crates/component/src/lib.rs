pub mod config;
pub mod ext;
pub mod prometheus;
pub mod registry;
pub mod suppress;

use std::collections::{BTreeMap, HashSet};

/// Label set of a sample.
///
/// Keys are unique by construction and iterate in a deterministic order.
pub type Labels = BTreeMap<String, String>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::IntoStaticStr,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[strum(serialize = "counter")]
    Counter,
    #[default]
    #[strum(serialize = "gauge")]
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Identity of a time series: its name and label set.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Labels,
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v:?}"))
                .collect::<Vec<_>>();
            write!(f, "{{{}}}", labels.join(","))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
    pub kind: MetricKind,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            value,
            kind,
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, MetricKind::Gauge)
    }

    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, MetricKind::Counter)
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: &Labels) -> Self {
        self.labels
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn series(&self) -> SeriesKey {
        SeriesKey {
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Static description of a metric family.
///
/// Collectors must be able to produce these without talking to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub help: String,
    pub label_keys: Vec<String>,
    pub kind: MetricKind,
}

impl Descriptor {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_keys: impl IntoIterator<Item = impl Into<String>>,
        kind: MetricKind,
    ) -> Self {
        let mut label_keys: Vec<String> = label_keys.into_iter().map(Into::into).collect();
        label_keys.sort();
        label_keys.dedup();
        Self {
            name: name.into(),
            help: help.into(),
            label_keys,
            kind,
        }
    }
}

/// Push side of the exposition layer.
pub trait Sink: Send {
    fn emit(&mut self, sample: MetricSample);
}

impl Sink for Vec<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("duplicate series {0}")]
    DuplicateSeries(SeriesKey),
    #[error("document at {path:?} is nested deeper than {limit} levels")]
    DepthExceeded { path: String, limit: usize },
    #[error("empty metric name at {path:?}")]
    EmptyName { path: String },
}

/// All samples of one scrape.
///
/// Rejects a second sample for an already seen series.
#[derive(Debug, Default)]
pub struct SampleSet {
    samples: Vec<MetricSample>,
    seen: HashSet<SeriesKey>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sample: MetricSample) -> Result<(), InvariantViolation> {
        if sample.name.is_empty() {
            return Err(InvariantViolation::EmptyName {
                path: sample.series().to_string(),
            });
        }
        if !self.seen.insert(sample.series()) {
            return Err(InvariantViolation::DuplicateSeries(sample.series()));
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn contains(&self, series: &SeriesKey) -> bool {
        self.seen.contains(series)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricSample> {
        self.samples.iter()
    }

    pub fn into_vec(self) -> Vec<MetricSample> {
        self.samples
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a MetricSample;
    type IntoIter = std::slice::Iter<'a, MetricSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum ErrorClass {
    /// Network, authentication or timeouts. Retried on the next scrape.
    #[strum(serialize = "transient")]
    Transient,
    /// An expected state of the server, e.g. replication not initialized.
    #[strum(serialize = "feature disabled")]
    FeatureDisabled,
    #[strum(serialize = "schema")]
    Schema,
    /// A declaration table or engine bug.
    #[strum(serialize = "internal")]
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connection failed: {source}")]
    Connectivity {
        #[source]
        source: BoxError,
    },
    #[error("permission denied: {source}")]
    PermissionDenied {
        #[source]
        source: BoxError,
    },
    #[error("{feature} is not enabled: {reason}")]
    FeatureDisabled {
        feature: &'static str,
        reason: String,
    },
    #[error("unexpected type at {path:?}: expected {expected}, found {found}")]
    Schema {
        path: String,
        expected: &'static str,
        found: String,
    },
    #[error(transparent)]
    InternalInvariant(#[from] InvariantViolation),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl Error {
    pub fn connectivity(source: impl Into<BoxError>) -> Self {
        Self::Connectivity {
            source: source.into(),
        }
    }

    pub fn permission_denied(source: impl Into<BoxError>) -> Self {
        Self::PermissionDenied {
            source: source.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connectivity { .. } | Self::PermissionDenied { .. } | Self::Timeout(_) => {
                ErrorClass::Transient
            }
            Self::FeatureDisabled { .. } => ErrorClass::FeatureDisabled,
            Self::Schema { .. } => ErrorClass::Schema,
            Self::InternalInvariant(_) => ErrorClass::Internal,
        }
    }
}

/// A unit satisfying the describe/collect contract for one source command.
#[async_trait::async_trait]
pub trait Collector: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn describe(&self) -> Vec<Descriptor>;

    /// Fetches a fresh document and emits its samples.
    ///
    /// When this returns an error, everything emitted so far is discarded.
    async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_set_rejects_duplicate_series() {
        let mut set = SampleSet::new();
        let sample = MetricSample::gauge("connections", 5.0).with_label("state", "current");
        assert_eq!(set.insert(sample.clone()), Ok(()));
        assert_eq!(
            set.insert(sample.clone()),
            Err(InvariantViolation::DuplicateSeries(sample.series()))
        );
        let other = MetricSample::gauge("connections", 995.0).with_label("state", "available");
        assert_eq!(set.insert(other), Ok(()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn sample_set_rejects_empty_names() {
        let mut set = SampleSet::new();
        assert!(matches!(
            set.insert(MetricSample::gauge("", 1.0)),
            Err(InvariantViolation::EmptyName { .. })
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn series_key_display() {
        let sample = MetricSample::gauge("index_size", 1.0)
            .with_label("index", "_id_")
            .with_label("db", "test");
        assert_eq!(
            sample.series().to_string(),
            r#"index_size{db="test",index="_id_"}"#
        );
    }

    #[test]
    fn error_classes() {
        let err = Error::connectivity("connection refused");
        assert_eq!(err.class(), ErrorClass::Transient);
        let err = Error::FeatureDisabled {
            feature: "replication",
            reason: "not yet initialized".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::FeatureDisabled);
        let err = Error::from(InvariantViolation::DepthExceeded {
            path: "a.b".to_string(),
            limit: 1,
        });
        assert_eq!(err.class(), ErrorClass::Internal);
    }
}
