use crate::compat::{CompatTable, RenameRule};
use mongodb_exporter_component::{Labels, MetricKind};
use std::collections::HashMap;

/// Branches nested deeper than this are dropped by the flattening engine.
pub const DEFAULT_MAX_DEPTH: usize = 32;

pub const SEPARATOR: &str = ".";

#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq, strum::IntoStaticStr)]
pub enum TimestampUnit {
    #[default]
    #[strum(serialize = "seconds")]
    Seconds,
    #[strum(serialize = "nanoseconds")]
    Nanoseconds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelPolicy {
    /// The keys of the map become the values of `label`.
    Keys { label: String },
    /// The array elements are records and their `field` becomes the value of `label`.
    ///
    /// Elements without the field are labeled with their index.
    Field { label: String, field: String },
}

impl LabelPolicy {
    pub fn label(&self) -> &str {
        match self {
            Self::Keys { label } | Self::Field { label, .. } => label,
        }
    }
}

/// Declared handling of one canonical path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    pub drop: bool,
    pub label: Option<LabelPolicy>,
    /// Absolute metric name of the leaves at this path.
    pub rename: Option<String>,
    /// Replaces this path's segment in the metric name.
    pub alias: Option<String>,
    /// Inherited by the subtree.
    pub kind: Option<MetricKind>,
    /// Inherited by the subtree.
    pub timestamp: Option<TimestampUnit>,
}

/// Static per-command declarations.
///
/// Policies are keyed by the dotted canonical path, which is the sequence of
/// document keys without the keys that were consumed as label values.
#[derive(Debug, Clone)]
pub struct DeclarationTable {
    prefix: Vec<String>,
    policies: HashMap<String, FieldPolicy>,
    compat: CompatTable,
    max_depth: usize,
}

impl DeclarationTable {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix
                .split(SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect(),
            policies: HashMap::new(),
            compat: CompatTable::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    fn update(mut self, path: &str, f: impl FnOnce(&mut FieldPolicy)) -> Self {
        f(self.policies.entry(path.to_string()).or_default());
        self
    }

    #[must_use]
    pub fn drop(self, path: &str) -> Self {
        self.update(path, |policy| policy.drop = true)
    }

    #[must_use]
    pub fn label_keys(self, path: &str, label: &str) -> Self {
        self.update(path, |policy| {
            policy.label = Some(LabelPolicy::Keys {
                label: label.to_string(),
            });
        })
    }

    #[must_use]
    pub fn label_field(self, path: &str, label: &str, field: &str) -> Self {
        self.update(path, |policy| {
            policy.label = Some(LabelPolicy::Field {
                label: label.to_string(),
                field: field.to_string(),
            });
        })
    }

    #[must_use]
    pub fn rename(self, path: &str, name: &str) -> Self {
        self.update(path, |policy| policy.rename = Some(name.to_string()))
    }

    #[must_use]
    pub fn alias(self, path: &str, segment: &str) -> Self {
        self.update(path, |policy| policy.alias = Some(segment.to_string()))
    }

    #[must_use]
    pub fn kind(self, path: &str, kind: MetricKind) -> Self {
        self.update(path, |policy| policy.kind = Some(kind))
    }

    #[must_use]
    pub fn counter(self, path: &str) -> Self {
        self.kind(path, MetricKind::Counter)
    }

    #[must_use]
    pub fn timestamp(self, path: &str, unit: TimestampUnit) -> Self {
        self.update(path, |policy| policy.timestamp = Some(unit))
    }

    #[must_use]
    pub fn compat(mut self, rule: RenameRule) -> Self {
        self.compat.push(rule);
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn policy(&self, path: &str) -> Option<&FieldPolicy> {
        self.policies.get(path)
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn compat_table(&self) -> &CompatTable {
        &self.compat
    }

    pub fn depth_limit(&self) -> usize {
        self.max_depth
    }

    /// Paths declared as dropped.
    pub fn dropped(&self) -> impl Iterator<Item = &str> {
        self.policies
            .iter()
            .filter(|(_, policy)| policy.drop)
            .map(|(path, _)| path.as_str())
    }
}

/// Position of the engine inside a document.
///
/// Every child gets its own clone, so siblings never observe each other's
/// path segments or labels.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalContext {
    path: Vec<String>,
    name: Vec<String>,
    labels: Labels,
    kind: MetricKind,
    timestamp: TimestampUnit,
    depth: usize,
}

impl TraversalContext {
    pub fn root(table: &DeclarationTable) -> Self {
        Self {
            path: Vec::new(),
            name: table.prefix().to_vec(),
            labels: Labels::new(),
            kind: MetricKind::default(),
            timestamp: TimestampUnit::default(),
            depth: 0,
        }
    }

    /// Descends into `key`, applying the inherited parts of its policy.
    pub fn child(&self, key: &str, policy: Option<&FieldPolicy>) -> Self {
        let mut child = self.clone();
        child.path.push(key.to_string());
        child.name.push(
            policy
                .and_then(|policy| policy.alias.clone())
                .unwrap_or_else(|| key.to_string()),
        );
        if let Some(policy) = policy {
            child.kind = policy.kind.unwrap_or(child.kind);
            child.timestamp = policy.timestamp.unwrap_or(child.timestamp);
        }
        child.depth += 1;
        child
    }

    /// Descends one level without extending the path.
    pub fn labeled(&self, label: &str, value: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.labels.insert(label.to_string(), value.into());
        child.depth += 1;
        child
    }

    /// Adds a label that did not come from the document itself.
    #[must_use]
    pub fn with_label(mut self, label: &str, value: impl Into<String>) -> Self {
        self.labels.insert(label.to_string(), value.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.path
    }

    pub fn path(&self) -> String {
        self.path.join(SEPARATOR)
    }

    pub fn name(&self) -> String {
        self.name
            .iter()
            .filter(|segment| !segment.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn timestamp_unit(&self) -> TimestampUnit {
        self.timestamp
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
