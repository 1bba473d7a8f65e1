use crate::path::SEPARATOR;
use mongodb_exporter_component::{Labels, MetricKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchMode {
    /// Matches the whole canonical path only.
    Exact,
    /// Matches every path strictly below `match_path`.
    ///
    /// The remaining segments, joined with `_`, become the value of `suffix_label`.
    Prefix { suffix_label: String },
}

/// Maps a canonical path to the name used by the legacy exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    pub legacy_name: String,
    pub match_path: Vec<String>,
    pub mode: MatchMode,
    /// Override labels derived during traversal.
    pub labels: Labels,
    pub kind: Option<MetricKind>,
}

fn split(path: &str) -> Vec<String> {
    path.split(SEPARATOR).map(ToString::to_string).collect()
}

impl RenameRule {
    pub fn exact(path: &str, legacy_name: &str) -> Self {
        Self {
            legacy_name: legacy_name.to_string(),
            match_path: split(path),
            mode: MatchMode::Exact,
            labels: Labels::new(),
            kind: None,
        }
    }

    pub fn prefix(path: &str, legacy_name: &str, suffix_label: &str) -> Self {
        Self {
            legacy_name: legacy_name.to_string(),
            match_path: split(path),
            mode: MatchMode::Prefix {
                suffix_label: suffix_label.to_string(),
            },
            labels: Labels::new(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub name: String,
    pub labels: Labels,
    pub kind: Option<MetricKind>,
}

/// Rules indexed by their dotted match path.
#[derive(Debug, Clone, Default)]
pub struct CompatTable {
    rules: Vec<RenameRule>,
    index: BTreeMap<String, Vec<usize>>,
}

impl CompatTable {
    pub fn push(&mut self, rule: RenameRule) {
        let key = rule.match_path.join(SEPARATOR);
        self.index.entry(key).or_default().push(self.rules.len());
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[RenameRule] {
        &self.rules
    }

    /// Finds the rule for a canonical path.
    ///
    /// The longest matching path wins. Rules declared for the same path are
    /// tried in declaration order.
    pub fn translate(&self, path: &[String]) -> Option<Translation> {
        for len in (1..=path.len()).rev() {
            let Some(candidates) = self.index.get(&path[..len].join(SEPARATOR)) else {
                continue;
            };
            for rule in candidates.iter().map(|&idx| &self.rules[idx]) {
                match &rule.mode {
                    MatchMode::Exact if len == path.len() => {
                        return Some(Translation {
                            name: rule.legacy_name.clone(),
                            labels: rule.labels.clone(),
                            kind: rule.kind,
                        });
                    }
                    MatchMode::Prefix { suffix_label } if len < path.len() => {
                        let mut labels = rule.labels.clone();
                        labels.insert(suffix_label.clone(), path[len..].join("_"));
                        return Some(Translation {
                            name: rule.legacy_name.clone(),
                            labels,
                            kind: rule.kind,
                        });
                    }
                    _ => {}
                }
            }
        }
        None
    }
}
