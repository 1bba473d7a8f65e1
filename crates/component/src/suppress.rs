use crate::{Error, ErrorClass};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, warn};

/// Identifies the scope of a failure.
///
/// The scope is empty for server-wide failures, a database name, or a fully
/// qualified `db.collection` name.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SuppressionKey {
    pub source: &'static str,
    pub scope: String,
}

impl SuppressionKey {
    pub fn server(source: &'static str) -> Self {
        Self {
            source,
            scope: String::new(),
        }
    }

    pub fn database(source: &'static str, database: &str) -> Self {
        Self {
            source,
            scope: database.to_string(),
        }
    }

    pub fn collection(source: &'static str, database: &str, collection: &str) -> Self {
        Self {
            source,
            scope: format!("{database}.{collection}"),
        }
    }

    /// A field of the documents fetched by `source`.
    pub fn field(source: &'static str, path: &str) -> Self {
        Self {
            source,
            scope: format!("field:{path}"),
        }
    }
}

impl std::fmt::Display for SuppressionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}", self.source)
        } else {
            write!(f, "{}:{}", self.source, self.scope)
        }
    }
}

/// Deduplicates warnings for failures that persist across scrapes.
///
/// A key is inserted on the first failure and removed when the scope succeeds
/// again, so a recovered and then failing scope is reported once more.
#[derive(Debug, Default)]
pub struct SuppressionLedger {
    warned: Mutex<HashSet<SuppressionKey>>,
}

impl SuppressionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the first call with `key` since it was last cleared.
    pub fn should_log(&self, key: &SuppressionKey) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone())
    }

    /// Returns whether `key` was suppressed.
    pub fn clear(&self, key: &SuppressionKey) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn is_suppressed(&self, key: &SuppressionKey) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a successful fetch for `key`.
    pub fn succeeded(&self, key: &SuppressionKey) {
        if self.clear(key) {
            debug!(scope = %key, "recovered");
        }
    }

    /// Logs `err` according to its class.
    ///
    /// Returns whether anything was logged at warn level or above.
    pub fn report(&self, key: &SuppressionKey, err: &Error) -> bool {
        match err.class() {
            ErrorClass::FeatureDisabled => {
                debug!(scope = %key, "{err}");
                false
            }
            ErrorClass::Internal => {
                error!(scope = %key, "{err}");
                true
            }
            ErrorClass::Transient | ErrorClass::Schema => {
                if self.should_log(key) {
                    warn!(
                        scope = %key,
                        "{err}. Metrics will not be collected for {key}. This log message will be suppressed from now."
                    );
                    true
                } else {
                    false
                }
            }
        }
    }
}
