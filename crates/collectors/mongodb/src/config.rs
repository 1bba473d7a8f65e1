use color_eyre::eyre;
use serde::Deserialize;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// A fully qualified `database.collection` name.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid namespace {0:?}: expected <database>.<collection>")]
pub struct InvalidNamespace(String);

impl std::str::FromStr for Namespace {
    type Err = InvalidNamespace;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    database: database.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => Err(InvalidNamespace(value.to_string())),
        }
    }
}

impl TryFrom<String> for Namespace {
    type Error = InvalidNamespace;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default = "yes")]
    pub server_status: bool,
    #[serde(default = "yes")]
    pub diagnostic_data: bool,
    #[serde(default = "yes")]
    pub replset_status: bool,
    #[serde(default)]
    pub replset_config: bool,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            server_status: true,
            diagnostic_data: true,
            replset_status: true,
            replset_config: false,
        }
    }
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MongoDbConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Emit the metric names of the legacy exporter where they exist.
    #[serde(default)]
    pub compatible_mode: bool,
    /// Share one pooled client across scrapes instead of connecting per scrape.
    #[serde(default)]
    pub global_conn_pool: bool,
    #[serde(default = "yes")]
    pub direct_connection: bool,
    /// Collect stats of all user collections when none are configured.
    #[serde(default)]
    pub discover_collections: bool,
    #[serde(default)]
    pub collstats_collections: Vec<Namespace>,
    #[serde(default)]
    pub indexstats_collections: Vec<Namespace>,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            compatible_mode: false,
            global_conn_pool: false,
            direct_connection: true,
            discover_collections: false,
            collstats_collections: Vec::new(),
            indexstats_collections: Vec::new(),
            collectors: CollectorsConfig::default(),
        }
    }
}

impl MongoDbConfig {
    /// Deserializes the `mongodb` section of the exporter config.
    pub fn from_value(value: serde_yaml::Value) -> eyre::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_value(value)?;
        Ok(config)
    }

    pub fn collstats_enabled(&self) -> bool {
        self.discover_collections || !self.collstats_collections.is_empty()
    }

    pub fn indexstats_enabled(&self) -> bool {
        self.discover_collections || !self.indexstats_collections.is_empty()
    }
}
