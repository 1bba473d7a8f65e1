use color_eyre::eyre;
use duration_string::DurationString;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ScrapeConfig {
    pub interval: Option<DurationString>,
    pub timeout: Option<DurationString>,
}

impl ScrapeConfig {
    pub fn interval(&self) -> Duration {
        self.interval
            .clone()
            .map(Into::into)
            .unwrap_or(DEFAULT_SCRAPE_INTERVAL)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
            .clone()
            .map(Into::into)
            .unwrap_or(DEFAULT_SCRAPE_TIMEOUT)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exporter: crate::prometheus::Config,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    /// Source specific section, deserialized by the collectors crate.
    #[serde(default)]
    pub mongodb: serde_yaml::Value,
}

impl Config {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> eyre::Result<Self> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        let reader = std::io::BufReader::new(file);
        Self::from_reader(reader)
    }

    pub fn from_reader(reader: impl std::io::BufRead) -> eyre::Result<Self> {
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() -> eyre::Result<()> {
        let yaml = r#"
exporter:
  namespace: mongo
  const_labels:
    cluster: prod
scrape:
  interval: 15s
  timeout: 5s
mongodb:
  uri: mongodb://localhost:27017
  compatible_mode: true
"#;
        let config = Config::from_reader(yaml.as_bytes())?;
        assert_eq!(config.exporter.namespace.as_deref(), Some("mongo"));
        assert_eq!(
            config.exporter.const_labels.get("cluster").map(String::as_str),
            Some("prod")
        );
        assert_eq!(config.scrape.interval(), Duration::from_secs(15));
        assert_eq!(config.scrape.timeout(), Duration::from_secs(5));
        assert!(config.mongodb.get("uri").is_some());
        Ok(())
    }

    #[test]
    fn defaults() -> eyre::Result<()> {
        let config = Config::from_reader("{}".as_bytes())?;
        assert_eq!(config.exporter.namespace.as_deref(), Some("mongodb"));
        assert_eq!(config.scrape.interval(), DEFAULT_SCRAPE_INTERVAL);
        assert_eq!(config.scrape.timeout(), DEFAULT_SCRAPE_TIMEOUT);
        assert!(config.mongodb.is_null());
        Ok(())
    }
}
