use crate::registry::Scrape;
use crate::{Descriptor, MetricKind, MetricSample};
use color_eyre::eyre;
use prometheus::core::Desc;
use prometheus::proto::{self, MetricFamily, MetricType};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{error, warn};

pub const DEFAULT_NAMESPACE: &str = "mongodb";

lazy_static::lazy_static! {
    static ref INVALID_METRIC_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_:]+").unwrap();
    static ref INVALID_LABEL_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_]+").unwrap();
}

fn default_namespace() -> Option<String> {
    Some(DEFAULT_NAMESPACE.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_namespace")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub const_labels: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            const_labels: HashMap::new(),
        }
    }
}

fn sanitize(name: &str, invalid: &Regex, fallback: &str) -> String {
    let name = invalid.replace_all(name, "_");
    let name = name.trim_matches('_');
    if name.is_empty() {
        return fallback.to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("_{name}");
    }
    name.to_string()
}

/// Turns a dotted canonical name into a valid prometheus metric name.
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, &INVALID_METRIC_NAME_CHARS, "unnamed")
}

pub fn sanitize_label_name(name: &str) -> String {
    sanitize(name, &INVALID_LABEL_NAME_CHARS, "label")
}

impl From<MetricKind> for MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricType::COUNTER,
            MetricKind::Gauge => MetricType::GAUGE,
        }
    }
}

fn to_metric(sample: &MetricSample) -> proto::Metric {
    let mut metric = proto::Metric::default();
    for (key, value) in &sample.labels {
        let mut pair = proto::LabelPair::default();
        pair.set_name(sanitize_label_name(key));
        pair.set_value(value.clone());
        metric.mut_label().push(pair);
    }
    match sample.kind {
        MetricKind::Counter => {
            let mut counter = proto::Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
        }
        MetricKind::Gauge => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
    }
    metric
}

fn to_desc(descriptor: &Descriptor) -> prometheus::Result<Desc> {
    Desc::new(
        sanitize_metric_name(&descriptor.name),
        descriptor.help.clone(),
        descriptor
            .label_keys
            .iter()
            .map(|key| sanitize_label_name(key))
            .collect(),
        HashMap::new(),
    )
}

/// Adapts the samples of one scrape to the pull contract of the prometheus registry.
#[derive(Debug)]
pub struct ScrapeCollector {
    descs: Vec<Desc>,
    families: Vec<MetricFamily>,
}

impl ScrapeCollector {
    pub fn new(scrape: &Scrape) -> Self {
        let mut descs = Vec::new();
        let mut help: HashMap<String, &str> = HashMap::new();
        for descriptor in &scrape.descriptors {
            let name = sanitize_metric_name(&descriptor.name);
            if help.contains_key(&name) {
                continue;
            }
            match to_desc(descriptor) {
                Ok(desc) => {
                    help.insert(name, &descriptor.help);
                    descs.push(desc);
                }
                Err(err) => warn!(metric = descriptor.name, "invalid descriptor: {err}"),
            }
        }

        let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();
        let mut seen = HashSet::new();
        for sample in &scrape.samples {
            let name = sanitize_metric_name(&sample.name);
            let labels: Vec<(String, &String)> = sample
                .labels
                .iter()
                .map(|(k, v)| (sanitize_label_name(k), v))
                .collect();
            if !seen.insert((name.clone(), labels)) {
                error!(
                    metric = name,
                    "dropping {} which collides with another series after name sanitization",
                    sample.series()
                );
                continue;
            }
            let family = families.entry(name.clone()).or_insert_with(|| {
                let mut family = MetricFamily::default();
                family.set_name(name.clone());
                family.set_help(
                    help.get(&name)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| format!("source = {}", sample.name)),
                );
                family.set_field_type(sample.kind.into());
                family
            });
            if family.get_field_type() != MetricType::from(sample.kind) {
                error!(
                    metric = name,
                    "dropping {} whose kind {} differs from its family",
                    sample.series(),
                    sample.kind.as_str()
                );
                continue;
            }
            family.mut_metric().push(to_metric(sample));
        }

        Self {
            descs,
            families: families.into_values().collect(),
        }
    }
}

impl prometheus::core::Collector for ScrapeCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families.clone()
    }
}

/// Builds a fresh registry for one scrape and gathers its metric families.
pub fn gather(scrape: &Scrape, config: &Config) -> eyre::Result<Vec<MetricFamily>> {
    let namespace = config
        .namespace
        .as_deref()
        .map(sanitize_metric_name)
        .filter(|namespace| !namespace.is_empty());
    let const_labels = Some(config.const_labels.clone()).filter(|labels| !labels.is_empty());
    let registry = prometheus::Registry::new_custom(namespace, const_labels)?;
    registry.register(Box::new(ScrapeCollector::new(scrape)))?;
    Ok(registry.gather())
}

pub fn encode_text(families: &[MetricFamily]) -> eyre::Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
