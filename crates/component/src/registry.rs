use crate::suppress::{SuppressionKey, SuppressionLedger};
use crate::{Collector, Descriptor, Error, SampleSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Result of one scrape over all registered collectors.
#[derive(Debug, Default)]
pub struct Scrape {
    pub samples: SampleSet,
    pub descriptors: Vec<Descriptor>,
}

/// Composes collectors for the lifetime of one scrape.
#[derive(Debug)]
pub struct Registry {
    collectors: Vec<Box<dyn Collector>>,
    timeout: Duration,
}

impl Registry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            collectors: Vec::new(),
            timeout,
        }
    }

    pub fn register(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push(collector);
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        self.collectors
            .iter()
            .flat_map(|collector| collector.describe())
            .collect()
    }

    /// Runs all collectors concurrently.
    ///
    /// A collector that fails or exceeds the timeout contributes no samples.
    pub async fn scrape(&self, ledger: &SuppressionLedger) -> Scrape {
        let timeout = self.timeout;
        let results = futures::future::join_all(self.collectors.iter().map(|collector| async move {
            let start = Instant::now();
            let mut buffer = Vec::new();
            let result = match tokio::time::timeout(timeout, collector.collect(&mut buffer)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            };
            trace!(
                collector = collector.name(),
                "completed in {:?}",
                start.elapsed()
            );
            (collector, result, buffer)
        }))
        .await;

        let mut scrape = Scrape {
            samples: SampleSet::new(),
            descriptors: self.describe(),
        };
        for (collector, result, buffer) in results {
            let key = SuppressionKey::server(collector.name());
            match result {
                Ok(()) => {
                    ledger.succeeded(&key);
                    debug!(
                        collector = collector.name(),
                        "emitted {} samples",
                        buffer.len()
                    );
                    for sample in buffer {
                        if let Err(err) = scrape.samples.insert(sample) {
                            error!(collector = collector.name(), "{err}");
                        }
                    }
                }
                Err(err) => {
                    ledger.report(&key, &err);
                }
            }
        }
        scrape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricKind, MetricSample, Sink};

    #[derive(Debug)]
    enum Behavior {
        Emit(Vec<MetricSample>),
        FailAfterEmit(MetricSample),
        Hang,
    }

    #[derive(Debug)]
    struct Static {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait::async_trait]
    impl Collector for Static {
        fn name(&self) -> &'static str {
            self.name
        }

        fn describe(&self) -> Vec<Descriptor> {
            vec![Descriptor::new(
                self.name,
                "test collector",
                Vec::<String>::new(),
                MetricKind::Gauge,
            )]
        }

        async fn collect(&self, sink: &mut dyn Sink) -> Result<(), Error> {
            match &self.behavior {
                Behavior::Emit(samples) => {
                    for sample in samples {
                        sink.emit(sample.clone());
                    }
                    Ok(())
                }
                Behavior::FailAfterEmit(sample) => {
                    sink.emit(sample.clone());
                    Err(Error::connectivity("connection reset"))
                }
                Behavior::Hang => {
                    sink.emit(MetricSample::gauge("partial", 1.0));
                    futures::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

    fn registry(collectors: Vec<Static>) -> Registry {
        let mut registry = Registry::new(Duration::from_millis(50));
        for collector in collectors {
            registry.register(Box::new(collector));
        }
        registry
    }

    fn names(scrape: &Scrape) -> Vec<&str> {
        let mut names: Vec<_> = scrape.samples.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn failing_collector_does_not_affect_others() {
        let registry = registry(vec![
            Static {
                name: "collstats",
                behavior: Behavior::FailAfterEmit(MetricSample::gauge("index_size", 1.0)),
            },
            Static {
                name: "serverstatus",
                behavior: Behavior::Emit(vec![MetricSample::gauge("ss.uptime", 10.0)]),
            },
        ]);
        let ledger = SuppressionLedger::new();
        let scrape = registry.scrape(&ledger).await;
        assert_eq!(names(&scrape), vec!["ss.uptime"]);
        assert!(ledger.is_suppressed(&SuppressionKey::server("collstats")));
        assert!(!ledger.is_suppressed(&SuppressionKey::server("serverstatus")));
        assert_eq!(scrape.descriptors.len(), 2);
    }

    #[tokio::test]
    async fn timed_out_collector_contributes_nothing() {
        let registry = registry(vec![
            Static {
                name: "slow",
                behavior: Behavior::Hang,
            },
            Static {
                name: "fast",
                behavior: Behavior::Emit(vec![MetricSample::gauge("fast", 1.0)]),
            },
        ]);
        let ledger = SuppressionLedger::new();
        let scrape = registry.scrape(&ledger).await;
        assert_eq!(names(&scrape), vec!["fast"]);
        assert!(ledger.is_suppressed(&SuppressionKey::server("slow")));
    }

    #[tokio::test]
    async fn duplicates_across_collectors_are_dropped() {
        let sample = MetricSample::gauge("ss.uptime", 10.0);
        let registry = registry(vec![
            Static {
                name: "a",
                behavior: Behavior::Emit(vec![sample.clone()]),
            },
            Static {
                name: "b",
                behavior: Behavior::Emit(vec![sample]),
            },
        ]);
        let scrape = registry.scrape(&SuppressionLedger::new()).await;
        assert_eq!(scrape.samples.len(), 1);
    }

    #[tokio::test]
    async fn success_clears_previous_failure() {
        let ledger = SuppressionLedger::new();
        let key = SuppressionKey::server("serverstatus");
        assert!(ledger.should_log(&key));
        let registry = registry(vec![Static {
            name: "serverstatus",
            behavior: Behavior::Emit(vec![]),
        }]);
        registry.scrape(&ledger).await;
        assert!(!ledger.is_suppressed(&key));
    }
}
