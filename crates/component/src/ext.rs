use prometheus::proto::MetricFamily;

pub trait NumSamples {
    fn num_samples(&self) -> usize;
}

impl NumSamples for MetricFamily {
    fn num_samples(&self) -> usize {
        self.get_metric().len()
    }
}

impl NumSamples for [MetricFamily] {
    fn num_samples(&self) -> usize {
        self.iter().map(NumSamples::num_samples).sum()
    }
}

impl NumSamples for Vec<MetricFamily> {
    fn num_samples(&self) -> usize {
        self.as_slice().num_samples()
    }
}
