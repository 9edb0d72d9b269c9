use std::time::Duration;

/// An optional sink for duration measurements, standing in for the service-hub facade that
/// `spec.md` §1 explicitly keeps out of scope ("treated as optional sink for duration gauges").
///
/// The core calls this at the same two points the original calls into the service hub: around
/// asynchronous protocol creation and around the connect phase of a dial. A caller that doesn't
/// care about metrics gets [`NoopMetricsSink`], which is the default and costs nothing.
pub trait MetricsSink: Send + Sync {
    /// Records how long `phase` took for the remote identified by `uri`.
    fn record_duration(&self, phase: &str, uri: &str, duration: Duration);
}

/// A [`MetricsSink`] that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_duration(&self, _phase: &str, _uri: &str, _duration: Duration) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Records every measurement it receives, for assertions in tests.
    #[derive(Default)]
    pub struct RecordingMetricsSink {
        pub records: Mutex<Vec<(String, String, Duration)>>,
    }

    impl MetricsSink for RecordingMetricsSink {
        fn record_duration(&self, phase: &str, uri: &str, duration: Duration) {
            self.records
                .lock()
                .unwrap()
                .push((phase.to_owned(), uri.to_owned(), duration));
        }
    }
}
