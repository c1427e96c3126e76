//! Process-wide counters/histograms for the spatial index (§2.1 "Metrics":
//! "buffer flush duration/size, nearest-query latency"), registered against
//! the default registry the same `/metrics` handler scrapes with
//! `prometheus::gather()` (`coordinator::health`).

use std::sync::OnceLock;

pub(crate) struct Metrics {
    pub(crate) buffer_flush_duration_seconds: prometheus::Histogram,
    pub(crate) buffer_flush_batch_size: prometheus::Histogram,
    pub(crate) nearest_query_duration_seconds: prometheus::Histogram,
}

fn histogram(name: &str, help: &str) -> prometheus::Histogram {
    let histogram =
        prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(name, help))
            .expect("valid metric");
    prometheus::register(Box::new(histogram.clone())).expect("metric not already registered");
    histogram
}

impl Metrics {
    fn new() -> Self {
        Self {
            buffer_flush_duration_seconds: histogram(
                "ride_spatial_buffer_flush_duration_seconds",
                "Time spent flushing a batch of staged driver locations.",
            ),
            buffer_flush_batch_size: histogram(
                "ride_spatial_buffer_flush_batch_size",
                "Number of distinct drivers written per flush.",
            ),
            nearest_query_duration_seconds: histogram(
                "ride_spatial_nearest_query_duration_seconds",
                "Latency of FindNearbyDrivers, from geo-index search to sorted result.",
            ),
        }
    }
}

pub(crate) fn metrics() -> &'static Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(Metrics::new)
}
