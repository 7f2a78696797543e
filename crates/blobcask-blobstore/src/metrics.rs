//! Blob store metrics
//!
//! Tracks operation counts, latencies and offset-store probe depths,
//! exported in Prometheus text format. The registry is process wide:
//! every metrics wrapper references the same singleton.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Latency histogram boundaries in microseconds
const LATENCY_BUCKET_BOUNDARIES_US: [u64; 11] = [
    100,
    250,
    500,
    1_000,
    2_500,
    5_000,
    10_000,
    25_000,
    100_000,
    1_000_000,
    10_000_000,
];

/// Probe histogram boundaries (probe counts are small integers)
const PROBE_BUCKET_BOUNDARIES: [u64; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

/// Blob store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Get,
    Put,
    Delete,
    FindMissing,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::Get => "get",
            StoreOperation::Put => "put",
            StoreOperation::Delete => "delete",
            StoreOperation::FindMissing => "find_missing",
        }
    }

    const ALL: [StoreOperation; 4] = [
        StoreOperation::Get,
        StoreOperation::Put,
        StoreOperation::Delete,
        StoreOperation::FindMissing,
    ];
}

/// Counters and latency histogram for one operation of one store
#[derive(Debug, Default)]
struct OperationMetrics {
    started_total: AtomicU64,
    duration_sum_us: AtomicU64,
    duration_count: AtomicU64,
    /// Cumulative counts per boundary
    duration_buckets: [AtomicU64; LATENCY_BUCKET_BOUNDARIES_US.len()],
}

impl OperationMetrics {
    fn record(&self, latency_us: u64) {
        self.duration_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.duration_count.fetch_add(1, Ordering::Relaxed);
        for (i, &boundary) in LATENCY_BUCKET_BOUNDARIES_US.iter().enumerate() {
            if latency_us <= boundary {
                self.duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Per-store-name metrics
#[derive(Debug, Default)]
pub struct StoreMetrics {
    operations: [OperationMetrics; 4],
}

impl StoreMetrics {
    fn operation(&self, op: StoreOperation) -> &OperationMetrics {
        &self.operations[op as usize]
    }

    /// Count an operation start
    pub fn start(&self, op: StoreOperation) {
        self.operation(op).started_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Observe an operation duration
    pub fn observe(&self, op: StoreOperation, latency_us: u64) {
        self.operation(op).record(latency_us);
    }

    /// Number of started operations of the given kind
    pub fn started(&self, op: StoreOperation) -> u64 {
        self.operation(op).started_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct ProbeHistogram {
    sum: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; PROBE_BUCKET_BOUNDARIES.len()],
}

impl ProbeHistogram {
    fn record(&self, probes: u64) {
        self.sum.fetch_add(probes, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (i, &boundary) in PROBE_BUCKET_BOUNDARIES.iter().enumerate() {
            if probes <= boundary {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Probe depth observations of the on-disk offset table, labelled by
/// operation and outcome.
#[derive(Debug, Default)]
pub struct OffsetProbeMetrics {
    series: RwLock<HashMap<(&'static str, &'static str), Arc<ProbeHistogram>>>,
}

impl OffsetProbeMetrics {
    pub fn observe(&self, operation: &'static str, result: &'static str, probes: u32) {
        let key = (operation, result);
        if let Some(histogram) = self.series.read().get(&key) {
            histogram.record(u64::from(probes));
            return;
        }
        let histogram = Arc::clone(
            self.series
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(ProbeHistogram::default())),
        );
        histogram.record(u64::from(probes));
    }

    /// Total number of observations for an operation/result pair
    pub fn count(&self, operation: &str, result: &str) -> u64 {
        self.series
            .read()
            .get(&(operation, result))
            .map_or(0, |h| h.count.load(Ordering::Relaxed))
    }
}

/// Process-wide metrics registry
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    stores: RwLock<HashMap<String, Arc<StoreMetrics>>>,
    offset_probes: OffsetProbeMetrics,
}

impl MetricsRegistry {
    /// Look up or register the metrics of a named store
    pub fn store(&self, name: &str) -> Arc<StoreMetrics> {
        if let Some(metrics) = self.stores.read().get(name) {
            return Arc::clone(metrics);
        }
        Arc::clone(
            self.stores
                .write()
                .entry(name.to_string())
                .or_default(),
        )
    }

    pub fn offset_store_probes(&self) -> &OffsetProbeMetrics {
        &self.offset_probes
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP blobcask_blobstore_operations_started_total Operations started on blob stores.\n");
        out.push_str("# TYPE blobcask_blobstore_operations_started_total counter\n");
        let stores = self.stores.read();
        let mut names: Vec<_> = stores.keys().collect();
        names.sort();
        for name in &names {
            let metrics = &stores[name.as_str()];
            for op in StoreOperation::ALL {
                let _ = writeln!(
                    out,
                    "blobcask_blobstore_operations_started_total{{name=\"{}\",operation=\"{}\"}} {}",
                    name,
                    op.as_str(),
                    metrics.started(op)
                );
            }
        }

        out.push_str("# HELP blobcask_blobstore_operations_duration_seconds Time spent per blob store operation.\n");
        out.push_str("# TYPE blobcask_blobstore_operations_duration_seconds histogram\n");
        for name in &names {
            let metrics = &stores[name.as_str()];
            for op in StoreOperation::ALL {
                let om = metrics.operation(op);
                let labels = format!("name=\"{}\",operation=\"{}\"", name, op.as_str());
                for (i, &boundary) in LATENCY_BUCKET_BOUNDARIES_US.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "blobcask_blobstore_operations_duration_seconds_bucket{{{labels},le=\"{}\"}} {}",
                        boundary as f64 / 1_000_000.0,
                        om.duration_buckets[i].load(Ordering::Relaxed)
                    );
                }
                let count = om.duration_count.load(Ordering::Relaxed);
                let _ = writeln!(
                    out,
                    "blobcask_blobstore_operations_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {count}"
                );
                let _ = writeln!(
                    out,
                    "blobcask_blobstore_operations_duration_seconds_sum{{{labels}}} {}",
                    om.duration_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
                );
                let _ = writeln!(
                    out,
                    "blobcask_blobstore_operations_duration_seconds_count{{{labels}}} {count}"
                );
            }
        }
        drop(stores);

        out.push_str("# HELP blobcask_circular_offset_store_probes Probes spent per offset store operation.\n");
        out.push_str("# TYPE blobcask_circular_offset_store_probes histogram\n");
        let series = self.offset_probes.series.read();
        let mut keys: Vec<_> = series.keys().copied().collect();
        keys.sort();
        for (operation, result) in keys {
            let histogram = &series[&(operation, result)];
            let labels = format!("operation=\"{operation}\",result=\"{result}\"");
            for (i, &boundary) in PROBE_BUCKET_BOUNDARIES.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "blobcask_circular_offset_store_probes_bucket{{{labels},le=\"{boundary}\"}} {}",
                    histogram.buckets[i].load(Ordering::Relaxed)
                );
            }
            let count = histogram.count.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "blobcask_circular_offset_store_probes_bucket{{{labels},le=\"+Inf\"}} {count}"
            );
            let _ = writeln!(
                out,
                "blobcask_circular_offset_store_probes_sum{{{labels}}} {}",
                histogram.sum.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                out,
                "blobcask_circular_offset_store_probes_count{{{labels}}} {count}"
            );
        }

        out
    }
}

static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

/// The process-wide metrics registry
pub fn registry() -> &'static MetricsRegistry {
    REGISTRY.get_or_init(MetricsRegistry::default)
}

/// Adapter that instruments another blob store with operation
/// counters and latency histograms.
pub struct MetricsBlobStore {
    inner: Arc<dyn BlobStore>,
    metrics: Arc<StoreMetrics>,
}

impl MetricsBlobStore {
    /// Wrap `inner`, reporting under `name` in the registry.
    pub fn new(inner: Arc<dyn BlobStore>, name: &str) -> Self {
        Self {
            inner,
            metrics: registry().store(name),
        }
    }

    fn measure<T>(&self, op: StoreOperation, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.metrics.start(op);
        let started = Instant::now();
        let result = f();
        self.metrics
            .observe(op, started.elapsed().as_micros() as u64);
        result
    }
}

impl BlobStore for MetricsBlobStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        self.measure(StoreOperation::Get, || self.inner.get(ctx, digest))
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        self.measure(StoreOperation::Put, || {
            self.inner.put(ctx, digest, size_bytes, reader)
        })
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        self.measure(StoreOperation::Delete, || self.inner.delete(ctx, digest))
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        self.measure(StoreOperation::FindMissing, || {
            self.inner.find_missing(ctx, digests)
        })
    }
}
