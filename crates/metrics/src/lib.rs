//! Metrics and tracing setup for tierkv.
//!
//! Provides a global [`ClientMetrics`] singleton backed by the `prometheus`
//! crate and a helper that installs the `tracing` subscriber.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Safe to call
/// more than once (later calls are ignored).
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

static METRICS: OnceLock<ClientMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static ClientMetrics {
    METRICS.get_or_init(ClientMetrics::new)
}

/// All Prometheus metrics for a tierkv process.
pub struct ClientMetrics {
    pub registry: Registry,

    // ── RPC counters ──
    pub rpcs_sent_by_type: IntCounterVec,
    pub rpc_failures_by_type: IntCounterVec,
    pub rpcs_received_by_type: IntCounterVec,

    // ── RPC latency ──
    pub rpc_latency_secs: HistogramVec,

    // ── KV operation counters ──
    pub kv_gets: IntCounter,
    pub kv_puts: IntCounter,
    pub kv_deletes: IntCounter,
    pub kv_stats: IntCounter,

    // ── KV outcomes ──
    pub kv_timeouts: IntCounter,
    pub kv_conflicts: IntCounter,

    // ── KV operation latency ──
    pub kv_latency_secs: HistogramVec,
}

// prometheus types don't derive Debug.
impl std::fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for RPC/KV latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help)).expect("valid counter opts")
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter vec opts")
}

fn histogram_vec(name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    HistogramVec::new(
        HistogramOpts::new(name, help).buckets(LATENCY_BUCKETS.to_vec()),
        labels,
    )
    .expect("valid histogram opts")
}

impl ClientMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let rpcs_sent_by_type = counter_vec(
            "tierkv_rpcs_sent_by_type_total",
            "Outbound replica calls, by type",
            &["rpc_type"],
        );
        let rpc_failures_by_type = counter_vec(
            "tierkv_rpc_failures_total",
            "Outbound replica calls that failed, by type",
            &["rpc_type"],
        );
        let rpcs_received_by_type = counter_vec(
            "tierkv_rpcs_received_by_type_total",
            "Inbound replica calls served, by type",
            &["rpc_type"],
        );
        let rpc_latency_secs = histogram_vec(
            "tierkv_rpc_latency_seconds",
            "Replica call latency in seconds",
            &["rpc_type", "direction"],
        );

        let kv_gets = counter("tierkv_kv_gets_total", "KV GET operations");
        let kv_puts = counter("tierkv_kv_puts_total", "KV PUT operations");
        let kv_deletes = counter("tierkv_kv_deletes_total", "KV DELETE operations");
        let kv_stats = counter("tierkv_kv_stats_total", "Cluster STAT operations");
        let kv_timeouts = counter(
            "tierkv_kv_timeouts_total",
            "Operations that missed their consistency level before the deadline",
        );
        let kv_conflicts = counter(
            "tierkv_kv_conflicts_total",
            "Reads that returned concurrent versions",
        );
        let kv_latency_secs = histogram_vec(
            "tierkv_kv_latency_seconds",
            "KV operation latency in seconds",
            &["op_type"],
        );

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(rpcs_sent_by_type.clone()),
            Box::new(rpc_failures_by_type.clone()),
            Box::new(rpcs_received_by_type.clone()),
            Box::new(rpc_latency_secs.clone()),
            Box::new(kv_gets.clone()),
            Box::new(kv_puts.clone()),
            Box::new(kv_deletes.clone()),
            Box::new(kv_stats.clone()),
            Box::new(kv_timeouts.clone()),
            Box::new(kv_conflicts.clone()),
            Box::new(kv_latency_secs.clone()),
        ];
        for collector in collectors {
            registry.register(collector).expect("register metric");
        }

        Self {
            registry,
            rpcs_sent_by_type,
            rpc_failures_by_type,
            rpcs_received_by_type,
            rpc_latency_secs,
            kv_gets,
            kv_puts,
            kv_deletes,
            kv_stats,
            kv_timeouts,
            kv_conflicts,
            kv_latency_secs,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&m.registry.gather(), &mut buf) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Helper: start an RPC latency timer. Returns a guard that records
/// elapsed time on drop.
pub fn start_rpc_timer(rpc_type: &str, direction: &str) -> prometheus::HistogramTimer {
    metrics()
        .rpc_latency_secs
        .with_label_values(&[rpc_type, direction])
        .start_timer()
}

/// Helper: start a KV operation latency timer.
pub fn start_kv_timer(op_type: &str) -> prometheus::HistogramTimer {
    metrics()
        .kv_latency_secs
        .with_label_values(&[op_type])
        .start_timer()
}

// ────────────────────────── Tests ──────────────────────────
