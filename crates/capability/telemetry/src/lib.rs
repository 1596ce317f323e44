//! 日志初始化与轮询计数。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 轮询计数快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connects: u64,
    pub connect_failures: u64,
    pub samples: u64,
    pub disconnects: u64,
    pub reconnect_attempts: u64,
    pub reconnects_succeeded: u64,
    pub reconnects_exhausted: u64,
    pub decode_faults: u64,
    pub stop_timeouts: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
}

/// 进程级轮询计数。
pub struct TelemetryMetrics {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    samples: AtomicU64,
    disconnects: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects_succeeded: AtomicU64,
    reconnects_exhausted: AtomicU64,
    decode_faults: AtomicU64,
    stop_timeouts: AtomicU64,
    poll_latency_ms_total: AtomicU64,
    poll_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connects: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnects_succeeded: AtomicU64::new(0),
            reconnects_exhausted: AtomicU64::new(0),
            decode_faults: AtomicU64::new(0),
            stop_timeouts: AtomicU64::new(0),
            poll_latency_ms_total: AtomicU64::new(0),
            poll_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnects_succeeded: self.reconnects_succeeded.load(Ordering::Relaxed),
            reconnects_exhausted: self.reconnects_exhausted.load(Ordering::Relaxed),
            decode_faults: self.decode_faults.load(Ordering::Relaxed),
            stop_timeouts: self.stop_timeouts.load(Ordering::Relaxed),
            poll_latency_ms_total: self.poll_latency_ms_total.load(Ordering::Relaxed),
            poll_latency_ms_count: self.poll_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录首次连接成功次数。
pub fn record_connect() {
    metrics().connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录首次连接耗尽次数。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布样本次数。
pub fn record_sample() {
    metrics().samples.fetch_add(1, Ordering::Relaxed);
}

/// 记录断线次数。
pub fn record_disconnect() {
    metrics().disconnects.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reconnect_attempt() {
    metrics().reconnect_attempts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reconnect_succeeded() {
    metrics()
        .reconnects_succeeded
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_reconnect_exhausted() {
    metrics()
        .reconnects_exhausted
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录解码契约违例次数。
pub fn record_decode_fault() {
    metrics().decode_faults.fetch_add(1, Ordering::Relaxed);
}

/// 记录停止时等待超时次数。
pub fn record_stop_timeout() {
    metrics().stop_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录单次读取+解码耗时（毫秒）。
pub fn record_poll_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .poll_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .poll_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
