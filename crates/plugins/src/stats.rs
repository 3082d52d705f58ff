use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

/// Per-plugin counters. Lock-free; shared between concurrent tasks.
#[derive(Debug, Default)]
pub struct PluginStats {
    call_count: AtomicU64,
    failure_count: AtomicU64,
    total_latency_us: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub avg_latency_ms: u64,
}

impl PluginStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.record_success(latency);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed) / calls)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.call_count.load(Ordering::Relaxed),
            failures: self.failure_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency().as_millis() as u64,
        }
    }
}
