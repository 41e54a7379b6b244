//! Metrics collector for the refresh pipeline

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// 刷新流水线指标
///
/// 未安装全局 recorder 时所有记录都是空操作，测试中可以直接构造。
#[derive(Clone)]
pub struct MetricsCollector {
    outdated_queries: Gauge,
    refresh_pass_duration: Histogram,
    dispatch_conflicts_total: Counter,
    execution_duration: Histogram,
    failure_digests_total: Counter,
    ghost_locks_removed_total: Counter,
    query_results_deleted_total: Counter,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            outdated_queries: gauge!("refresh_outdated_queries"),
            refresh_pass_duration: histogram!("refresh_pass_duration_seconds"),
            dispatch_conflicts_total: counter!("refresh_dispatch_conflicts_total"),
            execution_duration: histogram!("refresh_execution_duration_seconds"),
            failure_digests_total: counter!("refresh_failure_digests_total"),
            ghost_locks_removed_total: counter!("refresh_ghost_locks_removed_total"),
            query_results_deleted_total: counter!("refresh_query_results_deleted_total"),
        }
    }

    pub fn record_refresh_pass(&self, outdated: usize, duration_seconds: f64) {
        self.outdated_queries.set(outdated as f64);
        self.refresh_pass_duration.record(duration_seconds);
    }

    pub fn record_enqueue(&self, joined_existing: bool) {
        let joined = if joined_existing { "true" } else { "false" };
        counter!("refresh_jobs_enqueued_total", "joined" => joined).increment(1);
    }

    pub fn record_dispatch_conflict(&self) {
        self.dispatch_conflicts_total.increment(1);
    }

    /// `outcome`: finished / failed / timeout / cancelled
    pub fn record_execution(&self, outcome: &'static str, duration_seconds: f64) {
        counter!("refresh_executions_total", "outcome" => outcome).increment(1);
        self.execution_duration.record(duration_seconds);
    }

    pub fn record_failure_digest(&self) {
        self.failure_digests_total.increment(1);
    }

    pub fn record_ghost_locks_removed(&self, count: usize) {
        self.ghost_locks_removed_total.increment(count as u64);
    }

    pub fn record_query_results_deleted(&self, count: u64) {
        self.query_results_deleted_total.increment(count);
    }

    pub fn update_queue_depth(&self, queue: &str, depth: usize) {
        gauge!("refresh_queue_depth", "queue" => queue.to_string()).set(depth as f64);
    }
}
