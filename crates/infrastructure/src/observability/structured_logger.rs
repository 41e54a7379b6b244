//! Structured logging utilities
//!
//! One function per refresh pipeline event, so that field names stay
//! consistent across the scheduler and the workers.

use tracing::{error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_refresh_pass(outdated_count: usize, duration_ms: u64, dispatch_disabled: bool) {
        info!(
            event = "refresh_pass_complete",
            refresh.outdated_count = outdated_count,
            refresh.duration_ms = duration_ms,
            refresh.dispatch_disabled = dispatch_disabled,
            "Refresh pass completed"
        );
    }

    pub fn log_query_enqueued(
        job_id: &str,
        data_source_id: i64,
        query_hash: &str,
        queue: &str,
        query_id: Option<i64>,
        joined_existing: bool,
    ) {
        let event = if joined_existing {
            "query_job_joined"
        } else {
            "query_enqueued"
        };
        info!(
            event = event,
            job.id = job_id,
            job.queue = queue,
            data_source.id = data_source_id,
            query.hash = query_hash,
            query.id = query_id,
            "Query execution job dispatched"
        );
    }

    pub fn log_dispatch_conflict(data_source_id: i64, query_hash: &str, attempts: u32) {
        error!(
            event = "dispatch_conflict",
            data_source.id = data_source_id,
            query.hash = query_hash,
            dispatch.attempts = attempts,
            "Dispatch abandoned after repeated lock conflicts"
        );
    }

    pub fn log_execution_start(job_id: &str, query_id: Option<i64>, data_source_id: i64, worker_id: &str) {
        info!(
            event = "query_execution_start",
            job.id = job_id,
            query.id = query_id,
            data_source.id = data_source_id,
            worker.id = worker_id,
            "Query execution started"
        );
    }

    pub fn log_execution_finished(
        job_id: &str,
        query_result_id: i64,
        updated_queries: usize,
        runtime_seconds: f64,
    ) {
        info!(
            event = "query_execution_finished",
            job.id = job_id,
            query_result.id = query_result_id,
            query_result.updated_queries = updated_queries,
            query_result.runtime_seconds = runtime_seconds,
            "Query execution finished"
        );
    }

    pub fn log_execution_failed(job_id: &str, query_id: Option<i64>, error_message: &str, duration_ms: u64) {
        error!(
            event = "query_execution_failed",
            job.id = job_id,
            query.id = query_id,
            job.duration_ms = duration_ms,
            job.error = error_message,
            "Query execution failed"
        );
    }

    pub fn log_execution_cancelled(job_id: &str, query_id: Option<i64>) {
        warn!(
            event = "query_execution_cancelled",
            job.id = job_id,
            query.id = query_id,
            "Query execution cancelled"
        );
    }

    pub fn log_schedule_disabled(query_id: i64, reason: &str) {
        error!(
            event = "schedule_disabled",
            query.id = query_id,
            schedule.reason = reason,
            "Query schedule disabled"
        );
    }

    pub fn log_schedule_cleared(query_id: i64) {
        info!(
            event = "schedule_cleared",
            query.id = query_id,
            "Expired query schedule cleared"
        );
    }

    pub fn log_failure_tracked(query_id: i64, schedule_failures: i32, reported: bool) {
        warn!(
            event = "schedule_failure_tracked",
            query.id = query_id,
            query.schedule_failures = schedule_failures,
            failure.reported = reported,
            "Scheduled query failure recorded"
        );
    }

    pub fn log_digest_sent(user_id: i64, unique_failures: usize, total_failures: usize) {
        info!(
            event = "failure_digest_sent",
            user.id = user_id,
            digest.unique_failures = unique_failures,
            digest.total_failures = total_failures,
            "Failure digest sent"
        );
    }
}
