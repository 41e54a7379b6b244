use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use refresh_core::{config::SchedulerConfig, traits::ResultStore, RefreshResult};
use refresh_infrastructure::{JobLock, JobRegistry, MetricsCollector};

/// 周期性清理：残留锁、无人引用的旧结果，以及队列长度上报
pub struct MaintenanceService {
    lock: JobLock,
    registry: JobRegistry,
    results: Arc<dyn ResultStore>,
    config: SchedulerConfig,
    metrics: MetricsCollector,
}

impl MaintenanceService {
    pub fn new(
        lock: JobLock,
        registry: JobRegistry,
        results: Arc<dyn ResultStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            lock,
            registry,
            results,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_ghost_locks(&self) -> RefreshResult<usize> {
        let removed = self.lock.remove_ghost_locks().await?;
        if removed > 0 {
            info!("已删除 {} 个残留锁", removed);
        }
        self.metrics.record_ghost_locks_removed(removed);
        Ok(removed)
    }

    /// 删除超过保留期且没有查询引用的结果
    #[instrument(skip(self))]
    pub async fn cleanup_query_results(&self) -> RefreshResult<u64> {
        self.cleanup_query_results_at(Utc::now()).await
    }

    pub async fn cleanup_query_results_at(&self, now: DateTime<Utc>) -> RefreshResult<u64> {
        if !self.config.query_results_cleanup_enabled {
            return Ok(0);
        }
        let older_than = now - Duration::days(self.config.query_results_cleanup_max_age_days);
        let deleted = self
            .results
            .delete_unused(older_than, self.config.query_results_cleanup_count)
            .await?;
        if deleted > 0 {
            info!("已删除 {} 条无人引用的查询结果", deleted);
        }
        self.metrics.record_query_results_deleted(deleted);
        Ok(deleted)
    }

    pub async fn report_queue_depths(&self, queues: &[String]) {
        for queue in queues {
            match self.registry.queue_length(queue).await {
                Ok(depth) => self.metrics.update_queue_depth(queue, depth),
                Err(e) => warn!("读取队列 {} 长度失败: {}", queue, e),
            }
        }
    }
}
