use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use refresh_core::{
    config::SchedulerConfig,
    parameters::apply_parameters,
    traits::{QueryRepository, SharedStore},
    RefreshResult,
};
use refresh_infrastructure::{
    FailureTracker, MetricsCollector, ScheduledExecutionTracker, StructuredLogger,
};

use crate::enqueue::{Dispatcher, EnqueueRequest};
use crate::outdated_finder::{OutdatedQuery, OutdatedQueryFinder};

/// 刷新状态哈希键，仅供观察
pub const STATUS_KEY: &str = "refresh:status";

/// 一轮刷新的结果
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub outdated: usize,
    pub enqueued: Vec<i64>,
    pub skipped: usize,
}

/// 定时刷新
///
/// 每轮从共享存储刷新执行记录快照，找出到期查询并逐个分发，
/// 单个查询的分发失败不影响其他查询。
pub struct RefreshService {
    queries: Arc<dyn QueryRepository>,
    store: Arc<dyn SharedStore>,
    finder: OutdatedQueryFinder,
    dispatcher: Arc<Dispatcher>,
    failure_tracker: Arc<FailureTracker>,
    config: SchedulerConfig,
    started_at: DateTime<Utc>,
    metrics: MetricsCollector,
}

impl RefreshService {
    pub fn new(
        queries: Arc<dyn QueryRepository>,
        store: Arc<dyn SharedStore>,
        finder: OutdatedQueryFinder,
        dispatcher: Arc<Dispatcher>,
        failure_tracker: Arc<FailureTracker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queries,
            store,
            finder,
            dispatcher,
            failure_tracker,
            config,
            started_at: Utc::now(),
            metrics: MetricsCollector::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn refresh_queries(&self) -> RefreshResult<RefreshSummary> {
        self.refresh_queries_at(Utc::now()).await
    }

    pub async fn refresh_queries_at(&self, now: DateTime<Utc>) -> RefreshResult<RefreshSummary> {
        let timer = Instant::now();
        info!("开始刷新定时查询");

        let mut tracker = ScheduledExecutionTracker::new(self.store.clone());
        tracker.refresh().await?;
        let outdated = self.finder.find_outdated(&tracker, now).await?;

        let mut summary = RefreshSummary {
            outdated: outdated.len(),
            ..Default::default()
        };

        if self.config.disable_refresh_queries {
            info!("定时刷新已关闭，跳过 {} 个到期查询", outdated.len());
            summary.skipped = outdated.len();
        } else {
            for item in &outdated {
                match self.dispatch(item).await {
                    Ok(true) => summary.enqueued.push(item.query.id),
                    Ok(false) => summary.skipped += 1,
                    Err(e) => {
                        summary.skipped += 1;
                        error!("分发查询 {} 失败: {}", item.query.id, e);
                    }
                }
            }
        }

        self.write_status(&summary, now).await;

        let elapsed = timer.elapsed();
        self.metrics
            .record_refresh_pass(summary.enqueued.len(), elapsed.as_secs_f64());
        StructuredLogger::log_refresh_pass(
            summary.enqueued.len(),
            elapsed.as_millis() as u64,
            self.config.disable_refresh_queries,
        );
        Ok(summary)
    }

    /// 分发单个到期查询，参数无效时记录失败并跳过
    async fn dispatch(&self, item: &OutdatedQuery) -> RefreshResult<bool> {
        let query = &item.query;
        if let Err(e) = apply_parameters(&query.query_text, &query.options.parameters) {
            let message = format!("查询 {} 的参数无效，跳过刷新: {}", query.id, e);
            warn!("{}", message);
            self.failure_tracker.track_failure(query, &message).await?;
            return Ok(false);
        }

        let request = EnqueueRequest::scheduled(query);
        Ok(self
            .dispatcher
            .enqueue_query(&request, &item.data_source)
            .await?
            .is_some())
    }

    async fn write_status(&self, summary: &RefreshSummary, now: DateTime<Utc>) {
        let query_ids = serde_json::to_string(&summary.enqueued).unwrap_or_default();
        let fields = vec![
            ("started_at".to_string(), self.started_at.timestamp().to_string()),
            (
                "outdated_queries_count".to_string(),
                summary.enqueued.len().to_string(),
            ),
            ("last_refresh_at".to_string(), now.timestamp().to_string()),
            ("query_ids".to_string(), query_ids),
        ];
        if let Err(e) = self.store.hash_set(STATUS_KEY, &fields).await {
            warn!("写入刷新状态失败: {}", e);
        }
    }

    /// 清除已过截止日期的调度，返回清除数量
    #[instrument(skip(self))]
    pub async fn empty_schedules(&self) -> RefreshResult<usize> {
        self.empty_schedules_at(Utc::now()).await
    }

    pub async fn empty_schedules_at(&self, now: DateTime<Utc>) -> RefreshResult<usize> {
        let expired = self.queries.get_past_scheduled(now.date_naive()).await?;
        let mut cleared = 0;
        for query in expired {
            match self.queries.clear_schedule(query.id).await {
                Ok(()) => {
                    StructuredLogger::log_schedule_cleared(query.id);
                    cleared += 1;
                }
                Err(e) => error!("清除查询 {} 的调度失败: {}", query.id, e),
            }
        }
        if cleared > 0 {
            info!("已清除 {} 个过期调度", cleared);
        }
        Ok(cleared)
    }
}
