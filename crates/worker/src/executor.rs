//! 查询执行作业
//!
//! 单个作业的生命周期：
//! 1. `Queued -> Started`，已取消或已结束的作业直接跳过
//! 2. 解析执行身份并重新加载数据源
//! 3. 参数替换、自动LIMIT、元数据注释后交给执行器，受时限与取消令牌约束
//! 4. 结果或失败先落库，再释放作业锁
//!
//! 远程查询期间不持有数据库连接，仓储方法各自获取并归还连接。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use refresh_core::{
    config::{ExecutionConfig, WorkerConfig},
    models::{ActingUser, DataSource, ExecutionJob, JobRecord, JobStatus, NewQueryResult, Principal},
    parameters::apply_parameters,
    traits::{AlertEvaluator, DataSourceRepository, QueryRepository, ResultStore, UserRepository},
    RefreshError, RefreshResult,
};
use refresh_infrastructure::{
    FailureTracker, JobLock, JobRegistry, MetricsCollector, ScheduledExecutionTracker,
    StructuredLogger,
};

use crate::runners::QueryRunnerRegistry;

/// 执行器依赖的仓储
#[derive(Clone)]
pub struct ExecutorRepositories {
    pub queries: Arc<dyn QueryRepository>,
    pub data_sources: Arc<dyn DataSourceRepository>,
    pub users: Arc<dyn UserRepository>,
    pub results: Arc<dyn ResultStore>,
}

impl ExecutorRepositories {
    /// 同一个对象实现了全部仓储接口时使用
    pub fn from_shared<T>(db: Arc<T>) -> Self
    where
        T: QueryRepository + DataSourceRepository + UserRepository + ResultStore + 'static,
    {
        Self {
            queries: db.clone(),
            data_sources: db.clone(),
            users: db.clone(),
            results: db,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub worker_id: String,
    pub annotate_queries: bool,
    pub cancel_check_interval: Duration,
}

impl ExecutorSettings {
    pub fn from_config(worker_id: &str, execution: &ExecutionConfig, worker: &WorkerConfig) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            annotate_queries: execution.annotate_queries,
            cancel_check_interval: Duration::from_millis(worker.cancel_check_interval_ms),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            annotate_queries: true,
            cancel_check_interval: Duration::from_secs(1),
        }
    }
}

/// 作业的结束方式，失败以错误返回
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Finished {
        query_result_id: i64,
        updated_query_ids: Vec<i64>,
    },
    Cancelled,
    /// 记录已不存在或已不处于排队状态
    Skipped,
}

struct RunOutput {
    data: serde_json::Value,
    query_text: String,
    runtime: f64,
}

pub struct QueryExecutor {
    registry: JobRegistry,
    lock: JobLock,
    tracker: ScheduledExecutionTracker,
    repositories: ExecutorRepositories,
    runners: Arc<QueryRunnerRegistry>,
    failures: Arc<FailureTracker>,
    alerts: Arc<dyn AlertEvaluator>,
    settings: ExecutorSettings,
    metrics: MetricsCollector,
}

impl QueryExecutor {
    pub fn new(
        registry: JobRegistry,
        lock: JobLock,
        repositories: ExecutorRepositories,
        runners: Arc<QueryRunnerRegistry>,
        failures: Arc<FailureTracker>,
        alerts: Arc<dyn AlertEvaluator>,
        settings: ExecutorSettings,
    ) -> Self {
        let tracker = ScheduledExecutionTracker::new(registry.store().clone());
        Self {
            registry,
            lock,
            tracker,
            repositories,
            runners,
            failures,
            alerts,
            settings,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// 执行一个出队的作业
    ///
    /// `shutdown` 触发时正在执行的查询按取消处理。
    #[instrument(skip_all, fields(job_id = %record.job.id))]
    pub async fn execute(
        &self,
        record: JobRecord,
        shutdown: &CancellationToken,
    ) -> RefreshResult<ExecutionOutcome> {
        let job_id = record.job.id.clone();
        if record.status != JobStatus::Queued {
            debug!("作业状态为 {}，跳过", record.status.as_str());
            return Ok(ExecutionOutcome::Skipped);
        }

        let Some(current) = self.registry.mark_started(&job_id).await? else {
            warn!("作业 {} 的记录已不存在，跳过", job_id);
            return Ok(ExecutionOutcome::Skipped);
        };
        if current.status != JobStatus::Started {
            info!("作业 {} 已是 {} 状态，跳过", job_id, current.status.as_str());
            return Ok(ExecutionOutcome::Skipped);
        }

        let job = current.job;
        StructuredLogger::log_execution_start(
            &job.id,
            job.metadata.query_id,
            job.data_source_id,
            &self.settings.worker_id,
        );

        let started = Instant::now();
        let cancel = shutdown.child_token();
        let watcher = self.spawn_cancel_watcher(&job.id, cancel.clone());
        let result = self.run(&job, &cancel).await;
        watcher.abort();

        match result {
            Ok(output) => self.complete(&job, output, started).await,
            Err(RefreshError::Cancelled) => self.cancelled(&job, started).await,
            Err(err) => Err(self.fail(&job, err, started).await),
        }
    }

    async fn run(&self, job: &ExecutionJob, cancel: &CancellationToken) -> RefreshResult<RunOutput> {
        let data_source = self
            .repositories
            .data_sources
            .get_by_id(job.data_source_id)
            .await?
            .ok_or_else(|| RefreshError::not_found("数据源", job.data_source_id))?;
        let principal = self.resolve_principal(job, &data_source).await?;

        if let Some(query_id) = job.scheduled_query_id {
            if let Err(e) = self.tracker.update(query_id).await {
                warn!("记录查询 {} 的执行时间失败: {}", query_id, e);
            }
        }

        let query_text = apply_parameters(&job.query_text, &job.parameters)?;
        let runner = self
            .runners
            .create(&data_source.runner_type, &data_source.options)?;
        let limited = runner.apply_auto_limit(&query_text, job.apply_auto_limit);
        let annotated = if self.settings.annotate_queries && runner.should_annotate_query() {
            runner.annotate_query(&limited, &annotation_for(job, &principal))
        } else {
            limited
        };

        let limit = Duration::from_secs(job.time_limit_seconds);
        let started = Instant::now();
        let output = match tokio::time::timeout(
            limit,
            runner.run_query(&annotated, &principal, cancel.clone()),
        )
        .await
        {
            Ok(output) => output,
            Err(_) => {
                cancel.cancel();
                return Err(RefreshError::TimeLimitExceeded {
                    limit_seconds: job.time_limit_seconds,
                });
            }
        };

        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        let output = match output {
            Ok(output) => output,
            Err(RefreshError::Cancelled) => return Err(RefreshError::Cancelled),
            Err(RefreshError::QueryExecution(message)) => {
                return Err(RefreshError::QueryExecution(message))
            }
            Err(other) => return Err(RefreshError::QueryExecution(other.to_string())),
        };

        if let Some(message) = output.error {
            return Err(RefreshError::QueryExecution(message));
        }

        Ok(RunOutput {
            data: output.data.unwrap_or(serde_json::Value::Null),
            query_text,
            runtime: started.elapsed().as_secs_f64(),
        })
    }

    async fn resolve_principal(
        &self,
        job: &ExecutionJob,
        data_source: &DataSource,
    ) -> RefreshResult<Principal> {
        match &job.acting_user {
            ActingUser::User(user_id) => self
                .repositories
                .users
                .get_by_id(*user_id)
                .await?
                .map(Principal::User)
                .ok_or_else(|| RefreshError::not_found("用户", user_id)),
            ActingUser::ApiKey(api_key) => Ok(Principal::ApiKey {
                api_key: api_key.clone(),
                org_id: job.metadata.org_id,
                group_ids: data_source.group_ids.clone(),
            }),
            ActingUser::Anonymous => Ok(Principal::Anonymous),
        }
    }

    fn spawn_cancel_watcher(&self, job_id: &str, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let job_id = job_id.to_string();
        let interval = self.settings.cancel_check_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                match registry.is_cancel_requested(&job_id).await {
                    Ok(true) => {
                        info!("作业 {} 收到取消请求，中断执行", job_id);
                        cancel.cancel();
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("检查作业 {} 的取消请求失败: {}", job_id, e),
                }
            }
        })
    }

    async fn complete(
        &self,
        job: &ExecutionJob,
        output: RunOutput,
        started: Instant,
    ) -> RefreshResult<ExecutionOutcome> {
        let new_result = NewQueryResult {
            org_id: job.metadata.org_id,
            data_source_id: job.data_source_id,
            query_hash: job.query_hash.clone(),
            query_text: output.query_text,
            data: output.data,
            runtime: output.runtime,
            retrieved_at: Utc::now(),
        };

        let stored = match self
            .repositories
            .results
            .store_result(new_result, job.scheduled_query_id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => return Err(self.fail(job, e, started).await),
        };

        if let Err(e) = self.registry.mark_finished(&job.id, stored.result.id).await {
            error!("更新作业 {} 为完成状态失败: {}", job.id, e);
        }
        self.release_lock(job).await;

        for query_id in &stored.updated_query_ids {
            if let Err(e) = self.alerts.check_alerts_for_query(*query_id).await {
                warn!("查询 {} 的告警评估请求失败: {}", query_id, e);
            }
        }

        StructuredLogger::log_execution_finished(
            &job.id,
            stored.result.id,
            stored.updated_query_ids.len(),
            stored.result.runtime,
        );
        self.metrics
            .record_execution("finished", started.elapsed().as_secs_f64());

        Ok(ExecutionOutcome::Finished {
            query_result_id: stored.result.id,
            updated_query_ids: stored.updated_query_ids,
        })
    }

    /// 记录失败并返回原始错误
    async fn fail(&self, job: &ExecutionJob, err: RefreshError, started: Instant) -> RefreshError {
        let message = err.to_string();
        let elapsed = started.elapsed();

        if let Some(query_id) = job.scheduled_query_id {
            if counts_as_failure(&err) {
                self.track_scheduled_failure(query_id, &message).await;
            }
        }

        if let Err(e) = self.registry.mark_failed(&job.id, &message).await {
            error!("更新作业 {} 为失败状态失败: {}", job.id, e);
        }
        self.release_lock(job).await;

        StructuredLogger::log_execution_failed(
            &job.id,
            job.metadata.query_id,
            &message,
            elapsed.as_millis() as u64,
        );
        let outcome = if matches!(err, RefreshError::TimeLimitExceeded { .. }) {
            "timeout"
        } else {
            "failed"
        };
        self.metrics.record_execution(outcome, elapsed.as_secs_f64());

        err
    }

    async fn track_scheduled_failure(&self, query_id: i64, message: &str) {
        let query = match self.repositories.queries.get_by_id(query_id).await {
            Ok(Some(query)) => query,
            Ok(None) => {
                warn!("定时查询 {} 已不存在，不记录失败", query_id);
                return;
            }
            Err(e) => {
                error!("加载定时查询 {} 失败: {}", query_id, e);
                return;
            }
        };
        if let Err(e) = self.failures.track_failure(&query, message).await {
            error!("记录查询 {} 的失败次数失败: {}", query_id, e);
        }
    }

    async fn cancelled(&self, job: &ExecutionJob, started: Instant) -> RefreshResult<ExecutionOutcome> {
        if let Err(e) = self.registry.mark_cancelled(&job.id).await {
            error!("更新作业 {} 为取消状态失败: {}", job.id, e);
        }
        self.release_lock(job).await;
        if let Err(e) = self.registry.clear_cancel_request(&job.id).await {
            warn!("清除作业 {} 的取消请求失败: {}", job.id, e);
        }

        StructuredLogger::log_execution_cancelled(&job.id, job.metadata.query_id);
        self.metrics
            .record_execution("cancelled", started.elapsed().as_secs_f64());
        Ok(ExecutionOutcome::Cancelled)
    }

    async fn release_lock(&self, job: &ExecutionJob) {
        if let Err(e) = self
            .lock
            .release(job.data_source_id, &job.query_hash, &job.id)
            .await
        {
            error!("释放作业 {} 的锁失败: {}", job.id, e);
        }
    }
}

/// 共享存储或数据库的故障不计入查询的失败次数
fn counts_as_failure(err: &RefreshError) -> bool {
    !matches!(err, RefreshError::Cancelled) && !err.is_retryable()
}

fn annotation_for(job: &ExecutionJob, principal: &Principal) -> Vec<(String, String)> {
    let username = job
        .metadata
        .username
        .clone()
        .unwrap_or_else(|| principal.display_name());
    let query_id = job
        .metadata
        .query_id
        .map_or_else(|| "adhoc".to_string(), |id| id.to_string());

    vec![
        ("Username".to_string(), username),
        ("query_id".to_string(), query_id),
        ("Job ID".to_string(), job.id.clone()),
        ("Query Hash".to_string(), job.query_hash.clone()),
        ("Queue".to_string(), job.metadata.queue.clone()),
        ("Scheduled".to_string(), job.metadata.scheduled.to_string()),
    ]
}
