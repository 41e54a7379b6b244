use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use refresh_core::{
    models::{
        ActingUser, DataSource, ExecutionJob, JobHandle, JobMetadata, JobRecord, JobStatus, Query,
        QueryResult,
    },
    retry_on_conflict,
    traits::{ResultStore, TimeLimitPolicy},
    CasOutcome, QueryHasher, RefreshError, RefreshResult,
};
use refresh_infrastructure::{
    coordination::LockAttempt, JobLock, JobRegistry, MetricsCollector, StructuredLogger,
};

/// 一次分发请求
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub query_text: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub apply_auto_limit: bool,
    pub acting_user: ActingUser,
    pub username: Option<String>,
    /// 由调度器发起时为对应的查询ID
    pub scheduled_query_id: Option<i64>,
    pub query_id: Option<i64>,
}

impl EnqueueRequest {
    pub fn adhoc(query_text: impl Into<String>, acting_user: ActingUser) -> Self {
        Self {
            query_text: query_text.into(),
            parameters: BTreeMap::new(),
            apply_auto_limit: false,
            acting_user,
            username: None,
            scheduled_query_id: None,
            query_id: None,
        }
    }

    /// 定时刷新，以查询所有者的身份执行
    pub fn scheduled(query: &Query) -> Self {
        Self {
            query_text: query.query_text.clone(),
            parameters: query.options.parameters.clone(),
            apply_auto_limit: query.options.apply_auto_limit,
            acting_user: ActingUser::User(query.user_id),
            username: None,
            scheduled_query_id: Some(query.id),
            query_id: Some(query.id),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_auto_limit(mut self, apply_auto_limit: bool) -> Self {
        self.apply_auto_limit = apply_auto_limit;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn for_query(mut self, query_id: i64) -> Self {
        self.query_id = Some(query_id);
        self
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_query_id.is_some()
    }

    pub fn query_hash(&self) -> String {
        QueryHasher::hash(&self.query_text, &self.parameters, self.apply_auto_limit)
    }
}

/// 临时查询对缓存结果的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// 总是重新执行
    Bypass,
    /// 接受不早于该时长的结果
    MaxAge(Duration),
    /// 接受任意时间的结果
    Any,
}

#[derive(Debug, Clone)]
pub enum AdhocOutcome {
    Cached(QueryResult),
    Enqueued(JobHandle),
}

/// 查询执行作业的分发
///
/// 以 (数据源, 指纹) 去重：已有未结束的作业时加入该作业，否则创建新作业并入队。
pub struct Dispatcher {
    registry: JobRegistry,
    lock: JobLock,
    results: Arc<dyn ResultStore>,
    time_limits: Arc<dyn TimeLimitPolicy>,
    lock_attempts: u32,
    metrics: MetricsCollector,
}

enum Attempt {
    Joined(String),
    Created(String),
}

impl Dispatcher {
    pub fn new(
        registry: JobRegistry,
        lock: JobLock,
        results: Arc<dyn ResultStore>,
        time_limits: Arc<dyn TimeLimitPolicy>,
        lock_attempts: u32,
    ) -> Self {
        Self {
            registry,
            lock,
            results,
            time_limits,
            lock_attempts,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// 分发一次查询执行
    ///
    /// 返回新作业或已有作业的句柄；乐观锁重试耗尽时记录日志并返回 `None`，
    /// 查询留待下一轮。
    #[instrument(skip(self, request, data_source), fields(data_source_id = data_source.id))]
    pub async fn enqueue_query(
        &self,
        request: &EnqueueRequest,
        data_source: &DataSource,
    ) -> RefreshResult<Option<JobHandle>> {
        let query_hash = request.query_hash();
        let scheduled = request.is_scheduled();
        let queue_name = data_source.queue_for(scheduled).to_string();
        let time_limit = self.time_limits.query_time_limit(
            scheduled,
            request.acting_user.user_id(),
            data_source.org_id,
        );

        let outcome = retry_on_conflict(self.lock_attempts, |attempt| {
            let job = ExecutionJob {
                id: Uuid::new_v4().to_string(),
                query_text: request.query_text.clone(),
                query_hash: query_hash.clone(),
                parameters: request.parameters.clone(),
                apply_auto_limit: request.apply_auto_limit,
                data_source_id: data_source.id,
                acting_user: request.acting_user.clone(),
                scheduled_query_id: request.scheduled_query_id,
                time_limit_seconds: time_limit.as_secs(),
                metadata: JobMetadata {
                    org_id: data_source.org_id,
                    data_source_id: data_source.id,
                    enqueued_at: Utc::now(),
                    scheduled,
                    query_id: request.query_id,
                    user_id: request.acting_user.user_id(),
                    username: request.username.clone(),
                    queue: queue_name.clone(),
                },
            };
            debug!("第 {} 次尝试分发作业 {}", attempt, job.id);
            self.try_dispatch(JobRecord::new(job))
        })
        .await?;

        let (job_id, joined_existing) = match outcome {
            Some(Attempt::Joined(job_id)) => (job_id, true),
            Some(Attempt::Created(job_id)) => (job_id, false),
            None => {
                StructuredLogger::log_dispatch_conflict(
                    data_source.id,
                    &query_hash,
                    self.lock_attempts,
                );
                self.metrics.record_dispatch_conflict();
                return Ok(None);
            }
        };

        let queue_name = if joined_existing {
            match self.registry.get(&job_id).await? {
                Some(existing) => existing.job.metadata.queue,
                None => queue_name,
            }
        } else {
            queue_name
        };

        StructuredLogger::log_query_enqueued(
            &job_id,
            data_source.id,
            &query_hash,
            &queue_name,
            request.query_id,
            joined_existing,
        );
        self.metrics.record_enqueue(joined_existing);

        Ok(Some(JobHandle {
            job_id,
            queue_name,
            joined_existing,
        }))
    }

    /// 一次分发尝试
    ///
    /// 作业记录先于锁写入，锁所指的作业在任何时刻都可以被读到。
    /// 没有拿到锁时删除本次写入的记录。
    async fn try_dispatch(&self, record: JobRecord) -> RefreshResult<CasOutcome<Attempt>> {
        let job_id = record.job.id.clone();
        let data_source_id = record.job.data_source_id;
        let query_hash = record.job.query_hash.clone();
        let queue_name = record.job.metadata.queue.clone();

        self.registry.create(&record).await?;

        let attempt = match self
            .lock
            .try_acquire(data_source_id, &query_hash, &job_id)
            .await
        {
            Ok(attempt) => attempt,
            Err(e) => {
                self.discard(&job_id).await;
                return Err(e);
            }
        };

        match attempt {
            CasOutcome::Done(LockAttempt::Existing(existing)) => {
                self.discard(&job_id).await;
                Ok(CasOutcome::Done(Attempt::Joined(existing)))
            }
            CasOutcome::Done(LockAttempt::Acquired) => {
                if let Err(e) = self.registry.enqueue(&queue_name, &job_id).await {
                    if let Err(release_err) =
                        self.lock.release(data_source_id, &query_hash, &job_id).await
                    {
                        warn!("入队失败后释放锁出错: {}", release_err);
                    }
                    self.discard(&job_id).await;
                    return Err(e);
                }
                Ok(CasOutcome::Done(Attempt::Created(job_id)))
            }
            CasOutcome::Conflict => {
                self.discard(&job_id).await;
                Ok(CasOutcome::Conflict)
            }
        }
    }

    async fn discard(&self, job_id: &str) {
        if let Err(e) = self.registry.discard(job_id).await {
            warn!("删除未使用的作业记录 {} 失败: {}", job_id, e);
        }
    }

    /// 执行临时查询，按缓存策略优先返回已有结果
    #[instrument(skip(self, request, data_source), fields(data_source_id = data_source.id))]
    pub async fn run_adhoc(
        &self,
        request: &EnqueueRequest,
        data_source: &DataSource,
        cache: CachePolicy,
    ) -> RefreshResult<AdhocOutcome> {
        let max_age = match cache {
            CachePolicy::Bypass => None,
            CachePolicy::MaxAge(age) => Some(Some(age)),
            CachePolicy::Any => Some(None),
        };

        if let Some(max_age) = max_age {
            let query_hash = request.query_hash();
            if let Some(result) = self
                .results
                .get_latest(data_source.id, &query_hash, max_age)
                .await?
            {
                debug!("命中缓存结果 {}", result.id);
                return Ok(AdhocOutcome::Cached(result));
            }
        }

        match self.enqueue_query(request, data_source).await? {
            Some(handle) => Ok(AdhocOutcome::Enqueued(handle)),
            None => Err(RefreshError::TransientDispatchConflict {
                data_source_id: data_source.id,
                query_hash: request.query_hash(),
            }),
        }
    }

    /// 取消作业
    ///
    /// 排队中的作业直接标记为已取消并释放锁；执行中的作业写入取消请求，
    /// 由执行它的Worker转为执行器取消。返回处理后的作业状态。
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: &str) -> RefreshResult<JobStatus> {
        let record = self
            .registry
            .transition(job_id, |record| {
                if record.status != JobStatus::Queued {
                    return false;
                }
                record.update_status(JobStatus::Cancelled);
                true
            })
            .await?
            .ok_or_else(|| RefreshError::not_found("作业", job_id))?;

        match record.status {
            JobStatus::Cancelled => {
                self.lock
                    .release(record.job.data_source_id, &record.job.query_hash, job_id)
                    .await?;
                info!("排队中的作业 {} 已取消", job_id);
            }
            JobStatus::Started => {
                self.registry.request_cancel(job_id).await?;
                info!("已请求取消执行中的作业 {}", job_id);
            }
            status => debug!("作业 {} 已结束 ({})，忽略取消", job_id, status.as_str()),
        }

        Ok(record.status)
    }

    pub async fn job_status(&self, job_id: &str) -> RefreshResult<Option<JobRecord>> {
        self.registry.get(job_id).await
    }
}
