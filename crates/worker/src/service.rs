use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use refresh_core::{config::WorkerConfig, RefreshError, RefreshResult};

use crate::executor::{ExecutionOutcome, QueryExecutor};

/// Worker服务
///
/// 按优先级顺序轮询队列，同时执行的作业数受信号量限制。
/// 停止信号到达后不再出队，并等待执行中的作业以取消状态结束。
pub struct WorkerService {
    worker_id: String,
    queues: Vec<String>,
    executor: Arc<QueryExecutor>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    poll_interval: Duration,
}

impl WorkerService {
    pub fn new(worker_id: String, executor: Arc<QueryExecutor>, config: &WorkerConfig) -> Self {
        Self {
            worker_id,
            queues: config.queues.clone(),
            executor,
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            capacity: config.concurrency,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// 当前执行中的作业数
    pub fn running_jobs(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// 出队并在当前任务中执行一个作业，队列为空时返回 `None`
    pub async fn process_next(
        &self,
        shutdown: &CancellationToken,
    ) -> RefreshResult<Option<ExecutionOutcome>> {
        let Some((queue, record)) = self.executor.registry().dequeue(&self.queues).await? else {
            return Ok(None);
        };
        debug!("从队列 {} 取得作业 {}", queue, record.job.id);
        self.executor.execute(record, shutdown).await.map(Some)
    }

    /// 运行直到 `shutdown` 触发
    pub async fn run(&self, shutdown: CancellationToken) -> RefreshResult<()> {
        info!(
            "Worker {} 启动，队列: {:?}，并发: {}",
            self.worker_id,
            self.queues,
            self.capacity
        );
        let mut running = JoinSet::new();

        loop {
            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    error!("作业任务异常退出: {}", e);
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => permit
                    .map_err(|e| RefreshError::Internal(format!("Worker信号量已关闭: {e}")))?,
            };

            let next = match self.executor.registry().dequeue(&self.queues).await {
                Ok(next) => next,
                Err(e) => {
                    error!("出队失败: {}", e);
                    None
                }
            };

            let Some((queue, record)) = next else {
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                continue;
            };

            debug!("从队列 {} 取得作业 {}", queue, record.job.id);
            let executor = self.executor.clone();
            let token = shutdown.clone();
            running.spawn(async move {
                let _permit = permit;
                let job_id = record.job.id.clone();
                match executor.execute(record, &token).await {
                    Ok(ExecutionOutcome::Finished { query_result_id, .. }) => {
                        debug!("作业 {} 完成，结果 {}", job_id, query_result_id);
                    }
                    Ok(ExecutionOutcome::Cancelled) => debug!("作业 {} 已取消", job_id),
                    Ok(ExecutionOutcome::Skipped) => {}
                    Err(e) => warn!("作业 {} 失败: {}", job_id, e),
                }
            });
        }

        info!(
            "Worker {} 停止出队，等待 {} 个执行中的作业",
            self.worker_id,
            running.len()
        );
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!("作业任务异常退出: {}", e);
            }
        }
        info!("Worker {} 已停止", self.worker_id);
        Ok(())
    }
}
