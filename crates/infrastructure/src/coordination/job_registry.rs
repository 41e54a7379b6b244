use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use refresh_core::{
    models::{JobRecord, JobStatus},
    retry_on_conflict,
    traits::SharedStore,
    CasOutcome, RefreshError, RefreshResult, DEFAULT_CAS_ATTEMPTS,
};

pub fn job_key(job_id: &str) -> String {
    format!("job:{}", job_id)
}

pub fn cancel_key(job_id: &str) -> String {
    format!("job:{}:cancel", job_id)
}

pub fn queue_key(queue_name: &str) -> String {
    format!("queue:{}", queue_name)
}

/// 作业记录与工作队列
///
/// 作业记录以JSON保存在 `job:{id}`，未结束时存活 `job_expiry`，
/// 结束后缩短为 `finished_ttl`。队列是先进先出列表，元素为作业ID。
/// 状态变更使用条件写，避免取消请求与Worker的状态写入互相覆盖。
#[derive(Clone)]
pub struct JobRegistry {
    store: Arc<dyn SharedStore>,
    job_expiry: Duration,
    finished_ttl: Duration,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn SharedStore>, job_expiry: Duration, finished_ttl: Duration) -> Self {
        Self {
            store,
            job_expiry,
            finished_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    fn ttl_for(&self, record: &JobRecord) -> Duration {
        if record.is_terminal() {
            self.finished_ttl
        } else {
            self.job_expiry
        }
    }

    pub async fn get(&self, job_id: &str) -> RefreshResult<Option<JobRecord>> {
        match self.store.get(&job_key(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 写入新作业记录，不入队
    pub async fn create(&self, record: &JobRecord) -> RefreshResult<()> {
        let raw = serde_json::to_string(record)?;
        self.store
            .set(&job_key(&record.job.id), &raw, Some(self.ttl_for(record)))
            .await
    }

    /// 删除未入队的作业记录
    pub async fn discard(&self, job_id: &str) -> RefreshResult<()> {
        self.store.delete(&job_key(job_id)).await?;
        Ok(())
    }

    pub async fn enqueue(&self, queue_name: &str, job_id: &str) -> RefreshResult<()> {
        self.store.list_push(&queue_key(queue_name), job_id).await
    }

    pub async fn queue_length(&self, queue_name: &str) -> RefreshResult<usize> {
        self.store.list_len(&queue_key(queue_name)).await
    }

    /// 按顺序轮询队列，返回第一个仍有记录的作业
    ///
    /// 记录已过期的作业ID直接丢弃。
    pub async fn dequeue(&self, queues: &[String]) -> RefreshResult<Option<(String, JobRecord)>> {
        for queue in queues {
            while let Some(job_id) = self.store.list_pop(&queue_key(queue)).await? {
                match self.get(&job_id).await? {
                    Some(record) => return Ok(Some((queue.clone(), record))),
                    None => warn!("队列 {} 中的作业 {} 记录已过期，丢弃", queue, job_id),
                }
            }
        }
        Ok(None)
    }

    /// 以条件写修改作业记录
    ///
    /// `apply` 返回 `false` 表示不需要修改。记录不存在时返回 `None`。
    pub async fn transition<F>(&self, job_id: &str, apply: F) -> RefreshResult<Option<JobRecord>>
    where
        F: Fn(&mut JobRecord) -> bool,
    {
        let key = job_key(job_id);
        let apply = &apply;
        let outcome = retry_on_conflict(DEFAULT_CAS_ATTEMPTS, |_| {
            let key = key.clone();
            async move {
                let Some(raw) = self.store.get(&key).await? else {
                    return Ok(CasOutcome::Done(None));
                };
                let mut record: JobRecord = serde_json::from_str(&raw)?;
                if !apply(&mut record) {
                    return Ok(CasOutcome::Done(Some(record)));
                }
                let updated = serde_json::to_string(&record)?;
                let applied = self
                    .store
                    .compare_and_set(&key, Some(&raw), Some(&updated), Some(self.ttl_for(&record)))
                    .await?;
                if applied {
                    Ok(CasOutcome::Done(Some(record)))
                } else {
                    Ok(CasOutcome::Conflict)
                }
            }
        })
        .await?;

        outcome.ok_or_else(|| RefreshError::store(format!("作业 {} 状态更新冲突次数过多", job_id)))
    }

    /// `Queued -> Started`，已结束的作业保持不变
    pub async fn mark_started(&self, job_id: &str) -> RefreshResult<Option<JobRecord>> {
        self.transition(job_id, |record| {
            if record.status != JobStatus::Queued {
                return false;
            }
            record.update_status(JobStatus::Started);
            true
        })
        .await
    }

    pub async fn mark_finished(&self, job_id: &str, query_result_id: i64) -> RefreshResult<()> {
        self.transition(job_id, |record| {
            record.query_result_id = Some(query_result_id);
            record.error = None;
            record.update_status(JobStatus::Finished);
            true
        })
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, job_id: &str, error: &str) -> RefreshResult<()> {
        self.transition(job_id, |record| {
            record.error = Some(error.to_string());
            record.update_status(JobStatus::Failed);
            true
        })
        .await?;
        Ok(())
    }

    pub async fn mark_cancelled(&self, job_id: &str) -> RefreshResult<()> {
        self.transition(job_id, |record| {
            if record.is_terminal() {
                return false;
            }
            record.update_status(JobStatus::Cancelled);
            true
        })
        .await?;
        Ok(())
    }

    /// 记录取消请求，由执行该作业的Worker轮询
    pub async fn request_cancel(&self, job_id: &str) -> RefreshResult<()> {
        debug!("作业 {} 收到取消请求", job_id);
        self.store
            .set(&cancel_key(job_id), "1", Some(self.job_expiry))
            .await
    }

    pub async fn is_cancel_requested(&self, job_id: &str) -> RefreshResult<bool> {
        Ok(self.store.get(&cancel_key(job_id)).await?.is_some())
    }

    pub async fn clear_cancel_request(&self, job_id: &str) -> RefreshResult<()> {
        self.store.delete(&cancel_key(job_id)).await?;
        Ok(())
    }
}
