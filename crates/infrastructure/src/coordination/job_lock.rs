use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use refresh_core::{
    retry_on_conflict, traits::SharedStore, CasOutcome, RefreshError, RefreshResult,
    DEFAULT_CAS_ATTEMPTS,
};

use super::job_registry::JobRegistry;

pub const LOCK_PREFIX: &str = "lock:";

pub fn lock_key(data_source_id: i64, query_hash: &str) -> String {
    format!("{}{}:{}", LOCK_PREFIX, data_source_id, query_hash)
}

/// 从锁键中解析 (数据源ID, 指纹)
pub fn parse_lock_key(key: &str) -> Option<(i64, String)> {
    let rest = key.strip_prefix(LOCK_PREFIX)?;
    let (ds, hash) = rest.split_once(':')?;
    Some((ds.parse().ok()?, hash.to_string()))
}

/// 单次获取尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// 已有未结束的作业持有锁
    Existing(String),
    /// 锁已指向新作业
    Acquired,
}

/// 按查询指纹去重的分布式锁
///
/// 锁键的值是持有者的作业ID，过期时间必须大于任何作业的执行时限，
/// 作为执行进程崩溃后的兜底。所有写入都是条件写。
#[derive(Clone)]
pub struct JobLock {
    store: Arc<dyn SharedStore>,
    registry: JobRegistry,
    expiry: Duration,
}

impl JobLock {
    pub fn new(store: Arc<dyn SharedStore>, registry: JobRegistry, expiry: Duration) -> Self {
        Self {
            store,
            registry,
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// 当前持有锁的作业ID
    pub async fn holder(&self, data_source_id: i64, query_hash: &str) -> RefreshResult<Option<String>> {
        self.store.get(&lock_key(data_source_id, query_hash)).await
    }

    /// 一次获取尝试
    ///
    /// 锁存在且所指作业未结束时返回 `Existing`；锁不存在或所指作业已结束（含记录已过期）时，
    /// 以条件写把锁指向 `new_job_id`。条件写失败返回 `Conflict`，由调用方决定是否重试。
    pub async fn try_acquire(
        &self,
        data_source_id: i64,
        query_hash: &str,
        new_job_id: &str,
    ) -> RefreshResult<CasOutcome<LockAttempt>> {
        let key = lock_key(data_source_id, query_hash);
        let current = self.store.get(&key).await?;

        if let Some(job_id) = &current {
            match self.registry.get(job_id).await? {
                Some(record) if !record.is_terminal() => {
                    debug!("作业 {} 仍在进行中，复用", job_id);
                    return Ok(CasOutcome::Done(LockAttempt::Existing(job_id.clone())));
                }
                Some(record) => {
                    debug!("锁 {} 指向已结束的作业 {} ({})", key, job_id, record.status.as_str());
                }
                None => {
                    debug!("锁 {} 指向的作业 {} 已不存在", key, job_id);
                }
            }
        }

        let applied = self
            .store
            .compare_and_set(&key, current.as_deref(), Some(new_job_id), Some(self.expiry))
            .await?;
        if applied {
            Ok(CasOutcome::Done(LockAttempt::Acquired))
        } else {
            Ok(CasOutcome::Conflict)
        }
    }

    /// 获取锁，冲突时有界重试
    ///
    /// 返回已有作业ID，或 `None` 表示锁已指向 `new_job_id`。
    pub async fn acquire(
        &self,
        data_source_id: i64,
        query_hash: &str,
        new_job_id: &str,
    ) -> RefreshResult<Option<String>> {
        let outcome = retry_on_conflict(DEFAULT_CAS_ATTEMPTS, move |_| {
            self.try_acquire(data_source_id, query_hash, new_job_id)
        })
        .await?;

        match outcome {
            Some(LockAttempt::Existing(job_id)) => Ok(Some(job_id)),
            Some(LockAttempt::Acquired) => Ok(None),
            None => Err(RefreshError::TransientDispatchConflict {
                data_source_id,
                query_hash: query_hash.to_string(),
            }),
        }
    }

    /// 释放锁，仅当锁仍指向 `job_id` 时删除
    ///
    /// 锁已过期或已被新作业接管时什么也不做，返回 `false`。
    pub async fn release(
        &self,
        data_source_id: i64,
        query_hash: &str,
        job_id: &str,
    ) -> RefreshResult<bool> {
        let key = lock_key(data_source_id, query_hash);
        let released = self
            .store
            .compare_and_set(&key, Some(job_id), None, None)
            .await?;
        if !released {
            warn!("锁 {} 已不属于作业 {}，跳过释放", key, job_id);
        }
        Ok(released)
    }

    /// 清理残留锁
    ///
    /// 删除所指作业记录已不存在或已结束的锁键，返回删除数量。
    /// 删除是以当前值为条件的，扫描期间被新作业接管的锁不受影响。
    pub async fn remove_ghost_locks(&self) -> RefreshResult<usize> {
        let keys = self.store.scan_keys(&format!("{}*", LOCK_PREFIX)).await?;
        let mut removed = 0;

        for key in keys {
            let Some(job_id) = self.store.get(&key).await? else {
                continue;
            };
            let alive = self
                .registry
                .get(&job_id)
                .await?
                .is_some_and(|record| !record.is_terminal());
            if alive {
                continue;
            }
            if self
                .store
                .compare_and_set(&key, Some(&job_id), None, None)
                .await?
            {
                debug!("删除残留锁 {} (作业 {})", key, job_id);
                removed += 1;
            }
        }

        Ok(removed)
    }
}
