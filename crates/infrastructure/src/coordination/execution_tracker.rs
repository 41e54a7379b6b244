use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use refresh_core::{traits::SharedStore, RefreshResult};

pub const EXECUTED_AT_KEY: &str = "sq:executed_at";

/// 定时查询最近一次开始执行的时间
///
/// 以哈希 `sq:executed_at` 保存在共享存储中，值为毫秒时间戳。
/// 每轮扫描前调用 `refresh` 取回快照，扫描期间只读快照；
/// 执行器开始执行定时查询时调用 `update` 直接写入共享存储。
pub struct ScheduledExecutionTracker {
    store: Arc<dyn SharedStore>,
    executions: HashMap<i64, DateTime<Utc>>,
}

impl ScheduledExecutionTracker {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            executions: HashMap::new(),
        }
    }

    pub async fn refresh(&mut self) -> RefreshResult<()> {
        let raw = self.store.hash_get_all(EXECUTED_AT_KEY).await?;
        self.executions = raw
            .into_iter()
            .filter_map(|(id, millis)| {
                let parsed = id
                    .parse::<i64>()
                    .ok()
                    .zip(millis.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis));
                if parsed.is_none() {
                    warn!("忽略无法解析的执行时间记录: {}={}", id, millis);
                }
                parsed
            })
            .collect();
        Ok(())
    }

    pub fn get(&self, query_id: i64) -> Option<DateTime<Utc>> {
        self.executions.get(&query_id).copied()
    }

    pub async fn update(&self, query_id: i64) -> RefreshResult<()> {
        self.update_at(query_id, Utc::now()).await
    }

    pub async fn update_at(&self, query_id: i64, at: DateTime<Utc>) -> RefreshResult<()> {
        self.store
            .hash_set(
                EXECUTED_AT_KEY,
                &[(query_id.to_string(), at.timestamp_millis().to_string())],
            )
            .await
    }
}
