use std::time::Duration;

use async_trait::async_trait;

use crate::{models::FailureDigest, RefreshResult};

/// 告警评估入口，成功写入结果后按查询ID调用
#[async_trait]
pub trait AlertEvaluator: Send + Sync {
    async fn check_alerts_for_query(&self, query_id: i64) -> RefreshResult<()>;
}

/// 失败摘要的投递通道
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_digest(&self, digest: &FailureDigest) -> RefreshResult<()>;
}

/// 查询执行时间上限
///
/// 在分发时调用一次，结果随作业保存。
pub trait TimeLimitPolicy: Send + Sync {
    fn query_time_limit(&self, scheduled: bool, user_id: Option<i64>, org_id: i64) -> Duration;
}
