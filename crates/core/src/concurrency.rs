//! 乐观并发的有界重试
//!
//! 与具体存储无关：每次尝试读取当前值并做一次条件写，
//! 条件写因并发修改失败时返回 `CasOutcome::Conflict`，由这里决定是否重试。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::RefreshResult;

/// 默认最大尝试次数
pub const DEFAULT_CAS_ATTEMPTS: u32 = 5;

/// 单次条件写尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<T> {
    Done(T),
    Conflict,
}

/// 反复执行 `attempt` 直到成功或用尽 `max_attempts` 次
///
/// 用尽时返回 `Ok(None)`，由调用方决定如何处理本轮失败；
/// `attempt` 返回的错误立即向上传递，不参与重试。
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut attempt: F) -> RefreshResult<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RefreshResult<CasOutcome<T>>>,
{
    for n in 1..=max_attempts.max(1) {
        match attempt(n).await? {
            CasOutcome::Done(value) => return Ok(Some(value)),
            CasOutcome::Conflict => {
                debug!("条件写冲突，第 {}/{} 次尝试", n, max_attempts);
                if n < max_attempts {
                    let jitter_ms = rand::rng().random_range(1..=10u64);
                    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                }
            }
        }
    }
    Ok(None)
}
