use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::RefreshResult;

/// 跨进程协调用的共享键值存储
///
/// 作业锁、作业记录与队列、执行时间追踪、失败聚合列表和状态哈希都建立在此接口上。
/// 对正确性有影响的写入（锁的获取与释放）必须使用 `compare_and_set`。
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> RefreshResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> RefreshResult<()>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> RefreshResult<bool>;

    /// 条件写
    ///
    /// 仅当当前值等于 `expected`（`None` 表示键不存在）时生效：
    /// `new_value` 为 `Some` 时写入并设置 `ttl`，为 `None` 时删除。
    /// 返回 `false` 表示期间有并发修改，调用方应重新读取后重试。
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: Option<&str>,
        ttl: Option<Duration>,
    ) -> RefreshResult<bool>;

    /// 从列表头部推入
    async fn list_push(&self, key: &str, value: &str) -> RefreshResult<()>;

    /// 从列表尾部弹出，与 `list_push` 组成先进先出队列
    async fn list_pop(&self, key: &str) -> RefreshResult<Option<String>>;

    /// 列表全部元素，头部在前
    async fn list_range(&self, key: &str) -> RefreshResult<Vec<String>>;

    /// 原子地取出列表全部元素并删除列表，头部在前
    async fn list_drain(&self, key: &str) -> RefreshResult<Vec<String>>;

    async fn list_len(&self, key: &str) -> RefreshResult<usize>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> RefreshResult<()>;

    async fn hash_get_all(&self, key: &str) -> RefreshResult<HashMap<String, String>>;

    /// 按前缀匹配键，`pattern` 形如 `"lock:*"`
    async fn scan_keys(&self, pattern: &str) -> RefreshResult<Vec<String>>;

    async fn ping(&self) -> RefreshResult<()>;
}
