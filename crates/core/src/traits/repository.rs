//! 数据仓储层接口定义
//!
//! 刷新流水线只依赖关系型存储中的少量字段：
//! - `QueryRepository` - 调度配置与失败计数
//! - `DataSourceRepository` / `OrganizationRepository` / `UserRepository` - 只读查找
//! - `ResultStore` - 查询结果的写入、扇出更新与按时效查找
//!
//! 所有实现都必须 `Send + Sync`，每个方法自行获取并归还数据库连接，
//! 调用方不会跨越远程查询的等待期持有连接。

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    models::{DataSource, NewQueryResult, Organization, Query, QueryResult, StoredResult, User},
    RefreshResult,
};

#[async_trait]
pub trait QueryRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Query>>;

    /// 设置了调度且未归档的查询，按ID排序
    async fn get_scheduled(&self) -> RefreshResult<Vec<Query>>;

    /// 调度截止日期早于 `today` 的查询
    async fn get_past_scheduled(&self, today: NaiveDate) -> RefreshResult<Vec<Query>>;

    /// 清除调度（置为空），不可自动恢复
    async fn clear_schedule(&self, id: i64) -> RefreshResult<()>;

    /// 将调度标记为停用
    async fn disable_schedule(&self, id: i64) -> RefreshResult<()>;

    /// 失败计数加一，返回新的计数
    async fn increment_schedule_failures(&self, id: i64) -> RefreshResult<i32>;
}

#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<DataSource>>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Organization>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<User>>;
}

/// 查询结果存储
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 在同一事务内写入结果并完成扇出更新
    ///
    /// 1. 插入新结果
    /// 2. `reset_failures_for` 不为空时将该查询的失败计数归零
    /// 3. 将同一 (数据源, 指纹) 的全部查询指向新结果
    ///
    /// 提交之前外部看不到任何部分更新。
    async fn store_result(
        &self,
        result: NewQueryResult,
        reset_failures_for: Option<i64>,
    ) -> RefreshResult<StoredResult>;

    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<QueryResult>>;

    /// 最新结果；`max_age` 为空时不限时效
    async fn get_latest(
        &self,
        data_source_id: i64,
        query_hash: &str,
        max_age: Option<Duration>,
    ) -> RefreshResult<Option<QueryResult>>;

    /// 删除早于 `older_than` 且没有任何查询引用的结果，最多 `limit` 条
    async fn delete_unused(&self, older_than: DateTime<Utc>, limit: i64) -> RefreshResult<u64>;
}
