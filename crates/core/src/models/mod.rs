//! # 数据模型
//!
//! 刷新流水线读写的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Query - 定时查询
//! 查询文本、调度配置、失败计数以及对最新结果的弱引用。
//!
//! ### DataSource - 数据源
//! 队列名称、暂停状态以及查询执行器类型。
//!
//! ### QueryResult - 查询结果
//! 由执行器在成功时写入，之后不可变，按 (数据源, 指纹, 最大时效) 查找。
//!
//! ### ExecutionJob / JobRecord - 执行作业
//! 只存在于共享存储中的临时记录，从分发到完成为止。
//!
//! 所有时间字段统一使用 `DateTime<Utc>`。

pub mod data_source;
pub mod failure;
pub mod job;
pub mod principal;
pub mod query;
pub mod query_result;

pub use data_source::DataSource;
pub use failure::{DigestEntry, FailureDigest, FailureRecord};
pub use job::{ExecutionJob, JobHandle, JobMetadata, JobRecord, JobStatus};
pub use principal::{ActingUser, Organization, Principal, User};
pub use query::{Query, QueryOptions, Schedule};
pub use query_result::{NewQueryResult, QueryResult, StoredResult};
