//! PostgreSQL 持久化实现
//!
//! 只读写刷新流水线用到的列。每个方法自行从连接池取连接，
//! 结果写入与扇出更新在同一事务内完成。

pub mod accounts;
pub mod queries;
pub mod results;

pub use accounts::{PostgresDataSourceRepository, PostgresOrganizationRepository, PostgresUserRepository};
pub use queries::PostgresQueryRepository;
pub use results::PostgresResultStore;
