//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! 1. 编译期默认值
//! 2. TOML 配置文件
//! 3. `REFRESH__` 前缀的环境变量
//!
//! 加载完成后逐节校验，并检查作业过期时间大于最大执行时限。

pub mod models;

pub use models::{
    AppConfig, DatabaseConfig, ExecutionConfig, FailureReportsConfig, ObservabilityConfig,
    OrgTimeLimit, RedisConfig, SchedulerConfig, SharedStoreBackend, SharedStoreConfig, WorkerConfig,
};
