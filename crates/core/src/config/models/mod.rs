pub mod app_config;
pub mod database;
pub mod execution;
pub mod failure_reports;
pub mod observability;
pub mod scheduler_worker;
pub mod shared_store;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use execution::{ExecutionConfig, OrgTimeLimit};
pub use failure_reports::FailureReportsConfig;
pub use observability::ObservabilityConfig;
pub use scheduler_worker::{SchedulerConfig, WorkerConfig};
pub use shared_store::{RedisConfig, SharedStoreBackend, SharedStoreConfig};
