pub mod coordination;
pub mod database;
pub mod observability;
pub mod reporting;
pub mod shared_store;
pub mod time_limit;

pub use coordination::{JobLock, JobRegistry, ScheduledExecutionTracker};
pub use observability::{MetricsCollector, StructuredLogger};
pub use reporting::{FailureTracker, StoreAlertEvaluator, StoreNotifier};
pub use shared_store::{create_shared_store, InMemorySharedStore, RedisSharedStore};
pub use time_limit::StaticTimeLimitPolicy;
