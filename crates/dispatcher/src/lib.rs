//! 定时刷新与作业分发
//!
//! - `schedule_policy` - 到期判断与失败退避
//! - `outdated_finder` - 每轮扫描找出到期的定时查询
//! - `enqueue` - 按查询指纹去重的作业分发、临时查询与取消
//! - `refresh` - 刷新轮次与过期调度清理
//! - `maintenance` - 残留锁与旧结果清理

pub mod enqueue;
pub mod maintenance;
pub mod outdated_finder;
pub mod refresh;
pub mod schedule_policy;

pub use enqueue::{AdhocOutcome, CachePolicy, Dispatcher, EnqueueRequest};
pub use maintenance::MaintenanceService;
pub use outdated_finder::{OutdatedQuery, OutdatedQueryFinder};
pub use refresh::{RefreshService, RefreshSummary, STATUS_KEY};
pub use schedule_policy::{should_schedule_next, ScheduleSpec, SchedulePolicyError};
