//! 跨进程协调组件
//!
//! 全部建立在 `SharedStore` 之上：
//! - `JobLock` - 每个 (数据源, 指纹) 同一时间最多一个未结束作业
//! - `JobRegistry` - 作业记录、工作队列与取消请求
//! - `ScheduledExecutionTracker` - 定时查询最近一次开始执行的时间

pub mod execution_tracker;
pub mod job_lock;
pub mod job_registry;

pub use execution_tracker::ScheduledExecutionTracker;
pub use job_lock::{lock_key, JobLock, LockAttempt};
pub use job_registry::{cancel_key, job_key, queue_key, JobRegistry};
