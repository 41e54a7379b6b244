//! 失败追踪与对外投递
//!
//! - `FailureTracker` - 失败计数、按用户聚合失败记录、定期发送摘要
//! - `StoreAlertEvaluator` / `StoreNotifier` - 把告警评估请求与摘要通知写入共享存储列表，
//!   由外部消费者处理

pub mod failure_tracker;
pub mod outbox;

pub use failure_tracker::{aggregation_key, FailureTracker};
pub use outbox::{StoreAlertEvaluator, StoreNotifier, ALERTS_OUTBOX_KEY, NOTIFICATIONS_OUTBOX_KEY};
