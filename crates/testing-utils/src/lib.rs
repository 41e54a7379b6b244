//! # Refresh Testing Utils
//!
//! 测试共用的内存实现与数据构造器：
//!
//! - **MockDatabase**: 在一把锁内实现全部仓储接口，结果写入与扇出天然原子
//! - **MockQueryRunner**: 可配置成功、失败、延迟或一直挂起直到取消
//! - **RecordingAlertEvaluator / RecordingNotifier**: 记录调用以便断言
//! - **Builders**: 带合理默认值的查询、数据源、用户、组织构造器

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
