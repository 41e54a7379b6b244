//! Observability module
//!
//! - `MetricsCollector` - 刷新流水线的计数器、仪表与直方图
//! - `StructuredLogger` - 每类流水线事件一个结构化日志函数
//! - `telemetry` - 日志订阅器与 Prometheus 导出器初始化

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
pub use telemetry::{init_metrics, init_structured_logging, LogFormat, LoggingConfig};
