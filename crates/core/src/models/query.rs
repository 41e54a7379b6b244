use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::query_hash::QueryHasher;

/// 定时查询定义
///
/// 只包含刷新流水线读写的字段。`latest_query_data_id` 是对最新结果的弱引用，
/// 仅用于查找，结果本身的生命周期不受查询控制。
///
/// # 字段说明
///
/// - `schedule`: 调度配置，`None` 表示未设置定时刷新
/// - `schedule_failures`: 连续失败次数，任何一次成功都会归零
/// - `options`: 绑定参数与自动LIMIT开关
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub name: String,
    pub query_text: String,
    pub query_hash: String,
    pub data_source_id: Option<i64>,
    pub schedule: Option<Schedule>,
    pub schedule_failures: i32,
    pub latest_query_data_id: Option<i64>,
    pub options: QueryOptions,
    pub is_archived: bool,
    pub updated_at: DateTime<Utc>,
}

/// 调度配置
///
/// - `interval`: 间隔秒数
/// - `until`: 截止日期（含当天之前），过期后调度会被清除
/// - `day_of_week`: 星期名称，如 "Monday"
/// - `time`: "HH:MM" 格式的执行时刻，仅在间隔不小于一天时使用
/// - `disabled`: 调度因异常被停用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Schedule {
    pub interval: Option<i64>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub day_of_week: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryOptions {
    /// 参数名 -> 默认值
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub apply_auto_limit: bool,
}

impl Schedule {
    pub fn every(interval_seconds: i64) -> Self {
        Self {
            interval: Some(interval_seconds),
            ..Default::default()
        }
    }

    /// 截止日期是否已过
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.until.is_some_and(|until| until < today)
    }
}

impl Query {
    /// 按当前文本、参数与自动LIMIT开关重新计算指纹
    pub fn compute_hash(&self) -> String {
        QueryHasher::hash(
            &self.query_text,
            &self.options.parameters,
            self.options.apply_auto_limit,
        )
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn schedule_disabled(&self) -> bool {
        self.schedule.as_ref().is_some_and(|s| s.disabled)
    }
}
