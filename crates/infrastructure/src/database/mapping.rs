//! 行映射辅助函数
//!
//! 调度配置与查询选项以 JSON 列保存，历史数据中的 `interval` 可能是字符串。

use refresh_core::models::{QueryOptions, Schedule};
use serde_json::Value;
use tracing::warn;

pub struct MappingHelpers;

impl MappingHelpers {
    /// 解析调度列
    ///
    /// 无法解析的调度不会让整行读取失败，而是返回一个没有间隔的调度，
    /// 在到期判断时作为异常调度被停用。
    pub fn parse_schedule(query_id: i64, value: Option<Value>) -> Option<Schedule> {
        let mut value = match value {
            None | Some(Value::Null) => return None,
            Some(value) => value,
        };

        if let Some(interval) = value.get("interval").and_then(Value::as_str) {
            let parsed = interval.trim().parse::<i64>().ok();
            value["interval"] = parsed.map(Value::from).unwrap_or(Value::Null);
        }

        match serde_json::from_value::<Schedule>(value) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                warn!("查询 {} 的调度配置无法解析: {}", query_id, e);
                Some(Schedule::default())
            }
        }
    }

    pub fn parse_options(query_id: i64, value: Option<Value>) -> QueryOptions {
        let Some(value) = value else {
            return QueryOptions::default();
        };
        // 参数在存储中是 [{"name": .., "value": ..}] 列表
        let parameters = value
            .get("parameters")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|p| {
                        let name = p.get("name")?.as_str()?.to_string();
                        Some((name, p.get("value").cloned().unwrap_or(Value::Null)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let apply_auto_limit = value
            .get("apply_auto_limit")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| {
                if value.get("apply_auto_limit").is_some() {
                    warn!("查询 {} 的 apply_auto_limit 不是布尔值", query_id);
                }
                false
            });

        QueryOptions {
            parameters,
            apply_auto_limit,
        }
    }
}
