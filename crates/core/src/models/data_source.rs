use serde::{Deserialize, Serialize};

/// 数据源
///
/// 由外部管理，刷新流水线只读取其状态与执行器类型。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    /// 查询执行器类型，对应执行器注册表中的键
    pub runner_type: String,
    pub options: serde_json::Value,
    pub queue_name: String,
    pub scheduled_queue_name: String,
    pub paused: bool,
    pub pause_reason: Option<String>,
    /// 有权访问此数据源的用户组
    pub group_ids: Vec<i64>,
}

impl DataSource {
    /// 定时刷新与临时查询分别使用不同的队列
    pub fn queue_for(&self, scheduled: bool) -> &str {
        if scheduled {
            &self.scheduled_queue_name
        } else {
            &self.queue_name
        }
    }
}
