use serde::{Deserialize, Serialize};

/// 推入用户聚合列表的单条失败记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub id: i64,
    pub name: String,
    pub message: String,
    pub schedule_failures: i32,
    pub failed_at: String,
}

/// 摘要中的一行，同一 (查询ID, 错误信息) 只出现一次
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestEntry {
    pub query_id: i64,
    pub name: String,
    pub failed_at: String,
    pub failure_reason: String,
    pub failure_count: usize,
    pub comment: Option<String>,
}

/// 发给单个用户的失败摘要通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDigest {
    pub user_id: i64,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub failures: Vec<DigestEntry>,
}
