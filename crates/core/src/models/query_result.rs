use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 查询结果，仅由执行器在成功时创建，之后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub id: i64,
    pub org_id: i64,
    pub data_source_id: i64,
    pub query_hash: String,
    pub query_text: String,
    pub data: serde_json::Value,
    /// 运行耗时（秒）
    pub runtime: f64,
    pub retrieved_at: DateTime<Utc>,
}

/// 待持久化的查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueryResult {
    pub org_id: i64,
    pub data_source_id: i64,
    pub query_hash: String,
    pub query_text: String,
    pub data: serde_json::Value,
    pub runtime: f64,
    pub retrieved_at: DateTime<Utc>,
}

/// 一次结果写入及扇出更新的结果
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub result: QueryResult,
    /// 被指向新结果的全部查询ID
    pub updated_query_ids: Vec<i64>,
}

impl NewQueryResult {
    pub fn into_result(self, id: i64) -> QueryResult {
        QueryResult {
            id,
            org_id: self.org_id,
            data_source_id: self.data_source_id,
            query_hash: self.query_hash,
            query_text: self.query_text,
            data: self.data,
            runtime: self.runtime,
            retrieved_at: self.retrieved_at,
        }
    }
}
