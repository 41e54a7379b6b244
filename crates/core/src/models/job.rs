use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::principal::ActingUser;

/// 执行作业状态
///
/// `Queued -> Started -> {Finished, Failed}`，任意未结束状态都可能转为 `Cancelled`。
/// `Cancelled` 与 `Failed` 是不同的终态：取消不计入失败次数，也不触发告警。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// 随作业传递的可观测元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetadata {
    pub org_id: i64,
    pub data_source_id: i64,
    pub enqueued_at: DateTime<Utc>,
    pub scheduled: bool,
    pub query_id: Option<i64>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub queue: String,
}

/// 一次查询执行作业
///
/// `time_limit_seconds` 在分发时确定，作业生命周期内不再重新计算。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionJob {
    pub id: String,
    pub query_text: String,
    pub query_hash: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub apply_auto_limit: bool,
    pub data_source_id: i64,
    pub acting_user: ActingUser,
    pub scheduled_query_id: Option<i64>,
    pub time_limit_seconds: u64,
    pub metadata: JobMetadata,
}

/// 共享存储中的作业记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job: ExecutionJob,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub query_result_id: Option<i64>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(job: ExecutionJob) -> Self {
        Self {
            job,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            query_result_id: None,
            error: None,
        }
    }

    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        match status {
            JobStatus::Started => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled => {
                if self.ended_at.is_none() {
                    self.ended_at = Some(Utc::now());
                }
            }
            JobStatus::Queued => {}
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 分发结果句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub queue_name: String,
    /// 是否加入了已在执行中的同指纹作业
    pub joined_existing: bool,
}
