use thiserror::Error;

/// 刷新流水线错误类型定义
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("共享存储错误: {0}")]
    SharedStore(String),

    #[error("乐观锁重试耗尽: data_source={data_source_id}, query_hash={query_hash}")]
    TransientDispatchConflict {
        data_source_id: i64,
        query_hash: String,
    },

    #[error("查询执行失败: {0}")]
    QueryExecution(String),

    #[error("{}", TIME_LIMIT_MESSAGE)]
    TimeLimitExceeded { limit_seconds: u64 },

    #[error("查询执行已取消")]
    Cancelled,

    #[error("无法计算查询 {query_id} 的调度: {reason}")]
    ScheduleEvaluation { query_id: i64, reason: String },

    #[error("查询参数无效: {0}")]
    InvalidParameters(String),

    #[error("{entity}未找到: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("未注册的查询执行器类型: {0}")]
    UnknownRunner(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 超时失败的固定提示，与执行器上报的错误区分开
pub const TIME_LIMIT_MESSAGE: &str = "查询执行超过时间限制";

/// 统一的Result类型
pub type RefreshResult<T> = std::result::Result<T, RefreshError>;

impl RefreshError {
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::SharedStore(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 是否计入定时查询的失败次数
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            RefreshError::QueryExecution(_) | RefreshError::TimeLimitExceeded { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RefreshError::SharedStore(_)
                | RefreshError::Database(_)
                | RefreshError::TransientDispatchConflict { .. }
        )
    }
}

impl From<serde_json::Error> for RefreshError {
    fn from(err: serde_json::Error) -> Self {
        RefreshError::Serialization(err.to_string())
    }
}
