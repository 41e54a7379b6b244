//! 查询执行器接口
//!
//! 每种数据源类型对应一个 `QueryRunner` 实现，由 `QueryRunnerFactory`
//! 根据数据源配置创建。执行器必须响应取消令牌，
//! 令牌触发后应尽快放弃远程调用并返回。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{models::Principal, RefreshError, RefreshResult};

/// 执行器返回的原始结果
///
/// `error` 不为空即视为失败，即便同时带有数据。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOutput {
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RunnerOutput {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait QueryRunner: Send + Sync {
    fn runner_type(&self) -> &str;

    async fn run_query(
        &self,
        query: &str,
        principal: &Principal,
        cancel: CancellationToken,
    ) -> RefreshResult<RunnerOutput>;

    /// 是否在查询文本前附加元数据注释
    fn should_annotate_query(&self) -> bool {
        true
    }

    fn supports_auto_limit(&self) -> bool {
        false
    }

    /// 不支持自动LIMIT的执行器原样返回
    fn apply_auto_limit(&self, query: &str, _apply: bool) -> String {
        query.to_string()
    }

    /// 以 `/* k: v, ... */ 查询` 的形式附加元数据
    fn annotate_query(&self, query: &str, metadata: &[(String, String)]) -> String {
        if !self.should_annotate_query() || metadata.is_empty() {
            return query.to_string();
        }
        let annotation = metadata
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!("/* {} */ {}", annotation, query)
    }

    async fn get_schema(&self) -> RefreshResult<serde_json::Value> {
        Err(RefreshError::QueryExecution(format!(
            "执行器 {} 不支持获取Schema",
            self.runner_type()
        )))
    }
}

/// 根据数据源选项创建执行器
pub trait QueryRunnerFactory: Send + Sync {
    fn runner_type(&self) -> &str;

    /// 选项的JSON Schema描述
    fn configuration_schema(&self) -> serde_json::Value;

    fn create(&self, options: &serde_json::Value) -> RefreshResult<Box<dyn QueryRunner>>;
}
