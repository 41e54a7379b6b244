//! 查询执行器注册表与内置的 `url` 执行器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use refresh_core::{
    models::Principal,
    traits::{QueryRunner, QueryRunnerFactory, RunnerOutput},
    RefreshError, RefreshResult,
};

/// 执行器类型到工厂的映射，进程启动时构建
#[derive(Clone, Default)]
pub struct QueryRunnerRegistry {
    factories: HashMap<String, Arc<dyn QueryRunnerFactory>>,
}

impl QueryRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含全部内置执行器
    pub fn with_builtin_runners() -> Self {
        Self::new().register(Arc::new(UrlRunnerFactory::new()))
    }

    /// 注册执行器工厂，同类型的旧工厂会被替换
    pub fn register(mut self, factory: Arc<dyn QueryRunnerFactory>) -> Self {
        let runner_type = factory.runner_type().to_string();
        info!("注册查询执行器: {}", runner_type);
        self.factories.insert(runner_type, factory);
        self
    }

    pub fn contains(&self, runner_type: &str) -> bool {
        self.factories.contains_key(runner_type)
    }

    /// 已注册的类型，按名称排序
    pub fn runner_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn configuration_schema(&self, runner_type: &str) -> RefreshResult<serde_json::Value> {
        self.factory(runner_type)
            .map(|factory| factory.configuration_schema())
    }

    /// 按数据源选项创建执行器
    pub fn create(
        &self,
        runner_type: &str,
        options: &serde_json::Value,
    ) -> RefreshResult<Box<dyn QueryRunner>> {
        self.factory(runner_type)?.create(options)
    }

    fn factory(&self, runner_type: &str) -> RefreshResult<&Arc<dyn QueryRunnerFactory>> {
        self.factories
            .get(runner_type)
            .ok_or_else(|| RefreshError::UnknownRunner(runner_type.to_string()))
    }
}

pub const URL_RUNNER_TYPE: &str = "url";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UrlRunnerOptions {
    /// 基础地址，设置后查询文本可以是相对路径
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// 以查询文本为地址发起 GET 请求，响应体须为JSON
pub struct UrlRunner {
    client: reqwest::Client,
    options: UrlRunnerOptions,
}

impl UrlRunner {
    pub fn new(options: UrlRunnerOptions) -> RefreshResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(seconds) = options.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder
            .build()
            .map_err(|e| RefreshError::config_error(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client, options })
    }

    /// 解析请求地址
    ///
    /// 配置了基础地址时，相对路径拼接在其后，绝对地址必须以基础地址开头。
    pub fn resolve_url(&self, query: &str) -> Result<Url, String> {
        let target = query.trim();
        if target.is_empty() {
            return Err("查询为空".to_string());
        }

        let Some(base) = self.options.url.as_deref().filter(|b| !b.trim().is_empty()) else {
            return Url::parse(target).map_err(|e| format!("无效的URL {target}: {e}"));
        };

        if target.contains("://") {
            if !target.starts_with(base) {
                return Err(format!("URL必须以 {base} 开头"));
            }
            return Url::parse(target).map_err(|e| format!("无效的URL {target}: {e}"));
        }

        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            target.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| format!("无效的URL {joined}: {e}"))
    }

    async fn fetch(&self, url: Url) -> RunnerOutput {
        let mut request = self.client.get(url.clone());
        if let Some(username) = &self.options.username {
            request = request.basic_auth(username, self.options.password.as_deref());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return RunnerOutput::failure(format!("请求 {url} 失败: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return RunnerOutput::failure(format!("请求 {url} 返回HTTP {status}"));
        }

        match response.json::<serde_json::Value>().await {
            Ok(data) => RunnerOutput::success(data),
            Err(e) => RunnerOutput::failure(format!("响应不是有效的JSON: {e}")),
        }
    }
}

#[async_trait]
impl QueryRunner for UrlRunner {
    fn runner_type(&self) -> &str {
        URL_RUNNER_TYPE
    }

    async fn run_query(
        &self,
        query: &str,
        _principal: &Principal,
        cancel: CancellationToken,
    ) -> RefreshResult<RunnerOutput> {
        let url = match self.resolve_url(query) {
            Ok(url) => url,
            Err(message) => return Ok(RunnerOutput::failure(message)),
        };
        debug!("url执行器请求: {}", url);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RefreshError::Cancelled),
            output = self.fetch(url) => Ok(output),
        }
    }

    // 注释会破坏URL
    fn should_annotate_query(&self) -> bool {
        false
    }
}

pub struct UrlRunnerFactory;

impl UrlRunnerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlRunnerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRunnerFactory for UrlRunnerFactory {
    fn runner_type(&self) -> &str {
        URL_RUNNER_TYPE
    }

    fn configuration_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "title": "URL base path"},
                "username": {"type": "string"},
                "password": {"type": "string"},
                "timeout_seconds": {"type": "integer", "minimum": 1}
            },
            "secret": ["password"]
        })
    }

    fn create(&self, options: &serde_json::Value) -> RefreshResult<Box<dyn QueryRunner>> {
        let options: UrlRunnerOptions = if options.is_null() {
            UrlRunnerOptions::default()
        } else {
            serde_json::from_value(options.clone())
                .map_err(|e| RefreshError::config_error(format!("url执行器选项无效: {e}")))?
        };
        Ok(Box::new(UrlRunner::new(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(base: Option<&str>) -> UrlRunner {
        UrlRunner::new(UrlRunnerOptions {
            url: base.map(str::to_string),
            ..UrlRunnerOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_relative_path_against_base() {
        let runner = runner(Some("https://api.example.com/v1/"));
        assert_eq!(
            runner.resolve_url(" /stats?day=1 ").unwrap().as_str(),
            "https://api.example.com/v1/stats?day=1"
        );
    }

    #[test]
    fn test_absolute_url_must_match_base() {
        let runner = runner(Some("https://api.example.com"));
        assert!(runner.resolve_url("https://api.example.com/x").is_ok());
        assert!(runner.resolve_url("https://other.example.com/x").is_err());
    }

    #[test]
    fn test_empty_and_invalid_queries() {
        let runner = runner(None);
        assert_eq!(runner.resolve_url("   ").unwrap_err(), "查询为空");
        assert!(runner.resolve_url("not a url").is_err());
        assert!(runner.resolve_url("http://localhost:8080/data.json").is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let runner = runner(None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = runner
            .run_query("http://127.0.0.1:9/never", &Principal::Anonymous, cancel)
            .await;
        assert!(matches!(result, Err(RefreshError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_runner_failure() {
        let output = runner(None)
            .run_query("", &Principal::Anonymous, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.error.as_deref(), Some("查询为空"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = QueryRunnerRegistry::with_builtin_runners();
        assert_eq!(registry.runner_types(), vec!["url".to_string()]);
        assert!(registry.configuration_schema("url").unwrap()["properties"]["url"].is_object());

        let runner = registry
            .create("url", &serde_json::json!({"url": "https://example.com"}))
            .unwrap();
        assert!(!runner.should_annotate_query());

        assert!(matches!(
            registry.create("mysql", &serde_json::Value::Null),
            Err(RefreshError::UnknownRunner(_))
        ));
        assert!(registry
            .create("url", &serde_json::json!({"timeout_seconds": "soon"}))
            .is_err());
    }
}
