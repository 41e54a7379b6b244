use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureReportsConfig {
    pub enabled: bool,
    /// 单个查询失败次数达到此值后不再加入摘要
    pub max_failure_reports_per_query: i32,
    pub digest_interval_minutes: u64,
    /// 摘要中查询链接的前缀
    pub base_url: String,
}

impl Default for FailureReportsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failure_reports_per_query: 100,
            digest_interval_minutes: 60,
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

impl FailureReportsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_failure_reports_per_query <= 0 {
            return Err(anyhow::anyhow!("失败报告上限必须大于0"));
        }

        if self.digest_interval_minutes == 0 {
            return Err(anyhow::anyhow!("摘要发送间隔必须大于0"));
        }

        Ok(())
    }
}
