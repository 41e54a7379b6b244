use serde::{Deserialize, Serialize};

/// 单个组织的执行时限，同时作用于临时查询与定时查询
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgTimeLimit {
    pub org_id: i64,
    pub time_limit_seconds: u64,
}

/// 作业执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// 作业锁与作业记录的过期时间，必须大于任何执行时限
    pub job_expiry_seconds: u64,
    pub adhoc_time_limit_seconds: u64,
    pub scheduled_time_limit_seconds: u64,
    /// 作业结束后记录保留的时间
    pub finished_job_ttl_seconds: u64,
    /// 是否在查询文本前附加元数据注释
    pub annotate_queries: bool,
    /// 按组织覆盖的执行时限
    pub org_time_limits: Vec<OrgTimeLimit>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            job_expiry_seconds: 12 * 3600,
            adhoc_time_limit_seconds: 3600,
            scheduled_time_limit_seconds: 6 * 3600,
            finished_job_ttl_seconds: 600,
            annotate_queries: true,
            org_time_limits: Vec::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.adhoc_time_limit_seconds == 0 || self.scheduled_time_limit_seconds == 0 {
            return Err(anyhow::anyhow!("执行时限必须大于0"));
        }

        if let Some(limit) = self
            .org_time_limits
            .iter()
            .find(|limit| limit.time_limit_seconds == 0)
        {
            return Err(anyhow::anyhow!("组织 {} 的执行时限必须大于0", limit.org_id));
        }

        if self.job_expiry_seconds <= self.max_time_limit_seconds() {
            return Err(anyhow::anyhow!(
                "作业过期时间({}s)必须大于最大执行时限({}s)",
                self.job_expiry_seconds,
                self.max_time_limit_seconds()
            ));
        }

        if self.finished_job_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("作业记录保留时间必须大于0"));
        }

        Ok(())
    }

    /// 包括组织覆盖在内的最大执行时限
    pub fn max_time_limit_seconds(&self) -> u64 {
        self.org_time_limits
            .iter()
            .map(|limit| limit.time_limit_seconds)
            .fold(
                self.adhoc_time_limit_seconds
                    .max(self.scheduled_time_limit_seconds),
                u64::max,
            )
    }
}
