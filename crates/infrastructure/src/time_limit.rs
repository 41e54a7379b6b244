use std::collections::HashMap;
use std::time::Duration;

use refresh_core::{config::ExecutionConfig, traits::TimeLimitPolicy};

/// 按配置给出的执行时限，可按组织覆盖
#[derive(Debug, Clone)]
pub struct StaticTimeLimitPolicy {
    adhoc: Duration,
    scheduled: Duration,
    org_overrides: HashMap<i64, Duration>,
}

impl StaticTimeLimitPolicy {
    pub fn new(adhoc: Duration, scheduled: Duration) -> Self {
        Self {
            adhoc,
            scheduled,
            org_overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        config.org_time_limits.iter().fold(
            Self::new(
                Duration::from_secs(config.adhoc_time_limit_seconds),
                Duration::from_secs(config.scheduled_time_limit_seconds),
            ),
            |policy, limit| {
                policy.with_org_limit(limit.org_id, Duration::from_secs(limit.time_limit_seconds))
            },
        )
    }

    pub fn with_org_limit(mut self, org_id: i64, limit: Duration) -> Self {
        self.org_overrides.insert(org_id, limit);
        self
    }
}

impl TimeLimitPolicy for StaticTimeLimitPolicy {
    fn query_time_limit(&self, scheduled: bool, _user_id: Option<i64>, org_id: i64) -> Duration {
        if let Some(limit) = self.org_overrides.get(&org_id) {
            return *limit;
        }
        if scheduled {
            self.scheduled
        } else {
            self.adhoc
        }
    }
}
