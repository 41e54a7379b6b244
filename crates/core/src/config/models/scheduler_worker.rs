use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 刷新扫描周期
    pub refresh_interval_seconds: u64,
    /// 过期调度清理周期
    pub empty_schedules_interval_seconds: u64,
    /// 关闭后仍记录状态，但不分发任何作业
    pub disable_refresh_queries: bool,
    /// 失败退避的上限（分钟）
    pub max_backoff_minutes: i64,
    /// 分发时条件写的最大尝试次数
    pub lock_attempts: u32,
    pub ghost_lock_sweep_interval_seconds: u64,
    pub query_results_cleanup_enabled: bool,
    pub query_results_cleanup_interval_seconds: u64,
    pub query_results_cleanup_max_age_days: i64,
    /// 单次清理最多删除的结果数
    pub query_results_cleanup_count: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_seconds: 30,
            empty_schedules_interval_seconds: 300,
            disable_refresh_queries: false,
            max_backoff_minutes: 24 * 60,
            lock_attempts: 5,
            ghost_lock_sweep_interval_seconds: 300,
            query_results_cleanup_enabled: true,
            query_results_cleanup_interval_seconds: 300,
            query_results_cleanup_max_age_days: 7,
            query_results_cleanup_count: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval_seconds == 0 {
            return Err(anyhow::anyhow!("刷新间隔必须大于0"));
        }

        if self.empty_schedules_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度清理间隔必须大于0"));
        }

        if self.max_backoff_minutes <= 0 {
            return Err(anyhow::anyhow!("最大退避时间必须大于0"));
        }

        if self.lock_attempts == 0 {
            return Err(anyhow::anyhow!("分发重试次数必须大于0"));
        }

        if self.ghost_lock_sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("残留锁清理间隔必须大于0"));
        }

        if self.query_results_cleanup_enabled {
            if self.query_results_cleanup_interval_seconds == 0 {
                return Err(anyhow::anyhow!("结果清理间隔必须大于0"));
            }
            if self.query_results_cleanup_max_age_days <= 0 {
                return Err(anyhow::anyhow!("结果保留天数必须大于0"));
            }
            if self.query_results_cleanup_count <= 0 {
                return Err(anyhow::anyhow!("单次清理数量必须大于0"));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 为空时使用主机名
    pub worker_id: String,
    /// 按优先级排列的队列
    pub queues: Vec<String>,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// 执行期间检查取消请求的间隔
    pub cancel_check_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: String::new(),
            queues: vec!["queries".to_string(), "scheduled_queries".to_string()],
            concurrency: 4,
            poll_interval_ms: 500,
            cancel_check_interval_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queues.is_empty() {
            return Err(anyhow::anyhow!("Worker队列列表不能为空"));
        }

        if self.queues.iter().any(|q| q.trim().is_empty()) {
            return Err(anyhow::anyhow!("队列名称不能为空"));
        }

        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }

        if self.cancel_check_interval_ms == 0 {
            return Err(anyhow::anyhow!("取消检查间隔必须大于0"));
        }

        Ok(())
    }
}
