use serde::{Deserialize, Serialize};

/// 共享存储后端
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharedStoreBackend {
    #[default]
    Redis,
    /// 单进程内存实现，仅用于开发与测试
    Memory,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn build_url(&self) -> String {
        let auth = if let Some(password) = &self.password {
            format!(":{password}@")
        } else {
            String::new()
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        )
    }
}

/// 共享存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedStoreConfig {
    pub backend: SharedStoreBackend,
    /// 完整连接URL，设置后优先于 `redis` 中的分项配置
    pub url: Option<String>,
    pub redis: RedisConfig,
    /// 所有键的公共前缀，多套部署共用一个Redis时用于隔离
    pub key_prefix: String,
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            backend: SharedStoreBackend::Redis,
            url: None,
            redis: RedisConfig::default(),
            key_prefix: String::new(),
        }
    }
}

impl SharedStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend != SharedStoreBackend::Redis {
            return Ok(());
        }

        match &self.url {
            Some(url) if !url.starts_with("redis://") && !url.starts_with("rediss://") => {
                Err(anyhow::anyhow!("Redis URL必须是redis://或rediss://格式"))
            }
            Some(_) => Ok(()),
            None => self.redis.validate(),
        }
    }

    pub fn connection_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| self.redis.build_url())
    }
}
