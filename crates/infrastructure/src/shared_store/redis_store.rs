use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info, instrument};

use refresh_core::{
    config::SharedStoreConfig, traits::SharedStore, RefreshError, RefreshResult,
};

/// 条件写脚本
///
/// ARGV: 是否有期望值, 期望值, 是否写入新值, 新值, TTL毫秒（0表示不过期）
static COMPARE_AND_SET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= ARGV[2] then return 0 end
else
  if current then return 0 end
end
if ARGV[3] == '1' then
  if tonumber(ARGV[5]) > 0 then
    redis.call('SET', KEYS[1], ARGV[4], 'PX', ARGV[5])
  else
    redis.call('SET', KEYS[1], ARGV[4])
  end
else
  redis.call('DEL', KEYS[1])
end
return 1
"#,
    )
});

const SCAN_BATCH: usize = 500;

fn store_err(e: redis::RedisError) -> RefreshError {
    RefreshError::store(e.to_string())
}

fn ttl_millis(ttl: Option<Duration>) -> u64 {
    ttl.map(|t| t.as_millis().max(1) as u64).unwrap_or(0)
}

/// 基于 Redis 的共享存储
///
/// 持有一个自动重连的 `ConnectionManager`，克隆开销很小，每次调用各自克隆一份。
#[derive(Clone)]
pub struct RedisSharedStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSharedStore {
    pub async fn connect(config: &SharedStoreConfig) -> RefreshResult<Self> {
        let url = config.connection_url();
        let client = redis::Client::open(url).map_err(store_err)?;

        let conn = tokio::time::timeout(
            Duration::from_secs(config.redis.connection_timeout_seconds),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| RefreshError::store("连接Redis超时"))?
        .map_err(store_err)?;

        let store = Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        };
        store.ping().await?;
        info!("Redis共享存储已连接");
        Ok(store)
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    fn strip_prefix(&self, key: String) -> String {
        if self.key_prefix.is_empty() {
            return key;
        }
        let prefix = format!("{}:", self.key_prefix);
        match key.strip_prefix(&prefix) {
            Some(stripped) => stripped.to_string(),
            None => key,
        }
    }
}

#[async_trait]
impl SharedStore for RedisSharedStore {
    async fn get(&self, key: &str) -> RefreshResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> RefreshResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.build_key(key)).arg(value);
        if ttl.is_some() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<()>(&mut conn).await.map_err(store_err)
    }

    async fn delete(&self, key: &str) -> RefreshResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, expected, new_value))]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: Option<&str>,
        ttl: Option<Duration>,
    ) -> RefreshResult<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = COMPARE_AND_SET
            .key(self.build_key(key))
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(if new_value.is_some() { "1" } else { "0" })
            .arg(new_value.unwrap_or(""))
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        debug!("条件写 {}: {}", key, applied == 1);
        Ok(applied == 1)
    }

    async fn list_push(&self, key: &str, value: &str) -> RefreshResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(self.build_key(key))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn list_pop(&self, key: &str) -> RefreshResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("RPOP")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn list_range(&self, key: &str) -> RefreshResult<Vec<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("LRANGE")
            .arg(self.build_key(key))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn list_drain(&self, key: &str) -> RefreshResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_key = self.build_key(key);
        let (items,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("LRANGE")
            .arg(&full_key)
            .arg(0)
            .arg(-1)
            .cmd("DEL")
            .arg(&full_key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(items)
    }

    async fn list_len(&self, key: &str) -> RefreshResult<usize> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> RefreshResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.build_key(key));
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(store_err)
    }

    async fn hash_get_all(&self, key: &str) -> RefreshResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        redis::cmd("HGETALL")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn scan_keys(&self, pattern: &str) -> RefreshResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_pattern = self.build_key(pattern);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            keys.extend(batch.into_iter().map(|k| self.strip_prefix(k)));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ping(&self) -> RefreshResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
