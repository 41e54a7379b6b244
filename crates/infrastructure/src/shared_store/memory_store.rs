use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use refresh_core::{traits::SharedStore, RefreshError, RefreshResult};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 内存共享存储
///
/// 所有操作在同一把锁内完成，条件写天然原子。过期在读取时惰性清除，
/// 使用 `tokio::time::Instant`，测试中可以配合 `tokio::time::pause` 推进时间。
#[derive(Debug, Default)]
pub struct InMemorySharedStore {
    entries: Mutex<HashMap<String, Entry>>,
}

fn wrong_type(key: &str) -> RefreshError {
    RefreshError::store(format!("键 {} 的类型不匹配", key))
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键剩余的存活时间，测试用
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().await;
        live(&mut entries, key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> RefreshResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Text(v),
                ..
            }) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> RefreshResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> RefreshResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key).is_some() && entries.remove(key).is_some())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: Option<&str>,
        ttl: Option<Duration>,
    ) -> RefreshResult<bool> {
        let mut entries = self.entries.lock().await;
        let current = match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Text(v),
                ..
            }) => Some(v.clone()),
            Some(_) => return Err(wrong_type(key)),
            None => None,
        };
        if current.as_deref() != expected {
            return Ok(false);
        }
        match new_value {
            Some(value) => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::Text(value.to_string()),
                        expires_at: ttl.map(|t| Instant::now() + t),
                    },
                );
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(true)
    }

    async fn list_push(&self, key: &str, value: &str) -> RefreshResult<()> {
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::List(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => {
                list.push_front(value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_pop(&self, key: &str) -> RefreshResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let (item, now_empty) = match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => {
                let item = list.pop_back();
                (item, list.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(None),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(item)
    }

    async fn list_range(&self, key: &str) -> RefreshResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn list_drain(&self, key: &str) -> RefreshResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::List(_),
                ..
            }) => {}
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(Vec::new()),
        }
        match entries.remove(key) {
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => Ok(list.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> RefreshResult<usize> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> RefreshResult<()> {
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry {
                value: StoredValue::Hash(hash),
                ..
            }) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> RefreshResult<HashMap<String, String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: StoredValue::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> RefreshResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| matches_pattern(k, pattern))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> RefreshResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_and_set_semantics() {
        let store = InMemorySharedStore::new();

        assert!(store.compare_and_set("k", None, Some("a"), None).await.unwrap());
        assert!(!store.compare_and_set("k", None, Some("b"), None).await.unwrap());
        assert!(!store.compare_and_set("k", Some("x"), Some("b"), None).await.unwrap());
        assert!(store.compare_and_set("k", Some("a"), Some("b"), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));

        assert!(store.compare_and_set("k", Some("b"), None, None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_expire() {
        let store = InMemorySharedStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.compare_and_set("k", None, Some("n"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_fifo_and_drain_clears() {
        let store = InMemorySharedStore::new();
        store.list_push("q", "1").await.unwrap();
        store.list_push("q", "2").await.unwrap();
        store.list_push("q", "3").await.unwrap();

        assert_eq!(store.list_len("q").await.unwrap(), 3);
        assert_eq!(store.list_range("q").await.unwrap(), vec!["3", "2", "1"]);
        assert_eq!(store.list_pop("q").await.unwrap().as_deref(), Some("1"));

        let drained = store.list_drain("q").await.unwrap();
        assert_eq!(drained, vec!["3", "2"]);
        assert_eq!(store.list_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_keys_by_prefix() {
        let store = InMemorySharedStore::new();
        store.set("lock:1:a", "j1", None).await.unwrap();
        store.set("lock:2:b", "j2", None).await.unwrap();
        store.set("job:j1", "{}", None).await.unwrap();

        let keys = store.scan_keys("lock:*").await.unwrap();
        assert_eq!(keys, vec!["lock:1:a", "lock:2:b"]);
    }
}
