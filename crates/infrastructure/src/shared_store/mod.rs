//! 共享键值存储实现
//!
//! - `RedisSharedStore` - 生产环境，多个调度器与Worker进程共用
//! - `InMemorySharedStore` - 单进程内存实现，用于开发和测试

mod memory_store;
mod redis_store;

pub use memory_store::InMemorySharedStore;
pub use redis_store::RedisSharedStore;

use std::sync::Arc;

use refresh_core::{
    config::{SharedStoreBackend, SharedStoreConfig},
    traits::SharedStore,
    RefreshResult,
};

/// 按配置创建共享存储
pub async fn create_shared_store(config: &SharedStoreConfig) -> RefreshResult<Arc<dyn SharedStore>> {
    match config.backend {
        SharedStoreBackend::Redis => Ok(Arc::new(RedisSharedStore::connect(config).await?)),
        SharedStoreBackend::Memory => Ok(Arc::new(InMemorySharedStore::new())),
    }
}
