use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use refresh_core::{
    models::FailureDigest,
    traits::{AlertEvaluator, Notifier, SharedStore},
    RefreshResult,
};

pub const ALERTS_OUTBOX_KEY: &str = "alerts:pending";
pub const NOTIFICATIONS_OUTBOX_KEY: &str = "notifications:outbox";

/// 把告警评估请求推入 `alerts:pending`
pub struct StoreAlertEvaluator {
    store: Arc<dyn SharedStore>,
}

impl StoreAlertEvaluator {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AlertEvaluator for StoreAlertEvaluator {
    async fn check_alerts_for_query(&self, query_id: i64) -> RefreshResult<()> {
        let payload = json!({
            "query_id": query_id,
            "requested_at": Utc::now().to_rfc3339(),
        });
        debug!("请求评估查询 {} 的告警", query_id);
        self.store
            .list_push(ALERTS_OUTBOX_KEY, &payload.to_string())
            .await
    }
}

/// 把摘要通知推入 `notifications:outbox`
pub struct StoreNotifier {
    store: Arc<dyn SharedStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn send_digest(&self, digest: &FailureDigest) -> RefreshResult<()> {
        let payload = serde_json::to_string(digest)?;
        self.store
            .list_push(NOTIFICATIONS_OUTBOX_KEY, &payload)
            .await
    }
}
