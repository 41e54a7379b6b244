#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use refresh_core::{models::JobStatus, traits::SharedStore};
    use refresh_infrastructure::coordination::{job_key, JobRegistry, ScheduledExecutionTracker};
    use refresh_infrastructure::InMemorySharedStore;
    use refresh_testing_utils::JobBuilder;

    fn registry() -> (Arc<InMemorySharedStore>, JobRegistry) {
        let store = Arc::new(InMemorySharedStore::new());
        let registry = JobRegistry::new(
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        (store, registry)
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo_across_queues_in_order() {
        let (_store, registry) = registry();
        for id in ["a", "b", "c"] {
            registry.create(&JobBuilder::new(id).record()).await.unwrap();
        }
        registry.enqueue("queries", "a").await.unwrap();
        registry.enqueue("scheduled_queries", "b").await.unwrap();
        registry.enqueue("queries", "c").await.unwrap();

        let queues = vec!["queries".to_string(), "scheduled_queries".to_string()];
        let mut order = Vec::new();
        while let Some((queue, record)) = registry.dequeue(&queues).await.unwrap() {
            order.push((queue, record.job.id));
        }

        assert_eq!(
            order,
            vec![
                ("queries".to_string(), "a".to_string()),
                ("queries".to_string(), "c".to_string()),
                ("scheduled_queries".to_string(), "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_dequeue_skips_expired_records() {
        let (_store, registry) = registry();
        registry.enqueue("queries", "missing").await.unwrap();
        registry.create(&JobBuilder::new("present").record()).await.unwrap();
        registry.enqueue("queries", "present").await.unwrap();

        let (_, record) = registry
            .dequeue(&["queries".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.job.id, "present");
        assert_eq!(registry.queue_length("queries").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_transitions_and_ttl() {
        let (store, registry) = registry();
        registry.create(&JobBuilder::new("j").record()).await.unwrap();

        let started = registry.mark_started("j").await.unwrap().unwrap();
        assert_eq!(started.status, JobStatus::Started);
        assert!(started.started_at.is_some());

        registry.mark_finished("j", 42).await.unwrap();
        let record = registry.get("j").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Finished);
        assert_eq!(record.query_result_id, Some(42));
        assert!(record.ended_at.is_some());

        let ttl = store.ttl(&job_key("j")).await.unwrap();
        assert!(ttl <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancel_does_not_override_terminal_state() {
        let (_store, registry) = registry();
        registry.create(&JobBuilder::new("j").record()).await.unwrap();
        registry.mark_failed("j", "boom").await.unwrap();

        registry.mark_cancelled("j").await.unwrap();
        let record = registry.get("j").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));

        assert!(registry.mark_started("j").await.unwrap().is_some_and(|r| r.status == JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_cancel_request_flag() {
        let (_store, registry) = registry();
        assert!(!registry.is_cancel_requested("j").await.unwrap());
        registry.request_cancel("j").await.unwrap();
        assert!(registry.is_cancel_requested("j").await.unwrap());
        registry.clear_cancel_request("j").await.unwrap();
        assert!(!registry.is_cancel_requested("j").await.unwrap());
    }

    #[tokio::test]
    async fn test_discard_removes_record() {
        let (_store, registry) = registry();
        registry.create(&JobBuilder::new("j").record()).await.unwrap();
        registry.discard("j").await.unwrap();
        assert!(registry.get("j").await.unwrap().is_none());
        assert!(registry.mark_started("j").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execution_tracker_snapshot() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemorySharedStore::new());
        let mut tracker = ScheduledExecutionTracker::new(store.clone());
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        tracker.update_at(7, at).await.unwrap();
        assert_eq!(tracker.get(7), None);

        tracker.refresh().await.unwrap();
        assert_eq!(tracker.get(7), Some(at));
        assert_eq!(tracker.get(8), None);

        store
            .hash_set("sq:executed_at", &[("bogus".to_string(), "x".to_string())])
            .await
            .unwrap();
        tracker.refresh().await.unwrap();
        assert_eq!(tracker.get(7), Some(at));
    }
}
