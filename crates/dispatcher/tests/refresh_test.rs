#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::json;

    use refresh_core::config::{FailureReportsConfig, SchedulerConfig};
    use refresh_core::models::QueryResult;
    use refresh_core::traits::SharedStore;
    use refresh_dispatcher::{
        Dispatcher, MaintenanceService, OutdatedQueryFinder, RefreshService, STATUS_KEY,
    };
    use refresh_infrastructure::reporting::aggregation_key;
    use refresh_infrastructure::{
        FailureTracker, InMemorySharedStore, JobLock, JobRegistry, StaticTimeLimitPolicy,
    };
    use refresh_testing_utils::{
        DataSourceBuilder, JobBuilder, MockDatabase, OrganizationBuilder, QueryBuilder,
        RecordingNotifier, UserBuilder,
    };

    struct Fixture {
        db: MockDatabase,
        store: Arc<InMemorySharedStore>,
        registry: JobRegistry,
        lock: JobLock,
    }

    impl Fixture {
        fn new() -> Self {
            let db = MockDatabase::new();
            db.insert_organization(OrganizationBuilder::new(1).build());
            db.insert_user(UserBuilder::new(1).build());
            db.insert_data_source(DataSourceBuilder::new(1).build());

            let store = Arc::new(InMemorySharedStore::new());
            let shared: Arc<dyn SharedStore> = store.clone();
            let registry = JobRegistry::new(
                shared.clone(),
                Duration::from_secs(43200),
                Duration::from_secs(600),
            );
            let lock = JobLock::new(shared, registry.clone(), Duration::from_secs(43200));
            Self {
                db,
                store,
                registry,
                lock,
            }
        }

        fn service(&self, config: SchedulerConfig) -> RefreshService {
            let db = Arc::new(self.db.clone());
            let finder = OutdatedQueryFinder::new(
                db.clone(),
                db.clone(),
                db.clone(),
                db.clone(),
                config.max_backoff_minutes,
            );
            let dispatcher = Dispatcher::new(
                self.registry.clone(),
                self.lock.clone(),
                db.clone(),
                Arc::new(StaticTimeLimitPolicy::new(
                    Duration::from_secs(60),
                    Duration::from_secs(600),
                )),
                config.lock_attempts,
            );
            let tracker = FailureTracker::new(
                db.clone(),
                db.clone(),
                db.clone(),
                self.store.clone(),
                Arc::new(RecordingNotifier::new()),
                FailureReportsConfig::default(),
            );
            RefreshService::new(
                db,
                self.store.clone(),
                finder,
                Arc::new(dispatcher),
                Arc::new(tracker),
                config,
            )
        }

        fn insert_stale_query(&self, builder: QueryBuilder, result_id: i64) {
            let query = builder.with_latest_result(result_id).build();
            self.db.insert_result(QueryResult {
                id: result_id,
                org_id: 1,
                data_source_id: 1,
                query_hash: query.query_hash.clone(),
                query_text: query.query_text.clone(),
                data: json!({"rows": []}),
                runtime: 0.1,
                retrieved_at: Utc::now() - chrono::Duration::hours(3),
            });
            self.db.insert_query(query);
        }
    }

    fn today() -> DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn test_refresh_enqueues_due_queries_and_records_status() {
        let f = Fixture::new();
        f.insert_stale_query(QueryBuilder::new(1).every(3600), 100);
        f.insert_stale_query(QueryBuilder::new(2).with_text("SELECT 2").every(3600), 101);
        let service = f.service(SchedulerConfig::default());

        let summary = service.refresh_queries().await.unwrap();
        assert_eq!(summary.outdated, 2);
        assert_eq!(summary.enqueued, vec![1, 2]);
        assert_eq!(f.registry.queue_length("scheduled_queries").await.unwrap(), 2);

        let status = f.store.hash_get_all(STATUS_KEY).await.unwrap();
        assert_eq!(status.get("outdated_queries_count").map(String::as_str), Some("2"));
        assert_eq!(status.get("query_ids").map(String::as_str), Some("[1,2]"));
        assert!(status.contains_key("last_refresh_at"));
        assert!(status.contains_key("started_at"));

        // 作业仍在排队，下一轮加入同一作业
        service.refresh_queries().await.unwrap();
        assert_eq!(f.registry.queue_length("scheduled_queries").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disabled_refresh_dispatches_nothing() {
        let f = Fixture::new();
        f.insert_stale_query(QueryBuilder::new(1).every(3600), 100);
        let service = f.service(SchedulerConfig {
            disable_refresh_queries: true,
            ..SchedulerConfig::default()
        });

        let summary = service.refresh_queries().await.unwrap();
        assert_eq!(summary.outdated, 1);
        assert!(summary.enqueued.is_empty());
        assert_eq!(f.registry.queue_length("scheduled_queries").await.unwrap(), 0);

        let status = f.store.hash_get_all(STATUS_KEY).await.unwrap();
        assert_eq!(status.get("outdated_queries_count").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_tracked_and_skipped() {
        let f = Fixture::new();
        f.insert_stale_query(
            QueryBuilder::new(1)
                .with_text("select * from t where d = '{{ day }}'")
                .every(3600),
            100,
        );
        f.insert_stale_query(
            QueryBuilder::new(2)
                .with_text("select * from t where d = '{{ day }}'")
                .with_parameter("day", json!("2024-01-01"))
                .every(3600),
            101,
        );
        let service = f.service(SchedulerConfig::default());

        let summary = service.refresh_queries().await.unwrap();
        assert_eq!(summary.enqueued, vec![2]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(f.db.query(1).unwrap().schedule_failures, 1);
        assert_eq!(f.store.list_len(&aggregation_key(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_schedules_is_idempotent() {
        let f = Fixture::new();
        let past = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        f.insert_stale_query(QueryBuilder::new(1).every(3600).until(past), 100);
        f.insert_stale_query(QueryBuilder::new(2).with_text("SELECT 2").every(3600), 101);
        let service = f.service(SchedulerConfig::default());

        let summary = service.refresh_queries().await.unwrap();
        assert_eq!(summary.enqueued, vec![2]);

        assert_eq!(service.empty_schedules_at(today()).await.unwrap(), 1);
        assert!(f.db.query(1).unwrap().schedule.is_none());
        assert!(f.db.query(2).unwrap().schedule.is_some());

        assert_eq!(service.empty_schedules_at(today()).await.unwrap(), 0);
        assert!(f.db.query(1).unwrap().schedule.is_none());
    }

    #[tokio::test]
    async fn test_maintenance_removes_ghost_locks_and_old_results() {
        let f = Fixture::new();
        f.insert_stale_query(QueryBuilder::new(1).every(3600), 100);
        f.db.insert_result(QueryResult {
            id: 200,
            org_id: 1,
            data_source_id: 1,
            query_hash: "orphan".to_string(),
            query_text: "select 'orphan'".to_string(),
            data: json!({}),
            runtime: 0.1,
            retrieved_at: Utc::now() - chrono::Duration::days(30),
        });

        let finished = JobBuilder::new("finished").record();
        f.registry.create(&finished).await.unwrap();
        f.registry.mark_finished("finished", 100).await.unwrap();
        f.store
            .set(
                &refresh_infrastructure::coordination::lock_key(1, "h"),
                "finished",
                None,
            )
            .await
            .unwrap();

        let maintenance = MaintenanceService::new(
            f.lock.clone(),
            f.registry.clone(),
            Arc::new(f.db.clone()),
            SchedulerConfig::default(),
        );

        assert_eq!(maintenance.remove_ghost_locks().await.unwrap(), 1);
        assert_eq!(maintenance.cleanup_query_results().await.unwrap(), 1);
        assert_eq!(f.db.result_count(), 1);
        assert_eq!(maintenance.cleanup_query_results().await.unwrap(), 0);

        maintenance
            .report_queue_depths(&["queries".to_string()])
            .await;
    }
}
