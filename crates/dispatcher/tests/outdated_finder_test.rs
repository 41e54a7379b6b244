#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use serde_json::json;

    use refresh_core::models::{DataSource, QueryResult, Schedule};
    use refresh_core::traits::{DataSourceRepository, SharedStore};
    use refresh_core::{RefreshError, RefreshResult};
    use refresh_dispatcher::OutdatedQueryFinder;
    use refresh_infrastructure::database::mapping::MappingHelpers;
    use refresh_infrastructure::{InMemorySharedStore, ScheduledExecutionTracker};
    use refresh_testing_utils::{
        DataSourceBuilder, MockDatabase, OrganizationBuilder, QueryBuilder, UserBuilder,
    };

    struct Fixture {
        db: MockDatabase,
        store: Arc<dyn SharedStore>,
        finder: OutdatedQueryFinder,
    }

    fn fixture() -> Fixture {
        let db = MockDatabase::new();
        db.insert_organization(OrganizationBuilder::new(1).build());
        db.insert_user(UserBuilder::new(1).build());
        db.insert_data_source(DataSourceBuilder::new(1).build());

        let finder = OutdatedQueryFinder::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            24 * 60,
        );
        Fixture {
            db,
            store: Arc::new(InMemorySharedStore::new()),
            finder,
        }
    }

    fn stored_result(id: i64, text: &str, retrieved_at: DateTime<Utc>) -> QueryResult {
        QueryResult {
            id,
            org_id: 1,
            data_source_id: 1,
            query_hash: refresh_core::QueryHasher::hash_text(text),
            query_text: text.to_string(),
            data: json!({"rows": []}),
            runtime: 0.5,
            retrieved_at,
        }
    }

    async fn outdated_ids(f: &Fixture, now: DateTime<Utc>) -> Vec<i64> {
        let mut tracker = ScheduledExecutionTracker::new(f.store.clone());
        tracker.refresh().await.unwrap();
        f.finder
            .find_outdated(&tracker, now)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.query.id)
            .collect()
    }

    #[tokio::test]
    async fn test_due_by_latest_result() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::hours(2)));
        f.db.insert_query(QueryBuilder::new(1).every(3600).with_latest_result(100).build());
        f.db.insert_result(stored_result(101, "SELECT 2", now - Duration::minutes(10)));
        f.db.insert_query(
            QueryBuilder::new(2)
                .with_text("SELECT 2")
                .every(3600)
                .with_latest_result(101)
                .build(),
        );

        assert_eq!(outdated_ids(&f, now).await, vec![1]);
    }

    #[tokio::test]
    async fn test_query_without_history_is_not_due() {
        let f = fixture();
        f.db.insert_query(QueryBuilder::new(1).every(60).build());
        assert!(outdated_ids(&f, Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_tracker_time_wins_when_more_recent() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::hours(2)));
        f.db.insert_query(QueryBuilder::new(1).every(3600).with_latest_result(100).build());

        let tracker = ScheduledExecutionTracker::new(f.store.clone());
        tracker.update_at(1, now - Duration::minutes(5)).await.unwrap();

        assert!(outdated_ids(&f, now).await.is_empty());
    }

    #[tokio::test]
    async fn test_tracker_time_alone_makes_query_due() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_query(QueryBuilder::new(1).every(600).build());

        let tracker = ScheduledExecutionTracker::new(f.store.clone());
        tracker.update_at(1, now - Duration::minutes(11)).await.unwrap();

        assert_eq!(outdated_ids(&f, now).await, vec![1]);
    }

    #[tokio::test]
    async fn test_ineligible_queries_are_skipped() {
        let f = fixture();
        let now = Utc::now();
        let old = now - Duration::days(2);
        f.db.insert_organization(OrganizationBuilder::new(2).disabled().build());
        f.db.insert_data_source(DataSourceBuilder::new(2).paused("维护中").build());

        let mut results = 100;
        let mut add = |builder: QueryBuilder| {
            results += 1;
            let query = builder.every(3600).with_latest_result(results).build();
            f.db.insert_result(stored_result(results, &query.query_text, old));
            f.db.insert_query(query);
        };

        add(QueryBuilder::new(1).with_text("select 'ok'"));
        add(QueryBuilder::new(2).with_text("select 'org'").with_org(2));
        add(QueryBuilder::new(3).with_text("select 'paused'").with_data_source(2));
        add(QueryBuilder::new(4).with_text("select 'missing'").with_data_source(99));
        add(QueryBuilder::new(5).with_text("select 'none'").without_data_source());
        add(QueryBuilder::new(6).with_text("select 'archived'").archived());

        let disabled = QueryBuilder::new(7)
            .with_text("select 'disabled'")
            .with_schedule(Schedule {
                disabled: true,
                ..Schedule::every(3600)
            })
            .with_latest_result(100)
            .build();
        f.db.insert_query(disabled);

        let expired = QueryBuilder::new(8)
            .with_text("select 'expired'")
            .every(3600)
            .until(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
            .with_latest_result(100)
            .build();
        f.db.insert_query(expired);
        f.db.insert_result(stored_result(100, "select 'x'", old));

        assert_eq!(outdated_ids(&f, now).await, vec![1]);
    }

    #[tokio::test]
    async fn test_same_fingerprint_is_returned_once() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::hours(2)));
        for id in [3, 1, 2] {
            f.db.insert_query(QueryBuilder::new(id).every(3600).with_latest_result(100).build());
        }
        f.db.insert_query(
            QueryBuilder::new(4)
                .with_text("select 1 -- same text")
                .every(3600)
                .with_latest_result(100)
                .build(),
        );

        assert_eq!(outdated_ids(&f, now).await, vec![1]);
    }

    #[tokio::test]
    async fn test_malformed_schedule_is_disabled_and_scan_continues() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::days(3)));
        f.db.insert_query(
            QueryBuilder::new(1)
                .with_text("select 'broken'")
                .with_schedule(Schedule {
                    time: Some("not a time".to_string()),
                    ..Schedule::every(86400)
                })
                .with_latest_result(100)
                .build(),
        );
        f.db.insert_query(QueryBuilder::new(2).every(3600).with_latest_result(100).build());

        assert_eq!(outdated_ids(&f, now).await, vec![2]);
        assert!(f.db.query(1).unwrap().schedule_disabled());
        assert!(!f.db.query(2).unwrap().schedule_disabled());

        // 停用后不再参与扫描
        assert_eq!(outdated_ids(&f, now).await, vec![2]);
    }

    #[tokio::test]
    async fn test_backoff_defers_failing_query() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::seconds(3605)));
        f.db.insert_query(
            QueryBuilder::new(1)
                .every(3600)
                .with_failures(3)
                .with_latest_result(100)
                .build(),
        );

        assert!(outdated_ids(&f, now).await.is_empty());
        assert_eq!(outdated_ids(&f, now + Duration::minutes(9)).await, vec![1]);
    }

    #[tokio::test]
    async fn test_unparseable_schedule_row_is_disabled() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::days(3)));

        let schedule = MappingHelpers::parse_schedule(1, Some(json!({"interval": "abc"})))
            .expect("非空调度列应映射为调度");
        assert_eq!(schedule.interval, None);
        f.db.insert_query(
            QueryBuilder::new(1)
                .with_text("select 'broken'")
                .with_schedule(schedule)
                .with_latest_result(100)
                .build(),
        );
        f.db.insert_query(QueryBuilder::new(2).every(3600).with_latest_result(100).build());

        assert_eq!(outdated_ids(&f, now).await, vec![2]);
        assert!(f.db.query(1).unwrap().schedule_disabled());
        assert!(!f.db.query(2).unwrap().schedule_disabled());
    }

    /// 指定数据源查询失败的仓储
    struct FailingDataSources {
        inner: MockDatabase,
        failing_id: i64,
    }

    #[async_trait]
    impl DataSourceRepository for FailingDataSources {
        async fn get_by_id(&self, id: i64) -> RefreshResult<Option<DataSource>> {
            if id == self.failing_id {
                return Err(RefreshError::store("connection reset"));
            }
            DataSourceRepository::get_by_id(&self.inner, id).await
        }
    }

    #[tokio::test]
    async fn test_lookup_error_only_skips_that_query() {
        let f = fixture();
        let now = Utc::now();
        f.db.insert_data_source(DataSourceBuilder::new(2).build());
        f.db.insert_result(stored_result(100, "SELECT 1", now - Duration::hours(2)));
        f.db.insert_query(
            QueryBuilder::new(1)
                .with_text("select 'other'")
                .with_data_source(2)
                .every(3600)
                .with_latest_result(100)
                .build(),
        );
        f.db.insert_query(QueryBuilder::new(2).every(3600).with_latest_result(100).build());

        let finder = OutdatedQueryFinder::new(
            Arc::new(f.db.clone()),
            Arc::new(FailingDataSources {
                inner: f.db.clone(),
                failing_id: 2,
            }),
            Arc::new(f.db.clone()),
            Arc::new(f.db.clone()),
            24 * 60,
        );
        let mut tracker = ScheduledExecutionTracker::new(f.store.clone());
        tracker.refresh().await.unwrap();

        let due: Vec<i64> = finder
            .find_outdated(&tracker, now)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.query.id)
            .collect();
        assert_eq!(due, vec![2]);
        assert!(!f.db.query(1).unwrap().schedule_disabled());
    }
}
