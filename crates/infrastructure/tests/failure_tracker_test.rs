#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use refresh_core::{config::FailureReportsConfig, models::FailureRecord, traits::SharedStore};
    use refresh_infrastructure::reporting::{aggregation_key, FailureTracker};
    use refresh_infrastructure::InMemorySharedStore;
    use refresh_testing_utils::{
        MockDatabase, OrganizationBuilder, QueryBuilder, RecordingNotifier, UserBuilder,
    };

    struct Fixture {
        db: MockDatabase,
        store: Arc<InMemorySharedStore>,
        notifier: RecordingNotifier,
        tracker: FailureTracker,
    }

    fn fixture(max_reports: i32) -> Fixture {
        let db = MockDatabase::new();
        db.insert_organization(OrganizationBuilder::new(1).build());
        db.insert_user(UserBuilder::new(1).build());
        db.insert_query(QueryBuilder::new(10).every(60).build());

        let store = Arc::new(InMemorySharedStore::new());
        let notifier = RecordingNotifier::new();
        let config = FailureReportsConfig {
            max_failure_reports_per_query: max_reports,
            ..FailureReportsConfig::default()
        };
        let tracker = FailureTracker::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            store.clone(),
            Arc::new(notifier.clone()),
            config,
        );
        Fixture {
            db,
            store,
            notifier,
            tracker,
        }
    }

    #[tokio::test]
    async fn test_counter_increments_and_record_is_pushed() {
        let f = fixture(100);
        let query = f.db.query(10).unwrap();

        assert_eq!(f.tracker.track_failure(&query, "boom").await.unwrap(), 1);
        assert_eq!(f.db.query(10).unwrap().schedule_failures, 1);

        let items = f.store.list_range(&aggregation_key(1)).await.unwrap();
        assert_eq!(items.len(), 1);
        let record: FailureRecord = serde_json::from_str(&items[0]).unwrap();
        assert_eq!(record.id, 10);
        assert_eq!(record.message, "boom");
        assert_eq!(record.schedule_failures, 1);
    }

    #[tokio::test]
    async fn test_threshold_stops_reports_but_not_counting() {
        let f = fixture(3);
        let query = f.db.query(10).unwrap();

        for _ in 0..5 {
            f.tracker.track_failure(&query, "boom").await.unwrap();
        }

        assert_eq!(f.db.query(10).unwrap().schedule_failures, 5);
        // 计数 1、2 时报告，达到 3 后不再报告
        assert_eq!(f.store.list_len(&aggregation_key(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_org_or_disabled_owner_is_not_reported() {
        let f = fixture(100);
        f.db.insert_organization(OrganizationBuilder::new(2).without_failure_emails().build());
        f.db.insert_user(UserBuilder::new(2).disabled().build());
        let in_quiet_org = QueryBuilder::new(20).with_org(2).every(60).build();
        let disabled_owner = QueryBuilder::new(30).with_owner(2).every(60).build();
        f.db.insert_query(in_quiet_org.clone());
        f.db.insert_query(disabled_owner.clone());

        f.tracker.track_failure(&in_quiet_org, "boom").await.unwrap();
        f.tracker.track_failure(&disabled_owner, "boom").await.unwrap();

        assert_eq!(f.db.query(20).unwrap().schedule_failures, 1);
        assert_eq!(f.db.query(30).unwrap().schedule_failures, 1);
        assert!(f.store.scan_keys("aggregated_failures:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_reports_still_count() {
        let mut f = fixture(100);
        let config = FailureReportsConfig {
            enabled: false,
            ..FailureReportsConfig::default()
        };
        f.tracker = FailureTracker::new(
            Arc::new(f.db.clone()),
            Arc::new(f.db.clone()),
            Arc::new(f.db.clone()),
            f.store.clone(),
            Arc::new(f.notifier.clone()),
            config,
        );
        let query = f.db.query(10).unwrap();

        f.tracker.track_failure(&query, "boom").await.unwrap();
        assert_eq!(f.db.query(10).unwrap().schedule_failures, 1);
        assert_eq!(f.store.list_len(&aggregation_key(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_digest_deduplicates_and_clears_list() {
        let f = fixture(100);
        let other = QueryBuilder::new(11).with_name("other").every(60).build();
        f.db.insert_query(other.clone());
        let query = f.db.query(10).unwrap();

        f.tracker.track_failure(&query, "timeout").await.unwrap();
        f.tracker.track_failure(&other, "syntax error").await.unwrap();
        f.tracker.track_failure(&query, "timeout").await.unwrap();
        f.tracker.track_failure(&query, "connection refused").await.unwrap();

        assert_eq!(f.tracker.send_aggregated_errors().await.unwrap(), 1);

        let digests = f.notifier.digests();
        assert_eq!(digests.len(), 1);
        let digest = &digests[0];
        assert_eq!(digest.user_id, 1);
        assert_eq!(digest.email, "user1@example.com");

        let entries: Vec<(i64, &str, usize)> = digest
            .failures
            .iter()
            .map(|e| (e.query_id, e.failure_reason.as_str(), e.failure_count))
            .collect();
        assert_eq!(
            entries,
            vec![
                (10, "timeout", 2),
                (11, "syntax error", 1),
                (10, "connection refused", 1),
            ]
        );
        assert!(digest.body.contains("/queries/10"));

        assert_eq!(f.store.list_len(&aggregation_key(1)).await.unwrap(), 0);
        assert_eq!(f.tracker.send_aggregated_errors().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_comment_near_threshold() {
        let f = fixture(4);
        let query = f.db.query(10).unwrap();
        for _ in 0..3 {
            f.tracker.track_failure(&query, "boom").await.unwrap();
        }

        f.tracker.send_failure_report(1).await.unwrap();
        let digest = &f.notifier.digests()[0];
        let entry = &digest.failures[0];
        assert_eq!(entry.failure_count, 3);
        // 最后一条记录的计数为 3，超过 4 * 0.75
        assert!(entry.comment.is_some());
    }

    #[tokio::test]
    async fn test_no_comment_far_from_threshold() {
        let f = fixture(100);
        let query = f.db.query(10).unwrap();
        f.tracker.track_failure(&query, "boom").await.unwrap();

        f.tracker.send_failure_report(1).await.unwrap();
        assert!(f.notifier.digests()[0].failures[0].comment.is_none());
    }

    #[tokio::test]
    async fn test_notifier_failure_restores_entries() {
        let f = fixture(100);
        let query = f.db.query(10).unwrap();
        f.tracker.track_failure(&query, "first").await.unwrap();
        f.tracker.track_failure(&query, "second").await.unwrap();
        let before = f.store.list_range(&aggregation_key(1)).await.unwrap();

        f.notifier.set_failing(true);
        assert!(f.tracker.send_failure_report(1).await.is_err());
        assert_eq!(f.store.list_range(&aggregation_key(1)).await.unwrap(), before);

        f.notifier.set_failing(false);
        assert!(f.tracker.send_failure_report(1).await.unwrap());
        let reasons: Vec<String> = f.notifier.digests()[0]
            .failures
            .iter()
            .map(|e| e.failure_reason.clone())
            .collect();
        assert_eq!(reasons, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_entries_for_disabled_user_are_dropped() {
        let f = fixture(100);
        let query = f.db.query(10).unwrap();
        f.tracker.track_failure(&query, "boom").await.unwrap();
        f.db.insert_user(UserBuilder::new(1).disabled().build());

        assert!(!f.tracker.send_failure_report(1).await.unwrap());
        assert!(f.notifier.digests().is_empty());
        assert_eq!(f.store.list_len(&aggregation_key(1)).await.unwrap(), 0);
    }
}
