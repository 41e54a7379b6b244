#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use refresh_core::{models::JobStatus, traits::SharedStore, CasOutcome};
    use refresh_infrastructure::coordination::{lock_key, JobLock, JobRegistry, LockAttempt};
    use refresh_infrastructure::InMemorySharedStore;
    use refresh_testing_utils::JobBuilder;

    fn setup() -> (Arc<InMemorySharedStore>, JobRegistry, JobLock) {
        let store = Arc::new(InMemorySharedStore::new());
        let shared: Arc<dyn SharedStore> = store.clone();
        let registry = JobRegistry::new(
            shared.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        let lock = JobLock::new(shared, registry.clone(), Duration::from_secs(3600));
        (store, registry, lock)
    }

    #[tokio::test]
    async fn test_acquire_then_join_active_job() {
        let (_store, registry, lock) = setup();
        registry.create(&JobBuilder::new("job-1").record()).await.unwrap();

        assert_eq!(lock.acquire(1, "h", "job-1").await.unwrap(), None);
        assert_eq!(lock.holder(1, "h").await.unwrap().as_deref(), Some("job-1"));

        registry.create(&JobBuilder::new("job-2").record()).await.unwrap();
        let existing = lock.acquire(1, "h", "job-2").await.unwrap();
        assert_eq!(existing.as_deref(), Some("job-1"));
        assert_eq!(lock.holder(1, "h").await.unwrap().as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn test_lock_on_terminal_job_is_taken_over() {
        let (_store, registry, lock) = setup();
        registry.create(&JobBuilder::new("old").record()).await.unwrap();
        lock.acquire(1, "h", "old").await.unwrap();
        registry.mark_failed("old", "boom").await.unwrap();

        let outcome = lock.try_acquire(1, "h", "new").await.unwrap();
        assert_eq!(outcome, CasOutcome::Done(LockAttempt::Acquired));
        assert_eq!(lock.holder(1, "h").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_lock_on_missing_job_record_is_taken_over() {
        let (store, _registry, lock) = setup();
        store.set(&lock_key(1, "h"), "vanished", None).await.unwrap();

        assert_eq!(lock.acquire(1, "h", "fresh").await.unwrap(), None);
        assert_eq!(lock.holder(1, "h").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_lock_carries_expiry() {
        let (store, registry, lock) = setup();
        registry.create(&JobBuilder::new("job-1").record()).await.unwrap();
        lock.acquire(3, "abc", "job-1").await.unwrap();

        let ttl = store.ttl(&lock_key(3, "abc")).await.unwrap();
        assert!(ttl > Duration::from_secs(3500));
        assert!(ttl <= lock.expiry());
    }

    #[tokio::test]
    async fn test_release_only_when_owned() {
        let (_store, registry, lock) = setup();
        registry.create(&JobBuilder::new("a").record()).await.unwrap();
        lock.acquire(1, "h", "a").await.unwrap();

        assert!(!lock.release(1, "h", "b").await.unwrap());
        assert_eq!(lock.holder(1, "h").await.unwrap().as_deref(), Some("a"));

        assert!(lock.release(1, "h", "a").await.unwrap());
        assert_eq!(lock.holder(1, "h").await.unwrap(), None);

        assert!(!lock.release(1, "h", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_different_data_sources_do_not_share_locks() {
        let (_store, registry, lock) = setup();
        registry.create(&JobBuilder::new("a").record()).await.unwrap();
        registry.create(&JobBuilder::new("b").record()).await.unwrap();

        assert_eq!(lock.acquire(1, "h", "a").await.unwrap(), None);
        assert_eq!(lock.acquire(2, "h", "b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_ghost_locks() {
        let (store, registry, lock) = setup();

        registry.create(&JobBuilder::new("running").record()).await.unwrap();
        registry.mark_started("running").await.unwrap();
        lock.acquire(1, "running", "running").await.unwrap();

        registry
            .create(&JobBuilder::new("done").record_with_status(JobStatus::Finished))
            .await
            .unwrap();
        store.set(&lock_key(1, "done"), "done", None).await.unwrap();
        store.set(&lock_key(1, "gone"), "gone", None).await.unwrap();

        assert_eq!(lock.remove_ghost_locks().await.unwrap(), 2);
        assert_eq!(
            lock.holder(1, "running").await.unwrap().as_deref(),
            Some("running")
        );
        assert_eq!(lock.holder(1, "done").await.unwrap(), None);
        assert_eq!(lock.holder(1, "gone").await.unwrap(), None);

        assert_eq!(lock.remove_ghost_locks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let (_store, registry, lock) = setup();
        let mut handles = Vec::new();
        for i in 0..8 {
            let id = format!("job-{}", i);
            registry.create(&JobBuilder::new(&id).record()).await.unwrap();
            let lock = lock.clone();
            handles.push(tokio::spawn(async move {
                let existing = lock.acquire(5, "same", &id).await.unwrap();
                (id, existing)
            }));
        }

        let mut winners = Vec::new();
        let mut joined = Vec::new();
        for handle in handles {
            let (id, existing) = handle.await.unwrap();
            match existing {
                None => winners.push(id),
                Some(other) => joined.push(other),
            }
        }

        assert_eq!(winners.len(), 1);
        assert!(joined.iter().all(|id| id == &winners[0]));
    }
}
