use refresh_core::config::*;
use std::env;
use std::fs;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.scheduler.refresh_interval_seconds, 30);
    assert_eq!(config.scheduler.empty_schedules_interval_seconds, 300);
    assert_eq!(config.scheduler.lock_attempts, 5);
    assert_eq!(config.scheduler.max_backoff_minutes, 1440);
    assert_eq!(config.failure_reports.max_failure_reports_per_query, 100);
    assert_eq!(config.shared_store.backend, SharedStoreBackend::Redis);
    assert!(
        config.execution.job_expiry_seconds > config.execution.max_time_limit_seconds()
    );
}

#[test]
fn test_config_from_partial_toml() {
    let toml_content = r#"
[database]
url = "postgresql://test:5432/refresh_test"
max_connections = 15

[shared_store]
backend = "memory"

[scheduler]
refresh_interval_seconds = 60
disable_refresh_queries = true

[worker]
queues = ["scheduled_queries", "queries", "celery"]
concurrency = 8
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.database.url, "postgresql://test:5432/refresh_test");
    assert_eq!(config.database.max_connections, 15);
    assert_eq!(config.database.min_connections, 1);
    assert_eq!(config.shared_store.backend, SharedStoreBackend::Memory);
    assert_eq!(config.scheduler.refresh_interval_seconds, 60);
    assert!(config.scheduler.disable_refresh_queries);
    assert_eq!(config.worker.queues.len(), 3);
    assert_eq!(config.worker.concurrency, 8);
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_job_expiry_must_exceed_time_limits() {
    let toml_content = r#"
[execution]
job_expiry_seconds = 600
adhoc_time_limit_seconds = 300
scheduled_time_limit_seconds = 900
"#;

    let result = AppConfig::from_toml(toml_content);
    assert!(result.is_err());
}

#[test]
fn test_org_time_limits_count_toward_job_expiry() {
    let toml_content = r#"
[execution]
job_expiry_seconds = 7200
adhoc_time_limit_seconds = 300
scheduled_time_limit_seconds = 900

[[execution.org_time_limits]]
org_id = 3
time_limit_seconds = 1800
"#;
    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(
        config.execution.org_time_limits,
        vec![OrgTimeLimit {
            org_id: 3,
            time_limit_seconds: 1800
        }]
    );
    assert_eq!(config.execution.max_time_limit_seconds(), 1800);

    let too_long = toml_content.replace("time_limit_seconds = 1800", "time_limit_seconds = 7200");
    assert!(AppConfig::from_toml(&too_long).is_err());

    let zero = toml_content.replace("time_limit_seconds = 1800", "time_limit_seconds = 0");
    assert!(AppConfig::from_toml(&zero).is_err());
}

#[test]
fn test_invalid_sections_are_rejected() {
    let mut config = AppConfig::default();
    config.database.url = "mysql://localhost/db".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.worker.queues.clear();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.log_format = "xml".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.shared_store.url = Some("http://localhost:6379".to_string());
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.shared_store.backend = SharedStoreBackend::Memory;
    config.shared_store.url = Some("http://localhost:6379".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_redis_url_building() {
    let mut config = SharedStoreConfig::default();
    assert_eq!(config.connection_url(), "redis://127.0.0.1:6379/0");

    config.redis.password = Some("secret".to_string());
    config.redis.database = 2;
    assert_eq!(config.connection_url(), "redis://:secret@127.0.0.1:6379/2");

    config.url = Some("rediss://cache.internal:6380/1".to_string());
    assert_eq!(config.connection_url(), "rediss://cache.internal:6380/1");
}

#[test]
fn test_load_from_file_with_env_override() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().with_extension("toml");
    fs::write(
        &path,
        r#"
[failure_reports]
max_failure_reports_per_query = 20
base_url = "https://bi.example.com"

[execution]
scheduled_time_limit_seconds = 1800
"#,
    )
    .unwrap();

    env::set_var("REFRESH__FAILURE_REPORTS__DIGEST_INTERVAL_MINUTES", "15");
    let config = AppConfig::load(path.to_str());
    env::remove_var("REFRESH__FAILURE_REPORTS__DIGEST_INTERVAL_MINUTES");
    fs::remove_file(&path).ok();

    let config = config.unwrap();
    assert_eq!(config.failure_reports.max_failure_reports_per_query, 20);
    assert_eq!(config.failure_reports.base_url, "https://bi.example.com");
    assert_eq!(config.failure_reports.digest_interval_minutes, 15);
    assert_eq!(config.execution.scheduled_time_limit_seconds, 1800);
    assert_eq!(config.execution.adhoc_time_limit_seconds, 3600);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let result = AppConfig::load(Some("/nonexistent/refresh.toml"));
    assert!(result.is_err());
}

#[test]
fn test_toml_round_trip_keeps_values() {
    let mut config = AppConfig::default();
    config.worker.worker_id = "worker-a".to_string();
    let text = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&text).unwrap();
    assert_eq!(parsed.worker.worker_id, "worker-a");
    assert_eq!(parsed.scheduler.lock_attempts, config.scheduler.lock_attempts);
}
