//! Mock implementations for all repository and collaborator traits

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use refresh_core::{
    models::{
        DataSource, FailureDigest, NewQueryResult, Organization, Principal, Query, QueryResult,
        StoredResult, User,
    },
    traits::{
        AlertEvaluator, DataSourceRepository, Notifier, OrganizationRepository, QueryRepository,
        QueryRunner, QueryRunnerFactory, ResultStore, RunnerOutput, UserRepository,
    },
    RefreshError, RefreshResult,
};

#[derive(Debug, Default)]
struct DatabaseState {
    queries: BTreeMap<i64, Query>,
    data_sources: BTreeMap<i64, DataSource>,
    organizations: BTreeMap<i64, Organization>,
    users: BTreeMap<i64, User>,
    results: BTreeMap<i64, QueryResult>,
    next_result_id: i64,
    /// 每次 store_result 对应一次提交
    commits: usize,
}

/// 内存数据库，实现全部仓储接口
///
/// 所有操作都在同一把锁内完成，`store_result` 的插入、计数归零与扇出更新一次提交。
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_query(&self, query: Query) {
        self.state.lock().unwrap().queries.insert(query.id, query);
    }

    pub fn insert_data_source(&self, data_source: DataSource) {
        self.state
            .lock()
            .unwrap()
            .data_sources
            .insert(data_source.id, data_source);
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.state
            .lock()
            .unwrap()
            .organizations
            .insert(organization.id, organization);
    }

    pub fn insert_user(&self, user: User) {
        self.state.lock().unwrap().users.insert(user.id, user);
    }

    pub fn insert_result(&self, result: QueryResult) {
        let mut state = self.state.lock().unwrap();
        state.next_result_id = state.next_result_id.max(result.id);
        state.results.insert(result.id, result);
    }

    pub fn query(&self, id: i64) -> Option<Query> {
        self.state.lock().unwrap().queries.get(&id).cloned()
    }

    pub fn data_source(&self, id: i64) -> Option<DataSource> {
        self.state.lock().unwrap().data_sources.get(&id).cloned()
    }

    pub fn update_data_source<F: FnOnce(&mut DataSource)>(&self, id: i64, f: F) {
        if let Some(ds) = self.state.lock().unwrap().data_sources.get_mut(&id) {
            f(ds);
        }
    }

    pub fn update_query<F: FnOnce(&mut Query)>(&self, id: i64, f: F) {
        if let Some(query) = self.state.lock().unwrap().queries.get_mut(&id) {
            f(query);
        }
    }

    pub fn results(&self) -> Vec<QueryResult> {
        self.state.lock().unwrap().results.values().cloned().collect()
    }

    pub fn result_count(&self) -> usize {
        self.state.lock().unwrap().results.len()
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits
    }
}

#[async_trait]
impl QueryRepository for MockDatabase {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Query>> {
        Ok(self.query(id))
    }

    async fn get_scheduled(&self) -> RefreshResult<Vec<Query>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queries
            .values()
            .filter(|q| q.schedule.is_some() && !q.is_archived)
            .cloned()
            .collect())
    }

    async fn get_past_scheduled(&self, today: NaiveDate) -> RefreshResult<Vec<Query>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queries
            .values()
            .filter(|q| q.schedule.as_ref().is_some_and(|s| s.is_expired(today)))
            .cloned()
            .collect())
    }

    async fn clear_schedule(&self, id: i64) -> RefreshResult<()> {
        if let Some(query) = self.state.lock().unwrap().queries.get_mut(&id) {
            query.schedule = None;
        }
        Ok(())
    }

    async fn disable_schedule(&self, id: i64) -> RefreshResult<()> {
        if let Some(schedule) = self
            .state
            .lock()
            .unwrap()
            .queries
            .get_mut(&id)
            .and_then(|q| q.schedule.as_mut())
        {
            schedule.disabled = true;
        }
        Ok(())
    }

    async fn increment_schedule_failures(&self, id: i64) -> RefreshResult<i32> {
        let mut state = self.state.lock().unwrap();
        let query = state
            .queries
            .get_mut(&id)
            .ok_or_else(|| RefreshError::not_found("查询", id))?;
        query.schedule_failures += 1;
        Ok(query.schedule_failures)
    }
}

#[async_trait]
impl DataSourceRepository for MockDatabase {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<DataSource>> {
        Ok(self.data_source(id))
    }
}

#[async_trait]
impl OrganizationRepository for MockDatabase {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Organization>> {
        Ok(self.state.lock().unwrap().organizations.get(&id).cloned())
    }
}

#[async_trait]
impl UserRepository for MockDatabase {
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<User>> {
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }
}

#[async_trait]
impl ResultStore for MockDatabase {
    async fn store_result(
        &self,
        result: NewQueryResult,
        reset_failures_for: Option<i64>,
    ) -> RefreshResult<StoredResult> {
        let mut state = self.state.lock().unwrap();
        state.next_result_id += 1;
        let stored = result.into_result(state.next_result_id);
        state.results.insert(stored.id, stored.clone());

        if let Some(query) = reset_failures_for.and_then(|id| state.queries.get_mut(&id)) {
            query.schedule_failures = 0;
        }

        let mut updated_query_ids = Vec::new();
        for query in state.queries.values_mut() {
            if query.query_hash == stored.query_hash
                && query.data_source_id == Some(stored.data_source_id)
            {
                query.latest_query_data_id = Some(stored.id);
                updated_query_ids.push(query.id);
            }
        }
        state.commits += 1;

        Ok(StoredResult {
            result: stored,
            updated_query_ids,
        })
    }

    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<QueryResult>> {
        Ok(self.state.lock().unwrap().results.get(&id).cloned())
    }

    async fn get_latest(
        &self,
        data_source_id: i64,
        query_hash: &str,
        max_age: Option<chrono::Duration>,
    ) -> RefreshResult<Option<QueryResult>> {
        let cutoff = max_age.map(|age| Utc::now() - age);
        let state = self.state.lock().unwrap();
        Ok(state
            .results
            .values()
            .filter(|r| r.data_source_id == data_source_id && r.query_hash == query_hash)
            .filter(|r| cutoff.map_or(true, |c| r.retrieved_at >= c))
            .max_by_key(|r| r.retrieved_at)
            .cloned())
    }

    async fn delete_unused(&self, older_than: DateTime<Utc>, limit: i64) -> RefreshResult<u64> {
        let mut state = self.state.lock().unwrap();
        let referenced: Vec<i64> = state
            .queries
            .values()
            .filter_map(|q| q.latest_query_data_id)
            .collect();
        let doomed: Vec<i64> = state
            .results
            .values()
            .filter(|r| r.retrieved_at < older_than && !referenced.contains(&r.id))
            .map(|r| r.id)
            .take(limit.max(0) as usize)
            .collect();
        for id in &doomed {
            state.results.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}

/// 模拟执行器的行为
#[derive(Debug, Clone)]
pub enum RunnerBehavior {
    Succeed(serde_json::Value),
    /// 执行器返回错误信息
    Fail(String),
    /// 延迟后成功，期间响应取消
    Delay(Duration, serde_json::Value),
    /// 一直挂起直到被取消
    Hang,
}

#[derive(Debug)]
struct RunnerState {
    behavior: RunnerBehavior,
    executed: Vec<String>,
    cancelled: usize,
}

/// 可配置的查询执行器，记录收到的查询文本
#[derive(Debug, Clone)]
pub struct MockQueryRunner {
    state: Arc<Mutex<RunnerState>>,
    supports_auto_limit: bool,
    annotate: bool,
}

impl MockQueryRunner {
    pub fn new(behavior: RunnerBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(RunnerState {
                behavior,
                executed: Vec::new(),
                cancelled: 0,
            })),
            supports_auto_limit: false,
            annotate: true,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(RunnerBehavior::Succeed(
            serde_json::json!({"columns": [{"name": "n"}], "rows": [{"n": 1}]}),
        ))
    }

    pub fn failing(message: &str) -> Self {
        Self::new(RunnerBehavior::Fail(message.to_string()))
    }

    pub fn with_auto_limit(mut self) -> Self {
        self.supports_auto_limit = true;
        self
    }

    pub fn without_annotation(mut self) -> Self {
        self.annotate = false;
        self
    }

    pub fn set_behavior(&self, behavior: RunnerBehavior) {
        self.state.lock().unwrap().behavior = behavior;
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn cancelled_count(&self) -> usize {
        self.state.lock().unwrap().cancelled
    }

    fn note_cancelled(&self) -> RefreshError {
        self.state.lock().unwrap().cancelled += 1;
        RefreshError::Cancelled
    }
}

#[async_trait]
impl QueryRunner for MockQueryRunner {
    fn runner_type(&self) -> &str {
        "mock"
    }

    async fn run_query(
        &self,
        query: &str,
        _principal: &Principal,
        cancel: CancellationToken,
    ) -> RefreshResult<RunnerOutput> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.executed.push(query.to_string());
            state.behavior.clone()
        };

        match behavior {
            RunnerBehavior::Succeed(data) => Ok(RunnerOutput::success(data)),
            RunnerBehavior::Fail(message) => Ok(RunnerOutput::failure(message)),
            RunnerBehavior::Delay(delay, data) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(RunnerOutput::success(data)),
                    _ = cancel.cancelled() => Err(self.note_cancelled()),
                }
            }
            RunnerBehavior::Hang => {
                cancel.cancelled().await;
                Err(self.note_cancelled())
            }
        }
    }

    fn should_annotate_query(&self) -> bool {
        self.annotate
    }

    fn supports_auto_limit(&self) -> bool {
        self.supports_auto_limit
    }

    fn apply_auto_limit(&self, query: &str, apply: bool) -> String {
        if self.supports_auto_limit && apply {
            format!("{} LIMIT 1000", query.trim_end().trim_end_matches(';'))
        } else {
            query.to_string()
        }
    }
}

/// 总是返回同一个 `MockQueryRunner` 的工厂
pub struct MockRunnerFactory {
    runner: MockQueryRunner,
}

impl MockRunnerFactory {
    pub fn new(runner: MockQueryRunner) -> Self {
        Self { runner }
    }
}

impl QueryRunnerFactory for MockRunnerFactory {
    fn runner_type(&self) -> &str {
        "mock"
    }

    fn configuration_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn create(&self, _options: &serde_json::Value) -> RefreshResult<Box<dyn QueryRunner>> {
        Ok(Box::new(self.runner.clone()))
    }
}

/// 记录告警评估请求
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertEvaluator {
    calls: Arc<Mutex<Vec<i64>>>,
    fail: bool,
}

impl RecordingAlertEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<i64> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_unstable();
        calls
    }
}

#[async_trait]
impl AlertEvaluator for RecordingAlertEvaluator {
    async fn check_alerts_for_query(&self, query_id: i64) -> RefreshResult<()> {
        self.calls.lock().unwrap().push(query_id);
        if self.fail {
            return Err(RefreshError::Internal("告警评估不可用".to_string()));
        }
        Ok(())
    }
}

/// 记录发出的摘要，可设置为投递失败
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    digests: Arc<Mutex<Vec<FailureDigest>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn digests(&self) -> Vec<FailureDigest> {
        self.digests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_digest(&self, digest: &FailureDigest) -> RefreshResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(RefreshError::Internal("通知通道不可用".to_string()));
        }
        self.digests.lock().unwrap().push(digest.clone());
        Ok(())
    }
}
