use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument};

use refresh_core::{
    models::{DataSource, Query},
    traits::{DataSourceRepository, OrganizationRepository, QueryRepository, ResultStore},
    RefreshError, RefreshResult,
};
use refresh_infrastructure::{ScheduledExecutionTracker, StructuredLogger};

use crate::schedule_policy::{should_schedule_next, ScheduleSpec};

/// 到期的查询及其数据源
#[derive(Debug, Clone)]
pub struct OutdatedQuery {
    pub query: Query,
    pub data_source: DataSource,
}

/// 到期查询扫描
///
/// 每轮扫描全部设置了调度的查询，跳过停用的调度、已过截止日期的调度、
/// 停用组织的查询、没有数据源或数据源已暂停的查询。
/// 单个查询加载失败只影响该查询。同一 (指纹, 数据源) 只返回一个查询。
pub struct OutdatedQueryFinder {
    queries: Arc<dyn QueryRepository>,
    data_sources: Arc<dyn DataSourceRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    results: Arc<dyn ResultStore>,
    max_backoff_minutes: i64,
}

/// 单轮扫描内的查找缓存
#[derive(Default)]
struct PassCache {
    org_disabled: HashMap<i64, bool>,
    data_sources: HashMap<i64, Option<DataSource>>,
}

impl OutdatedQueryFinder {
    pub fn new(
        queries: Arc<dyn QueryRepository>,
        data_sources: Arc<dyn DataSourceRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        results: Arc<dyn ResultStore>,
        max_backoff_minutes: i64,
    ) -> Self {
        Self {
            queries,
            data_sources,
            organizations,
            results,
            max_backoff_minutes,
        }
    }

    /// 返回本轮到期的查询
    ///
    /// `tracker` 须由调用方在扫描前刷新。单个查询的调度无法计算时停用其调度并继续扫描。
    #[instrument(skip(self, tracker))]
    pub async fn find_outdated(
        &self,
        tracker: &ScheduledExecutionTracker,
        now: DateTime<Utc>,
    ) -> RefreshResult<Vec<OutdatedQuery>> {
        let scheduled = self.queries.get_scheduled().await?;
        let mut cache = PassCache::default();
        let mut outdated: BTreeMap<(String, i64), OutdatedQuery> = BTreeMap::new();

        for query in scheduled {
            let data_source = match self.eligible_data_source(&query, now, &mut cache).await {
                Ok(Some(data_source)) => data_source,
                Ok(None) => continue,
                Err(e) => {
                    error!("加载查询 {} 的组织或数据源失败，本轮跳过: {}", query.id, e);
                    continue;
                }
            };

            match self.is_due(&query, tracker, now).await {
                Ok(true) => {
                    let key = (query.query_hash.clone(), data_source.id);
                    outdated
                        .entry(key)
                        .or_insert(OutdatedQuery { query, data_source });
                }
                Ok(false) => {}
                Err(e @ RefreshError::ScheduleEvaluation { .. }) => {
                    self.disable_schedule(&query, &e).await
                }
                Err(e) => error!("检查查询 {} 是否到期时出错: {}", query.id, e),
            }
        }

        let mut due: Vec<OutdatedQuery> = outdated.into_values().collect();
        due.sort_by_key(|item| item.query.id);
        debug!("本轮到期查询 {} 个", due.len());
        Ok(due)
    }

    async fn eligible_data_source(
        &self,
        query: &Query,
        now: DateTime<Utc>,
        cache: &mut PassCache,
    ) -> RefreshResult<Option<DataSource>> {
        let Some(schedule) = &query.schedule else {
            return Ok(None);
        };
        if schedule.disabled || query.is_archived {
            return Ok(None);
        }
        if schedule.is_expired(now.date_naive()) {
            return Ok(None);
        }
        if self.org_disabled(query.org_id, cache).await? {
            debug!("查询 {} 所属组织已停用，跳过", query.id);
            return Ok(None);
        }

        let Some(data_source_id) = query.data_source_id else {
            debug!("查询 {} 没有数据源，跳过", query.id);
            return Ok(None);
        };
        let data_source = match cache.data_sources.get(&data_source_id) {
            Some(cached) => cached.clone(),
            None => {
                let loaded = self.data_sources.get_by_id(data_source_id).await?;
                cache.data_sources.insert(data_source_id, loaded.clone());
                loaded
            }
        };

        match data_source {
            Some(ds) if ds.paused => {
                debug!(
                    "数据源 {} 已暂停 ({}), 跳过查询 {}",
                    ds.id,
                    ds.pause_reason.as_deref().unwrap_or("未说明原因"),
                    query.id
                );
                Ok(None)
            }
            Some(ds) => Ok(Some(ds)),
            None => {
                debug!("查询 {} 的数据源 {} 不存在，跳过", query.id, data_source_id);
                Ok(None)
            }
        }
    }

    async fn org_disabled(&self, org_id: i64, cache: &mut PassCache) -> RefreshResult<bool> {
        if let Some(disabled) = cache.org_disabled.get(&org_id) {
            return Ok(*disabled);
        }
        let disabled = self
            .organizations
            .get_by_id(org_id)
            .await?
            .map_or(true, |org| org.is_disabled);
        cache.org_disabled.insert(org_id, disabled);
        Ok(disabled)
    }

    /// 上次执行时间取执行记录与最新结果时间中较晚者，都没有时取 `now`
    async fn last_execution(
        &self,
        query: &Query,
        tracker: &ScheduledExecutionTracker,
        now: DateTime<Utc>,
    ) -> RefreshResult<DateTime<Utc>> {
        let retrieved_at = match query.latest_query_data_id {
            Some(result_id) => self
                .results
                .get_by_id(result_id)
                .await?
                .map(|result| result.retrieved_at),
            None => None,
        };
        Ok(tracker
            .get(query.id)
            .into_iter()
            .chain(retrieved_at)
            .max()
            .unwrap_or(now))
    }

    async fn is_due(
        &self,
        query: &Query,
        tracker: &ScheduledExecutionTracker,
        now: DateTime<Utc>,
    ) -> RefreshResult<bool> {
        let Some(schedule) = &query.schedule else {
            return Ok(false);
        };
        // 调度列无法解析时映射为没有间隔的调度
        let Some(interval_seconds) = schedule.interval else {
            return Err(RefreshError::ScheduleEvaluation {
                query_id: query.id,
                reason: "调度缺少执行间隔".to_string(),
            });
        };

        let previous = self.last_execution(query, tracker, now).await?;
        let spec = ScheduleSpec {
            interval_seconds,
            time: schedule.time.as_deref(),
            day_of_week: schedule.day_of_week.as_deref(),
            failures: query.schedule_failures,
        };

        should_schedule_next(previous, now, &spec, self.max_backoff_minutes).map_err(|e| {
            RefreshError::ScheduleEvaluation {
                query_id: query.id,
                reason: e.to_string(),
            }
        })
    }

    async fn disable_schedule(&self, query: &Query, cause: &RefreshError) {
        let reason = format!(
            "无法判断查询 {} 是否到期: {}，已停用该查询的调度",
            query.id, cause
        );
        StructuredLogger::log_schedule_disabled(query.id, &reason);
        if let Err(e) = self.queries.disable_schedule(query.id).await {
            error!("停用查询 {} 的调度失败: {}", query.id, e);
        }
    }
}
