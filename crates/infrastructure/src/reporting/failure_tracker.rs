use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use refresh_core::{
    config::FailureReportsConfig,
    models::{DigestEntry, FailureDigest, FailureRecord, Query},
    traits::{Notifier, OrganizationRepository, QueryRepository, SharedStore, UserRepository},
    RefreshResult,
};

use crate::observability::{MetricsCollector, StructuredLogger};

const AGGREGATION_PREFIX: &str = "aggregated_failures:";

/// 用户的失败聚合列表键
pub fn aggregation_key(user_id: i64) -> String {
    format!("{}{}", AGGREGATION_PREFIX, user_id)
}

/// 定时查询失败追踪
///
/// 每次失败都会累加计数；只有组织订阅了失败邮件、查询所有者账号可用、
/// 且计数未达到上限时，才把失败记录推入所有者的聚合列表。
/// `send_aggregated_errors` 定期把每个用户的列表合并为一封摘要并清空列表。
pub struct FailureTracker {
    queries: Arc<dyn QueryRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    users: Arc<dyn UserRepository>,
    store: Arc<dyn SharedStore>,
    notifier: Arc<dyn Notifier>,
    config: FailureReportsConfig,
    metrics: MetricsCollector,
}

impl FailureTracker {
    pub fn new(
        queries: Arc<dyn QueryRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        users: Arc<dyn UserRepository>,
        store: Arc<dyn SharedStore>,
        notifier: Arc<dyn Notifier>,
        config: FailureReportsConfig,
    ) -> Self {
        Self {
            queries,
            organizations,
            users,
            store,
            notifier,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn max_failure_reports(&self) -> i32 {
        self.config.max_failure_reports_per_query
    }

    /// 记录一次失败，返回新的失败计数
    #[instrument(skip(self, query, message), fields(query_id = query.id))]
    pub async fn track_failure(&self, query: &Query, message: &str) -> RefreshResult<i32> {
        debug!("定时查询失败: {}", message);
        let schedule_failures = self.queries.increment_schedule_failures(query.id).await?;

        let reported = self
            .notify_of_failure(query, message, schedule_failures)
            .await
            .unwrap_or_else(|e| {
                error!("记录查询 {} 的失败通知失败: {}", query.id, e);
                false
            });

        StructuredLogger::log_failure_tracked(query.id, schedule_failures, reported);
        Ok(schedule_failures)
    }

    async fn notify_of_failure(
        &self,
        query: &Query,
        message: &str,
        schedule_failures: i32,
    ) -> RefreshResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        if schedule_failures >= self.config.max_failure_reports_per_query {
            debug!(
                "查询 {} 失败次数 {} 已达上限，不再报告",
                query.id, schedule_failures
            );
            return Ok(false);
        }

        let subscribed = self
            .organizations
            .get_by_id(query.org_id)
            .await?
            .is_some_and(|org| org.send_failure_emails);
        if !subscribed {
            return Ok(false);
        }

        let Some(owner) = self.users.get_by_id(query.user_id).await? else {
            return Ok(false);
        };
        if owner.is_disabled {
            return Ok(false);
        }

        let record = FailureRecord {
            id: query.id,
            name: query.name.clone(),
            message: message.to_string(),
            schedule_failures,
            failed_at: Utc::now().format("%B %d, %Y %I:%M%p UTC").to_string(),
        };
        self.store
            .list_push(&aggregation_key(owner.id), &serde_json::to_string(&record)?)
            .await?;
        Ok(true)
    }

    /// 失败次数接近上限时附加的提示
    pub fn comment_for(&self, record: &FailureRecord) -> Option<String> {
        let max = self.config.max_failure_reports_per_query;
        if f64::from(record.schedule_failures) > f64::from(max) * 0.75 {
            Some(format!(
                "注意：该查询已累计失败 {} 次，超过 {} 次后将不再报告。",
                record.schedule_failures, max
            ))
        } else {
            None
        }
    }

    /// 为所有有待发送失败记录的用户发送摘要，返回发送数量
    #[instrument(skip(self))]
    pub async fn send_aggregated_errors(&self) -> RefreshResult<usize> {
        let keys = self
            .store
            .scan_keys(&format!("{}*", AGGREGATION_PREFIX))
            .await?;
        let mut sent = 0;

        for key in keys {
            let Some(user_id) = key
                .strip_prefix(AGGREGATION_PREFIX)
                .and_then(|id| id.parse::<i64>().ok())
            else {
                warn!("忽略无法识别的聚合键: {}", key);
                continue;
            };

            match self.send_failure_report(user_id).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => error!("向用户 {} 发送失败摘要出错: {}", user_id, e),
            }
        }

        if sent > 0 {
            info!("已发送 {} 份失败摘要", sent);
        }
        Ok(sent)
    }

    /// 合并并发送单个用户的摘要
    ///
    /// 列表在发送前被原子取出；投递失败时按原顺序放回，下一轮重试。
    pub async fn send_failure_report(&self, user_id: i64) -> RefreshResult<bool> {
        let key = aggregation_key(user_id);
        let raw = self.store.list_drain(&key).await?;
        if raw.is_empty() {
            return Ok(false);
        }

        let user = match self.users.get_by_id(user_id).await? {
            Some(user) if !user.is_disabled => user,
            _ => {
                debug!("用户 {} 不存在或已停用，丢弃 {} 条失败记录", user_id, raw.len());
                return Ok(false);
            }
        };

        // 列表头部是最新的记录，翻转为时间顺序
        let records: Vec<FailureRecord> = raw
            .iter()
            .rev()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("忽略无法解析的失败记录: {}", e);
                    None
                }
            })
            .collect();
        if records.is_empty() {
            return Ok(false);
        }

        let failures = self.aggregate(&records);
        let subject = format!("有 {} 个定时查询执行失败", failures.len());
        let digest = FailureDigest {
            user_id: user.id,
            email: user.email.clone(),
            subject,
            body: self.render_body(&failures),
            failures,
        };

        if let Err(e) = self.notifier.send_digest(&digest).await {
            for item in raw.iter().rev() {
                self.store.list_push(&key, item).await?;
            }
            return Err(e);
        }

        StructuredLogger::log_digest_sent(user_id, digest.failures.len(), records.len());
        self.metrics.record_failure_digest();
        Ok(true)
    }

    /// 按 (查询ID, 错误信息) 去重
    ///
    /// 顺序取首次出现的位置，内容取最后一次出现的记录，`failure_count` 为出现次数。
    pub fn aggregate(&self, records: &[FailureRecord]) -> Vec<DigestEntry> {
        let mut order: Vec<(i64, String)> = Vec::new();
        let mut latest: HashMap<(i64, String), &FailureRecord> = HashMap::new();
        let mut occurrences: HashMap<(i64, String), usize> = HashMap::new();

        for record in records {
            let k = (record.id, record.message.clone());
            if !latest.contains_key(&k) {
                order.push(k.clone());
            }
            latest.insert(k.clone(), record);
            *occurrences.entry(k).or_insert(0) += 1;
        }

        order
            .into_iter()
            .filter_map(|k| {
                let record = latest.get(&k)?;
                Some(DigestEntry {
                    query_id: record.id,
                    name: record.name.clone(),
                    failed_at: record.failed_at.clone(),
                    failure_reason: record.message.clone(),
                    failure_count: occurrences.get(&k).copied().unwrap_or(1),
                    comment: self.comment_for(record),
                })
            })
            .collect()
    }

    fn render_body(&self, failures: &[DigestEntry]) -> String {
        let base_url = self.config.base_url.trim_end_matches('/');
        let mut body = String::from("以下定时查询执行失败：\n\n");
        for entry in failures {
            body.push_str(&format!(
                "- {} ({}/queries/{})\n  最近失败: {}，共 {} 次\n  原因: {}\n",
                entry.name, base_url, entry.query_id, entry.failed_at, entry.failure_count, entry.failure_reason
            ));
            if let Some(comment) = &entry.comment {
                body.push_str(&format!("  {}\n", comment));
            }
        }
        body
    }
}
