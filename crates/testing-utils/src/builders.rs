//! Test data builders

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use refresh_core::models::{
    ActingUser, DataSource, ExecutionJob, JobMetadata, JobRecord, JobStatus, Organization, Query,
    QueryOptions, Schedule, User,
};

pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            query: Query {
                id,
                org_id: 1,
                user_id: 1,
                name: format!("query {}", id),
                query_text: "SELECT 1".to_string(),
                query_hash: String::new(),
                data_source_id: Some(1),
                schedule: None,
                schedule_failures: 0,
                latest_query_data_id: None,
                options: QueryOptions::default(),
                is_archived: false,
                updated_at: Utc::now(),
            },
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.query.query_text = text.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.query.name = name.to_string();
        self
    }

    pub fn with_org(mut self, org_id: i64) -> Self {
        self.query.org_id = org_id;
        self
    }

    pub fn with_owner(mut self, user_id: i64) -> Self {
        self.query.user_id = user_id;
        self
    }

    pub fn with_data_source(mut self, data_source_id: i64) -> Self {
        self.query.data_source_id = Some(data_source_id);
        self
    }

    pub fn without_data_source(mut self) -> Self {
        self.query.data_source_id = None;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.query.schedule = Some(schedule);
        self
    }

    pub fn every(self, interval_seconds: i64) -> Self {
        self.with_schedule(Schedule::every(interval_seconds))
    }

    pub fn until(mut self, until: NaiveDate) -> Self {
        let mut schedule = self.query.schedule.take().unwrap_or_default();
        schedule.until = Some(until);
        self.query.schedule = Some(schedule);
        self
    }

    pub fn with_failures(mut self, failures: i32) -> Self {
        self.query.schedule_failures = failures;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: serde_json::Value) -> Self {
        self.query.options.parameters.insert(name.to_string(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        self.query.options.parameters = parameters;
        self
    }

    pub fn with_auto_limit(mut self, apply: bool) -> Self {
        self.query.options.apply_auto_limit = apply;
        self
    }

    pub fn with_latest_result(mut self, result_id: i64) -> Self {
        self.query.latest_query_data_id = Some(result_id);
        self
    }

    pub fn archived(mut self) -> Self {
        self.query.is_archived = true;
        self
    }

    pub fn build(mut self) -> Query {
        self.query.query_hash = self.query.compute_hash();
        self.query
    }
}

pub struct DataSourceBuilder {
    data_source: DataSource,
}

impl DataSourceBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            data_source: DataSource {
                id,
                org_id: 1,
                name: format!("data source {}", id),
                runner_type: "mock".to_string(),
                options: serde_json::json!({}),
                queue_name: "queries".to_string(),
                scheduled_queue_name: "scheduled_queries".to_string(),
                paused: false,
                pause_reason: None,
                group_ids: vec![1],
            },
        }
    }

    pub fn with_runner_type(mut self, runner_type: &str) -> Self {
        self.data_source.runner_type = runner_type.to_string();
        self
    }

    pub fn with_queues(mut self, queue_name: &str, scheduled_queue_name: &str) -> Self {
        self.data_source.queue_name = queue_name.to_string();
        self.data_source.scheduled_queue_name = scheduled_queue_name.to_string();
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.data_source.options = options;
        self
    }

    pub fn with_groups(mut self, group_ids: Vec<i64>) -> Self {
        self.data_source.group_ids = group_ids;
        self
    }

    pub fn paused(mut self, reason: &str) -> Self {
        self.data_source.paused = true;
        self.data_source.pause_reason = Some(reason.to_string());
        self
    }

    pub fn build(self) -> DataSource {
        self.data_source
    }
}

pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            user: User {
                id,
                org_id: 1,
                name: format!("user {}", id),
                email: format!("user{}@example.com", id),
                is_disabled: false,
                group_ids: vec![1],
            },
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.user.email = email.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.user.is_disabled = true;
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

pub struct OrganizationBuilder {
    organization: Organization,
}

impl OrganizationBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            organization: Organization {
                id,
                name: format!("org {}", id),
                is_disabled: false,
                send_failure_emails: true,
            },
        }
    }

    pub fn disabled(mut self) -> Self {
        self.organization.is_disabled = true;
        self
    }

    pub fn without_failure_emails(mut self) -> Self {
        self.organization.send_failure_emails = false;
        self
    }

    pub fn build(self) -> Organization {
        self.organization
    }
}

pub struct JobBuilder {
    job: ExecutionJob,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: ExecutionJob {
                id: id.to_string(),
                query_text: "SELECT 1".to_string(),
                query_hash: refresh_core::QueryHasher::hash_text("SELECT 1"),
                parameters: BTreeMap::new(),
                apply_auto_limit: false,
                data_source_id: 1,
                acting_user: ActingUser::User(1),
                scheduled_query_id: None,
                time_limit_seconds: 60,
                metadata: JobMetadata {
                    org_id: 1,
                    data_source_id: 1,
                    enqueued_at: Utc::now(),
                    scheduled: false,
                    query_id: None,
                    user_id: Some(1),
                    username: Some("user1@example.com".to_string()),
                    queue: "queries".to_string(),
                },
            },
        }
    }

    pub fn for_query(mut self, query: &Query) -> Self {
        self.job.query_text = query.query_text.clone();
        self.job.query_hash = query.query_hash.clone();
        self.job.parameters = query.options.parameters.clone();
        self.job.apply_auto_limit = query.options.apply_auto_limit;
        self.job.data_source_id = query.data_source_id.unwrap_or(1);
        self.job.metadata.data_source_id = self.job.data_source_id;
        self.job.metadata.org_id = query.org_id;
        self.job.metadata.query_id = Some(query.id);
        self
    }

    pub fn with_hash(mut self, data_source_id: i64, query_hash: &str) -> Self {
        self.job.data_source_id = data_source_id;
        self.job.metadata.data_source_id = data_source_id;
        self.job.query_hash = query_hash.to_string();
        self
    }

    pub fn scheduled(mut self, query_id: i64) -> Self {
        self.job.scheduled_query_id = Some(query_id);
        self.job.metadata.scheduled = true;
        self.job.metadata.query_id = Some(query_id);
        self.job.metadata.queue = "scheduled_queries".to_string();
        self
    }

    pub fn with_acting_user(mut self, acting_user: ActingUser) -> Self {
        self.job.metadata.user_id = acting_user.user_id();
        self.job.acting_user = acting_user;
        self
    }

    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.job.time_limit_seconds = seconds;
        self
    }

    pub fn build(self) -> ExecutionJob {
        self.job
    }

    pub fn record(self) -> JobRecord {
        JobRecord::new(self.job)
    }

    pub fn record_with_status(self, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(self.job);
        record.update_status(status);
        record
    }
}
