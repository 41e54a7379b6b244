use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub is_disabled: bool,
    /// 是否订阅定时查询失败邮件
    pub send_failure_emails: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub email: String,
    pub is_disabled: bool,
    pub group_ids: Vec<i64>,
}

/// 发起执行的身份，随作业序列化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActingUser {
    User(i64),
    ApiKey(String),
    Anonymous,
}

impl ActingUser {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            ActingUser::User(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_api_key(&self) -> bool {
        matches!(self, ActingUser::ApiKey(_))
    }
}

/// 执行器看到的实际身份
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    User(User),
    /// API Key 合成身份，权限范围限定为查询所在组织与数据源的用户组
    ApiKey {
        api_key: String,
        org_id: i64,
        group_ids: Vec<i64>,
    },
    Anonymous,
}

impl Principal {
    pub fn display_name(&self) -> String {
        match self {
            Principal::User(user) => user.email.clone(),
            Principal::ApiKey { .. } => "API Key".to_string(),
            Principal::Anonymous => "anonymous".to_string(),
        }
    }
}
