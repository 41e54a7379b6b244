//! `{{ name }}` 形式的查询参数替换

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{RefreshError, RefreshResult};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern")
});

/// 查询文本中引用的参数名
pub fn referenced_parameters(query_text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(query_text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// 用参数值替换占位符
///
/// 文本引用了但没有值（缺失或为 null）的参数会导致 `InvalidParameters`。
pub fn apply_parameters(
    query_text: &str,
    parameters: &BTreeMap<String, serde_json::Value>,
) -> RefreshResult<String> {
    let missing: Vec<String> = referenced_parameters(query_text)
        .into_iter()
        .filter(|name| render_value(parameters.get(name)).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(RefreshError::InvalidParameters(format!(
            "缺少参数值: {}",
            missing.join(", ")
        )));
    }

    let rendered = PLACEHOLDER.replace_all(query_text, |caps: &Captures| {
        render_value(parameters.get(&caps[1])).unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

fn render_value(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| render_value(Some(item)))
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_parameters() {
        let mut params = BTreeMap::new();
        params.insert("day".to_string(), json!("2024-05-01"));
        params.insert("limit".to_string(), json!(10));
        let text = "select * from t where day = '{{day}}' limit {{ limit }}";
        assert_eq!(
            apply_parameters(text, &params).unwrap(),
            "select * from t where day = '2024-05-01' limit 10"
        );
    }

    #[test]
    fn test_missing_parameter_is_rejected() {
        let mut params = BTreeMap::new();
        params.insert("day".to_string(), serde_json::Value::Null);
        let err = apply_parameters("select {{ day }}, {{ other }}", &params).unwrap_err();
        match err {
            RefreshError::InvalidParameters(msg) => {
                assert!(msg.contains("day"));
                assert!(msg.contains("other"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        let text = "select 1";
        assert_eq!(apply_parameters(text, &BTreeMap::new()).unwrap(), text);
        assert!(referenced_parameters(text).is_empty());
    }

    #[test]
    fn test_array_values_are_joined() {
        let mut params = BTreeMap::new();
        params.insert("ids".to_string(), json!([1, 2, 3]));
        assert_eq!(
            apply_parameters("where id in ({{ ids }})", &params).unwrap(),
            "where id in (1,2,3)"
        );
    }
}
