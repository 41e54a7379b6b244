//! 查询指纹
//!
//! 指纹由规范化后的查询文本、排序后的绑定参数以及自动LIMIT开关共同决定，
//! 作为去重锁与结果缓存的键。

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

use sha2::{Digest, Sha256};

pub struct QueryHasher;

impl QueryHasher {
    /// 计算查询指纹（64位十六进制SHA-256）
    ///
    /// 仅在注释、空白或大小写上不同的查询得到相同指纹；
    /// 参数值或自动LIMIT开关不同则指纹不同。
    pub fn hash(
        query_text: &str,
        parameters: &BTreeMap<String, serde_json::Value>,
        apply_auto_limit: bool,
    ) -> String {
        let normalized = Self::normalize(query_text);
        // BTreeMap 按键有序，序列化结果稳定
        let params = serde_json::to_string(parameters).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");
        hasher.update(params.as_bytes());
        hasher.update(b"\n");
        hasher.update(if apply_auto_limit { b"1" } else { b"0" });
        hex::encode(hasher.finalize())
    }

    /// 仅按文本计算指纹
    pub fn hash_text(query_text: &str) -> String {
        Self::hash(query_text, &BTreeMap::new(), false)
    }

    /// 去掉注释与全部空白并转为小写
    ///
    /// 引号内的内容原样保留，其中的 `--`、`/*` 不视为注释。
    pub fn normalize(query_text: &str) -> String {
        let mut normalized = String::with_capacity(query_text.len());
        let mut chars = query_text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\'' | '"' => {
                    normalized.push(c);
                    copy_quoted(&mut chars, c, &mut normalized);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for skipped in chars.by_ref() {
                        if skipped == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    skip_block_comment(&mut chars);
                }
                c if c.is_whitespace() => {}
                c => normalized.extend(c.to_lowercase()),
            }
        }
        normalized
    }
}

/// 复制到匹配的结束引号为止，连续两个引号视为转义
fn copy_quoted(chars: &mut Peekable<Chars<'_>>, quote: char, out: &mut String) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == quote {
            if chars.peek() == Some(&quote) {
                out.push(quote);
                chars.next();
            } else {
                return;
            }
        }
    }
}

/// 未闭合的块注释一直延续到文本末尾
fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            return;
        }
    }
}
