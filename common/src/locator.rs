//! 解析結果オブジェクトの取得先導出
//!
//! アップロードしたオブジェクトキーから、解析パイプラインが最終結果を
//! 書き出すキーを決定する。I/Oを伴わない純粋関数。
//!
//! 例: `uploads/u1/img.jpg` → `recommendations/u1/img.jpg_final.json`

use crate::types::ResultLocator;
use serde::{Deserialize, Serialize};

/// プレフィックス書き換え規則
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixRewrite {
    pub source_prefix: String,
    pub result_prefix: String,
}

impl PrefixRewrite {
    pub fn new(source_prefix: impl Into<String>, result_prefix: impl Into<String>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            result_prefix: result_prefix.into(),
        }
    }
}

/// 結果キーの導出規則
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultKeyRules {
    /// 先頭から順に試し、最初に一致したものを使う
    pub prefix_rewrites: Vec<PrefixRewrite>,
    pub result_suffix: String,
}

impl Default for ResultKeyRules {
    fn default() -> Self {
        Self {
            prefix_rewrites: vec![PrefixRewrite::new("uploads/", "recommendations/")],
            result_suffix: "_final.json".into(),
        }
    }
}

impl ResultKeyRules {
    /// オブジェクトキーを結果キーへ変換
    ///
    /// どの規則にも一致しない場合はキーをそのまま使い、サフィックスだけ付ける。
    pub fn result_key(&self, object_key: &str) -> String {
        let rewritten = self
            .prefix_rewrites
            .iter()
            .find_map(|rule| {
                object_key
                    .strip_prefix(rule.source_prefix.as_str())
                    .map(|rest| format!("{}{}", rule.result_prefix, rest))
            })
            .unwrap_or_else(|| object_key.to_string());

        format!("{}{}", rewritten, self.result_suffix)
    }

    /// 規則に一致するプレフィックスがあるか
    pub fn matches(&self, object_key: &str) -> bool {
        self.prefix_rewrites
            .iter()
            .any(|rule| object_key.starts_with(rule.source_prefix.as_str()))
    }
}

/// 結果オブジェクトのURLを導出
///
/// `target_host` はバケットのベースURL（例: `https://bucket.s3.amazonaws.com`）。
/// 空の場合は結果キーをそのまま返す。
pub fn derive_result_locator(
    object_key: &str,
    target_host: &str,
    rules: &ResultKeyRules,
) -> ResultLocator {
    let key = rules.result_key(object_key);
    let host = target_host.trim_end_matches('/');

    let url = if host.is_empty() {
        key
    } else {
        format!("{}/{}", host, key.trim_start_matches('/'))
    };

    ResultLocator { url }
}
