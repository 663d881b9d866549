//! ラベル翻訳モジュール
//!
//! 解析パイプラインが返す英語ラベル（`Acne`, `Dark-Spots` 等）を
//! 表示用の語彙に置き換える。

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ラベル翻訳表
///
/// 未登録のラベルはそのまま返す（捨てない）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleMap {
    labels: BTreeMap<String, String>,
}

impl LocaleMap {
    /// 組み込みプリセットを取得
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "th" | "thai" | "ไทย" => Some(Self::thai_preset()),
            "raw" | "none" | "en" => Some(Self::default()),
            _ => None,
        }
    }

    /// JSONファイルから読み込み
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// JSON文字列から読み込み（`{"Acne": "สิว", ...}`）
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Self = serde_json::from_str(json)?;
        Ok(map)
    }

    /// タイ語プリセット
    fn thai_preset() -> Self {
        let mut map = Self::default();

        map.insert("Acne", "สิว");
        map.insert("Blackheads", "สิวหัวดำ");
        map.insert("Whiteheads", "สิวหัวขาว");
        map.insert("Oily-Skin", "ผิวมัน");
        map.insert("Enlarged-Pores", "รูขุมขนกว้าง");
        // パイプライン側の綴り揺れ
        map.insert("Englarged-Pores", "รูขุมขนกว้าง");
        map.insert("Wrinkles", "ริ้วรอย");
        map.insert("Dark-Spots", "จุดด่างดำ");
        map.insert("Skin-Redness", "รอยแดง");
        map.insert("Redness", "รอยแดง");
        map.insert("Dry-Skin", "ผิวแห้ง");
        map.insert("Eyebags", "ถุงใต้ตา");
        map.insert("wrinkles-acne-pores", "ปัญหาริ้วรอย สิว และรูขุมขน");

        map
    }

    pub fn insert(&mut self, raw: impl Into<String>, display: impl Into<String>) {
        self.labels.insert(raw.into(), display.into());
    }

    /// ラベルを翻訳（完全一致のみ）
    pub fn translate<'a>(&'a self, raw: &'a str) -> &'a str {
        self.labels.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.labels.contains_key(raw)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
