//! ワークフローの型定義
//!
//! CLIとテストで共有される型:
//! - SelectedFile: ユーザーが選択した画像ファイル
//! - UploadRequest: presignエンドポイントへ送る要求
//! - PresignedTarget: presign応答を正規化したアップロード先
//! - ResultLocator: 解析結果オブジェクトの取得先
//! - AnalysisResult: 解析結果（内部モデル）

use crate::validator::{file_extension, mime_type_for_extension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 拡張子からMIMEタイプを判定できない場合の値
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// ユーザーが選択した画像ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: String,
    /// 宣言されたMIMEタイプ（検証対象）
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    /// ファイル名の拡張子からMIMEタイプを決定して作成
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type_for_extension(&file_extension(&file_name))
            .unwrap_or(UNKNOWN_MIME_TYPE)
            .to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// MIMEタイプを明示して作成
    pub fn with_mime_type(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// 小文字の拡張子（なければ "jpg"）
    pub fn extension(&self) -> String {
        file_extension(&self.file_name)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// presignエンドポイントへの要求
///
/// JSONボディ形式では `extra_fields` がトップレベルに展開される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub file_type: String,
    pub session_id: String,
    #[serde(flatten)]
    pub extra_fields: BTreeMap<String, String>,
}

/// アップロード方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    /// multipart/form-data（fields → file の順）
    Post,
    /// 生ボディ + 署名済みヘッダー
    Put,
}

impl UploadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMethod::Post => "POST",
            UploadMethod::Put => "PUT",
        }
    }
}

impl std::str::FromStr for UploadMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POST" => Ok(UploadMethod::Post),
            "PUT" => Ok(UploadMethod::Put),
            _ => Err(format!("Unknown upload method: {}. Use POST or PUT", s)),
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 正規化済みのアップロード先
///
/// `fields` と `required_headers` はサーバーが返した順序を保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedTarget {
    pub method: UploadMethod,
    pub url: String,
    /// POST時のフォームフィールド
    pub fields: Vec<(String, String)>,
    /// PUT時に付与するヘッダー（署名対象なので値は改変しない）
    pub required_headers: Vec<(String, String)>,
    pub object_key: String,
}

/// 解析結果オブジェクトの取得先
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultLocator {
    pub url: String,
}

impl fmt::Display for ResultLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// おすすめ商品
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub problem: String,
    pub name: String,
    pub brand: String,
    pub price: f64,
    pub image_url: String,
    pub ingredients: Vec<String>,
}

/// 解析結果（内部モデル）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub labels: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}
