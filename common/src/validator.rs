//! 入力検証モジュール
//!
//! ネットワーク呼び出し前に、選択ファイルと補助選択（肌タイプ等）を
//! 受付ルールに照らして検証する。副作用なし。

use crate::types::SelectedFile;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 拡張子 → MIMEタイプ対応表
const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
];

const DEFAULT_EXTENSION: &str = "jpg";

/// 受付ルール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRules {
    /// 受け付けるMIMEタイプ（完全一致・大文字小文字を区別）
    pub accepted_mime_types: Vec<String>,
    /// 補助選択を1つ以上必須とするか
    pub require_aux_selection: bool,
    /// ファイルサイズ上限（バイト）
    pub max_file_size_bytes: Option<u64>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            accepted_mime_types: vec!["image/jpeg".into(), "image/png".into()],
            require_aux_selection: false,
            max_file_size_bytes: None,
        }
    }
}

/// 検証で拒否された理由
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("no file selected")]
    NoFile,

    #[error("unsupported file type: {mime_type}")]
    UnsupportedType { mime_type: String },

    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("select at least one option before submitting")]
    MissingAuxSelection,
}

/// ファイルのみを検証（選択時）
pub fn validate_file(file: Option<&SelectedFile>, rules: &ValidationRules) -> Result<(), Rejection> {
    let file = file.ok_or(Rejection::NoFile)?;

    if !rules.accepted_mime_types.iter().any(|m| m == &file.mime_type) {
        return Err(Rejection::UnsupportedType {
            mime_type: file.mime_type.clone(),
        });
    }

    if let Some(limit) = rules.max_file_size_bytes {
        if file.size() > limit {
            return Err(Rejection::FileTooLarge {
                size: file.size(),
                limit,
            });
        }
    }

    Ok(())
}

/// ファイルと補助選択を検証（送信時）
pub fn validate(
    file: Option<&SelectedFile>,
    aux_selections: &[String],
    rules: &ValidationRules,
) -> Result<(), Rejection> {
    validate_file(file, rules)?;

    if rules.require_aux_selection && aux_selections.iter().all(|s| s.trim().is_empty()) {
        return Err(Rejection::MissingAuxSelection);
    }

    Ok(())
}

/// 拡張子からMIMEタイプを取得
pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// ファイル名から小文字の拡張子を取得（なければ "jpg"）
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
