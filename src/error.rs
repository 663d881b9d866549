use dermavision_common::Rejection;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DermaError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("入力エラー: {0}")]
    Validation(#[from] Rejection),

    #[error("アップロードURLの取得に失敗: {message}")]
    Presign { status: Option<u16>, message: String },

    #[error("ファイルのアップロードに失敗: {message}")]
    Upload { status: Option<u16>, message: String },

    #[error("解析結果はまだ作成されていません (HTTP {status})")]
    PollSoftMiss { status: u16 },

    #[error("解析結果の取得中に通信エラー: {0}")]
    PollTransport(String),

    #[error("解析結果の形式が不正: {0}")]
    MalformedResult(String),

    #[error("{attempts}回確認しましたが解析結果が見つかりません")]
    GaveUp { attempts: u32 },

    #[error("HTTPクライアントエラー: {0}")]
    Transport(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] dermavision_common::Error),
}

/// 表示層へ渡す機械可読なエラー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Presign,
    Upload,
    PollSoftMiss,
    PollTransport,
    MalformedResult,
    GiveUp,
    Config,
    /// HTTPクライアントの初期化失敗
    Transport,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Presign => "presign",
            ErrorKind::Upload => "upload",
            ErrorKind::PollSoftMiss => "poll_soft_miss",
            ErrorKind::PollTransport => "poll_transport",
            ErrorKind::MalformedResult => "malformed_result",
            ErrorKind::GiveUp => "give_up",
            ErrorKind::Config => "config",
            ErrorKind::Transport => "transport",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DermaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DermaError::Config(_) => ErrorKind::Config,
            DermaError::Transport(_) => ErrorKind::Transport,
            DermaError::Validation(_) => ErrorKind::Validation,
            DermaError::Presign { .. } => ErrorKind::Presign,
            DermaError::Upload { .. } => ErrorKind::Upload,
            DermaError::PollSoftMiss { .. } => ErrorKind::PollSoftMiss,
            DermaError::PollTransport(_) => ErrorKind::PollTransport,
            DermaError::MalformedResult(_) => ErrorKind::MalformedResult,
            DermaError::GaveUp { .. } => ErrorKind::GiveUp,
            DermaError::JsonParse(_) | DermaError::Io(_) => ErrorKind::Io,
            DermaError::Common(dermavision_common::Error::Parse(_)) => ErrorKind::MalformedResult,
            DermaError::Common(dermavision_common::Error::Config(_)) => ErrorKind::Config,
            DermaError::Common(_) => ErrorKind::Io,
        }
    }

    /// HTTPステータス（あれば）
    pub fn status(&self) -> Option<u16> {
        match self {
            DermaError::Presign { status, .. } | DermaError::Upload { status, .. } => *status,
            DermaError::PollSoftMiss { status } => Some(*status),
            _ => None,
        }
    }

    /// 表示層へ渡すスナップショット
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            status: self.status(),
        }
    }
}

/// エラーの表示用スナップショット（人が読むメッセージ + 種別）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

pub type Result<T> = std::result::Result<T, DermaError>;
