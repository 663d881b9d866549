//! presignクライアント
//!
//! バックエンドから短時間有効なアップロード先を取得する。
//! 応答は2種類の形式があり、どちらもここで `PresignedTarget` に正規化する:
//! - `{ "upload": { "url", "fields", "method"? }, "key" }`（S3 presigned POST）
//! - `{ "uploadURL", "key", "bucket"?, "requiredHeaders"? }`（presigned PUT）

use crate::error::{DermaError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody};
use dermavision_common::{PresignedTarget, UploadMethod, UploadRequest, file_extension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// エラー本文を表示用に切り詰める長さ
const MAX_ERROR_BODY_CHARS: usize = 300;

/// presign要求の送り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresignMode {
    /// `GET <endpoint>?ext=<拡張子>[&userId=<id>]`
    #[default]
    Query,
    /// `POST <endpoint>` + JSONボディ（fileName, fileType, sessionId, 補助フィールド）
    Json,
}

impl std::str::FromStr for PresignMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query" | "get" => Ok(PresignMode::Query),
            "json" | "post" => Ok(PresignMode::Json),
            _ => Err(format!("Unknown presign mode: {}. Use query or json", s)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PresignResponse {
    Form(FormPresign),
    Direct(DirectPresign),
}

#[derive(Debug, Deserialize)]
struct FormPresign {
    upload: FormUpload,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormUpload {
    url: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectPresign {
    #[serde(rename = "uploadURL", alias = "uploadUrl")]
    upload_url: String,
    key: String,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    required_headers: Map<String, Value>,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_to_pairs(map: &Map<String, Value>) -> Vec<(String, String)> {
    map.iter().map(|(k, v)| (k.clone(), value_to_string(v))).collect()
}

/// presign応答を正規化
pub fn normalize_presign_response(body: &str) -> Result<PresignedTarget> {
    let response: PresignResponse = serde_json::from_str(body).map_err(|e| DermaError::Presign {
        status: None,
        message: format!("presign応答の形式が不正です: {}", e),
    })?;

    match response {
        PresignResponse::Form(form) => {
            let method = match form.upload.method.as_deref() {
                Some(m) => m.parse::<UploadMethod>().map_err(|e| DermaError::Presign {
                    status: None,
                    message: e,
                })?,
                None => UploadMethod::Post,
            };
            let pairs = map_to_pairs(&form.upload.fields);

            // トップレベルにkeyがなければフォームフィールドのkeyを使う
            let object_key = form
                .key
                .filter(|k| !k.is_empty())
                .or_else(|| form.upload.fields.get("key").map(value_to_string))
                .ok_or_else(|| DermaError::Presign {
                    status: None,
                    message: "presign応答にオブジェクトキーがありません".into(),
                })?;

            let (fields, required_headers) = match method {
                UploadMethod::Post => (pairs, Vec::new()),
                UploadMethod::Put => (Vec::new(), pairs),
            };

            Ok(PresignedTarget {
                method,
                url: form.upload.url,
                fields,
                required_headers,
                object_key,
            })
        }
        PresignResponse::Direct(direct) => {
            if let Some(bucket) = &direct.bucket {
                tracing::debug!(bucket = %bucket, key = %direct.key, "presigned PUT target");
            }
            Ok(PresignedTarget {
                method: UploadMethod::Put,
                url: direct.upload_url,
                fields: Vec::new(),
                required_headers: map_to_pairs(&direct.required_headers),
                object_key: direct.key,
            })
        }
    }
}

/// 失敗応答から表示用メッセージを取り出す
///
/// `{"error": "...", "detail": "..."}` 形式ならその内容、そうでなければ本文。
pub fn error_message(response: &HttpResponse) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&response.body) {
        if let Some(error) = obj.get("error").map(value_to_string) {
            return match obj.get("detail").map(value_to_string) {
                Some(detail) => format!("HTTP {}: {} ({})", response.status, error, detail),
                None => format!("HTTP {}: {}", response.status, error),
            };
        }
    }

    let body = response.body.trim();
    if body.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("HTTP {}: {}", response.status, truncated)
    }
}

pub struct PresignClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    mode: PresignMode,
    user_id: Option<String>,
}

impl PresignClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: impl Into<String>, mode: PresignMode) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            mode,
            user_id: None,
        }
    }

    /// クエリ形式で `userId` を送る
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn build_request(&self, request: &UploadRequest) -> Result<HttpRequest> {
        match self.mode {
            PresignMode::Query => {
                let mut http = HttpRequest::get(&self.endpoint);
                if let Some(user_id) = &self.user_id {
                    http.query.push(("userId".into(), user_id.trim().to_string()));
                }
                http.query.push(("ext".into(), file_extension(&request.file_name)));
                Ok(http)
            }
            PresignMode::Json => {
                let mut http = HttpRequest::get(&self.endpoint);
                http.method = HttpMethod::Post;
                http.body = RequestBody::Json(serde_json::to_value(request)?);
                Ok(http)
            }
        }
    }

    /// アップロード先を取得（リトライしない）
    pub async fn request_target(&self, request: &UploadRequest) -> Result<PresignedTarget> {
        let http = self.build_request(request)?;
        tracing::info!(
            endpoint = %self.endpoint,
            mode = ?self.mode,
            file = %request.file_name,
            session = %request.session_id,
            "Requesting presigned upload target"
        );

        let response = self.transport.send(http).await.map_err(|e| DermaError::Presign {
            status: None,
            message: format!("バックエンドに接続できません: {}", e),
        })?;

        if !response.is_success() {
            return Err(DermaError::Presign {
                status: Some(response.status),
                message: error_message(&response),
            });
        }

        let target = normalize_presign_response(&response.body)?;
        tracing::info!(method = %target.method, key = %target.object_key, "Presigned target received");
        Ok(target)
    }
}
