//! オブジェクトストレージへのアップロード
//!
//! presign応答が指定した方式をそのまま使う:
//! - POST: fieldsを全て先に追加し、最後にファイルパート（署名方式がフィールド順を検証するため）
//! - PUT: ファイルを生ボディで送り、requiredHeadersを値を変えずに付与する

use crate::error::{DermaError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpTransport, MultipartPart, RequestBody};
use crate::presign::error_message;
use dermavision_common::{PresignedTarget, SelectedFile, UploadMethod};
use std::sync::Arc;

/// multipartのファイルパート名
pub const FILE_FIELD_NAME: &str = "file";

/// アップロード要求を組み立てる
pub fn build_upload_request(file: &SelectedFile, target: &PresignedTarget) -> HttpRequest {
    let mut request = HttpRequest::get(&target.url);

    match target.method {
        UploadMethod::Post => {
            request.method = HttpMethod::Post;
            let mut parts: Vec<MultipartPart> = target
                .fields
                .iter()
                .map(|(name, value)| MultipartPart::Text {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            parts.push(MultipartPart::File {
                name: FILE_FIELD_NAME.to_string(),
                file_name: file.file_name.clone(),
                mime_type: file.mime_type.clone(),
                bytes: file.bytes.clone(),
            });
            request.body = RequestBody::Multipart(parts);
        }
        UploadMethod::Put => {
            request.method = HttpMethod::Put;
            // 署名済みのContent-Typeがあればそちらを優先する
            let signed_content_type = target
                .required_headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !signed_content_type {
                request
                    .headers
                    .push(("Content-Type".to_string(), file.mime_type.clone()));
            }
            request.headers.extend(target.required_headers.iter().cloned());
            request.body = RequestBody::Bytes(file.bytes.clone());
        }
    }

    request
}

pub struct Uploader {
    transport: Arc<dyn HttpTransport>,
}

impl Uploader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// ファイルを転送（リトライしない）
    pub async fn upload(&self, file: &SelectedFile, target: &PresignedTarget) -> Result<()> {
        let request = build_upload_request(file, target);
        tracing::info!(
            method = %target.method,
            key = %target.object_key,
            bytes = file.size(),
            "Uploading file"
        );

        let response = self.transport.send(request).await.map_err(|e| DermaError::Upload {
            status: None,
            message: format!("ストレージに接続できません: {}", e),
        })?;

        if !response.is_success() {
            return Err(DermaError::Upload {
                status: Some(response.status),
                message: error_message(&response),
            });
        }

        tracing::info!(key = %target.object_key, status = response.status, "Upload complete");
        Ok(())
    }
}
