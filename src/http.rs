//! HTTP送信の抽象
//!
//! presign・アップロード・ポーリングはすべて `HttpTransport` を通して送信する。
//! 本番では `ReqwestTransport`、テストではスクリプト化したスタブを使う。

use crate::error::{DermaError, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("dermavision/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// multipartの各パート
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

impl MultipartPart {
    pub fn name(&self) -> &str {
        match self {
            MultipartPart::Text { name, .. } | MultipartPart::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    /// パートは追加順に送信される
    Multipart(Vec<MultipartPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// ヘッダー値を取得（名前は大文字小文字を区別しない）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 応答を得られなかった送信失敗（接続・タイムアウト等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// reqwestによる実装
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DermaError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn build(&self, request: HttpRequest) -> std::result::Result<reqwest::RequestBuilder, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = match part {
                        MultipartPart::Text { name, value } => form.text(name, value),
                        MultipartPart::File {
                            name,
                            file_name,
                            mime_type,
                            bytes,
                        } => {
                            let file_part = reqwest::multipart::Part::bytes(bytes)
                                .file_name(file_name)
                                .mime_str(&mime_type)
                                .map_err(|e| TransportError(format!("invalid MIME type {}: {}", mime_type, e)))?;
                            form.part(name, file_part)
                        }
                    };
                }
                builder.multipart(form)
            }
        };

        Ok(builder)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = request.method;
        let url = request.url.clone();
        tracing::debug!(method = method.as_str(), url = %url, "HTTP request");

        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        // 成功応答の本文が途中で切れたら送信失敗として扱う（空の結果と区別するため）
        let body = if response.status().is_success() {
            response
                .text()
                .await
                .map_err(|e| TransportError(format!("failed to read response body: {}", e)))?
        } else {
            response.text().await.unwrap_or_default()
        };
        tracing::debug!(method = method.as_str(), url = %url, status, "HTTP response");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(199, "").is_success());
        assert!(!HttpResponse::new(300, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut request = HttpRequest::get("https://example.com");
        request.headers.push(("Content-Type".into(), "image/png".into()));
        assert_eq!(request.header("content-type"), Some("image/png"));
        assert_eq!(request.header("x-amz-acl"), None);
    }

    #[test]
    fn test_reqwest_transport_builds_multipart() {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let mut request = HttpRequest::get("https://example.com/upload");
        request.method = HttpMethod::Post;
        request.body = RequestBody::Multipart(vec![
            MultipartPart::Text { name: "key".into(), value: "uploads/a.jpg".into() },
            MultipartPart::File {
                name: "file".into(),
                file_name: "a.jpg".into(),
                mime_type: "image/jpeg".into(),
                bytes: vec![0xFF, 0xD8],
            },
        ]);
        assert!(transport.build(request).is_ok());
    }

    #[test]
    fn test_reqwest_transport_rejects_bad_mime() {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let mut request = HttpRequest::get("https://example.com/upload");
        request.body = RequestBody::Multipart(vec![MultipartPart::File {
            name: "file".into(),
            file_name: "a.jpg".into(),
            mime_type: "not a mime".into(),
            bytes: vec![],
        }]);
        assert!(transport.build(request).is_err());
    }

    /// ループバックで1回だけ応答するサーバ（受信したリクエストヘッダを返す）
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            String::from_utf8_lossy(&head).to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_send_success_with_query() {
        let (url, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}").await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let mut request = HttpRequest::get(format!("{}/presign", url));
        request.query.push(("userId".into(), "U 001".into()));
        request.query.push(("ext".into(), "jpg".into()));
        let response = transport.send(request).await.unwrap();

        assert_eq!(response, HttpResponse::new(200, "{\"ok\":true}"));
        let head = server.await.unwrap();
        assert!(head.starts_with("GET /presign?userId=U+001&ext=jpg HTTP/1.1"), "{}", head);
        assert!(head.to_lowercase().contains("user-agent: dermavision/"));
    }

    #[tokio::test]
    async fn test_send_error_status_keeps_body() {
        let (url, _server) = serve_once(
            "HTTP/1.1 403 Forbidden\r\nContent-Length: 13\r\nConnection: close\r\n\r\nAccessDenied.",
        )
        .await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let response = transport.send(HttpRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(response.body, "AccessDenied.");
        assert!(!response.is_success());
    }

    /// 成功応答の本文が途中で切れたら空の本文ではなく送信失敗
    #[tokio::test]
    async fn test_send_truncated_success_body_is_transport_error() {
        let (url, _server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n{\"analysis_lab").await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport.send(HttpRequest::get(url)).await.unwrap_err();
        assert!(err.0.contains("response body"), "{}", err);
    }
}
