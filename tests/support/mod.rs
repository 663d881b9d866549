//! テスト用のスクリプト化HTTPスタブ

#![allow(dead_code)]

use async_trait::async_trait;
use dermavision::config::Config;
use dermavision::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use dermavision::orchestrator::{Phase, SessionState, StateDetail, StateObserver};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const PRESIGN_URL: &str = "https://api.test/presign";
pub const BUCKET_URL: &str = "https://bucket.test/";
pub const RESULT_HOST: &str = "https://results.test";
pub const OBJECT_KEY: &str = "uploads/u1/img.jpg";
pub const RESULT_URL: &str = "https://results.test/recommendations/u1/img.jpg_final.json";

pub const ACNE_RESULT: &str = r#"{
    "analysis_labels": ["Acne", "Oily-Skin"],
    "recommendations": [
        {"problem": "Acne", "name": "Clear Gel", "brand": "Derma", "price": 2500, "image_url": "", "ingredients": "water|glycerin"}
    ]
}"#;

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(String),
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Status(200, body.to_string())
    }

    pub fn status(status: u16) -> Self {
        Reply::Status(status, String::new())
    }
}

struct Route {
    method: HttpMethod,
    url: String,
    /// 使い切ったら最後の応答を繰り返す
    replies: VecDeque<Reply>,
    last: Option<Reply>,
}

/// method + URL ごとに応答を順番に返すスタブ
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, method: HttpMethod, url: &str, replies: Vec<Reply>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route {
                method,
                url: url.to_string(),
                replies: replies.into(),
                last: None,
            });
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|r| r.method == request.method && r.url == request.url);
            match route {
                Some(route) => {
                    let next = route.replies.pop_front().or_else(|| route.last.clone());
                    if let Some(reply) = &next {
                        route.last = Some(reply.clone());
                    }
                    next
                }
                None => None,
            }
        };

        match reply {
            Some(Reply::Status(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(Reply::Fail(message)) => Err(TransportError(message)),
            None => Err(TransportError(format!(
                "unscripted request: {} {}",
                request.method.as_str(),
                request.url
            ))),
        }
    }
}

/// ループバックHTTPサーバ。接続ごとに応答を順に返し、使い切ったら最後を繰り返す
///
/// 応答を書いたら接続を閉じる。戻り値はベースURL。
pub async fn serve_sequence(responses: Vec<String>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut index = 0;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let response = &responses[index.min(responses.len() - 1)];
            index += 1;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.flush().await;
        }
    });
    url
}

/// 完全なHTTP応答
pub fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    )
}

/// POST形式のpresign応答
pub fn form_presign_body() -> String {
    format!(
        r#"{{"key": "{key}", "upload": {{"url": "{url}", "fields": {{"key": "{key}", "policy": "cG9saWN5", "x-amz-signature": "sig"}}}}}}"#,
        key = OBJECT_KEY,
        url = BUCKET_URL
    )
}

pub fn test_config() -> Config {
    Config {
        presign_endpoint: PRESIGN_URL.into(),
        result_host: RESULT_HOST.into(),
        initial_poll_delay_ms: 5000,
        poll_interval_ms: 3000,
        max_poll_attempts: 5,
        ..Default::default()
    }
}

pub fn transport_arc(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, Arc<dyn HttpTransport>) {
    let transport = Arc::new(transport);
    let dyn_transport: Arc<dyn HttpTransport> = transport.clone();
    (transport, dyn_transport)
}

/// 状態変化を記録するオブザーバ
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(Phase, StateDetail)>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<(Phase, StateDetail)> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = Vec::new();
        for (phase, _) in self.events() {
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }
        phases
    }

    pub fn count(&self, pred: impl Fn(&StateDetail) -> bool) -> usize {
        self.events().iter().filter(|(_, d)| pred(d)).count()
    }
}

impl StateObserver for Recorder {
    fn on_state_change(&mut self, state: &SessionState, detail: &StateDetail) {
        self.events.lock().unwrap().push((state.phase, detail.clone()));
    }
}
