//! 解析結果のポーリング
//!
//! アップロード完了後、初回待機を挟んでから一定間隔で結果オブジェクトをGETする。
//! 取得は常に1件ずつ（前回の取得が終わるまで次のtickは予約しない）。
//!
//! - 2xx + パース可能 → 成功
//! - 2xx + パース不可 → 不正な結果として終了（再試行しても直らない）
//! - 403/404 → まだ作成されていない（soft miss）、試行回数+1で継続
//! - その他 → 通信警告として通知し、試行回数+1で継続
//!
//! 試行回数（と任意の経過時間）に上限があり、超えたら GaveUp で終了する。

use crate::error::DermaError;
use crate::http::{HttpRequest, HttpTransport};
use dermavision_common::{parse_analysis_result, AnalysisResult, IngredientSplitter, ResultLocator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// ポーリング設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// アップロード直後の待機（ストアの反映遅延を見込む）
    pub initial_delay: Duration,
    pub interval: Duration,
    /// 1以上
    pub max_attempts: u32,
    pub max_duration: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5000),
            interval: Duration::from_millis(3000),
            max_attempts: 40,
            max_duration: None,
        }
    }
}

/// 各tickで発生する非終端の出来事
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// 結果オブジェクトがまだない
    SoftMiss { attempt: u32, status: u16 },
    /// 通信エラーまたは想定外のステータス
    TransportWarning { attempt: u32, message: String },
}

impl PollEvent {
    pub fn attempt(&self) -> u32 {
        match self {
            PollEvent::SoftMiss { attempt, .. } | PollEvent::TransportWarning { attempt, .. } => *attempt,
        }
    }

    /// 対応する非終端エラー（ログ・表示用）
    pub fn to_error(&self) -> DermaError {
        match self {
            PollEvent::SoftMiss { status, .. } => DermaError::PollSoftMiss { status: *status },
            PollEvent::TransportWarning { message, .. } => DermaError::PollTransport(message.clone()),
        }
    }
}

/// ポーリングの終了理由
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Found(AnalysisResult),
    Malformed(String),
    GaveUp { attempts: u32 },
    Cancelled,
}

enum Tick {
    Found(AnalysisResult),
    Malformed(String),
    Miss(PollEvent),
}

pub struct Poller {
    transport: Arc<dyn HttpTransport>,
    settings: PollSettings,
    splitter: IngredientSplitter,
}

impl Poller {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: PollSettings, splitter: IngredientSplitter) -> Self {
        Self {
            transport,
            settings,
            splitter,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// 結果が見つかる・不正と判明する・上限に達する・キャンセルされるまでポーリング
    ///
    /// `on_tick` は非終端の出来事ごとに呼ばれる。
    pub async fn poll<F>(&self, locator: &ResultLocator, cancel: &CancellationToken, mut on_tick: F) -> PollOutcome
    where
        F: FnMut(PollEvent),
    {
        let started = Instant::now();
        let max_attempts = self.settings.max_attempts.max(1);

        tracing::debug!(url = %locator.url, delay = ?self.settings.initial_delay, "Poll scheduled");
        if !sleep_or_cancel(self.settings.initial_delay, cancel).await {
            return PollOutcome::Cancelled;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                tick = self.fetch_once(locator, attempt) => tick,
            };

            match tick {
                Tick::Found(result) => {
                    tracing::info!(url = %locator.url, attempt, "Analysis result found");
                    return PollOutcome::Found(result);
                }
                Tick::Malformed(message) => {
                    tracing::error!(url = %locator.url, attempt, error = %message, "Malformed analysis result");
                    return PollOutcome::Malformed(message);
                }
                Tick::Miss(event) => {
                    let reason = event.to_error();
                    match &event {
                        PollEvent::SoftMiss { status, .. } => {
                            tracing::debug!(url = %locator.url, attempt, status, reason = %reason, "Result not ready yet");
                        }
                        PollEvent::TransportWarning { .. } => {
                            tracing::warn!(url = %locator.url, attempt, error = %reason, "Poll request failed, will retry");
                        }
                    }
                    on_tick(event);
                }
            }

            if attempt >= max_attempts {
                tracing::warn!(url = %locator.url, attempts = attempt, "Poll attempt limit reached");
                return PollOutcome::GaveUp { attempts: attempt };
            }
            if let Some(max_duration) = self.settings.max_duration {
                if started.elapsed() + self.settings.interval > max_duration {
                    tracing::warn!(url = %locator.url, attempts = attempt, "Poll duration limit reached");
                    return PollOutcome::GaveUp { attempts: attempt };
                }
            }

            if !sleep_or_cancel(self.settings.interval, cancel).await {
                return PollOutcome::Cancelled;
            }
        }
    }

    async fn fetch_once(&self, locator: &ResultLocator, attempt: u32) -> Tick {
        let response = match self.transport.send(HttpRequest::get(&locator.url)).await {
            Ok(response) => response,
            Err(e) => {
                return Tick::Miss(PollEvent::TransportWarning {
                    attempt,
                    message: e.to_string(),
                })
            }
        };

        match response.status {
            200..=299 => match parse_analysis_result(&response.body, &self.splitter) {
                Ok(result) => Tick::Found(result),
                Err(e) => Tick::Malformed(e.to_string()),
            },
            403 | 404 => Tick::Miss(PollEvent::SoftMiss {
                attempt,
                status: response.status,
            }),
            status => Tick::Miss(PollEvent::TransportWarning {
                attempt,
                message: format!("unexpected HTTP status {}", status),
            }),
        }
    }
}

/// 指定時間待つ。途中でキャンセルされたら false
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
