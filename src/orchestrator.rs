//! アップロード〜ポーリングの状態機械
//!
//! `SessionState` を書き換えるのはこのモジュールだけ。
//! ネットワーク処理（presign・アップロード・ポーリング）は非同期タスクとして起動し、
//! 結果は提出ID付きのメッセージとしてチャネル経由で戻ってくる。
//! 現在の提出IDと一致しないメッセージは破棄するので、リセットや再提出の後に
//! 古いタスクの結果が遅れて届いても新しいセッションは変化しない。
//!
//! ```text
//! Idle → FileSelected → Submitting → Uploading → AwaitingResult → Succeeded | Failed | GaveUp
//! ```

use crate::config::Config;
use crate::error::{DermaError, ErrorReport, Result};
use crate::http::HttpTransport;
use crate::poller::{PollEvent, PollOutcome, Poller};
use crate::presign::PresignClient;
use crate::upload::Uploader;
use chrono::{DateTime, Local};
use dermavision_common::{
    derive_result_locator, transform, validate, validate_file, IngredientSplitter, LocaleMap,
    PresignedTarget, Rejection, ResultKeyRules, ResultLocator, SelectedFile, TransformOptions,
    UploadRequest, ValidationRules, ViewModel,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// ワークフローの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    FileSelected,
    Submitting,
    Uploading,
    AwaitingResult,
    Succeeded,
    Failed,
    GaveUp,
}

impl Phase {
    /// ネットワーク処理中か
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::Uploading | Phase::AwaitingResult)
    }

    /// 新しい提出を受け付けられるか
    pub fn accepts_submit(&self) -> bool {
        matches!(self, Phase::Idle | Phase::FileSelected | Phase::Failed | Phase::GaveUp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::FileSelected => "file_selected",
            Phase::Submitting => "submitting",
            Phase::Uploading => "uploading",
            Phase::AwaitingResult => "awaiting_result",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::GaveUp => "gave_up",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1回の提出に対応するセッション状態
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub selected_file: Option<SelectedFile>,
    pub presigned_target: Option<PresignedTarget>,
    pub result_locator: Option<ResultLocator>,
    pub poll_attempt: u32,
    pub last_error: Option<ErrorReport>,
    pub submitted_at: Option<DateTime<Local>>,
}

/// 状態変化に添える詳細
#[derive(Debug, Clone, PartialEq)]
pub enum StateDetail {
    Entered,
    Rejected(Rejection),
    /// 結果オブジェクトがまだない（失敗ではない）
    Waiting { attempt: u32, max_attempts: u32 },
    /// ポーリング中の一時的な通信エラー
    Warning { attempt: u32, message: String },
    Succeeded(ViewModel),
    Failed(ErrorReport),
    GaveUp(ErrorReport),
}

/// 表示層が購読する通知口
pub trait StateObserver: Send {
    fn on_state_change(&mut self, state: &SessionState, detail: &StateDetail);
}

/// 非同期タスクからの報告
#[derive(Debug)]
pub enum TaskResult {
    Presigned(Result<PresignedTarget>),
    Uploaded(Result<()>),
    Poll(PollEvent),
    PollFinished(PollOutcome),
}

#[derive(Debug)]
pub struct TaskMessage {
    pub submission: u64,
    pub result: TaskResult,
}

/// 可変の設定を束ねたもの（variantごとの違いは全てここに入る）
struct Workflow {
    validation: ValidationRules,
    result_keys: ResultKeyRules,
    result_host: String,
    aux_field_name: String,
    locale: LocaleMap,
    transform: TransformOptions,
}

pub struct Orchestrator {
    workflow: Workflow,
    presign: Arc<PresignClient>,
    uploader: Arc<Uploader>,
    poller: Arc<Poller>,
    state: SessionState,
    submission: u64,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TaskMessage>,
    rx: mpsc::UnboundedReceiver<TaskMessage>,
    observers: Vec<Box<dyn StateObserver>>,
}

impl Orchestrator {
    pub fn new(config: &Config, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let splitter = IngredientSplitter::new(&config.ingredient_delimiters)?;
        let presign = PresignClient::new(transport.clone(), &config.presign_endpoint, config.presign_mode)
            .with_user_id(config.user_id.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            workflow: Workflow {
                validation: config.validation_rules(),
                result_keys: config.result_key_rules(),
                result_host: config.result_host.clone(),
                aux_field_name: config.aux_field_name.clone(),
                locale: config.label_locale_map.clone(),
                transform: config.transform_options(),
            },
            presign: Arc::new(presign),
            uploader: Arc::new(Uploader::new(transport.clone())),
            poller: Arc::new(Poller::new(transport, config.poll_settings(), splitter)),
            state: SessionState::default(),
            submission: 0,
            cancel: CancellationToken::new(),
            tx,
            rx,
            observers: Vec::new(),
        })
    }

    pub fn subscribe(&mut self, observer: Box<dyn StateObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// 現在の提出ID（提出・リセットのたびに増える）
    pub fn submission_id(&self) -> u64 {
        self.submission
    }

    fn notify(&mut self, detail: StateDetail) {
        for observer in self.observers.iter_mut() {
            observer.on_state_change(&self.state, &detail);
        }
    }

    fn enter(&mut self, phase: Phase, detail: StateDetail) {
        tracing::info!(from = %self.state.phase, to = %phase, submission = self.submission, "Phase transition");
        self.state.phase = phase;
        self.notify(detail);
    }

    /// 進行中のタスクを全て無効化し、新しい提出IDを払い出す
    fn invalidate(&mut self) -> CancellationToken {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.submission += 1;
        self.cancel.clone()
    }

    /// ファイルを選択（進行中のセッションがあれば置き換える）
    pub fn select_file(&mut self, file: Option<SelectedFile>) {
        if self.state.phase.is_busy() {
            tracing::info!(phase = %self.state.phase, "New file selected, superseding in-flight submission");
        }
        self.invalidate();

        match validate_file(file.as_ref(), &self.workflow.validation) {
            Ok(()) => {
                self.state = SessionState {
                    selected_file: file,
                    ..Default::default()
                };
                self.enter(Phase::FileSelected, StateDetail::Entered);
            }
            Err(rejection) => {
                tracing::info!(reason = %rejection, "File rejected");
                self.state = SessionState {
                    last_error: Some(DermaError::from(rejection.clone()).report()),
                    ..Default::default()
                };
                self.enter(Phase::Idle, StateDetail::Rejected(rejection));
            }
        }
    }

    /// 提出を開始。受け付けなかった場合は false
    pub fn submit(&mut self, aux_selections: &[String]) -> bool {
        if !self.state.phase.accepts_submit() {
            tracing::debug!(phase = %self.state.phase, "Submit ignored while a submission is in flight");
            return false;
        }

        if let Err(rejection) = validate(self.state.selected_file.as_ref(), aux_selections, &self.workflow.validation) {
            tracing::info!(reason = %rejection, "Submit rejected");
            self.state.last_error = Some(DermaError::from(rejection.clone()).report());
            let phase = if self.state.selected_file.is_some() {
                Phase::FileSelected
            } else {
                Phase::Idle
            };
            self.enter(phase, StateDetail::Rejected(rejection));
            return false;
        }

        let Some(file) = self.state.selected_file.clone() else {
            return false;
        };

        let cancel = self.invalidate();
        let submission = self.submission;
        self.state = SessionState {
            selected_file: Some(file.clone()),
            submitted_at: Some(Local::now()),
            ..Default::default()
        };

        let request = self.upload_request(&file, aux_selections);
        self.enter(Phase::Submitting, StateDetail::Entered);

        let presign = self.presign.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = presign.request_target(&request) => result,
            };
            let _ = tx.send(TaskMessage {
                submission,
                result: TaskResult::Presigned(result),
            });
        });

        true
    }

    fn upload_request(&self, file: &SelectedFile, aux_selections: &[String]) -> UploadRequest {
        let mut extra_fields = BTreeMap::new();
        let selections: Vec<&str> = aux_selections
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !selections.is_empty() && !self.workflow.aux_field_name.is_empty() {
            extra_fields.insert(self.workflow.aux_field_name.clone(), selections.join(","));
        }

        UploadRequest {
            file_name: file.file_name.clone(),
            file_type: file.mime_type.clone(),
            session_id: uuid::Uuid::new_v4().to_string(),
            extra_fields,
        }
    }

    /// GaveUp から同じ結果オブジェクトのポーリングをやり直す
    pub fn retry_poll(&mut self) -> bool {
        if self.state.phase != Phase::GaveUp {
            return false;
        }
        let Some(locator) = self.state.result_locator.clone() else {
            return false;
        };

        self.invalidate();
        self.state.poll_attempt = 0;
        self.state.last_error = None;
        self.enter(Phase::AwaitingResult, StateDetail::Entered);
        self.spawn_poll(locator);
        true
    }

    /// 明示的なクリア。保留中のタイマーを止め、セッションを破棄する
    pub fn clear(&mut self) {
        self.invalidate();
        self.state = SessionState::default();
        self.enter(Phase::Idle, StateDetail::Entered);
    }

    fn spawn_upload(&self, file: SelectedFile, target: PresignedTarget) {
        let uploader = self.uploader.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let submission = self.submission;
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = uploader.upload(&file, &target) => result,
            };
            let _ = tx.send(TaskMessage {
                submission,
                result: TaskResult::Uploaded(result),
            });
        });
    }

    fn spawn_poll(&self, locator: ResultLocator) {
        let poller = self.poller.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let submission = self.submission;
        tokio::spawn(async move {
            let events = tx.clone();
            let outcome = poller
                .poll(&locator, &cancel, |event| {
                    let _ = events.send(TaskMessage {
                        submission,
                        result: TaskResult::Poll(event),
                    });
                })
                .await;
            if matches!(outcome, PollOutcome::Cancelled) {
                return;
            }
            let _ = tx.send(TaskMessage {
                submission,
                result: TaskResult::PollFinished(outcome),
            });
        });
    }

    fn fail(&mut self, error: DermaError) {
        tracing::error!(kind = %error.kind(), error = %error, "Submission failed");
        let report = error.report();
        self.state.last_error = Some(report.clone());
        self.enter(Phase::Failed, StateDetail::Failed(report));
    }

    /// タスクからの報告を状態に反映する
    pub fn apply(&mut self, message: TaskMessage) {
        if message.submission != self.submission {
            tracing::warn!(
                stale = message.submission,
                current = self.submission,
                "Discarding message from superseded submission"
            );
            return;
        }

        match (self.state.phase, message.result) {
            (Phase::Submitting, TaskResult::Presigned(Ok(target))) => {
                let Some(file) = self.state.selected_file.clone() else {
                    self.fail(DermaError::Validation(Rejection::NoFile));
                    return;
                };
                self.state.presigned_target = Some(target.clone());
                self.enter(Phase::Uploading, StateDetail::Entered);
                self.spawn_upload(file, target);
            }
            (Phase::Submitting, TaskResult::Presigned(Err(e))) => self.fail(e),
            (Phase::Uploading, TaskResult::Uploaded(Ok(()))) => {
                let Some(target) = self.state.presigned_target.as_ref() else {
                    return;
                };
                if !self.workflow.result_keys.matches(&target.object_key) {
                    tracing::warn!(key = %target.object_key, "No prefix rewrite matched, using object key unmodified");
                }
                let locator = derive_result_locator(
                    &target.object_key,
                    &self.workflow.result_host,
                    &self.workflow.result_keys,
                );
                tracing::info!(url = %locator.url, "Awaiting analysis result");
                self.state.result_locator = Some(locator.clone());
                self.state.poll_attempt = 0;
                self.enter(Phase::AwaitingResult, StateDetail::Entered);
                self.spawn_poll(locator);
            }
            (Phase::Uploading, TaskResult::Uploaded(Err(e))) => self.fail(e),
            (Phase::AwaitingResult, TaskResult::Poll(event)) => {
                self.state.poll_attempt = event.attempt();
                let detail = match &event {
                    PollEvent::SoftMiss { attempt, .. } => StateDetail::Waiting {
                        attempt: *attempt,
                        max_attempts: self.poller.settings().max_attempts,
                    },
                    PollEvent::TransportWarning { attempt, .. } => StateDetail::Warning {
                        attempt: *attempt,
                        message: event.to_error().to_string(),
                    },
                };
                self.notify(detail);
            }
            (Phase::AwaitingResult, TaskResult::PollFinished(outcome)) => match outcome {
                PollOutcome::Found(result) => {
                    let view = transform(&result, &self.workflow.locale, &self.workflow.transform);
                    self.state.last_error = None;
                    self.enter(Phase::Succeeded, StateDetail::Succeeded(view));
                }
                PollOutcome::Malformed(message) => self.fail(DermaError::MalformedResult(message)),
                PollOutcome::GaveUp { attempts } => {
                    self.state.poll_attempt = attempts;
                    let report = DermaError::GaveUp { attempts }.report();
                    self.state.last_error = Some(report.clone());
                    self.enter(Phase::GaveUp, StateDetail::GaveUp(report));
                }
                PollOutcome::Cancelled => {}
            },
            (phase, result) => {
                tracing::debug!(phase = %phase, ?result, "Ignoring message not applicable to current phase");
            }
        }
    }

    /// 次のタスク報告を待って反映する
    pub async fn step(&mut self) -> Phase {
        if let Some(message) = self.rx.recv().await {
            self.apply(message);
        }
        self.state.phase
    }

    /// ネットワーク処理が終わる（成功・失敗・GaveUp）まで進める
    pub async fn run_until_settled(&mut self) -> Phase {
        while self.state.phase.is_busy() {
            self.step().await;
        }
        self.state.phase
    }
}
