//! コンソール表示
//!
//! `StateObserver` としてオーケストレーターの状態変化を受け取り、
//! 段階ごとの進捗とビューモデルを標準出力に書く。

use crate::orchestrator::{Phase, SessionState, StateDetail, StateObserver};
use dermavision_common::{ViewModel, ViewOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TOTAL_STEPS: usize = 4;

pub struct ConsoleRenderer {
    spinner: Option<ProgressBar>,
    quiet_spinner: bool,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            spinner: None,
            quiet_spinner: false,
        }
    }

    /// スピナーを使わない（詳細ログと混ざらないように）
    pub fn without_spinner() -> Self {
        Self {
            spinner: None,
            quiet_spinner: true,
        }
    }

    fn start_spinner(&mut self, message: String) {
        self.finish_spinner();
        if self.quiet_spinner {
            println!("{}", message);
            return;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn spinner_message(&self, message: String) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message),
            None => println!("  {}", message),
        }
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConsoleRenderer {
    fn drop(&mut self) {
        self.finish_spinner();
    }
}

impl StateObserver for ConsoleRenderer {
    fn on_state_change(&mut self, state: &SessionState, detail: &StateDetail) {
        match detail {
            StateDetail::Entered => match state.phase {
                Phase::FileSelected => {
                    if let Some(file) = &state.selected_file {
                        println!("✔ {} ({}, {} bytes)\n", file.file_name, file.mime_type, file.size());
                    }
                }
                Phase::Submitting => println!("[1/{}] アップロードURLを取得中...", TOTAL_STEPS),
                Phase::Uploading => {
                    if let Some(target) = &state.presigned_target {
                        println!("✔ 取得完了 ({} {})\n", target.method, target.object_key);
                    }
                    println!("[2/{}] アップロード中...", TOTAL_STEPS);
                }
                Phase::AwaitingResult => {
                    println!("✔ アップロード完了\n");
                    println!("[3/{}] 解析結果を待機中...", TOTAL_STEPS);
                    if let Some(locator) = &state.result_locator {
                        println!("  {}", locator);
                    }
                    self.start_spinner("解析中".into());
                }
                Phase::Idle => self.finish_spinner(),
                _ => {}
            },
            StateDetail::Rejected(rejection) => {
                self.finish_spinner();
                println!("✖ 入力エラー: {}", rejection);
            }
            StateDetail::Waiting { attempt, max_attempts } => {
                self.spinner_message(format!("解析中 [{}/{}]", attempt, max_attempts));
            }
            StateDetail::Warning { attempt, message } => {
                self.spinner_message(format!("再試行中 [{}] {}", attempt, message));
            }
            StateDetail::Succeeded(view) => {
                self.finish_spinner();
                println!("✔ 解析完了\n");
                println!("[4/{}] 結果", TOTAL_STEPS);
                print_view_model(view);
            }
            StateDetail::Failed(report) => {
                self.finish_spinner();
                println!("\n✖ {}", report.message);
            }
            StateDetail::GaveUp(report) => {
                self.finish_spinner();
                println!("\n⚠ {}", report.message);
            }
        }
    }
}

/// ビューモデルを表示
pub fn print_view_model(view: &ViewModel) {
    if view.healthy {
        println!("\n🎉 肌の問題は検出されませんでした。健康な状態です。");
    } else {
        let labels: Vec<&str> = view.labels.iter().map(|l| l.display.as_str()).collect();
        println!("\n検出された問題: {}", labels.join(", "));
    }

    match view.outcome {
        ViewOutcome::NoRecommendations => {
            println!("\nおすすめ商品はありません");
        }
        ViewOutcome::HasRecommendations => {
            for group in &view.groups {
                println!("\n■ {}", group.problem_display);
                for item in &group.items {
                    println!("  - {}", item.title);
                    println!("    価格: {}", item.price_display);
                    if !item.ingredients.is_empty() {
                        println!("    成分: {}", item.ingredients.join(", "));
                    }
                    println!("    画像: {}", item.image_url);
                }
            }
            println!("\n({}件のおすすめ)", view.recommendation_count());
        }
    }
}
