//! ポーリングのテスト
//!
//! 時間は tokio の仮想時計（start_paused）で進める
//! （ループバックサーバを使うテストのみ実時間）

mod support;

use dermavision::http::{HttpMethod, ReqwestTransport};
use dermavision::poller::{PollEvent, PollOutcome, PollSettings, Poller};
use dermavision_common::{IngredientSplitter, ResultLocator};
use std::time::Duration;
use support::{Reply, ScriptedTransport, ACNE_RESULT, RESULT_URL};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn settings(max_attempts: u32) -> PollSettings {
    PollSettings {
        initial_delay: Duration::from_millis(5000),
        interval: Duration::from_millis(3000),
        max_attempts,
        max_duration: None,
    }
}

fn locator() -> ResultLocator {
    ResultLocator {
        url: RESULT_URL.to_string(),
    }
}

fn poller(transport: ScriptedTransport, settings: PollSettings) -> (std::sync::Arc<ScriptedTransport>, Poller) {
    let (stub, transport) = support::transport_arc(transport);
    (stub, Poller::new(transport, settings, IngredientSplitter::default()))
}

/// N回の未作成の後に成功
#[tokio::test(start_paused = true)]
async fn test_soft_misses_then_found() {
    let transport = ScriptedTransport::new().script(
        HttpMethod::Get,
        RESULT_URL,
        vec![Reply::status(404), Reply::status(403), Reply::status(404), Reply::ok(ACNE_RESULT)],
    );
    let (stub, poller) = poller(transport, settings(10));

    let started = Instant::now();
    let mut events = Vec::new();
    let outcome = poller
        .poll(&locator(), &CancellationToken::new(), |e| events.push(e))
        .await;

    match outcome {
        PollOutcome::Found(result) => {
            assert_eq!(result.labels, vec!["Acne", "Oily-Skin"]);
            assert_eq!(result.recommendations[0].ingredients, vec!["water", "glycerin"]);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(
        events,
        vec![
            PollEvent::SoftMiss { attempt: 1, status: 404 },
            PollEvent::SoftMiss { attempt: 2, status: 403 },
            PollEvent::SoftMiss { attempt: 3, status: 404 },
        ]
    );
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 4);
    // 初回待機 + 3回の間隔
    assert_eq!(started.elapsed(), Duration::from_millis(5000 + 3 * 3000));
}

/// 常に未作成 → ちょうど上限回数で打ち切り
#[tokio::test(start_paused = true)]
async fn test_always_missing_gives_up_after_max_attempts() {
    let transport = ScriptedTransport::new().script(HttpMethod::Get, RESULT_URL, vec![Reply::status(404)]);
    let (stub, poller) = poller(transport, settings(7));

    let mut misses = 0;
    let outcome = poller
        .poll(&locator(), &CancellationToken::new(), |_| misses += 1)
        .await;

    assert_eq!(outcome, PollOutcome::GaveUp { attempts: 7 });
    assert_eq!(misses, 7);
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 7);
}

/// 2xxでもパースできなければ即終了
#[tokio::test(start_paused = true)]
async fn test_malformed_result_stops_polling() {
    let transport = ScriptedTransport::new().script(
        HttpMethod::Get,
        RESULT_URL,
        vec![Reply::status(404), Reply::ok("<html>oops</html>"), Reply::ok(ACNE_RESULT)],
    );
    let (stub, poller) = poller(transport, settings(10));

    let outcome = poller.poll(&locator(), &CancellationToken::new(), |_| {}).await;

    assert!(matches!(outcome, PollOutcome::Malformed(_)));
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 2);
}

/// 通信エラーは警告として継続し、試行回数を消費する
#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_retried_and_counted() {
    let transport = ScriptedTransport::new().script(
        HttpMethod::Get,
        RESULT_URL,
        vec![
            Reply::Fail("connection reset".into()),
            Reply::status(500),
            Reply::ok(ACNE_RESULT),
        ],
    );
    let (_stub, poller) = poller(transport, settings(10));

    let mut events = Vec::new();
    let outcome = poller
        .poll(&locator(), &CancellationToken::new(), |e| events.push(e))
        .await;

    assert!(matches!(outcome, PollOutcome::Found(_)));
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], PollEvent::TransportWarning { attempt: 1, message } if message.contains("connection reset")));
    assert!(matches!(&events[1], PollEvent::TransportWarning { attempt: 2, message } if message.contains("500")));
}

/// 通信エラーが続いても上限で止まる
#[tokio::test(start_paused = true)]
async fn test_transport_errors_do_not_reset_budget() {
    let transport = ScriptedTransport::new().script(
        HttpMethod::Get,
        RESULT_URL,
        vec![Reply::status(404), Reply::Fail("timeout".into()), Reply::status(404)],
    );
    let (stub, poller) = poller(transport, settings(3));

    let outcome = poller.poll(&locator(), &CancellationToken::new(), |_| {}).await;

    assert_eq!(outcome, PollOutcome::GaveUp { attempts: 3 });
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 3);
}

/// キャンセルすると以降のGETは発生しない
#[tokio::test(start_paused = true)]
async fn test_cancel_during_initial_delay() {
    let transport = ScriptedTransport::new().script(HttpMethod::Get, RESULT_URL, vec![Reply::status(404)]);
    let (stub, poller) = poller(transport, settings(10));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        trigger.cancel();
    });

    let outcome = poller.poll(&locator(), &cancel, |_| {}).await;

    assert_eq!(outcome, PollOutcome::Cancelled);
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_ticks() {
    let transport = ScriptedTransport::new().script(HttpMethod::Get, RESULT_URL, vec![Reply::status(404)]);
    let (stub, poller) = poller(transport, settings(10));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // 初回(5s) + 2回目(8s) の後、3回目(11s) の前
        tokio::time::sleep(Duration::from_millis(9000)).await;
        trigger.cancel();
    });

    let outcome = poller.poll(&locator(), &cancel, |_| {}).await;

    assert_eq!(outcome, PollOutcome::Cancelled);
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 2);
}

/// 2xxの本文が途中で切れた場合は通信警告として継続する（不正な結果で終わらない）
#[tokio::test]
async fn test_truncated_body_keeps_polling() {
    let base = support::serve_sequence(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n{\"analysis_lab".to_string(),
        support::http_response("200 OK", ACNE_RESULT),
    ])
    .await;
    let transport: std::sync::Arc<dyn dermavision::http::HttpTransport> =
        std::sync::Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let poller = Poller::new(
        transport,
        PollSettings {
            initial_delay: Duration::ZERO,
            interval: Duration::from_millis(10),
            max_attempts: 5,
            max_duration: None,
        },
        IngredientSplitter::default(),
    );
    let locator = ResultLocator {
        url: format!("{}/recommendations/u1/img.jpg_final.json", base),
    };

    let mut events = Vec::new();
    let outcome = poller
        .poll(&locator, &CancellationToken::new(), |e| events.push(e))
        .await;

    assert!(matches!(outcome, PollOutcome::Found(_)), "{:?}", outcome);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], PollEvent::TransportWarning { attempt: 1, .. }));
}

/// ポーリング中の事象はエラー種別に対応する
#[test]
fn test_poll_event_error_kinds() {
    use dermavision::error::{DermaError, ErrorKind};

    let miss = PollEvent::SoftMiss { attempt: 1, status: 404 }.to_error();
    assert!(matches!(miss, DermaError::PollSoftMiss { status: 404 }));
    assert_eq!(miss.kind(), ErrorKind::PollSoftMiss);
    assert_eq!(miss.report().status, Some(404));

    let warning = PollEvent::TransportWarning {
        attempt: 2,
        message: "connection reset".into(),
    }
    .to_error();
    assert_eq!(warning.kind(), ErrorKind::PollTransport);
    assert!(warning.to_string().contains("connection reset"));
}

/// 経過時間の上限
#[tokio::test(start_paused = true)]
async fn test_max_duration_bounds_polling() {
    let transport = ScriptedTransport::new().script(HttpMethod::Get, RESULT_URL, vec![Reply::status(404)]);
    let mut settings = settings(100);
    settings.max_duration = Some(Duration::from_millis(12_000));
    let (stub, poller) = poller(transport, settings);

    let outcome = poller.poll(&locator(), &CancellationToken::new(), |_| {}).await;

    // 5s, 8s, 11s で取得し、次の14sは上限を超えるので打ち切り
    assert_eq!(outcome, PollOutcome::GaveUp { attempts: 3 });
    assert_eq!(stub.count(HttpMethod::Get, RESULT_URL), 3);
}
