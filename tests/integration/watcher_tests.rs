use rstest::rstest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use restock_watcher::models::{ContinueSignal, InitialAvailability, StopReason};

use super::*;

#[rstest]
#[case::two_edges(
    vec![product_out(), product_out(), product_in(), product_in(), product_out(), product_in()],
    InitialAvailability::Report,
    vec![3, 6]
)]
#[case::in_stock_at_start_reported(
    vec![product_in(), product_in(), product_out()],
    InitialAvailability::Report,
    vec![]
)]
#[case::in_stock_at_start_triggers(
    vec![product_in(), product_in(), product_out()],
    InitialAvailability::Trigger,
    vec![1]
)]
#[case::unreadable_counts_as_unavailable(
    vec![product_out(), product_in(), Page::Unreadable, product_in()],
    InitialAvailability::Report,
    vec![2, 4]
)]
#[tokio::test(start_paused = true)]
async fn test_transitions_fire_on_rising_edges(
    #[case] pages: Vec<Page>,
    #[case] initial: InitialAvailability,
    #[case] expected: Vec<u64>,
) {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", pages.clone()));
    let watcher = watcher(
        Arc::clone(&reader),
        WatcherConfig {
            initial_availability: initial,
            ..watcher_config()
        },
    );
    let plugins = default_plugins().await;
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;
    let handler = RecordingHandler::new(ContinueSignal::Continue);

    let report = watcher
        .start_watch(&target, classifier.as_ref(), &handler, &stop)
        .await
        .unwrap();

    assert_eq!(handler.polls(), expected);
    assert_eq!(report.transitions, expected.len() as u64);
    assert_eq!(report.polls, pages.len() as u64 + 1);
    assert_eq!(report.stop_reason, StopReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_drop_set_opens() {
    let stop = CancellationToken::new();
    let reader = Arc::new(
        FixtureReader::stopping(stop.clone())
            .script("293", vec![set_closed(), set_closed(), set_open(), set_open()]),
    );
    let watcher = watcher(Arc::clone(&reader), watcher_config());
    let plugins = default_plugins().await;
    let target = drop_set("293");
    let classifier = classifier(&plugins, &target).await;
    let handler = RecordingHandler::new(ContinueSignal::Continue);

    let report = watcher
        .start_watch(&target, classifier.as_ref(), &handler, &stop)
        .await
        .unwrap();

    assert_eq!(handler.polls(), vec![3]);
    let last = report.last_status.expect("last status recorded");
    assert!(last.available);
    assert_eq!(reader.attached(), vec!["293".to_string()]);
    assert_eq!(reader.released(), vec!["293".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_polls_follow_the_interval() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::new().script("2710", vec![product_out()]));
    let watcher = watcher(Arc::clone(&reader), watcher_config());
    let plugins = default_plugins().await;
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;
    let handler = RecordingHandler::new(ContinueSignal::Continue);

    let canceller = {
        let stop = stop.clone();
        tokio::spawn(async move {
            // First tick is immediate, then one per interval: polls at 0, 100, ..., 900ms.
            tokio::time::sleep(Duration::from_millis(10 * POLL_MS - POLL_MS / 2)).await;
            stop.cancel();
        })
    };

    let report = watcher
        .start_watch(&target, classifier.as_ref(), &handler, &stop)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.polls, 10);
    assert_eq!(reader.reads("2710"), 10);
    assert!(handler.polls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_crashed_reader_aborts_and_releases() {
    let stop = CancellationToken::new();
    let reader = Arc::new(
        FixtureReader::new().script("2710", vec![product_out(), Page::Crashed, product_in()]),
    );
    let watcher = watcher(Arc::clone(&reader), watcher_config());
    let plugins = default_plugins().await;
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;
    let handler = RecordingHandler::new(ContinueSignal::Continue);

    let result = watcher
        .start_watch(&target, classifier.as_ref(), &handler, &stop)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(reader.reads("2710"), 2);
    assert_eq!(reader.released(), vec!["2710".to_string()]);
    assert!(handler.polls().is_empty());
}
