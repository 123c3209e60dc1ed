use rstest::rstest;
use std::sync::Arc;

use restock_watcher::models::{CheckoutOutcome, StopReason, WatchState};
use restock_watcher::WatchScheduler;

use super::*;

async fn scheduler(
    reader: Arc<FixtureReader>,
    checkout: Arc<StubCheckout>,
    plugins: PluginManager,
) -> WatchScheduler {
    let dispatcher = dispatcher(checkout, plugins.clone(), false);
    WatchScheduler::new(watcher(reader, watcher_config()), dispatcher, plugins)
}

#[rstest]
#[case::slow_success(CheckoutOutcome::Success, WatchState::Stopped)]
#[case::slow_failure_resumes(CheckoutOutcome::failure("cart empty"), WatchState::Watching)]
#[tokio::test(start_paused = true)]
async fn test_slow_checkout_does_not_block_other_targets(
    #[case] slow_outcome: CheckoutOutcome,
    #[case] slow_state_after: WatchState,
) {
    let reader = Arc::new(
        FixtureReader::new()
            .script("2710", vec![product_out(), product_in()])
            .script("293", vec![set_closed(), set_closed(), set_open()]),
    );
    let checkout = Arc::new(
        StubCheckout::always(CheckoutOutcome::Success)
            .then("2710", slow_outcome)
            .slow("2710", Duration::from_secs(10)),
    );
    let plugins = default_plugins().await;
    let scheduler = scheduler(Arc::clone(&reader), Arc::clone(&checkout), plugins.clone()).await;

    for target in [product("2710"), drop_set("293")] {
        let classifier = classifier(&plugins, &target).await;
        scheduler.schedule(target, classifier).await.unwrap();
    }

    // Past the slow checkout, so the first target has either stopped or resumed.
    tokio::time::sleep(Duration::from_secs(11)).await;

    let slow = &checkout.calls_for("2710")[0];
    let fast = &checkout.calls_for("293")[0];
    assert!(fast.finished < slow.finished);
    // 293 turns available one poll after 2710 and is checked out on that same poll.
    assert!(fast.started.duration_since(slow.started) <= Duration::from_millis(POLL_MS));

    let slow_job = scheduler.get_job_info("2710").await.unwrap();
    assert_eq!(slow_job.status, slow_state_after);
    assert_eq!(slow_job.checkouts, 1);
    let fast_job = scheduler.get_job_info("293").await.unwrap();
    assert_eq!(fast_job.status, WatchState::Stopped);
    assert_eq!(fast_job.stop_reason, Some(StopReason::Handler));

    let summary = scheduler.shutdown().await;
    assert_eq!(summary.completed.len(), 2);
    assert!(summary.failed.is_empty());

    let stats = scheduler.get_stats().await;
    assert_eq!(stats.stopped_jobs, 2);
    assert_eq!(stats.total_transitions, 2);
    assert_eq!(stats.total_checkouts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_watch_promptly() {
    let reader = Arc::new(
        FixtureReader::new()
            .script("2710", vec![product_out()])
            .script("293", vec![set_closed()]),
    );
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::Success));
    let plugins = default_plugins().await;
    let sink = RecordingSink::default();
    plugins.register_sink(Box::new(sink.clone())).await.unwrap();
    let scheduler = scheduler(Arc::clone(&reader), Arc::clone(&checkout), plugins.clone()).await;

    for target in [product("2710"), drop_set("293")] {
        let classifier = classifier(&plugins, &target).await;
        scheduler.schedule(target, classifier).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(5 * POLL_MS)).await;
    let job = scheduler.get_job_info("2710").await.unwrap();
    assert_eq!(job.status, WatchState::Watching);
    assert!(job.polls >= 5);

    let started = Instant::now();
    let summary = scheduler.shutdown().await;
    assert!(started.elapsed() <= Duration::from_millis(POLL_MS));

    assert_eq!(summary.completed.len(), 2);
    assert!(summary
        .completed
        .iter()
        .all(|report| report.stop_reason == StopReason::Cancelled));
    let mut released = reader.released();
    released.sort();
    assert_eq!(released, vec!["2710".to_string(), "293".to_string()]);
    assert!(checkout.calls().is_empty());

    let stopped = sink
        .received()
        .into_iter()
        .filter(|n| matches!(n, Notification::TargetStopped { .. }))
        .count();
    assert_eq!(stopped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_target_does_not_take_down_others() {
    let reader = Arc::new(
        FixtureReader::new()
            .script("666", vec![product_out(), Page::Crashed])
            .script("293", vec![set_closed(), set_closed(), set_closed(), set_open()]),
    );
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::Success));
    let plugins = default_plugins().await;
    let scheduler = scheduler(Arc::clone(&reader), Arc::clone(&checkout), plugins.clone()).await;

    for target in [product("666"), drop_set("293")] {
        let classifier = classifier(&plugins, &target).await;
        scheduler.schedule(target, classifier).await.unwrap();
    }

    let summary = scheduler.wait().await;

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].target_id, "666");
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].target_id, "293");
    assert!(!summary.all_failed());

    let crashed = scheduler.get_job_info("666").await.unwrap();
    assert_eq!(crashed.status, WatchState::Stopped);
    assert!(matches!(crashed.stop_reason, Some(StopReason::Fatal { .. })));
    assert!(crashed.last_error.unwrap().contains("tab crashed"));
    assert_eq!(checkout.calls_for("293").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_target_cannot_be_scheduled_twice() {
    let reader = Arc::new(FixtureReader::new().script("2710", vec![product_out()]));
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::Success));
    let plugins = default_plugins().await;
    let scheduler = scheduler(reader, checkout, plugins.clone()).await;
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    scheduler
        .schedule(target.clone(), Arc::clone(&classifier))
        .await
        .unwrap();
    assert!(scheduler.schedule(target, classifier).await.is_err());

    scheduler.shutdown().await;
}
