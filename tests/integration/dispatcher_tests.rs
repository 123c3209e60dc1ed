use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use restock_watcher::models::{CheckoutOutcome, StopReason, WatchState};
use restock_watcher::MonitorOnlyCheckout;

use super::*;

fn flapping() -> Vec<Page> {
    vec![product_out(), product_in(), product_out(), product_in()]
}

#[tokio::test(start_paused = true)]
async fn test_successful_checkout_ends_the_watch() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", flapping()));
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::Success));
    let plugins = default_plugins().await;
    let dispatcher = dispatcher(Arc::clone(&checkout), plugins.clone(), false);
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    let report = watcher(Arc::clone(&reader), watcher_config())
        .start_watch(&target, classifier.as_ref(), dispatcher.as_ref(), &stop)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Handler);
    assert_eq!(report.state, WatchState::Stopped);
    assert_eq!(report.polls, 2);
    assert_eq!(reader.reads("2710"), 2);
    assert_eq!(checkout.calls().len(), 1);
    assert!(!stop.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_failed_checkout_resumes_until_next_restock() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", flapping()));
    let checkout = Arc::new(
        StubCheckout::always(CheckoutOutcome::Success)
            .then("2710", CheckoutOutcome::failure("ADD TO BAG never appeared"))
            .then("2710", CheckoutOutcome::failure("cart empty")),
    );
    let plugins = default_plugins().await;
    let dispatcher = dispatcher(Arc::clone(&checkout), plugins.clone(), false);
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    let report = watcher(Arc::clone(&reader), watcher_config())
        .start_watch(&target, classifier.as_ref(), dispatcher.as_ref(), &stop)
        .await
        .unwrap();

    assert_eq!(report.transitions, 2);
    assert_eq!(checkout.calls().len(), 2);
    assert_eq!(report.stop_reason, StopReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_stop_on_failure_ends_the_watch() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", flapping()));
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::failure("cart empty")));
    let plugins = default_plugins().await;
    let dispatcher = dispatcher(Arc::clone(&checkout), plugins.clone(), true);
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    let report = watcher(Arc::clone(&reader), watcher_config())
        .start_watch(&target, classifier.as_ref(), dispatcher.as_ref(), &stop)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Handler);
    assert_eq!(report.transitions, 1);
    assert_eq!(checkout.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_polls_while_checkout_runs() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", flapping()));
    let checkout = Arc::new(
        StubCheckout::always(CheckoutOutcome::failure("timed out"))
            .slow("2710", Duration::from_secs(5)),
    );
    let plugins = default_plugins().await;
    let dispatcher = dispatcher(Arc::clone(&checkout), plugins.clone(), false);
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    let watch = {
        let reader = Arc::clone(&reader);
        let stop = stop.clone();
        tokio::spawn(async move {
            watcher(reader, watcher_config())
                .start_watch(&target, classifier.as_ref(), dispatcher.as_ref(), &stop)
                .await
        })
    };

    // Well inside the first checkout: the restock was read on poll 2.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(reader.reads("2710"), 2);

    let report = watch.await.unwrap().unwrap();
    assert_eq!(report.transitions, 2);
    let calls = checkout.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].started >= calls[0].finished);
}

#[tokio::test(start_paused = true)]
async fn test_sinks_hear_restock_and_checkout() {
    let stop = CancellationToken::new();
    let reader = Arc::new(
        FixtureReader::stopping(stop.clone()).script("293", vec![set_closed(), set_open()]),
    );
    let checkout = Arc::new(StubCheckout::always(CheckoutOutcome::Success));
    let plugins = default_plugins().await;
    let sink = RecordingSink::default();
    plugins.register_sink(Box::new(sink.clone())).await.unwrap();
    let dispatcher = dispatcher(Arc::clone(&checkout), plugins.clone(), false);
    let target = drop_set("293");
    let classifier = classifier(&plugins, &target).await;

    watcher(Arc::clone(&reader), watcher_config())
        .start_watch(&target, classifier.as_ref(), dispatcher.as_ref(), &stop)
        .await
        .unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 2);
    match &received[0] {
        Notification::Transition { event } => {
            assert_eq!(event.target_id, "293");
            assert_eq!(event.status.poll_count, 2);
        }
        other => panic!("expected a transition first, got {:?}", other),
    }
    match &received[1] {
        Notification::CheckoutFinished { outcome, signal, .. } => {
            assert_eq!(outcome, &CheckoutOutcome::Success);
            assert!(!signal.should_continue());
        }
        other => panic!("expected the checkout result, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_monitor_only_keeps_watching() {
    let stop = CancellationToken::new();
    let reader = Arc::new(FixtureReader::stopping(stop.clone()).script("2710", flapping()));
    let plugins = default_plugins().await;
    let dispatcher = ReactionDispatcher::new(
        Arc::new(MonitorOnlyCheckout),
        plugins.clone(),
        &DispatcherConfig::default(),
    );
    let target = product("2710");
    let classifier = classifier(&plugins, &target).await;

    let report = watcher(Arc::clone(&reader), watcher_config())
        .start_watch(&target, classifier.as_ref(), &dispatcher, &stop)
        .await
        .unwrap();

    assert_eq!(report.transitions, 2);
    assert_eq!(report.stop_reason, StopReason::Cancelled);
}
