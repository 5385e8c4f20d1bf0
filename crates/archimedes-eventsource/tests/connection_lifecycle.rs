//! Connection lifecycle integration tests.
//!
//! Drives [`SseConnection`] through a [`ChannelTransport`] under paused tokio
//! time, covering the open/error/retry/close transitions end to end.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archimedes_eventsource::prelude::*;
use archimedes_eventsource::transport::{ChannelTransport, SignalSender, TransportController};
use archimedes_eventsource::RawEvent;
use futures_util::FutureExt;
use proptest::prelude::*;
use tokio::time::Instant;

const URL: &str = "https://example.test/events";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn connect(config: ConnectionConfig) -> (SseConnection<ChannelTransport>, TransportController) {
    let (transport, controller) = ChannelTransport::new();
    let conn = SseConnection::connect_with_config(transport, config).unwrap();
    (conn, controller)
}

async fn next_sender(controller: &mut TransportController) -> SignalSender {
    controller.next_open().await.unwrap().into_sender()
}

fn opens_pending(controller: &mut TransportController) -> usize {
    let mut count = 0;
    while controller.try_next_open().is_some() {
        count += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handler_invoked_once_per_matching_event() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);
    let handler = MessageHandler::new(move |msg: &SseMessage| log.lock().unwrap().push(msg.clone()));
    conn.on("update", handler);

    let sender = next_sender(&mut controller).await;
    sender.opened();
    sender.message(RawEvent::new("{\"v\":1}").event("update").id("1"));
    sender.message(RawEvent::new("ignored").event("other"));
    for _ in 0..3 {
        conn.next_step().await;
    }

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_name(), "update");
    assert_eq!(received[0].data(), "{\"v\":1}");
    assert_eq!(received[0].origin(), URL);
    assert_eq!(received[0].id(), Some("1"));
}

#[tokio::test]
async fn test_duplicate_registration_and_off() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    let calls = Arc::new(Mutex::new(0_u32));
    let counter = Arc::clone(&calls);
    let handler = MessageHandler::new(move |_| *counter.lock().unwrap() += 1);

    conn.on("update", handler.clone()).on("update", handler.clone());

    let sender = next_sender(&mut controller).await;
    sender.opened();
    sender.message(RawEvent::new("1").event("update"));
    conn.next_step().await;
    conn.next_step().await;
    assert_eq!(*calls.lock().unwrap(), 2);

    conn.off("update", &handler);
    sender.message(RawEvent::new("2").event("update"));
    conn.next_step().await;
    assert_eq!(*calls.lock().unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_open_error_then_reconnect_after_interval() {
    init_tracing();
    let config = ConnectionConfig::new(URL).with_reconnect_interval(Duration::from_millis(1000));
    let (mut conn, mut controller) = connect(config);
    conn.setup_auto_reconnect();

    let sender = next_sender(&mut controller).await;
    sender.opened();
    conn.next_step().await;
    assert_eq!(conn.connection_state(), EventState::Open);

    sender.error(TransportError::network("connection reset"));
    conn.next_step().await;
    assert_eq!(conn.connection_state(), EventState::Error);
    assert!(conn.is_retry_pending());

    let failed_at = Instant::now();
    conn.next_step().await;
    assert_eq!(conn.connection_state(), EventState::Connecting);
    assert!(failed_at.elapsed() >= Duration::from_millis(1000));
    assert_eq!(conn.retry_count(), 1);
    assert!(controller.try_next_open().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_at_max_retries() {
    init_tracing();
    let config = ConnectionConfig::new(URL)
        .with_reconnect_interval(Duration::from_millis(100))
        .with_max_retries(3);
    let (mut conn, mut controller) = connect(config);
    conn.setup_auto_reconnect();

    let mut reconnections = 0;
    loop {
        let Some(opened) = controller.try_next_open() else {
            break;
        };
        opened.sender().error(TransportError::network("refused"));
        conn.next_step().await;
        assert!(conn.retry_count() <= 3);
        if conn.next_step().await {
            reconnections += 1;
        }
    }

    assert_eq!(reconnections, 3);
    assert_eq!(conn.retry_count(), 3);
    assert_eq!(conn.connection_state(), EventState::Error);
    assert!(!conn.is_retry_pending());
    assert!(!conn.next_step().await);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_renews_retry_budget() {
    init_tracing();
    let config = ConnectionConfig::new(URL)
        .with_reconnect_interval(Duration::from_millis(100))
        .with_max_retries(3);
    let (mut conn, mut controller) = connect(config);
    conn.setup_auto_reconnect();

    // Three failed attempts use the whole budget.
    for _ in 0..3 {
        next_sender(&mut controller)
            .await
            .error(TransportError::StreamAborted);
        conn.next_step().await;
        conn.next_step().await;
    }
    assert_eq!(conn.retry_count(), 3);

    // The third retry succeeds.
    let sender = next_sender(&mut controller).await;
    sender.opened();
    conn.next_step().await;
    assert!(conn.is_open());
    assert_eq!(conn.retry_count(), 0);

    // A fourth cumulative retry is still allowed.
    sender.error(TransportError::StreamAborted);
    conn.next_step().await;
    assert!(conn.is_retry_pending());
    conn.next_step().await;
    assert_eq!(conn.connection_state(), EventState::Connecting);
    assert_eq!(conn.retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_burst_schedules_one_retry() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    conn.setup_auto_reconnect();

    let sender = next_sender(&mut controller).await;
    sender.opened();
    sender.error(TransportError::network("first"));
    sender.error(TransportError::network("second"));
    conn.next_step().await;
    conn.next_step().await;
    assert_eq!(conn.retry_count(), 1);

    conn.next_step().await;
    assert_eq!(conn.connection_state(), EventState::Connecting);
    assert_eq!(conn.retry_count(), 1);
    assert_eq!(opens_pending(&mut controller), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_retry() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    conn.setup_auto_reconnect();

    let sender = next_sender(&mut controller).await;
    sender.error(TransportError::network("down"));
    conn.next_step().await;
    assert!(conn.is_retry_pending());

    conn.close();
    assert!(!conn.is_retry_pending());
    assert!(!conn.next_step().await);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(conn.is_closed());
    assert_eq!(opens_pending(&mut controller), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_from_error_handler_preempts_retry() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    let handle = conn.handle();
    conn.on_error(ErrorHandler::new(move |_| {
        handle.close().unwrap();
    }))
    .setup_auto_reconnect();

    next_sender(&mut controller)
        .await
        .error(TransportError::unknown("boom"));
    conn.next_step().await;

    assert!(conn.is_closed());
    assert!(!conn.is_retry_pending());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!conn.next_step().await);
    assert_eq!(opens_pending(&mut controller), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_bypasses_exhausted_budget() {
    init_tracing();
    let config = ConnectionConfig::new(URL)
        .with_reconnect_interval(Duration::from_millis(100))
        .with_max_retries(1);
    let (mut conn, mut controller) = connect(config);
    conn.setup_auto_reconnect();

    for _ in 0..2 {
        next_sender(&mut controller)
            .await
            .error(TransportError::StreamAborted);
        conn.next_step().await;
        conn.next_step().await;
    }
    assert_eq!(conn.retry_count(), 1);
    assert_eq!(conn.connection_state(), EventState::Error);

    conn.close();
    conn.reconnect();
    assert_eq!(conn.connection_state(), EventState::Connecting);
    assert_eq!(conn.retry_count(), 0);
    assert!(controller.try_next_open().is_some());
}

#[tokio::test]
async fn test_handle_reconnect_from_other_task() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    let first = next_sender(&mut controller).await;
    let handle = conn.handle();

    tokio::spawn(async move {
        handle.reconnect().unwrap();
    })
    .await
    .unwrap();

    assert!(conn.next_step().await);
    assert_eq!(conn.connection_state(), EventState::Connecting);
    assert_eq!(first.terminate_count(), 1);
    assert!(controller.try_next_open().is_some());
}

#[tokio::test]
async fn test_run_returns_when_closed_by_handler() {
    init_tracing();
    let (mut conn, mut controller) = connect(ConnectionConfig::new(URL));
    let handle = conn.handle();
    conn.on("shutdown", MessageHandler::new(move |_| handle.close().unwrap()));

    let sender = next_sender(&mut controller).await;
    sender.opened();
    sender.message(RawEvent::new("").event("shutdown"));

    tokio::time::timeout(Duration::from_secs(1), conn.run())
        .await
        .unwrap();
    assert!(conn.is_closed());
    assert_eq!(sender.terminate_count(), 1);
}

// ---------------------------------------------------------------------------
// Handler panics
// ---------------------------------------------------------------------------

fn panics_once(flag: &Arc<AtomicBool>) -> bool {
    flag.swap(false, Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn test_handler_panic_propagates_and_connection_recovers() {
    init_tracing();
    let config = ConnectionConfig::new(URL).with_reconnect_interval(Duration::from_millis(100));
    let (mut conn, mut controller) = connect(config);
    conn.setup_auto_reconnect();

    let message_armed = Arc::new(AtomicBool::new(true));
    let error_armed = Arc::new(AtomicBool::new(true));
    let received = Arc::new(Mutex::new(Vec::new()));

    let flag = Arc::clone(&message_armed);
    let log = Arc::clone(&received);
    conn.on("update", MessageHandler::new(move |msg| {
        if panics_once(&flag) {
            panic!("update handler failed");
        }
        log.lock().unwrap().push(msg.data().to_string());
    }));
    let flag = Arc::clone(&error_armed);
    conn.on_error(ErrorHandler::new(move |_| {
        if panics_once(&flag) {
            panic!("error handler failed");
        }
    }));

    let sender = next_sender(&mut controller).await;
    sender.opened();
    sender.message(RawEvent::new("first").event("update"));
    sender.message(RawEvent::new("second").event("update"));
    conn.next_step().await;

    // A panicking message handler unwinds out of next_step.
    let outcome = AssertUnwindSafe(conn.next_step()).catch_unwind().await;
    assert!(outcome.is_err());
    assert!(conn.is_open());
    assert_eq!(conn.handler_count("update"), 1);

    conn.next_step().await;
    assert_eq!(*received.lock().unwrap(), vec!["second"]);

    // A panicking error handler still leaves the retry armed.
    sender.error(TransportError::network("reset"));
    let outcome = AssertUnwindSafe(conn.next_step()).catch_unwind().await;
    assert!(outcome.is_err());
    assert_eq!(conn.connection_state(), EventState::Error);
    assert!(conn.is_retry_pending());

    assert!(conn.next_step().await);
    assert_eq!(conn.connection_state(), EventState::Connecting);
    next_sender(&mut controller).await.opened();
    conn.next_step().await;
    assert!(conn.is_open());
    assert_eq!(conn.retry_count(), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_connect_starts_connecting(
        scheme in prop::sample::select(vec!["http", "https"]),
        host in "[a-z]{1,12}(\\.[a-z]{2,6}){0,2}",
        path in "(/[a-z0-9_-]{1,8}){0,4}",
    ) {
        let url = format!("{scheme}://{host}{path}");
        let (transport, _controller) = ChannelTransport::new();
        let conn = SseConnection::connect(transport, url.clone()).unwrap();

        prop_assert_eq!(conn.connection_state(), EventState::Connecting);
        prop_assert_eq!(conn.url(), url.as_str());
    }

    #[test]
    fn prop_config_round_trips(
        with_credentials in any::<bool>(),
        interval_ms in 1_u64..600_000,
        max_retries in 0_u32..100,
    ) {
        let config = ConnectionConfig::new(URL)
            .with_credentials(with_credentials)
            .with_reconnect_interval(Duration::from_millis(interval_ms))
            .with_max_retries(max_retries);
        let (conn, _controller) = connect(config.clone());

        prop_assert_eq!(conn.config(), &config);
    }
}
