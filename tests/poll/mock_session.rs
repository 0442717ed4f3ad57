use std::time::Duration;

use crate::support::{
    helpers::{
        assert_positions_are_contiguous, init_tracing, wait_for_cycles, wait_for_fault_count,
        wait_for_offset, FailingSink, RecordingSink,
    },
    mock_server::{MockResults, MockResultsServer, ScriptedPage},
};
use anyhow::Result;
use pagepoll::{probe_once, PacingPolicy, PollSession, PollerConfig};
use tokio::time::{sleep, timeout};

fn fast_pacing() -> PacingPolicy {
    PacingPolicy::default()
        .with_initial_delay_ms(10.0)
        .with_growth_increment_ms(10.0)
        .with_max_delay_ms(50.0)
}

fn fast_config(server: &MockResultsServer) -> Result<PollerConfig> {
    PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .pacing(fast_pacing())
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_renders_pages_in_order_and_advances_offset() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(
        0,
        ScriptedPage::Items(vec![
            "http://tracker.example/a".into(),
            "http://tracker.example/b".into(),
        ]),
    );
    results.script_page(
        2,
        ScriptedPage::Items(vec!["http://tracker.example/c".into()]),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(fast_config(&server)?, sink);
    session.start()?;

    wait_for_offset(&session, 3, Duration::from_secs(5)).await?;
    session.stop().await?;

    {
        let guard = state.lock().await;
        assert_eq!(
            guard.rendered,
            vec![
                (0, "http://tracker.example/a".to_owned()),
                (1, "http://tracker.example/b".to_owned()),
                (2, "http://tracker.example/c".to_owned()),
            ]
        );
        assert_positions_are_contiguous(&guard.rendered);
    }

    let telemetry = session.telemetry();
    assert_eq!(telemetry.items_rendered(), 3);
    assert!(telemetry.cycles() >= 2);

    let offsets = results.requested_offsets();
    assert_eq!(
        &offsets[..2],
        &[0, 2],
        "each fetch must ask for the first unseen offset"
    );
    assert!(results
        .requests()
        .iter()
        .all(|request| request.query == "cats"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_starts_from_the_configured_offset() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(
        4,
        ScriptedPage::Items(vec!["http://tracker.example/e".into()]),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let config = PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .start_offset(4)
        .pacing(fast_pacing())
        .build()?;
    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(config, sink);
    session.start()?;

    wait_for_offset(&session, 5, Duration::from_secs(5)).await?;
    session.stop().await?;

    let guard = state.lock().await;
    assert_eq!(
        guard.rendered,
        vec![(4, "http://tracker.example/e".to_owned())]
    );
    assert_eq!(results.requested_offsets().first(), Some(&4));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_pages_leave_the_offset_untouched() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    let server = MockResultsServer::start(results.clone()).await?;

    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(fast_config(&server)?, sink);
    let telemetry = session.telemetry();
    session.start()?;

    wait_for_cycles(&telemetry, 3, Duration::from_secs(5)).await?;
    session.stop().await?;

    assert_eq!(session.offset(), 0);
    assert_eq!(telemetry.items_rendered(), 0);
    assert!(telemetry.empty_cycles() >= 3);
    assert!(state.lock().await.rendered.is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn non_success_status_bodies_are_still_decoded() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(
        0,
        ScriptedPage::Status(500, r#"["http://tracker.example/a"]"#.into()),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(fast_config(&server)?, sink);
    session.start()?;

    wait_for_offset(&session, 1, Duration::from_secs(5)).await?;
    session.stop().await?;

    let guard = state.lock().await;
    assert_eq!(
        guard.rendered,
        vec![(0, "http://tracker.example/a".to_owned())]
    );
    assert_eq!(session.telemetry().transport_faults(), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_page_is_discarded_and_polling_continues() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page_once(0, ScriptedPage::Raw("{not json".into()));
    results.script_page(
        0,
        ScriptedPage::Items(vec!["http://tracker.example/a".into()]),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(fast_config(&server)?, sink);
    let telemetry = session.telemetry();
    session.start()?;

    wait_for_offset(&session, 1, Duration::from_secs(5)).await?;
    session.stop().await?;

    assert_eq!(telemetry.decode_faults(), 1);
    assert_eq!(state.lock().await.rendered.len(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_endpoint_counts_transport_faults() -> Result<()> {
    init_tracing();
    // Bind then drop a listener so the port refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let config = PollerConfig::builder()
        .results_url(format!("http://{addr}/results"))
        .query("cats")
        .pacing(fast_pacing())
        .build()?;
    let (sink, state) = RecordingSink::new();
    let mut session = PollSession::new(config, sink);
    let telemetry = session.telemetry();
    session.start()?;

    wait_for_fault_count(&telemetry, 2, Duration::from_secs(5)).await?;
    session.stop().await?;

    assert!(telemetry.transport_faults() >= 2);
    assert_eq!(session.offset(), 0);
    assert!(state.lock().await.rendered.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sink_failure_aborts_the_session() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(
        0,
        ScriptedPage::Items(vec!["http://tracker.example/a".into()]),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let mut session = PollSession::new(fast_config(&server)?, FailingSink::new(0));
    session.start()?;
    sleep(Duration::from_millis(300)).await;

    let err = session
        .stop()
        .await
        .expect_err("render failure should surface from stop");
    let message = format!("{err:#}");
    assert!(
        message.contains("poll session aborted"),
        "unexpected error: {message}"
    );
    assert!(
        message.contains("Render sink error"),
        "unexpected error: {message}"
    );
    assert!(!session.is_running());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fault_budget_aborts_the_session() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.set_fallback(ScriptedPage::Raw("not json".into()));
    let server = MockResultsServer::start(results.clone()).await?;

    let config = PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .pacing(fast_pacing())
        .max_consecutive_faults(3)
        .build()?;
    let (sink, _state) = RecordingSink::new();
    let mut session = PollSession::new(config, sink);
    let telemetry = session.telemetry();
    session.start()?;

    wait_for_fault_count(&telemetry, 3, Duration::from_secs(5)).await?;
    sleep(Duration::from_millis(100)).await;

    let err = session
        .stop()
        .await
        .expect_err("exhausted fault budget should surface from stop");
    let message = format!("{err:#}");
    assert!(
        message.contains("consecutive fetch faults"),
        "unexpected error: {message}"
    );
    assert_eq!(telemetry.decode_faults(), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_interrupts_a_long_backoff() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    let server = MockResultsServer::start(results.clone()).await?;

    let config = PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .pacing(
            PacingPolicy::default()
                .with_initial_delay_ms(30_000.0)
                .with_max_delay_ms(60_000.0),
        )
        .build()?;
    let (sink, _state) = RecordingSink::new();
    let mut session = PollSession::new(config, sink);
    let telemetry = session.telemetry();
    session.start()?;

    wait_for_cycles(&telemetry, 1, Duration::from_secs(5)).await?;

    timeout(Duration::from_secs(2), session.stop())
        .await
        .expect("stop should interrupt the backoff sleep")?;
    assert!(!session.is_running());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn probe_once_returns_the_raw_body() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(5, ScriptedPage::Raw("!!raw diagnostic body!!".into()));
    let server = MockResultsServer::start(results.clone()).await?;

    let config = PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .start_offset(5)
        .build()?;

    let body = probe_once(&config).await?;
    assert_eq!(body, "!!raw diagnostic body!!");
    assert_eq!(results.hits(), 1);

    server.shutdown().await;
    Ok(())
}
