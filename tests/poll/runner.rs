use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, wait_for_rendered_len, FailingSink, RecordingSink},
    mock_server::{MockResults, MockResultsServer, ScriptedPage},
};
use anyhow::{Context, Result};
use pagepoll::{PacingPolicy, PollerConfig, Runner};
use tokio::time::{sleep, timeout};

fn fast_config(server: &MockResultsServer) -> Result<PollerConfig> {
    PollerConfig::builder()
        .results_url(server.results_url())
        .query("cats")
        .pacing(
            PacingPolicy::default()
                .with_initial_delay_ms(10.0)
                .with_growth_increment_ms(10.0)
                .with_max_delay_ms(50.0),
        )
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_exits_on_sink_failure() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    results.script_page(
        0,
        ScriptedPage::Items(vec!["http://tracker.example/a".into()]),
    );
    let server = MockResultsServer::start(results.clone()).await?;

    let mut runner = Runner::new(fast_config(&server)?, FailingSink::new(0));
    let outcome = timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after sink failure")?;

    let err = outcome.expect_err("sink failure should abort runner");
    let message = format!("{err:#}");
    assert!(
        message.contains("poll session aborted"),
        "runner did not propagate sink failure, got {message}"
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_can_restart_after_stop() -> Result<()> {
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
    let mut runner = Runner::new(fast_config(&server)?, sink);

    runner.start()?;
    wait_for_rendered_len(&state, 3, Duration::from_secs(5)).await?;
    runner.stop().await?;

    runner.start()?;
    wait_for_rendered_len(&state, 6, Duration::from_secs(5)).await?;
    runner.stop().await?;
    server.shutdown().await;

    let guard = state.lock().await;
    assert_eq!(
        guard.rendered.len(),
        6,
        "restart should poll from the start offset again"
    );
    assert_eq!(
        guard.rendered[..3],
        guard.rendered[3..6],
        "both runs should render the same items at the same positions"
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn external_cancellation_stops_the_runner() -> Result<()> {
    init_tracing();
    let results = MockResults::new();
    let server = MockResultsServer::start(results.clone()).await?;

    let (sink, _state) = RecordingSink::new();
    let mut runner = Runner::new(fast_config(&server)?, sink);
    let token = runner.cancellation_token();
    let canceller = tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let outcome = timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after external cancellation")?;
    outcome?;
    assert!(!runner.session().is_running());
    canceller.await?;

    server.shutdown().await;
    Ok(())
}
