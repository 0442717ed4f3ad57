//! Polling session orchestration.
//!
//! `PollSession` composes smaller modules so each concern is owned by the
//! component that knows it best:
//! - `pacing` owns the adaptive delay between fetches.
//! - `decode` turns response bodies into ordered pages of result items.
//! - `client` performs the HTTP exchange with the results endpoint.
//! - `lifecycle` wires run-scoped cancellation, the telemetry reporter, and
//!   fatal error propagation.
//!
//! The struct defined below orchestrates these pieces so callers interact
//! with a single `PollSession` API while implementation details live in the
//! focused submodules.

use super::lifecycle::{LifecycleHandles, LifecycleSpawnParams};
use super::pacing::PollPacer;

use crate::client::http::{HttpResultsClient, ResultsTransport};
use crate::poller::decode::{decode_page, ResultItem};
use crate::runtime::config::PollerConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::hooks::HookDecision;
use crate::runtime::offset::OffsetCursor;
use crate::runtime::sink::ResultSink;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub struct PollSession<S: ResultSink> {
    config: PollerConfig,
    sink: Arc<RwLock<S>>,
    transport: Option<Arc<dyn ResultsTransport>>,
    loop_handle: Option<JoinHandle<Result<()>>>,
    running: bool,
    shutdown_root: CancellationToken,
    offset: Arc<OffsetCursor>,
    telemetry: Arc<Telemetry>,
    lifecycle: Option<LifecycleHandles>,
}

pub(crate) enum PageAction {
    Rendered,
    Cancelled,
}

pub(crate) struct SessionHandles<S: ResultSink> {
    pub(super) sink: Arc<RwLock<S>>,
    pub(super) transport: Arc<dyn ResultsTransport>,
    pub(super) offset: Arc<OffsetCursor>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) fatal_handler: Arc<FatalErrorHandler>,
}

impl<S: ResultSink> PollSession<S> {
    /// Creates a new polling session with the given configuration and sink.
    ///
    /// The session creates its own root cancellation token. Use [`Self::with_cancellation_token`]
    /// if you need to integrate with an existing shutdown mechanism.
    pub fn new(config: PollerConfig, sink: S) -> Self {
        Self::with_cancellation_token(config, sink, CancellationToken::new())
    }

    /// Creates a new polling session with the given configuration, sink, and shutdown token.
    ///
    /// The shutdown token is used to derive per-run cancellation tokens for the poll loop.
    pub fn with_cancellation_token(
        config: PollerConfig,
        sink: S,
        shutdown_token: CancellationToken,
    ) -> Self {
        let offset = Arc::new(OffsetCursor::new(config.start_offset()));
        Self {
            sink: Arc::new(RwLock::new(sink)),
            transport: None,
            loop_handle: None,
            running: false,
            shutdown_root: shutdown_token,
            offset,
            telemetry: Arc::new(Telemetry::default()),
            config,
            lifecycle: None,
        }
    }

    /// Replaces the HTTP transport with a caller-supplied implementation.
    ///
    /// By default the session builds an [`HttpResultsClient`] from its
    /// configuration on `start`. Must be called before `start`.
    pub fn with_transport(mut self, transport: Arc<dyn ResultsTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns a reference to the session's configuration.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Returns a reference to the sink instance wrapped in an `RwLock`.
    pub fn sink(&self) -> &Arc<RwLock<S>> {
        &self.sink
    }

    /// Current offset: how many result items have been consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset.current()
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replaces the root shutdown token used to derive per-run cancellation tokens.
    /// This must only be called while the session is idle (i.e. between `stop` and `start`).
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while the session is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Starts the polling loop from the configured start offset.
    ///
    /// Returns an error if the session is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            bail!("poll session already running");
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "PollerConfig should have been validated at construction time"
        );

        let transport: Arc<dyn ResultsTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(
                HttpResultsClient::from_config(&self.config)
                    .context("failed to build results client")?,
            ),
        };

        tracing::info!(
            query = %self.config.query(),
            start_offset = self.config.start_offset(),
            "starting poll session"
        );

        self.offset.reset(self.config.start_offset());

        let lifecycle = LifecycleHandles::spawn(LifecycleSpawnParams {
            shutdown_root: &self.shutdown_root,
            telemetry: self.telemetry.clone(),
            offset: self.offset.clone(),
            metrics_interval: self.config.metrics_interval(),
        });
        let fatal_handler = lifecycle.fatal_handler();
        let run_token = lifecycle.run_token.clone();

        let handles = SessionHandles {
            sink: self.sink.clone(),
            transport,
            offset: self.offset.clone(),
            telemetry: self.telemetry.clone(),
            fatal_handler,
        };
        let loop_handle = Self::spawn_poll_loop(handles, run_token, self.config.clone());
        self.loop_handle = Some(loop_handle);
        self.lifecycle = Some(lifecycle);
        self.running = true;

        Ok(())
    }

    /// Stops the polling loop gracefully.
    ///
    /// Cancels the run token, joins the loop task, and invokes the sink's shutdown hook.
    /// Returns any error encountered during the run.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping poll session");

        let lifecycle_error = self.lifecycle.as_ref().and_then(|handles| handles.error());
        if let Some(handles) = &self.lifecycle {
            handles.run_token.cancel();
        }

        let mut loop_error: Option<anyhow::Error> = None;
        if let Some(handle) = self.loop_handle.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "poll loop exited with error");
                    loop_error = Some(err);
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to join poll loop task");
                    loop_error = Some(err.into());
                }
            }
        }
        tracing::debug!("poll session stop: loop task joined");

        if let Some(handles) = self.lifecycle.take() {
            handles.shutdown().await;
        }

        {
            let mut sink = self.sink.write().await;
            sink.shutdown().await.context("failed to shutdown sink")?;
        }

        self.running = false;

        let final_error = loop_error.or(lifecycle_error);

        if let Some(err) = final_error {
            return Err(err).context("poll session aborted");
        }

        Ok(())
    }

    fn spawn_poll_loop(
        handles: SessionHandles<S>,
        shutdown: CancellationToken,
        config: PollerConfig,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let mut pacer = PollPacer::new(config.pacing());
            let mut consecutive_faults: u32 = 0;

            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                let offset = handles.offset.current();
                let fetched = tokio::select! {
                    result = handles.transport.fetch_page(config.query(), offset) => result,
                    _ = shutdown.cancelled() => {
                        tracing::info!("poll loop received shutdown signal while fetching");
                        break;
                    }
                };

                match fetched {
                    Ok(body) => match decode_page(&body) {
                        Ok(items) if items.is_empty() => {
                            consecutive_faults = 0;
                            handles.telemetry.record_empty_cycle();
                            tracing::debug!(offset, "results page carried no new items");
                        }
                        Ok(items) => {
                            consecutive_faults = 0;
                            match Self::render_page(&handles, items, &mut pacer, &shutdown).await? {
                                PageAction::Rendered => {}
                                PageAction::Cancelled => break,
                            }
                        }
                        Err(err) => {
                            handles.telemetry.record_decode_fault();
                            consecutive_faults += 1;
                            tracing::warn!(
                                offset,
                                body_bytes = err.body_len(),
                                error = %err,
                                "discarding undecodable results page"
                            );
                            Self::check_fault_budget(&handles, &config, consecutive_faults)?;
                        }
                    },
                    Err(err) => {
                        handles.telemetry.record_transport_fault();
                        consecutive_faults += 1;
                        tracing::warn!(offset, error = %err, "results fetch failed");
                        Self::check_fault_budget(&handles, &config, consecutive_faults)?;
                    }
                }

                handles.telemetry.record_cycle();

                tokio::select! {
                    _ = sleep(pacer.sleep_delay()) => {}
                    _ = shutdown.cancelled() => {
                        tracing::info!("poll loop received shutdown signal during backoff");
                        break;
                    }
                }
                pacer.grow_for_next_cycle();
            }

            tracing::info!("poll loop stopped");
            Ok(())
        })
    }

    /// Renders one page of items in order, advancing the offset and shrinking
    /// the pacer once per item. Sink failures are routed to the fatal handler.
    async fn render_page(
        handles: &SessionHandles<S>,
        items: Vec<ResultItem>,
        pacer: &mut PollPacer,
        shutdown: &CancellationToken,
    ) -> Result<PageAction> {
        let count = items.len();
        let mut sink = handles.sink.write().await;

        for item in items {
            let position = handles.offset.current();
            let render_future = sink.render(item, position);
            tokio::pin!(render_future);
            let hook = tokio::select! {
                result = &mut render_future => HookDecision::Finished(result),
                _ = shutdown.cancelled() => HookDecision::Cancelled,
            };
            match hook {
                HookDecision::Finished(Ok(())) => {
                    handles.offset.advance(1);
                    pacer.record_items(1);
                    handles.telemetry.record_items_rendered(1);
                }
                HookDecision::Finished(Err(error)) => {
                    return Err(handles.fatal_handler.trigger(error));
                }
                HookDecision::Cancelled => {
                    tracing::info!("poll loop received shutdown signal while rendering");
                    return Ok(PageAction::Cancelled);
                }
            }
        }

        tracing::debug!(
            items = count,
            offset = handles.offset.current(),
            "rendered results page"
        );
        Ok(PageAction::Rendered)
    }

    fn check_fault_budget(
        handles: &SessionHandles<S>,
        config: &PollerConfig,
        consecutive_faults: u32,
    ) -> Result<()> {
        if let Some(budget) = config.max_consecutive_faults() {
            if consecutive_faults >= budget {
                let error = handles.fatal_handler.trigger_external(
                    "fault budget",
                    anyhow!(
                        "{consecutive_faults} consecutive fetch faults reached the budget of {budget}"
                    ),
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Fetches a single results page and returns the raw body verbatim.
///
/// The one-shot counterpart of a session: one GET at the configured start
/// offset, no decode, no reschedule. Useful for eyeballing what an endpoint
/// actually returns.
pub async fn probe_once(config: &PollerConfig) -> Result<String> {
    config.validate()?;
    let client =
        HttpResultsClient::from_config(config).context("failed to build results client")?;
    let body = client
        .fetch_page(config.query(), config.start_offset())
        .await
        .context("failed to fetch results page")?;
    tracing::debug!(body_bytes = body.len(), "probe fetched one results page");
    Ok(body)
}
