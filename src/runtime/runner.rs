use crate::{PollSession, PollerConfig, ResultSink};
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the poll session lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner<S: ResultSink> {
    session: PollSession<S>,
    shutdown: CancellationToken,
    started: bool,
}

impl<S: ResultSink> Runner<S> {
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates
    /// through the session's poll loop and telemetry reporter.
    pub fn new(config: PollerConfig, sink: S) -> Self {
        let shutdown = CancellationToken::new();
        let session = PollSession::with_cancellation_token(config, sink, shutdown.clone());
        Self {
            session,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns a reference to the underlying session for observation.
    pub fn session(&self) -> &PollSession<S> {
        &self.session
    }

    /// Starts the underlying poll session.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.session.start()?;
        self.started = true;
        Ok(())
    }

    /// Stops the session gracefully by cancelling the root token and delegating to it.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        self.session.stop().await?;
        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start()?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.shutdown.cancel();
        self.session.stop().await?;
        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.session.replace_shutdown_root(self.shutdown.clone());
    }
}
