use crate::runtime::sink::SinkError;
use anyhow::Error as AnyError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Routes unrecoverable errors to a session-wide shutdown.
///
/// The first trigger wins: it records the error and cancels both the run
/// token and the root token so every task unwinds. Later triggers return
/// their error to the caller without overwriting the capture. `stop()`
/// retrieves the capture through [`FatalErrorHandler::error`].
#[derive(Clone)]
pub struct FatalErrorHandler {
    state: Arc<FatalState>,
}

struct FatalState {
    tripped: AtomicBool,
    root_token: CancellationToken,
    run_token: CancellationToken,
    captured: Mutex<Option<SharedError>>,
}

/// Clonable view of the captured error, re-surfaceable as `anyhow::Error`
/// from both the trigger site and `stop()`.
#[derive(Clone)]
struct SharedError {
    inner: Arc<AnyError>,
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner.as_ref(), f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

impl FatalErrorHandler {
    pub fn new(root_token: CancellationToken, run_token: CancellationToken) -> Self {
        Self {
            state: Arc::new(FatalState {
                tripped: AtomicBool::new(false),
                root_token,
                run_token,
                captured: Mutex::new(None),
            }),
        }
    }

    /// Reports a fatal sink error and begins shutdown.
    pub fn trigger(&self, error: SinkError) -> AnyError {
        if self.state.tripped.swap(true, Ordering::SeqCst) {
            return error.into();
        }

        tracing::error!(
            stage = ?error.stage(),
            error = %error,
            "fatal sink error; initiating shutdown"
        );
        self.capture(error.into())
    }

    /// Reports a fatal condition raised outside the sink hooks.
    pub fn trigger_external(&self, context: &str, error: AnyError) -> AnyError {
        if self.state.tripped.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::error!(
            context,
            error = %error,
            "fatal poller error; initiating shutdown"
        );
        self.capture(error)
    }

    fn capture(&self, error: AnyError) -> AnyError {
        let shared = SharedError {
            inner: Arc::new(error),
        };

        {
            let mut slot = self.state.captured.lock().unwrap();
            if slot.is_none() {
                *slot = Some(shared.clone());
            }
        }

        self.state.run_token.cancel();
        self.state.root_token.cancel();

        shared.into()
    }

    /// The first captured fatal error, if any was triggered.
    pub fn error(&self) -> Option<AnyError> {
        self.state
            .captured
            .lock()
            .unwrap()
            .as_ref()
            .map(|error| error.clone().into())
    }
}
