use crate::poller::decode::ResultItem;
use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// Enumerates the execution stages of the [`ResultSink`] hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStage {
    Render,
    Shutdown,
}

/// Error surfaced by sink hooks. Every instance is considered fatal.
#[derive(Debug)]
pub struct SinkError {
    stage: SinkStage,
    source: AnyError,
}

impl SinkError {
    pub fn new(stage: SinkStage, source: AnyError) -> Self {
        Self { stage, source }
    }

    pub fn stage(&self) -> SinkStage {
        self.stage
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for SinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} sink error: {}", self.stage, self.source)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Trait implemented by render targets consuming fetched result items.
pub trait ResultSink: Send + Sync + 'static {
    /// Executed sequentially by the session task, once per item in page order.
    /// `position` is the absolute offset of the item within the result set.
    /// Always async so it can perform I/O such as writing to a page or file.
    fn render<'a>(&'a mut self, item: ResultItem, position: u64) -> SinkFuture<'a>;

    /// Called once during shutdown to allow graceful cleanup (flush buffers, close handles, etc.).
    fn shutdown<'a>(&'a mut self) -> SinkFuture<'a>;
}
