pub mod client;
pub mod poller;
pub mod runtime;

pub use client::http::{HttpResultsClient, ResultsTransport, TransportError};
pub use client::metrics::TransportMetricsSnapshot;
pub use client::options::HttpClientOptions;
pub use poller::decode::{decode_page, DecodeError, ResultItem};
pub use poller::html::HtmlListSink;
pub use poller::pacing::{PacingPolicy, PollPacer};
pub use poller::session::{probe_once, PollSession};
pub use runtime::config::{PollerConfig, PollerConfigBuilder, PollerConfigParams};
pub use runtime::offset::OffsetCursor;
pub use runtime::runner::Runner;
pub use runtime::sink::{ResultSink, SinkError, SinkFuture, SinkStage};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
