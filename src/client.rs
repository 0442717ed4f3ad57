//! HTTP plumbing for the results endpoint: client, transport seam, metrics,
//! and configurable options.

pub mod http;
pub mod metrics;
pub mod options;

pub use http::{HttpResultsClient, ResultsTransport, TransportError};
pub use metrics::TransportMetricsSnapshot;
pub use options::HttpClientOptions;
