use crate::client::options::DEFAULT_USER_AGENT;
use crate::poller::pacing::PacingPolicy;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_START_OFFSET: u64 = 0;

/// Runtime configuration for a polling session.
///
/// All instances must be constructed via [`PollerConfig::builder`] or [`PollerConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    results_url: String,
    query: String,
    start_offset: u64,
    request_timeout: Duration,
    pacing: PacingPolicy,
    max_consecutive_faults: Option<u32>,
    metrics_interval: Duration,
    user_agent: String,
}

pub struct PollerConfigParams {
    pub results_url: String,
    pub query: String,
    pub start_offset: u64,
    pub request_timeout: Duration,
    pub pacing: PacingPolicy,
    pub max_consecutive_faults: Option<u32>,
    pub metrics_interval: Duration,
    pub user_agent: String,
}

impl PollerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> PollerConfigBuilder {
        PollerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`PollerConfig::builder`] for ergonomics when many values use defaults.
    /// Callers that already have concrete runtime parameters can use this method to enforce
    /// validation without going through the builder.
    pub fn new(params: PollerConfigParams) -> Result<Self> {
        let PollerConfigParams {
            results_url,
            query,
            start_offset,
            request_timeout,
            pacing,
            max_consecutive_faults,
            metrics_interval,
            user_agent,
        } = params;

        let config = Self {
            results_url: trimmed_string(results_url),
            query: trimmed_string(query),
            start_offset,
            request_timeout,
            pacing,
            max_consecutive_faults,
            metrics_interval,
            user_agent: trimmed_string(user_agent),
        };

        config.validate()?;
        Ok(config)
    }

    /// Full results endpoint URL (including scheme) the session polls.
    pub fn results_url(&self) -> &str {
        &self.results_url
    }

    /// Search query submitted with every fetch, fixed for the session.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Offset cursor value the session starts from.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Per-request timeout applied to the HTTP client.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Constants governing the adaptive poll delay.
    pub fn pacing(&self) -> PacingPolicy {
        self.pacing
    }

    /// Consecutive transport/decode faults tolerated before the session
    /// aborts. `None` polls forever.
    pub fn max_consecutive_faults(&self) -> Option<u32> {
        self.max_consecutive_faults
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// User-Agent header sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.results_url)?;
        ensure_not_empty(&self.query, "query")?;
        ensure_not_empty(&self.user_agent, "user_agent")?;

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.max_consecutive_faults == Some(0) {
            bail!("max_consecutive_faults must be greater than 0 when set");
        }

        self.pacing.validate()?;

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PollerConfigBuilder {
    results_url: Option<String>,
    query: Option<String>,
    start_offset: Option<u64>,
    request_timeout: Option<Duration>,
    pacing: Option<PacingPolicy>,
    max_consecutive_faults: Option<u32>,
    metrics_interval: Option<Duration>,
    user_agent: Option<String>,
}

impl PollerConfigBuilder {
    pub fn results_url(mut self, url: impl Into<String>) -> Self {
        self.results_url = Some(url.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn start_offset(mut self, offset: u64) -> Self {
        self.start_offset = Some(offset);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn pacing(mut self, policy: PacingPolicy) -> Self {
        self.pacing = Some(policy);
        self
    }

    pub fn max_consecutive_faults(mut self, budget: u32) -> Self {
        self.max_consecutive_faults = Some(budget);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<PollerConfig> {
        let params = PollerConfigParams {
            results_url: self.results_url.context("results_url is required")?,
            query: self.query.context("query is required")?,
            start_offset: self.start_offset.unwrap_or(DEFAULT_START_OFFSET),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            pacing: self.pacing.unwrap_or_default(),
            max_consecutive_faults: self.max_consecutive_faults,
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        };

        PollerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("results_url must start with http:// or https://");
    }
    Ok(())
}
