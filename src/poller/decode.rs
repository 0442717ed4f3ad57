//! Decoding of result pages returned by the search endpoint.

use serde::Deserialize;
use std::fmt;

/// A single search result: one URL string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ResultItem(String);

impl ResultItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }

    pub fn into_url(self) -> String {
        self.0
    }
}

impl fmt::Display for ResultItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error raised when a non-empty body is not a valid result page.
#[derive(Debug)]
pub struct DecodeError {
    body_len: usize,
    source: serde_json::Error,
}

impl DecodeError {
    fn new(body_len: usize, source: serde_json::Error) -> Self {
        Self { body_len, source }
    }

    /// Length of the offending body in bytes.
    pub fn body_len(&self) -> usize {
        self.body_len
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to decode result page ({} bytes): {}",
            self.body_len, self.source
        )
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Decodes one response body into an ordered page of result items.
///
/// An empty body means "no new results this cycle" and never reaches the
/// JSON decoder. Anything else must be a JSON array of URL strings.
pub fn decode_page(body: &str) -> Result<Vec<ResultItem>, DecodeError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(body).map_err(|err| DecodeError::new(body.len(), err))
}
