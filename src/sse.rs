//! Server-sent event stream from the sensor board
//!
//! Only the `data:` field matters here; every event the board pushes is a
//! single `data: {json}` line.

use eyre::{Context, Result};
use std::io::{BufRead, BufReader};
use std::time::Duration;

/// Marker that starts a line carrying an event payload
pub const DATA_MARKER: &str = "data: ";

/// Request headers for an event stream
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("Accept", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// Extract the payload from a `data: ` line.
///
/// Returns `None` for comments, other SSE fields and keep-alive blank lines.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_MARKER).map(str::trim)
}

/// Something the collector can (re)connect to and read lines from
pub trait EventSource {
    /// Where the events come from, for log and console messages
    fn describe(&self) -> String;

    /// Open a fresh stream. An error here is a transport failure.
    fn connect(&self) -> Result<Box<dyn BufRead>>;
}

/// Long-lived HTTP GET against the board's `/events` endpoint
pub struct HttpEventSource {
    agent: ureq::Agent,
    url: String,
}

impl HttpEventSource {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        // No global timeout: the stream is expected to stay open forever
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(None)
            .timeout_connect(Some(connect_timeout))
            .http_status_as_error(true)
            .build()
            .into();

        Self { agent, url: url.into() }
    }
}

impl EventSource for HttpEventSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn connect(&self) -> Result<Box<dyn BufRead>> {
        let mut request = self.agent.get(&self.url);
        for (name, value) in SSE_HEADERS {
            request = request.header(name, value);
        }

        let response = request
            .call()
            .context(format!("Failed to connect to {}", self.url))?;

        log::debug!("Connected to {} ({})", self.url, response.status());

        let reader = response.into_body().into_with_config().limit(u64::MAX).reader();

        Ok(Box::new(BufReader::new(reader)))
    }
}
