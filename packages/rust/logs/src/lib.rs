//! Log service client: one bounded fetch of a build's execution output,
//! trimmed to the configured keyword window.
//!
//! Same wire protocol as the CI client: `POST` to the endpoint root with the
//! operation named in the `X-Amz-Target` header. The fetch is retried with a
//! bounded exponential backoff because a transient log-service hiccup should
//! not cost the operator the notification.

pub mod window;

use std::time::Duration;

use exponential_backoff::Backoff;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use buildwatch_shared::{BuildwatchError, LogEvent, Result, WindowConfig};

pub use window::{select_window, window_bounds};

/// Operation target: fetch log events for a group/stream.
const OP_GET_LOG_EVENTS: &str = "Logs_20140328.GetLogEvents";

/// Target header name used for operation dispatch.
const TARGET_HEADER: &str = "X-Amz-Target";

/// Wire content type for the JSON protocol.
const PROTOCOL_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// User-Agent string for log service requests.
const USER_AGENT: &str = concat!("buildwatch/", env!("CARGO_PKG_VERSION"));

/// First retry delay.
const RETRY_MIN_DELAY: Duration = Duration::from_millis(250);

/// Retry delay ceiling.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetLogEventsResponse {
    #[serde(default)]
    events: Vec<LogEvent>,
}

// ---------------------------------------------------------------------------
// LogClient
// ---------------------------------------------------------------------------

/// Client for the log service's single read-only operation.
pub struct LogClient {
    http: Client,
    endpoint: Url,
    log_limit: u32,
    max_retries: u32,
}

impl LogClient {
    /// Create a client for the given endpoint.
    ///
    /// `log_limit` bounds the single fetch; `max_retries` bounds the backoff
    /// loop around it.
    pub fn new(endpoint: &str, timeout_secs: u64, log_limit: u32, max_retries: u32) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| BuildwatchError::validation(format!("logs endpoint '{endpoint}': {e}")))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                BuildwatchError::LogService(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint,
            log_limit,
            max_retries,
        })
    }

    /// Fetch up to `log_limit` events from `group`/`stream` and return the
    /// configured keyword window of their message text.
    ///
    /// An empty result means either the stream held no events or the keyword
    /// was not found; both are "nothing to report", not errors.
    #[instrument(skip(self, window))]
    pub async fn fetch_window(
        &self,
        group: &str,
        stream: &str,
        window: &WindowConfig,
    ) -> Result<Vec<String>> {
        let events = self.get_log_events_with_retry(group, stream).await?;

        debug!(events = events.len(), limit = self.log_limit, "log events fetched");

        let messages: Vec<String> = events.into_iter().map(|e| e.message).collect();
        Ok(window::select_window(&messages, window))
    }

    /// The bounded fetch, retried with exponential backoff.
    async fn get_log_events_with_retry(&self, group: &str, stream: &str) -> Result<Vec<LogEvent>> {
        let backoff = Backoff::new(self.max_retries, RETRY_MIN_DELAY, Some(RETRY_MAX_DELAY));
        let mut attempt: u32 = 0;

        loop {
            match self.get_log_events(group, stream).await {
                Ok(events) => return Ok(events),
                Err(e) => {
                    attempt += 1;
                    let Some(delay) = backoff.next(attempt) else {
                        return Err(e);
                    };
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "log fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One fetch of up to `log_limit` events, reading from the stream head.
    async fn get_log_events(&self, group: &str, stream: &str) -> Result<Vec<LogEvent>> {
        let body = serde_json::json!({
            "logGroupName": group,
            "logStreamName": stream,
            "limit": self.log_limit,
            "startFromHead": true,
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(TARGET_HEADER, OP_GET_LOG_EVENTS)
            .header(reqwest::header::CONTENT_TYPE, PROTOCOL_CONTENT_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuildwatchError::LogService(format!("{group}/{stream}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuildwatchError::LogService(format!(
                "{group}/{stream}: HTTP {status}"
            )));
        }

        let decoded: GetLogEventsResponse = response.json().await.map_err(|e| {
            BuildwatchError::LogService(format!("{group}/{stream}: bad response body: {e}"))
        })?;

        Ok(decoded.events)
    }
}
