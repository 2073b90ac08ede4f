//! HTTP plumbing shared by the remote providers.
//!
//! Every remote backend maps transport and status failures the same way:
//!
//! | Outcome | Error |
//! |---------|-------|
//! | connect error, timeout, 5xx | [`RagError::ProviderUnavailable`] |
//! | 429 | [`RagError::RateLimited`] with `Retry-After` when present |
//! | 404 | [`RagError::NotFound`] |
//! | other 4xx | [`RagError::InvalidInput`] |
//! | malformed body | [`RagError::Storage`] |

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use support_harness_core::{RagError, Result};

/// Build a client with a per-request timeout.
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Map a transport error (no response received).
pub fn send_error(provider: &str, url: &str, e: reqwest::Error) -> RagError {
    if e.is_timeout() {
        RagError::unavailable(format!("{} request to {} timed out", provider, url))
    } else {
        RagError::unavailable(format!("{} connection error ({}): {}", provider, url, e))
    }
}

/// Parse `Retry-After` given in seconds. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Classify a non-success status.
pub fn status_error(provider: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> RagError {
    let message = format!("{} API error {}: {}", provider, status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        RagError::RateLimited {
            message,
            retry_after: retry_after(headers),
        }
    } else if status.is_server_error() {
        RagError::unavailable(message)
    } else if status == StatusCode::NOT_FOUND {
        RagError::not_found(message)
    } else {
        RagError::invalid(message)
    }
}

/// Return the JSON body of a successful response, or the classified error.
pub async fn json_body(provider: &str, response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(provider, status, &headers, &body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| RagError::storage(format!("invalid {} response body: {}", provider, e)))
}

/// Read a JSON array of numbers as an `f32` vector.
pub fn parse_vector(provider: &str, value: Option<&Value>) -> Result<Vec<f32>> {
    let items = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| RagError::storage(format!("invalid {} response: missing embedding", provider)))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::storage(format!("invalid {} response: non-numeric embedding", provider)))
        })
        .collect()
}
