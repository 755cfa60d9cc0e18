//! HTTP plumbing shared by all provider adapters
//!
//! Every adapter funnels its requests through [`send_json`] so transport
//! faults, upstream status codes and body shape mismatches classify into the
//! same error taxonomy everywhere.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::core::error::{ProviderError, Result};
use crate::core::model::ProviderKind;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for health probes. Probes must complete quickly or count as dead.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("finbridge/", env!("CARGO_PKG_VERSION"));

/// Builds a client with the crate user agent and a per-call timeout. A
/// request that outlives the timeout surfaces as a `Transient` error.
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Internal(format!("failed to build http client: {e}")))
}

/// Sends a prepared request and deserializes the JSON body.
///
/// Classification: connect/timeout and 5xx answers are `Transient`; any
/// other error status is `Http`; a 2xx body that does not match `T` is a
/// `Contract` violation.
pub async fn send_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = execute(provider, request).await?;

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transient(format!("{provider}: failed to read body: {e}")))?;

    if body.trim().is_empty() {
        return Err(ProviderError::contract(provider, "empty response body"));
    }

    serde_json::from_str(&body).map_err(|e| {
        debug!(%provider, error = %e, "Response body failed schema validation");
        ProviderError::contract(provider, e.to_string())
    })
}

/// Sends a prepared request, checking only the status. For deletes and other
/// calls whose body carries nothing the caller needs.
pub async fn send_ok(provider: ProviderKind, request: reqwest::RequestBuilder) -> Result<()> {
    execute(provider, request).await.map(|_| ())
}

async fn execute(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transient(format!("{provider}: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response.text().await.unwrap_or_default();
    let detail = truncate(&detail, 200);
    debug!(%provider, %status, %detail, "Upstream returned an error status");

    if status.is_server_error() {
        Err(ProviderError::Transient(format!(
            "{provider} answered {status}: {detail}"
        )))
    } else {
        Err(ProviderError::Http {
            provider,
            status: status.as_u16(),
            detail,
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &text[..cut])
    }
}

/// Parses a provider's decimal-string amount. Some aggregators ship amounts
/// as strings to dodge float truncation on their side.
pub fn parse_amount(provider: ProviderKind, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| ProviderError::contract(provider, format!("unparseable amount: '{raw}'")))
}
