//! HTTP transport for platform adapters
//!
//! A thin wrapper around `reqwest::Client` that gives every adapter the
//! same bounded-timeout, classified-error calling convention. Adapters
//! describe the request; the response path here is the only place where
//! transport failures and non-2xx statuses become [`AdapterError`]s.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::debug;

use crate::error::{classify_status, classify_transport, AdapterError};
use crate::types::Platform;

/// Default per-request timeout for outbound platform calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("socialhub/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for REST adapters.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
}

impl RestClient {
    pub fn new() -> Result<Self, AdapterError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Access the underlying client for requests that need full control
    /// over headers (OAuth 1.0a signing). Pair with [`RestClient::send`].
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn get_json(
        &self,
        platform: Platform,
        url: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let mut rb = self.client.get(url).query(query);
        if let Some(token) = bearer {
            rb = rb.bearer_auth(token);
        }
        self.send(platform, rb).await
    }

    pub async fn post_json(
        &self,
        platform: Platform,
        url: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<Value, AdapterError> {
        let mut rb = self.client.post(url).query(query).json(body);
        if let Some(token) = bearer {
            rb = rb.bearer_auth(token);
        }
        self.send(platform, rb).await
    }

    pub async fn post_form(
        &self,
        platform: Platform,
        url: &str,
        form: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let mut rb = self.client.post(url).form(form);
        if let Some(token) = bearer {
            rb = rb.bearer_auth(token);
        }
        self.send(platform, rb).await
    }

    pub async fn delete_json(
        &self,
        platform: Platform,
        url: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let mut rb = self.client.delete(url).query(query);
        if let Some(token) = bearer {
            rb = rb.bearer_auth(token);
        }
        self.send(platform, rb).await
    }

    /// Send a prepared request and decode the response.
    ///
    /// Non-2xx statuses pass through [`classify_status`], carrying the
    /// `Retry-After` header value when present. An empty 2xx body
    /// decodes to `Value::Null`.
    pub async fn send(
        &self,
        platform: Platform,
        request: RequestBuilder,
    ) -> Result<Value, AdapterError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(platform, &e))?;

        let status = response.status();
        debug!(platform = %platform, status = status.as_u16(), "platform response");

        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                platform,
                status.as_u16(),
                &body,
                retry_after,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(platform, &e))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| AdapterError::Remote {
            status: Some(status.as_u16()),
            message: format!("{} returned undecodable body: {}", platform, e),
        })
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        assert!(RestClient::new().is_ok());
        assert!(RestClient::with_timeout(Duration::from_secs(5)).is_ok());
    }
}
