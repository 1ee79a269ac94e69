//! Access point discovery.
//!
//! The resolver either returns a configured override verbatim or asks the
//! resolution service for a list of access points and picks the first one. It
//! never retries; failover belongs to the caller.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::{ApStreamError, Result};

/// List field in the resolution response holding `host:port` strings.
pub const AP_LIST_FIELD: &str = "ap_list";

/// A selected access point address, `host:port`. Immutable once chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Endpoint {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

impl From<&str> for Endpoint {
    fn from(addr: &str) -> Self {
        Self(addr.to_owned())
    }
}

/// Picks the endpoint for the next connection attempt.
#[derive(Debug, Clone)]
pub struct AccessPointResolver {
    override_endpoint: Option<Endpoint>,
    url: String,
    timeout: Duration,
}

impl AccessPointResolver {
    /// Resolver that queries `url`, bounding the request by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            override_endpoint: None,
            url: url.into(),
            timeout,
        }
    }

    /// Resolver that always answers `endpoint` and never touches the network.
    pub fn with_override(endpoint: impl Into<Endpoint>) -> Self {
        Self {
            override_endpoint: Some(endpoint.into()),
            url: String::new(),
            timeout: Duration::ZERO,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        match &config.ap_override {
            Some(addr) => Self::with_override(addr.as_str()),
            None => Self::new(config.resolver_url.clone(), config.resolver_timeout()),
        }
    }

    pub fn override_endpoint(&self) -> Option<&Endpoint> {
        self.override_endpoint.as_ref()
    }

    /// Return the override, or the first access point the service lists.
    pub async fn resolve_endpoint(&self) -> Result<Endpoint> {
        if let Some(endpoint) = &self.override_endpoint {
            tracing::debug!(endpoint = %endpoint, "using access point override");
            return Ok(endpoint.clone());
        }

        let body = self.fetch().await?;
        let endpoint = Endpoint::new(first_string_in_list(&body, AP_LIST_FIELD)?);
        tracing::info!(endpoint = %endpoint, "access point resolved");
        Ok(endpoint)
    }

    async fn fetch(&self) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApStreamError::Resolution(format!("http client: {e}")))?;

        tracing::debug!(url = %self.url, timeout_ms = self.timeout.as_millis() as u64, "querying resolver");
        let response = client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApStreamError::Resolution(format!("request to {}: {e}", self.url)))?;

        response
            .text()
            .await
            .map_err(|e| ApStreamError::Resolution(format!("reading response body: {e}")))
    }
}

/// First entry of the string list `field` in the JSON object `body`.
///
/// Anything other than an object whose `field` is a non-empty array starting
/// with a string is a resolution error.
pub fn first_string_in_list(body: &str, field: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ApStreamError::Resolution(format!("response is not JSON: {e}")))?;

    let list = value
        .as_object()
        .ok_or_else(|| ApStreamError::Resolution("response is not a JSON object".into()))?
        .get(field)
        .ok_or_else(|| ApStreamError::Resolution(format!("response has no `{field}` field")))?
        .as_array()
        .ok_or_else(|| ApStreamError::Resolution(format!("`{field}` is not a list")))?;

    list.first()
        .ok_or_else(|| ApStreamError::Resolution(format!("`{field}` is empty")))?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ApStreamError::Resolution(format!("first `{field}` entry is not a string")))
}
