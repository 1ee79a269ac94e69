//! Session configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a valid
//! configuration.

use std::time::Duration;

use aptrust::{ApVerifyingKey, ClientInfo};
use serde::{Deserialize, Serialize};

use crate::error::{ApStreamError, Result};

pub const DEFAULT_RESOLVER_URL: &str = "https://apresolve.spotify.com/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed `host:port`; when set no resolution request is made.
    pub ap_override: Option<String>,
    pub resolver_url: String,
    pub resolver_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Deadline for each handshake read and every write.
    pub io_timeout_ms: u64,
    /// How long a keepalive ping waits for its pong.
    pub keepalive_window_ms: u64,
    pub client_product: u8,
    pub client_platform: u8,
    pub client_version: u32,
    /// Hex-encoded Ed25519 key the access point must sign with.
    pub ap_verifying_key: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let info = ClientInfo::default();
        Self {
            ap_override: None,
            resolver_url: DEFAULT_RESOLVER_URL.to_owned(),
            resolver_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 10_000,
            keepalive_window_ms: 5_000,
            client_product: info.product,
            client_platform: info.platform,
            client_version: info.version,
            ap_verifying_key: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ApStreamError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("resolver_timeout_ms", self.resolver_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("io_timeout_ms", self.io_timeout_ms),
            ("keepalive_window_ms", self.keepalive_window_ms),
        ] {
            if value == 0 {
                return Err(ApStreamError::Config(format!("{name} must be non-zero")));
            }
        }

        match &self.ap_override {
            Some(addr) if addr.trim().is_empty() => {
                return Err(ApStreamError::Config("ap_override is empty".into()));
            }
            Some(_) => {}
            None if self.resolver_url.is_empty() => {
                return Err(ApStreamError::Config(
                    "resolver_url is required without ap_override".into(),
                ));
            }
            None => {}
        }

        self.verifying_key()?;
        Ok(())
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn keepalive_window(&self) -> Duration {
        Duration::from_millis(self.keepalive_window_ms)
    }

    /// Product, platform and version announced in the client hello.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            product: self.client_product,
            platform: self.client_platform,
            version: self.client_version,
        }
    }

    /// The pinned access point key, if one is configured.
    pub fn verifying_key(&self) -> Result<Option<ApVerifyingKey>> {
        self.ap_verifying_key
            .as_deref()
            .map(ApVerifyingKey::from_hex)
            .transpose()
            .map_err(|e| ApStreamError::Config(format!("ap_verifying_key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.resolver_url, DEFAULT_RESOLVER_URL);
        assert_eq!(config.client_info(), ClientInfo::default());
    }

    #[test]
    fn partial_document() {
        let config = SessionConfig::from_json_str(
            r#"{"ap_override":"10.0.0.5:4070","io_timeout_ms":250,"client_version":7}"#,
        )
        .unwrap();
        assert_eq!(config.ap_override.as_deref(), Some("10.0.0.5:4070"));
        assert_eq!(config.io_timeout(), Duration::from_millis(250));
        assert_eq!(config.client_info().version, 7);
        assert_eq!(config.connect_timeout_ms, 5_000);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = SessionConfig::from_json_str(r#"{"keepalive_window_ms":0}"#).unwrap_err();
        assert!(matches!(err, ApStreamError::Config(msg) if msg.contains("keepalive_window_ms")));
    }

    #[test]
    fn bad_key_and_bad_json_rejected() {
        assert!(SessionConfig::from_json_str(r#"{"ap_verifying_key":"abcd"}"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{"io_timeout_ms":"soon"}"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{"ap_override":"  "}"#).is_err());
    }

    #[test]
    fn serializes_back() {
        let config = SessionConfig {
            ap_override: Some("ap:4070".into()),
            ..SessionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }
}
