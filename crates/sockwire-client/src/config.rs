use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sockwire_engine::config::DEFAULT_ENGINE_PATH;
use sockwire_engine::EngineConfig;
use sockwire_frame::{normalize_path, DEFAULT_PATH};
use sockwire_transport::TlsPolicy;

use crate::error::{ClientError, Result};
use crate::reconnect::ReconnectPolicy;

/// Session options. Every field has a default, so a JSON file only needs to
/// name what it changes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Never upgrade from long-polling.
    pub force_polling: bool,
    /// Use only the streaming socket.
    pub force_websockets: bool,
    /// Build a fresh engine on every connect, even if one is still running.
    pub force_new_engine: bool,
    /// Request path on the server.
    pub path: String,
    pub extra_headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    /// Extra query parameters sent with every engine request.
    pub connect_params: BTreeMap<String, String>,
    /// Reconnect when the transport drops for any reason other than
    /// an explicit disconnect.
    pub reconnects: bool,
    /// Reconnect attempts before giving up; `-1` means unlimited.
    pub reconnect_attempts: i64,
    /// Fixed delay between reconnect attempts, in seconds.
    #[serde(with = "seconds")]
    pub reconnect_wait: Duration,
    /// Give up on a user-initiated connect after this many seconds.
    #[serde(with = "optional_seconds")]
    pub connect_timeout: Option<Duration>,
    /// Channel used by the `Session` convenience methods.
    pub default_path: String,
    pub compress: bool,
    pub tls: TlsPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            force_polling: false,
            force_websockets: false,
            force_new_engine: false,
            path: DEFAULT_ENGINE_PATH.to_string(),
            extra_headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            connect_params: BTreeMap::new(),
            reconnects: true,
            reconnect_attempts: -1,
            reconnect_wait: Duration::from_secs(10),
            connect_timeout: None,
            default_path: DEFAULT_PATH.to_string(),
            compress: false,
            tls: TlsPolicy::Verify,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject contradictory or out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        if self.force_polling && self.force_websockets {
            return Err(ClientError::Config(
                "force_polling and force_websockets are mutually exclusive".to_string(),
            ));
        }
        if self.reconnect_attempts < -1 {
            return Err(ClientError::Config(format!(
                "reconnect_attempts must be -1 or greater, got {}",
                self.reconnect_attempts
            )));
        }
        if u32::try_from(self.reconnect_attempts).is_err() && self.reconnect_attempts != -1 {
            return Err(ClientError::Config(format!(
                "reconnect_attempts {} is too large",
                self.reconnect_attempts
            )));
        }
        if !self.path.starts_with('/') {
            return Err(ClientError::Config(format!(
                "path must start with '/', got {:?}",
                self.path
            )));
        }
        Ok(())
    }

    pub fn polling_only(mut self) -> Self {
        self.force_polling = true;
        self.force_websockets = false;
        self
    }

    pub fn websocket_only(mut self) -> Self {
        self.force_websockets = true;
        self.force_polling = false;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_connect_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_params.insert(name.into(), value.into());
        self
    }

    /// Set the reconnect attempt limit. `None` means unlimited.
    pub fn with_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect_attempts = attempts.map(i64::from).unwrap_or(-1);
        self
    }

    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn without_reconnects(mut self) -> Self {
        self.reconnects = false;
        self
    }

    /// Canonical form of [`SessionConfig::default_path`].
    pub fn default_channel_path(&self) -> String {
        normalize_path(&self.default_path)
    }

    pub fn engine_config(&self) -> EngineConfig {
        fn pairs(map: &BTreeMap<String, String>) -> Vec<(String, String)> {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }
        EngineConfig {
            path: self.path.clone(),
            force_polling: self.force_polling,
            force_websockets: self.force_websockets,
            extra_headers: pairs(&self.extra_headers),
            cookies: pairs(&self.cookies),
            connect_params: pairs(&self.connect_params),
            compress: self.compress,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnects,
            max_attempts: u32::try_from(self.reconnect_attempts).ok(),
            wait: self.reconnect_wait,
        }
    }
}

// Header, cookie and parameter values may carry credentials.
impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |map: &BTreeMap<String, String>| -> Vec<String> {
            map.iter()
                .map(|(k, v)| format!("{k}=<redacted:{} bytes>", v.len()))
                .collect()
        };
        f.debug_struct("SessionConfig")
            .field("force_polling", &self.force_polling)
            .field("force_websockets", &self.force_websockets)
            .field("force_new_engine", &self.force_new_engine)
            .field("path", &self.path)
            .field("extra_headers", &redacted(&self.extra_headers))
            .field("cookies", &redacted(&self.cookies))
            .field("connect_params", &redacted(&self.connect_params))
            .field("reconnects", &self.reconnects)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_wait", &self.reconnect_wait)
            .field("connect_timeout", &self.connect_timeout)
            .field("default_path", &self.default_path)
            .field("compress", &self.compress)
            .field("tls", &self.tls)
            .finish()
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod optional_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_conventions() {
        let config = SessionConfig::default();
        assert_eq!(config.path, "/socket.io/");
        assert!(config.reconnects);
        assert_eq!(config.reconnect_attempts, -1);
        assert_eq!(config.reconnect_wait, Duration::from_secs(10));
        assert_eq!(config.default_path, "/");
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect_policy().max_attempts, None);
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{
                "force_polling": true,
                "reconnect_attempts": 3,
                "reconnect_wait": 0.5,
                "connect_timeout": 4,
                "cookies": {"session": "abc"},
                "tls": {"mode": "accept_invalid_certs"}
            }"#,
        )
        .expect("config should parse");
        assert!(config.force_polling);
        assert_eq!(config.reconnect_policy().max_attempts, Some(3));
        assert_eq!(config.reconnect_wait, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(4)));
        assert_eq!(config.tls, TlsPolicy::AcceptInvalidCerts);
        assert_eq!(
            config.engine_config().request_headers(),
            vec![("Cookie".to_string(), "session=abc".to_string())]
        );
    }

    #[test]
    fn rejects_contradictions_and_unknown_fields() {
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"force_polling":true,"force_websockets":true}"#),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"reconnect_attempts":-2}"#),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"reconnect_wait":-1}"#),
            Err(ClientError::Json(_))
        ));
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"bogus":1}"#),
            Err(ClientError::Json(_))
        ));
    }

    #[test]
    fn debug_redacts_values() {
        let config = SessionConfig::default()
            .with_header("Authorization", "Bearer secret")
            .with_connect_param("token", "t0k3n");
        let debug = format!("{config:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("t0k3n"));
    }

    #[test]
    fn builders_compose() {
        let config = SessionConfig::default()
            .websocket_only()
            .with_reconnect_attempts(Some(2))
            .with_connect_timeout(Duration::from_secs(1));
        assert!(config.force_websockets && !config.force_polling);
        assert_eq!(config.reconnect_attempts, 2);
        assert!(config.engine_config().force_websockets);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }
}
