use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Contents of the server's open packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInfo {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOpen {
    sid: Option<String>,
    #[serde(default)]
    upgrades: Vec<String>,
    ping_interval: Option<u64>,
    ping_timeout: Option<u64>,
}

/// Interval and timeout assumed when the server omits them.
const FALLBACK_PING_INTERVAL_MS: u64 = 25_000;
const FALLBACK_PING_TIMEOUT_MS: u64 = 20_000;

impl OpenInfo {
    /// Parse the JSON data of an open packet.
    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawOpen = serde_json::from_str(data)
            .map_err(|err| EngineError::Handshake(format!("unparseable open packet: {err}")))?;
        let sid = raw
            .sid
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| EngineError::Handshake("open packet has no session id".to_string()))?;
        let ping_interval = raw.ping_interval.unwrap_or(FALLBACK_PING_INTERVAL_MS);
        if ping_interval == 0 {
            return Err(EngineError::Handshake("ping interval must be positive".to_string()));
        }
        Ok(Self {
            sid,
            upgrades: raw.upgrades,
            ping_interval: Duration::from_millis(ping_interval),
            ping_timeout: Duration::from_millis(raw.ping_timeout.unwrap_or(FALLBACK_PING_TIMEOUT_MS)),
        })
    }

    /// True if the server offers the streaming socket.
    pub fn offers_websocket(&self) -> bool {
        self.upgrades.iter().any(|u| u == "websocket")
    }
}
