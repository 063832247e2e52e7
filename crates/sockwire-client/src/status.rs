use std::fmt;

/// Session connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientStatus {
    #[default]
    NotConnected,
    Connecting,
    Connected,
    /// Disconnected on purpose (user request, server request or reconnection
    /// gave up). No automatic reconnection happens from here.
    Disconnected,
}

impl ClientStatus {
    /// True while connecting or connected.
    pub fn is_active(self) -> bool {
        matches!(self, ClientStatus::Connecting | ClientStatus::Connected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientStatus::NotConnected => "notConnected",
            ClientStatus::Connecting => "connecting",
            ClientStatus::Connected => "connected",
            ClientStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
