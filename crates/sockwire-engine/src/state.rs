use std::fmt;

/// Which transport the engine is on, and how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    #[default]
    Idle,
    Handshaking,
    Polling,
    /// Polling, with a streaming socket being probed in parallel.
    Probing,
    Streaming,
    /// The probe succeeded and queued packets are being moved over.
    Upgrading,
    Closed,
}

impl TransportState {
    /// True once a handshake has completed and until close.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TransportState::Polling
                | TransportState::Probing
                | TransportState::Streaming
                | TransportState::Upgrading
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Idle => "idle",
            TransportState::Handshaking => "handshaking",
            TransportState::Polling => "polling",
            TransportState::Probing => "probing",
            TransportState::Streaming => "streaming",
            TransportState::Upgrading => "upgrading",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}
