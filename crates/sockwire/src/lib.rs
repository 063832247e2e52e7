//! Real-time event client over long-polling with a websocket upgrade.
//!
//! sockwire speaks a two-layer protocol: an engine layer that handshakes over
//! HTTP long-polling, keeps a heartbeat and upgrades to a websocket when it
//! can, and a session layer that multiplexes named channels with
//! acknowledged events and binary attachments over that engine.
//!
//! # Crate Structure
//!
//! - [`transport`]: HTTP and websocket collaborator traits plus native adapters
//! - [`frame`]: Wire codec for engine packets, session packets and binary attachments
//! - [`engine`]: Transport engine: handshake, polling, probe/upgrade, heartbeat
//! - [`client`]: Sessions, channels, acknowledgements and reconnection
//!
//! The most used client types are also re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use sockwire_transport::*;
}

/// Re-export frame codec types.
pub mod frame {
    pub use sockwire_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use sockwire_engine::*;
}

/// Re-export session types.
pub mod client {
    pub use sockwire_client::*;
}

pub use sockwire_client::{
    client_event, AckResponse, Channel, ClientError, ClientStatus, Event, Session, SessionConfig,
    Value,
};
