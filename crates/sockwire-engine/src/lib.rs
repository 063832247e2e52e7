//! Transport engine for the sockwire client.
//!
//! An [`Engine`] runs as its own tokio task. It performs the handshake over
//! long-polling, keeps exactly one poll outstanding, batches outbound packets
//! into POST bodies, probes and upgrades to a streaming socket when the
//! server offers one, and owns the heartbeat. Everything it observes is
//! reported in order as [`EngineEvent`]s.
//!
//! The [`timer`] module holds the scheduled-task primitives shared with the
//! session layer.

pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod heartbeat;
pub mod state;
pub mod timer;
pub mod endpoint;

pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent, EngineHandle};
pub use error::{EngineError, Result};
pub use handshake::OpenInfo;
pub use heartbeat::{Heartbeat, HeartbeatTick};
pub use state::TransportState;
pub use timer::{schedule_once, schedule_repeating, Epoch, ScheduledTask};
pub use endpoint::EngineUrls;
