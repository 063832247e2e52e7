//! Session layer of the sockwire client.
//!
//! A [`Session`] owns one transport engine and multiplexes any number of
//! [`Channel`]s (named paths) over it. It tracks connection status, matches
//! acknowledgement replies to the calls that asked for them, reassembles
//! binary events and reconnects when the transport drops.
//!
//! All session state lives on a single task. Handles only send commands to
//! it, and subscriber callbacks run on it in the order packets arrived.

pub mod ack;
pub mod binary_queue;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod reconnect;
pub mod session;
pub mod status;

pub use ack::{AckEmitter, AckReply, AckResponse};
pub use channel::Channel;
pub use config::SessionConfig;
pub use error::{ClientError, Result};
pub use event::{client_event, Callback, Event, HandlerId};
pub use reconnect::{ReconnectPolicy, ReconnectState, ReconnectStep};
pub use session::Session;
pub use status::ClientStatus;

pub use sockwire_frame::Value;
