//! Collaborator interfaces for the sockwire transport engine.
//!
//! The engine never talks to the network directly. It drives two narrow
//! collaborators defined here:
//! - [`HttpClient`]: one async request/response call, used for long-polling
//! - [`SocketConnector`]: opens a persistent full-duplex socket and hands back
//!   a [`SocketLink`] (an outbound sender plus an inbound event receiver)
//!
//! Native implementations are feature-gated: `reqwest` provides
//! [`ReqwestHttpClient`], `websocket` provides [`TungsteniteConnector`].
//! The `mock` feature provides scripted in-memory doubles for tests.

pub mod error;
pub mod tls;
pub mod traits;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "reqwest")]
pub mod reqwest_client;

#[cfg(feature = "websocket")]
mod socket_tls;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use tls::TlsPolicy;
pub use traits::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, SocketConnector, SocketEvent, SocketFrame,
    SocketLink, SocketRequest, Transports,
};

#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestHttpClient;

#[cfg(feature = "websocket")]
pub use websocket::TungsteniteConnector;
