//! Core route registration functionality
//!
//! This library provides:
//! - BusClient: resilient message bus connection with connected-host tracking
//! - Advertisement encoding for router register/unregister messages
//! - Registrar: the register → wait for shutdown → unregister session
//! - SignalBridge: termination signals to a one-shot cancellation

pub mod bus;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod registrar;
pub mod shutdown;

#[cfg(test)]
mod mock;

pub use bus::{BusClient, BusConnection, ConnectOptions, Transport, PING_INTERVAL};
pub use connection::{BusEvent, ConnectionEvents, ConnectionState};
pub use encoder::encode;
pub use error::{
    ConnectError, HostParseError, PublishError, RegistrarError, Result, TransportError,
    UnexpectedClose,
};
pub use registrar::{Registrar, RegistrarConfig, RegistrarState};
pub use shutdown::{SignalBridge, TerminationSignal};
pub use tokio_util::sync::CancellationToken;
