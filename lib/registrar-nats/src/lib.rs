//! NATS integration for the route registrar
pub mod client;
pub mod tls;

pub use client::{NatsConnection, NatsTransport};
pub use tls::TlsClientConfig;
