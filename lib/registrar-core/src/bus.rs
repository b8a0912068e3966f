//! Message bus client
//!
//! [`BusClient`] owns the single connection to the broker cluster. The wire protocol lives
//! behind the [`Transport`] trait; the client adds failover list construction, connected
//! host tracking and the life-cycle notification pump.

use crate::connection::{parse_bus_host, BusEvent, ConnectionEvents, ConnectionState};
use crate::error::{ConnectError, PublishError, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use registrar_api::BusServerDescriptor;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Keep-alive probe interval sent to the broker
pub const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Parameters handed to a transport for one connection attempt
#[derive(Clone)]
pub struct ConnectOptions {
    /// Failover candidates in preference order, credentials embedded
    pub servers: Vec<String>,
    pub tls: Option<ClientConfig>,
    pub ping_interval: Duration,
}

/// Pub/sub transport able to open a connection.
///
/// Implementations report life-cycle changes on `events` from their own tasks for as long
/// as the connection lives.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<BusEvent>,
    ) -> std::result::Result<Box<dyn BusConnection>, TransportError>;
}

/// An open transport connection. `publish` must be safe to call while the transport
/// reconnects in the background.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// URL of the broker currently connected to
    fn connected_url(&self) -> String;

    fn is_connected(&self) -> bool;

    async fn publish(&self, subject: &str, payload: Bytes) -> std::result::Result<(), TransportError>;

    async fn close(&self);
}

struct Session {
    connection: Arc<dyn BusConnection>,
    pump: JoinHandle<()>,
}

/// BusClient manages a resilient connection to the broker cluster
pub struct BusClient {
    transport: Arc<dyn Transport>,
    state: Arc<ConnectionState>,
    session: RwLock<Option<Session>>,
}

impl BusClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(ConnectionState::new()),
            session: RwLock::new(None),
        }
    }

    /// Shared view of the connected broker host
    pub fn connection_state(&self) -> Arc<ConnectionState> {
        self.state.clone()
    }

    /// Connect to the first broker in `servers` that accepts us
    pub async fn connect(
        &self,
        servers: &[BusServerDescriptor],
        tls: Option<ClientConfig>,
    ) -> std::result::Result<(), ConnectError> {
        if servers.is_empty() {
            error!("Failed to connect to message bus: no servers configured");
            return Err(ConnectError::NoServers);
        }

        let hosts: Vec<String> = servers.iter().map(|s| s.host.clone()).collect();
        let options = ConnectOptions {
            servers: servers.iter().map(BusServerDescriptor::connection_url).collect(),
            tls,
            ping_interval: PING_INTERVAL,
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let connection: Arc<dyn BusConnection> =
            match self.transport.connect(options, events_tx).await {
                Ok(connection) => Arc::from(connection),
                Err(e) => {
                    error!("Failed to connect to message bus {:?}: {}", hosts, e);
                    return Err(ConnectError::Unreachable {
                        hosts,
                        reason: e.to_string(),
                    });
                }
            };

        // Seed the state before the pump starts so a queued reconnect always wins.
        let host = parse_bus_host(&connection.connected_url()).unwrap_or_else(|e| {
            error!("Failed to parse message bus url: {}", e);
            String::new()
        });
        self.state.store(host);
        info!("Connected to message bus at {}", self.state.current_host());

        let handler = ConnectionEvents::new(self.state.clone());
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                handler.handle(event);
            }
        });

        let previous = self.session.write().await.replace(Session { connection, pump });
        if let Some(previous) = previous {
            debug!("Replacing previous message bus connection");
            Self::shutdown(previous).await;
        }

        Ok(())
    }

    /// Publish `payload` on `subject` at most once
    pub async fn publish(&self, subject: &str, payload: Bytes) -> std::result::Result<(), PublishError> {
        let connection = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(session) => session.connection.clone(),
                None => return Err(PublishError::NotConnected),
            }
        };

        if !connection.is_connected() {
            return Err(PublishError::NotConnected);
        }

        connection
            .publish(subject, payload)
            .await
            .map_err(|e| PublishError::Rejected {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }

    /// Release the connection. A no-op if there is none.
    pub async fn close(&self) {
        if let Some(session) = self.session.write().await.take() {
            Self::shutdown(session).await;
            debug!("Released message bus connection to {}", self.state.current_host());
        }
    }

    async fn shutdown(session: Session) {
        // Stop listening first: the close we trigger is not an anomaly.
        session.pump.abort();
        session.connection.close().await;
    }
}
