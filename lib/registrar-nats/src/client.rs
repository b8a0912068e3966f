//! NATS transport for the registrar bus client

use async_nats::connection::State;
use async_nats::{Client, Event, ServerAddr, ServerInfo};
use async_trait::async_trait;
use bytes::Bytes;
use registrar_core::{BusConnection, BusEvent, ConnectOptions, Transport, TransportError};
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// Upper bound on a publish flush and on draining the connection at close
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a reconnect waits for the new server's INFO to replace the old one
const SERVER_INFO_SETTLE: Duration = Duration::from_millis(500);

/// NatsTransport opens connections to a NATS cluster with `async-nats`.
///
/// Failover across the configured servers and background reconnection are handled by the
/// NATS client itself.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    flush_timeout: Duration,
}

impl NatsTransport {
    pub fn new() -> Self {
        Self {
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }
}

impl Default for NatsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<BusEvent>,
    ) -> Result<Box<dyn BusConnection>, TransportError> {
        let dialed = options
            .servers
            .iter()
            .map(|url| url.parse::<ServerAddr>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::Connect(format!("invalid server address: {}", e)))?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut nats_options = async_nats::ConnectOptions::new()
            .ping_interval(options.ping_interval)
            .event_callback(move |event| {
                let raw_tx = raw_tx.clone();
                async move {
                    let _ = raw_tx.send(event);
                }
            });

        if let Some(tls) = options.tls {
            nats_options = nats_options.require_tls(true).tls_client_config(tls);
        }

        let client = nats_options
            .connect(dialed.as_slice())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let forwarder = tokio::spawn(forward_events(
            client.clone(),
            dialed.clone(),
            raw_rx,
            events,
        ));

        Ok(Box::new(NatsConnection {
            client,
            dialed,
            forwarder,
            flush_timeout: self.flush_timeout,
        }))
    }
}

/// Translate NATS client events into bus events.
///
/// The first `Connected` belongs to the initial connect, which the bus client records
/// itself; every later one is a reconnect.
async fn forward_events(
    client: Client,
    dialed: Vec<ServerAddr>,
    mut raw: mpsc::UnboundedReceiver<Event>,
    events: mpsc::UnboundedSender<BusEvent>,
) {
    let mut initial = true;
    let mut last_server_id = client.server_info().server_id;

    while let Some(event) = raw.recv().await {
        let translated = match event {
            Event::Connected if initial => {
                initial = false;
                continue;
            }
            Event::Connected => {
                let info = settled_server_info(&client, &last_server_id).await;
                last_server_id = info.server_id.clone();
                BusEvent::Reconnected {
                    url: resolve_connected_url(&info, &dialed),
                }
            }
            Event::Disconnected => BusEvent::Disconnected,
            Event::Closed => BusEvent::Closed,
            Event::ServerError(e) => {
                warn!("NATS server reported an error: {}", e);
                continue;
            }
            Event::ClientError(e) => {
                warn!("NATS client error: {}", e);
                continue;
            }
            other => {
                debug!("Ignoring NATS event: {}", other);
                continue;
            }
        };

        if events.send(translated).is_err() {
            break;
        }
    }
}

/// Server info after a reconnect.
///
/// async-nats fires `Connected` before it stores the new server's INFO, so wait a short
/// while for the server id to change. A reconnect to the same server keeps its id and
/// returns once the window passes.
async fn settled_server_info(client: &Client, previous_server_id: &str) -> ServerInfo {
    let deadline = Instant::now() + SERVER_INFO_SETTLE;
    loop {
        let info = client.server_info();
        if info.server_id != previous_server_id || Instant::now() >= deadline {
            return info;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// URL of the server we are connected to, without credentials.
///
/// Servers commonly advertise their listen address (`0.0.0.0`) rather than a reachable
/// one, so a dialed address is preferred whenever it matches the server's port.
fn resolve_connected_url(info: &ServerInfo, dialed: &[ServerAddr]) -> String {
    let url = |host: &str, port: u16| format!("nats://{}:{}", host, port);

    if let Some(addr) = dialed
        .iter()
        .find(|a| a.host() == info.host && a.port() == info.port)
    {
        return url(addr.host(), addr.port());
    }

    let unspecified = info.host.is_empty()
        || info
            .host
            .parse::<IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false);
    if !unspecified {
        return url(&info.host, info.port);
    }

    dialed
        .iter()
        .find(|a| a.port() == info.port)
        .or_else(|| dialed.first())
        .map(|a| url(a.host(), a.port()))
        .unwrap_or_else(|| url(&info.host, info.port))
}

/// An open NATS connection
pub struct NatsConnection {
    client: Client,
    dialed: Vec<ServerAddr>,
    forwarder: JoinHandle<()>,
    flush_timeout: Duration,
}

#[async_trait]
impl BusConnection for NatsConnection {
    fn connected_url(&self) -> String {
        resolve_connected_url(&self.client.server_info(), &self.dialed)
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        // async-nats would buffer the message until a reconnect.
        if !self.is_connected() {
            return Err(TransportError::Publish(
                "not connected to a NATS server".to_string(),
            ));
        }

        let delivery = async {
            self.client
                .publish(subject.to_string(), payload)
                .await
                .map_err(|e| e.to_string())?;

            // Push the message out now; the process may exit right after the unregister.
            self.client.flush().await.map_err(|e| e.to_string())
        };

        match timeout(self.flush_timeout, delivery).await {
            Ok(result) => result.map_err(TransportError::Publish),
            Err(_) => Err(TransportError::Publish(format!(
                "flush did not complete within {:?}",
                self.flush_timeout
            ))),
        }
    }

    async fn close(&self) {
        self.forwarder.abort();

        // A lost connection has nothing left to drain; dropping the client ends it.
        if !self.is_connected() {
            debug!("NATS connection already lost, skipping drain");
            return;
        }

        match timeout(self.flush_timeout, self.client.drain()).await {
            Ok(Ok(())) => debug!("Drained NATS connection"),
            Ok(Err(e)) => debug!("Failed to drain NATS connection: {}", e),
            Err(_) => warn!(
                "Gave up draining NATS connection after {:?}",
                self.flush_timeout
            ),
        }
    }
}
