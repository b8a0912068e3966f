//! Route registration session
//!
//! ```text
//! Idle ──► Connecting ──► Registered ──(shutdown)──► Unregistering ──► Done
//!               │
//!               └──► Failed
//! ```
//!
//! - connect errors end in `Failed` before anything is published
//! - the register message is published once, then the session waits for shutdown
//! - the first cancellation of the shutdown token triggers the single unregister publish
//! - `Done` is reached whether or not the unregister publish succeeded

use crate::bus::BusClient;
use crate::encoder::encode;
use crate::error::{PublishError, Result};
use bytes::Bytes;
use registrar_api::{BusServerDescriptor, PrivateInstanceId, RouteDescriptor};
use rustls::ClientConfig;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_REGISTER_SUBJECT: &str = "router.register";
pub const DEFAULT_UNREGISTER_SUBJECT: &str = "router.unregister";

/// Everything one registration session needs
#[derive(Clone)]
pub struct RegistrarConfig {
    pub servers: Vec<BusServerDescriptor>,
    pub tls: Option<ClientConfig>,
    pub route: RouteDescriptor,
    pub instance_id: PrivateInstanceId,
    /// Advertised availability zone; empty means none
    pub availability_zone: String,
    pub register_subject: String,
    pub unregister_subject: String,
}

impl RegistrarConfig {
    /// Session for `route` using the conventional router subjects
    pub fn new(
        servers: Vec<BusServerDescriptor>,
        route: RouteDescriptor,
        instance_id: PrivateInstanceId,
    ) -> Self {
        Self {
            servers,
            tls: None,
            route,
            instance_id,
            availability_zone: String::new(),
            register_subject: DEFAULT_REGISTER_SUBJECT.to_string(),
            unregister_subject: DEFAULT_UNREGISTER_SUBJECT.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrarState {
    Idle,
    Connecting,
    Registered,
    Unregistering,
    Done,
    Failed,
}

/// Registrar runs one register → wait → unregister session
pub struct Registrar {
    config: RegistrarConfig,
    bus: BusClient,
    state: watch::Sender<RegistrarState>,
}

impl Registrar {
    pub fn new(config: RegistrarConfig, bus: BusClient) -> Self {
        let (state, _) = watch::channel(RegistrarState::Idle);
        Self { config, bus, state }
    }

    pub fn state(&self) -> RegistrarState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<RegistrarState> {
        self.state.subscribe()
    }

    /// Run the session until `shutdown` is cancelled and the route is unregistered.
    ///
    /// Consumes the registrar: a session registers and unregisters exactly once.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.transition(RegistrarState::Connecting);
        if let Err(e) = self
            .bus
            .connect(&self.config.servers, self.config.tls.clone())
            .await
        {
            self.transition(RegistrarState::Failed);
            return Err(e.into());
        }

        if let Err(e) = self.advertise(&self.config.register_subject).await {
            error!("Failed to register route {:?}: {}", self.config.route.uris, e);
            self.bus.close().await;
            self.transition(RegistrarState::Failed);
            return Err(e.into());
        }

        self.transition(RegistrarState::Registered);
        info!(
            "Registered {:?} -> {} as instance {}",
            self.config.route.uris, self.config.route.host, self.config.instance_id
        );

        shutdown.cancelled().await;

        self.transition(RegistrarState::Unregistering);
        let result = self.advertise(&self.config.unregister_subject).await;
        match &result {
            Ok(()) => info!(
                "Unregistered {:?} via {}",
                self.config.route.uris,
                self.bus.connection_state().current_host()
            ),
            Err(e) => error!("Failed to unregister route {:?}: {}", self.config.route.uris, e),
        }

        self.bus.close().await;
        self.transition(RegistrarState::Done);

        result.map_err(Into::into)
    }

    async fn advertise(&self, subject: &str) -> std::result::Result<(), PublishError> {
        let message = encode(
            &self.config.route,
            &self.config.instance_id,
            &self.config.availability_zone,
        );
        let payload = message.to_json()?;

        debug!("Publishing on {}: {}", subject, String::from_utf8_lossy(&payload));
        self.bus.publish(subject, Bytes::from(payload)).await
    }

    fn transition(&self, next: RegistrarState) {
        let previous = self.state.send_replace(next);
        debug!("Registrar state {:?} -> {:?}", previous, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectError, RegistrarError};
    use crate::mock::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> RegistrarConfig {
        RegistrarConfig::new(
            vec![BusServerDescriptor::new("127.0.0.1:4222", "nats", "nats")],
            RouteDescriptor::new(vec!["riakcs.vcap.me".to_string()], "127.0.0.1").with_port(8080),
            PrivateInstanceId::new("abc"),
        )
    }

    fn registrar(transport: &Arc<MockTransport>, config: RegistrarConfig) -> Registrar {
        Registrar::new(config, BusClient::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_registers_and_waits_for_shutdown() {
        let transport = MockTransport::new();
        let registrar = registrar(&transport, config());
        let mut states = registrar.subscribe();
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(registrar.run(shutdown.clone()));
        states
            .wait_for(|s| *s == RegistrarState::Registered)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            transport.published_on(DEFAULT_REGISTER_SUBJECT),
            vec![Bytes::from_static(
                br#"{"uris":["riakcs.vcap.me"],"host":"127.0.0.1","port":8080,"tags":null,"private_instance_id":"abc"}"#
            )]
        );
        assert!(transport.published_on(DEFAULT_UNREGISTER_SUBJECT).is_empty());
        assert!(!session.is_finished());

        shutdown.cancel();
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unregister_mirrors_register() {
        let transport = MockTransport::new();
        let mut config = config();
        config.availability_zone = "z1".to_string();
        config.route.load_balancing_algorithm = Some("round-robin".to_string());
        let registrar = registrar(&transport, config);
        let mut states = registrar.subscribe();
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(registrar.run(shutdown.clone()));
        transport.wait_for_publishes(1).await;
        shutdown.cancel();
        session.await.unwrap().unwrap();

        let registered = transport.published_on(DEFAULT_REGISTER_SUBJECT);
        let unregistered = transport.published_on(DEFAULT_UNREGISTER_SUBJECT);
        assert_eq!(registered.len(), 1);
        assert_eq!(registered, unregistered);
        assert_eq!(transport.close_count(), 1);
        assert_eq!(*states.borrow_and_update(), RegistrarState::Done);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_shutdown_unregisters_once() {
        let transport = MockTransport::new();
        let registrar = registrar(&transport, config());
        let mut states = registrar.subscribe();
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(registrar.run(shutdown.clone()));
        transport.wait_for_publishes(1).await;

        let first = shutdown.clone();
        let second = shutdown.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.cancel() }),
            tokio::spawn(async move { second.cancel() }),
        );
        a.unwrap();
        b.unwrap();

        session.await.unwrap().unwrap();
        shutdown.cancel();

        assert_eq!(transport.published_on(DEFAULT_UNREGISTER_SUBJECT).len(), 1);
        assert_eq!(transport.published().len(), 2);
        assert_eq!(*states.borrow_and_update(), RegistrarState::Done);
    }

    #[tokio::test]
    async fn test_custom_subjects() {
        let transport = MockTransport::new();
        let mut config = config();
        config.register_subject = "custom.register".to_string();
        config.unregister_subject = "custom.unregister".to_string();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        registrar(&transport, config).run(shutdown).await.unwrap();

        let subjects: Vec<String> = transport.published().into_iter().map(|(s, _)| s).collect();
        assert_eq!(subjects, vec!["custom.register", "custom.unregister"]);
    }

    #[tokio::test]
    async fn test_connect_failure_never_registers() {
        let transport = MockTransport::refusing();
        let registrar = registrar(&transport, config());
        let states = registrar.subscribe();

        let result = registrar.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RegistrarError::Connect(ConnectError::Unreachable { .. }))
        ));
        assert!(transport.published().is_empty());
        assert_eq!(*states.borrow(), RegistrarState::Failed);
    }

    #[tokio::test]
    async fn test_empty_server_list_fails() {
        let transport = MockTransport::new();
        let mut config = config();
        config.servers.clear();

        let result = registrar(&transport, config).run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RegistrarError::Connect(ConnectError::NoServers))
        ));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_register_failure_closes_connection() {
        let transport = MockTransport::new();
        transport.reject_publishes(true);
        let registrar = registrar(&transport, config());
        let states = registrar.subscribe();

        let result = registrar.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(RegistrarError::Publish(PublishError::Rejected { .. }))
        ));
        assert_eq!(transport.close_count(), 1);
        assert_eq!(*states.borrow(), RegistrarState::Failed);
    }

    #[tokio::test]
    async fn test_failed_unregister_still_completes() {
        let transport = MockTransport::new();
        let registrar = registrar(&transport, config());
        let states = registrar.subscribe();
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(registrar.run(shutdown.clone()));
        transport.wait_for_publishes(1).await;
        transport.set_connected(false);
        shutdown.cancel();

        let result = session.await.unwrap();
        assert!(matches!(
            result,
            Err(RegistrarError::Publish(PublishError::NotConnected))
        ));
        assert_eq!(*states.borrow(), RegistrarState::Done);
        assert_eq!(transport.close_count(), 1);
    }
}
