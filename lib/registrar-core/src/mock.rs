//! In-memory transport for tests

use crate::bus::{BusConnection, ConnectOptions, Transport};
use crate::connection::BusEvent;
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    reject: AtomicBool,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    published: Mutex<Vec<(String, Bytes)>>,
    last_options: Mutex<Option<ConnectOptions>>,
    events: Mutex<Option<mpsc::UnboundedSender<BusEvent>>>,
    on_publish: Notify,
}

pub(crate) struct MockTransport {
    refuse: bool,
    shared: Arc<Shared>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            refuse: false,
            shared: Arc::new(Shared::default()),
        })
    }

    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            shared: Arc::new(Shared::default()),
        })
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> Vec<(String, Bytes)> {
        self.shared.published.lock().unwrap().clone()
    }

    pub(crate) fn published_on(&self, subject: &str) -> Vec<Bytes> {
        self.published()
            .into_iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Wait until at least `count` messages have been published
    pub(crate) async fn wait_for_publishes(&self, count: usize) {
        loop {
            let notified = self.shared.on_publish.notified();
            if self.shared.published.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn last_options(&self) -> Option<ConnectOptions> {
        self.shared.last_options.lock().unwrap().clone()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn reject_publishes(&self, reject: bool) {
        self.shared.reject.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, event: BusEvent) {
        if let Some(events) = self.shared.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<BusEvent>,
    ) -> Result<Box<dyn BusConnection>, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let url = options.servers.first().cloned().unwrap_or_default();
        *self.shared.last_options.lock().unwrap() = Some(options);
        *self.shared.events.lock().unwrap() = Some(events);
        self.shared.connected.store(true, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            url,
            shared: self.shared.clone(),
        }))
    }
}

struct MockConnection {
    url: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl BusConnection for MockConnection {
    fn connected_url(&self) -> String {
        self.url.clone()
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.shared.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("write failed".to_string()));
        }
        self.shared
            .published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        self.shared.on_publish.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}
