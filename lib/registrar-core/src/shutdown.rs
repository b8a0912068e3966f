//! Termination signal bridge
//!
//! Turns process termination signals into a single cancellation of a [`CancellationToken`].
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]
//!
//! Both signals are treated the same. Only the first one delivered cancels the token; the
//! listener keeps running afterwards so later signals are swallowed instead of killing the
//! process while it unregisters.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Delivers termination signals to a shutdown token, exactly once
pub struct SignalBridge {
    token: CancellationToken,
    fired: AtomicBool,
}

impl SignalBridge {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            fired: AtomicBool::new(false),
        }
    }

    /// Record a delivered signal. Returns `true` only for the signal that triggered shutdown.
    pub fn deliver(&self, signal: TerminationSignal) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Ignoring {}: shutdown already in progress", signal);
            return false;
        }

        info!("Received {}, shutting down", signal);
        self.token.cancel();
        true
    }

    /// Install the OS signal listeners and forward signals until the process exits.
    ///
    /// Returns `Err` if the listeners cannot be registered.
    #[cfg(unix)]
    pub fn listen(self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        Ok(tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigint.recv() => TerminationSignal::Interrupt,
                    Some(()) = sigterm.recv() => TerminationSignal::Terminate,
                    else => break,
                };
                self.deliver(received);
            }
        }))
    }

    /// Install the OS signal listeners and forward signals until the process exits.
    #[cfg(not(unix))]
    pub fn listen(self) -> std::io::Result<JoinHandle<()>> {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                self.deliver(TerminationSignal::Interrupt);
            }
        }))
    }
}
