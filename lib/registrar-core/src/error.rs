use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Failure to establish the initial bus connection
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("no message bus servers configured")]
    NoServers,

    #[error("failed to connect to message bus (tried {hosts:?}): {reason}")]
    Unreachable { hosts: Vec<String>, reason: String },
}

/// Failure to hand a message to the bus
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("not connected to message bus")]
    NotConnected,

    #[error("message bus rejected publish on {subject}: {reason}")]
    Rejected { subject: String, reason: String },

    #[error("failed to encode advertisement: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The connected broker URL could not be reduced to a host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse message bus url {url:?}: {reason}")]
pub struct HostParseError {
    pub url: String,
    pub reason: String,
}

/// The transport closed the connection for good
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected message bus connection close (last host {last_host:?})")]
pub struct UnexpectedClose {
    pub last_host: String,
}

/// Error reported by a transport implementation
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
