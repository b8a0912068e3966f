//! Route descriptors and instance identity

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors found while validating a route before it is advertised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteValidationError {
    #[error("route must declare at least one uri")]
    NoUris,

    #[error("route uri at index {0} is blank")]
    BlankUri(usize),

    #[error("route host must not be empty")]
    MissingHost,
}

/// RouteDescriptor describes one endpoint this process wants the router to send traffic to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Hostnames the router should map to this endpoint
    pub uris: Vec<String>,

    /// Address the router forwards traffic to
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_port: Option<u16>,

    /// Backend protocol hint (e.g. "http1", "http2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Free-form metadata forwarded to the router. `None` is advertised as `null`.
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,

    /// SAN the router should expect on the backend's certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_cert_domain_san: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_algorithm: Option<String>,
}

impl RouteDescriptor {
    /// Create a route for the given uris pointing at `host`
    pub fn new(uris: Vec<String>, host: impl Into<String>) -> Self {
        Self {
            uris,
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the plain-text port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the TLS port
    pub fn with_tls_port(mut self, port: u16) -> Self {
        self.tls_port = Some(port);
        self
    }

    /// Add a tag, creating the tag map on first use
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check that the route can be advertised.
    ///
    /// The encoder never fabricates uris, so this must pass before a route reaches it.
    pub fn validate(&self) -> Result<(), RouteValidationError> {
        if self.uris.is_empty() {
            return Err(RouteValidationError::NoUris);
        }

        if let Some(index) = self.uris.iter().position(|uri| uri.trim().is_empty()) {
            return Err(RouteValidationError::BlankUri(index));
        }

        if self.host.trim().is_empty() {
            return Err(RouteValidationError::MissingHost);
        }

        Ok(())
    }
}

/// Opaque identifier distinguishing instances that advertise the same route
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateInstanceId(String);

impl PrivateInstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (UUID v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrivateInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrivateInstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PrivateInstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
