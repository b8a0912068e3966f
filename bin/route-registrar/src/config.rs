//! Registrar configuration file

use anyhow::{bail, Context, Result};
use registrar_api::{BusServerDescriptor, PrivateInstanceId, RouteDescriptor};
use registrar_core::registrar::{DEFAULT_REGISTER_SUBJECT, DEFAULT_UNREGISTER_SUBJECT};
use registrar_core::RegistrarConfig;
use registrar_nats::TlsClientConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load balancing algorithms the router understands
const LOAD_BALANCING_ALGORITHMS: [&str; 2] = ["round-robin", "least-connection"];

#[derive(Debug, Deserialize)]
pub struct Config {
    pub message_bus_servers: Vec<BusServerDescriptor>,

    #[serde(default)]
    pub availability_zone: String,

    /// Generated per process when not set
    #[serde(default)]
    pub private_instance_id: Option<String>,

    #[serde(default = "default_register_subject")]
    pub register_subject: String,

    #[serde(default = "default_unregister_subject")]
    pub unregister_subject: String,

    pub route: RouteConfig,

    #[serde(default)]
    pub nats_mtls: Option<TlsFileConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RouteConfig {
    pub uris: Vec<String>,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls_port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub route_service_url: Option<String>,
    #[serde(default)]
    pub server_cert_domain_san: Option<String>,
    #[serde(default)]
    pub options: Option<RouteOptionsConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RouteOptionsConfig {
    #[serde(default, rename = "loadbalancing")]
    pub load_balancing_algorithm: Option<String>,
}

/// PEM files for the broker connection
#[derive(Debug, Deserialize)]
pub struct TlsFileConfig {
    pub ca_cert_path: PathBuf,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub min_version: Option<String>,
}

fn default_register_subject() -> String {
    DEFAULT_REGISTER_SUBJECT.to_string()
}

fn default_unregister_subject() -> String {
    DEFAULT_UNREGISTER_SUBJECT.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.route_descriptor().validate()?;

        if let Some(algorithm) = self.load_balancing_algorithm() {
            if !LOAD_BALANCING_ALGORITHMS.contains(&algorithm) {
                bail!(
                    "Invalid load balancing algorithm: {}. Must be one of {:?}",
                    algorithm,
                    LOAD_BALANCING_ALGORITHMS
                );
            }
        }

        Ok(())
    }

    fn load_balancing_algorithm(&self) -> Option<&str> {
        self.route
            .options
            .as_ref()
            .and_then(|o| o.load_balancing_algorithm.as_deref())
            .filter(|a| !a.is_empty())
    }

    pub fn route_descriptor(&self) -> RouteDescriptor {
        let route = &self.route;
        RouteDescriptor {
            uris: route.uris.clone(),
            host: route.host.clone(),
            port: route.port,
            tls_port: route.tls_port,
            protocol: route.protocol.clone(),
            tags: route.tags.clone(),
            route_service_url: route.route_service_url.clone(),
            server_cert_domain_san: route.server_cert_domain_san.clone(),
            load_balancing_algorithm: self.load_balancing_algorithm().map(str::to_string),
        }
    }

    pub fn instance_id(&self) -> PrivateInstanceId {
        match self.private_instance_id.as_deref() {
            Some(id) if !id.is_empty() => PrivateInstanceId::new(id),
            _ => PrivateInstanceId::generate(),
        }
    }

    /// Build the broker TLS configuration, if one is configured
    pub fn tls_client_config(&self) -> Result<Option<TlsClientConfig>> {
        let Some(tls) = &self.nats_mtls else {
            return Ok(None);
        };

        let ca = read_pem(&tls.ca_cert_path)?;
        let cert = tls.cert_path.as_deref().map(read_pem).transpose()?;
        let key = tls.key_path.as_deref().map(read_pem).transpose()?;

        let config = TlsClientConfig::from_pem(
            &ca,
            cert.as_deref(),
            key.as_deref(),
            tls.min_version.clone(),
        )?;
        Ok(Some(config))
    }

    /// Everything the registrar needs for one session
    pub fn registrar_config(&self) -> Result<RegistrarConfig> {
        let instance_id = self.instance_id();
        debug!("Using private instance id {}", instance_id);

        let mut config = RegistrarConfig::new(
            self.message_bus_servers.clone(),
            self.route_descriptor(),
            instance_id,
        );
        if let Some(tls) = self.tls_client_config()? {
            info!(
                "Message bus TLS enabled (min version {}, client certificate: {})",
                tls.min_version, tls.client_auth
            );
            config.tls = Some(tls.config);
        }
        config.availability_zone = self.availability_zone.clone();
        config.register_subject = self.register_subject.clone();
        config.unregister_subject = self.unregister_subject.clone();
        Ok(config)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read PEM file {}", path.display()))
}
