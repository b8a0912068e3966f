//! TLS support for the message bus connection

use anyhow::{anyhow, bail, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use rustls_pemfile::{certs, read_all};
use std::io::BufReader;
use std::sync::Arc;
use tracing::debug;

/// Client-side TLS configuration for broker connections
#[derive(Clone, Debug)]
pub struct TlsClientConfig {
    /// Rustls client configuration
    pub config: ClientConfig,
    /// Minimum TLS version
    pub min_version: String,
    /// Whether a client certificate is presented (mTLS)
    pub client_auth: bool,
}

impl TlsClientConfig {
    /// Validate TLS version string
    pub fn validate_version(version: &str) -> Result<()> {
        match version {
            "1.2" | "1.3" => Ok(()),
            _ => Err(anyhow!(
                "Invalid TLS version: {}. Must be 1.2 or 1.3",
                version
            )),
        }
    }

    /// Create a TLS configuration trusting the CA in `ca_pem`.
    ///
    /// When both `cert_pem` and `key_pem` are given the client authenticates with them.
    pub fn from_pem(
        ca_pem: &[u8],
        cert_pem: Option<&[u8]>,
        key_pem: Option<&[u8]>,
        min_version: Option<String>,
    ) -> Result<Self> {
        debug!("Creating message bus TLS configuration from PEM data");

        let min_version = min_version.unwrap_or_else(|| "1.2".to_string());
        Self::validate_version(&min_version)?;

        let mut roots = RootCertStore::empty();
        for cert in load_certificates(ca_pem)? {
            roots
                .add(cert)
                .map_err(|e| anyhow!("Failed to add CA certificate to root store: {}", e))?;
        }
        debug!("Loaded {} CA certificate(s)", roots.len());

        let versions: &[&'static SupportedProtocolVersion] = if min_version == "1.3" {
            &[&rustls::version::TLS13]
        } else {
            &[&rustls::version::TLS12, &rustls::version::TLS13]
        };

        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(versions)
        .map_err(|e| anyhow!("Failed to select TLS versions: {}", e))?
        .with_root_certificates(roots);

        let (config, client_auth) = match (cert_pem, key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                let chain = load_certificates(cert_pem)?;
                let key = load_private_key(key_pem)?;
                let config = builder
                    .with_client_auth_cert(chain, key)
                    .map_err(|e| anyhow!("Failed to create mTLS config: {}", e))?;
                (config, true)
            }
            (None, None) => (builder.with_no_client_auth(), false),
            _ => bail!("Client certificate and key must be provided together"),
        };

        debug!("Message bus TLS configuration created");

        Ok(Self {
            config,
            min_version,
            client_auth,
        })
    }
}

/// Parse every certificate in a PEM bundle
pub fn load_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Failed to parse certificates: {}", e))?;

    if chain.is_empty() {
        return Err(anyhow!("No certificates found in PEM data"));
    }
    Ok(chain)
}

/// Parse the first private key in a PEM document
pub fn load_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem);
    let items: Vec<_> = read_all(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow!("Failed to parse private key: {}", e))?;

    items
        .into_iter()
        .find_map(|item| match item {
            rustls_pemfile::Item::Pkcs8Key(k) => Some(PrivateKeyDer::Pkcs8(k)),
            rustls_pemfile::Item::Pkcs1Key(k) => Some(PrivateKeyDer::Pkcs1(k)),
            rustls_pemfile::Item::Sec1Key(k) => Some(PrivateKeyDer::Sec1(k)),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No private key found in PEM data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["nats.internal".to_string()])
            .expect("generate certificate");
        (certified.cert.pem(), certified.key_pair.serialize_pem())
    }

    #[test]
    fn test_validate_valid_tls_versions() {
        for version in &["1.2", "1.3"] {
            assert!(
                TlsClientConfig::validate_version(version).is_ok(),
                "Version {} should be valid",
                version
            );
        }
    }

    #[test]
    fn test_validate_invalid_tls_version() {
        assert!(TlsClientConfig::validate_version("1.0").is_err());
        assert!(TlsClientConfig::validate_version("2.0").is_err());
    }

    #[test]
    fn test_ca_only_config() {
        let (ca, _) = self_signed();
        let tls = TlsClientConfig::from_pem(ca.as_bytes(), None, None, None).unwrap();
        assert!(!tls.client_auth);
        assert_eq!(tls.min_version, "1.2");
    }

    #[test]
    fn test_mutual_tls_config() {
        let (ca, _) = self_signed();
        let (cert, key) = self_signed();
        let tls = TlsClientConfig::from_pem(
            ca.as_bytes(),
            Some(cert.as_bytes()),
            Some(key.as_bytes()),
            Some("1.3".to_string()),
        )
        .unwrap();
        assert!(tls.client_auth);
        assert_eq!(tls.min_version, "1.3");
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let (ca, _) = self_signed();
        let (cert, _) = self_signed();
        let result = TlsClientConfig::from_pem(ca.as_bytes(), Some(cert.as_bytes()), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_ca_rejected() {
        let result = TlsClientConfig::from_pem(b"not a certificate", None, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_private_key() {
        let (cert, _) = self_signed();
        assert!(load_private_key(cert.as_bytes()).is_err());
    }
}
