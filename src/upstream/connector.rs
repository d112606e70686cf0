//! Dialing upstream hosts over TLS + HTTP/2.
//!
//! The upstream video origins present certificates this proxy does not
//! validate. Verification is switched off through `accept_invalid_certs`,
//! which defaults to true; see DESIGN.md.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::UpstreamConfig;
use crate::upstream::error::UpstreamError;
use crate::upstream::session::{H2Session, UpstreamSession};

/// Opens new sessions to an upstream host.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Dial `host` and return a ready session.
    fn connect(&self, host: &str) -> BoxFuture<'static, Result<Arc<dyn UpstreamSession>, UpstreamError>>;
}

/// Production connector: TCP, then TLS with ALPN `h2`, then an h2 handshake.
pub struct TlsH2Connector {
    tls: TlsConnector,
    port: u16,
    window_size: u32,
    connect_timeout: Duration,
}

impl TlsH2Connector {
    /// Build a connector from upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| UpstreamError::Tls(e.to_string()))?;

        let mut tls_config = if config.accept_invalid_certs {
            tracing::warn!("Upstream certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(load_roots(config.ca_file.as_deref())?)
                .with_no_client_auth()
        };
        tls_config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Self {
            tls: TlsConnector::from(Arc::new(tls_config)),
            port: config.port,
            window_size: config.initial_window_size,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }
}

impl fmt::Debug for TlsH2Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsH2Connector")
            .field("port", &self.port)
            .field("window_size", &self.window_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Connector for TlsH2Connector {
    fn connect(&self, host: &str) -> BoxFuture<'static, Result<Arc<dyn UpstreamSession>, UpstreamError>> {
        let tls = self.tls.clone();
        let host = host.to_string();
        let port = self.port;
        let window_size = self.window_size;
        let connect_timeout = self.connect_timeout;

        Box::pin(async move {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|e| UpstreamError::Dns(e.to_string()))?;

            let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect((host.as_str(), port)))
                .await
                .map_err(|_| UpstreamError::TimedOut)??;
            tcp.set_nodelay(true).ok();

            let tls_stream = tokio::time::timeout(connect_timeout, tls.connect(server_name, tcp))
                .await
                .map_err(|_| UpstreamError::TimedOut)?
                .map_err(|e| UpstreamError::Tls(e.to_string()))?;

            let session = H2Session::handshake(tls_stream, &host, window_size).await?;
            tracing::debug!(host = %host, session_id = %session.id(), "Upstream session established");
            Ok(Arc::new(session) as Arc<dyn UpstreamSession>)
        })
    }
}

/// Trusted roots from a PEM bundle. No bundle means an empty store.
fn load_roots(ca_file: Option<&str>) -> Result<RootCertStore, UpstreamError> {
    let mut roots = RootCertStore::empty();
    let Some(path) = ca_file else {
        return Ok(roots);
    };

    let file = File::open(path).map_err(|e| UpstreamError::Tls(format!("{path}: {e}")))?;
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| UpstreamError::Tls(format!("{path}: {e}")))?;
        roots.add(cert).map_err(|e| UpstreamError::Tls(e.to_string()))?;
    }
    Ok(roots)
}

/// Certificate verifier that accepts every certificate.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_dial_is_reported() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = UpstreamConfig {
            port,
            ..UpstreamConfig::default()
        };
        let connector = TlsH2Connector::new(&config).unwrap();
        let err = connector.connect("127.0.0.1").await.unwrap_err();
        assert_eq!(err, UpstreamError::ConnectionRefused);
    }

    #[test]
    fn missing_ca_file_is_a_tls_error() {
        let config = UpstreamConfig {
            accept_invalid_certs: false,
            ca_file: Some("/nonexistent/upstream-roots.pem".into()),
            ..UpstreamConfig::default()
        };
        assert!(matches!(TlsH2Connector::new(&config), Err(UpstreamError::Tls(_))));
    }
}
