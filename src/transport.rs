//! TCP and TLS connection setup.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ClientError;

/// An established connection, before any IRC traffic.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    pub fn is_tls(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }
}

/// Connect to `server`, with TLS if configured, within `timeout`.
pub async fn connect(server: &ServerConfig, timeout: Duration) -> Result<Stream, ClientError> {
    tokio::time::timeout(timeout, establish(server))
        .await
        .map_err(|_| ClientError::Timeout("connect"))?
}

async fn establish(server: &ServerConfig) -> Result<Stream, ClientError> {
    let tcp = TcpStream::connect((server.host.as_str(), server.port)).await?;
    if let Err(e) = enable_keepalive(&tcp) {
        warn!("failed to enable TCP keepalive: {}", e);
    }
    debug!(host = %server.host, port = server.port, tls = server.tls, "connected");

    if !server.tls {
        return Ok(Stream::Tcp(tcp));
    }
    let name = ServerName::try_from(server.host.clone())
        .map_err(|_| ClientError::InvalidServerName(server.host.clone()))?;
    let connector = TlsConnector::from(Arc::new(tls_config()));
    let tls = connector.connect(name, tcp).await?;
    debug!(host = %server.host, "TLS handshake complete");
    Ok(Stream::Tls(Box::new(tls)))
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}

/// Client config trusting the platform's root certificates.
fn tls_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("failed to add root cert: {}", e);
        }
    }
    for e in &native.errors {
        warn!("error loading native certs: {}", e);
    }
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            ..ServerConfig::default()
        };
        let (stream, accepted) = tokio::join!(
            connect(&server, Duration::from_secs(5)),
            listener.accept()
        );
        assert!(!stream.unwrap().is_tls());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            tls: true,
            password: None,
        };
        // An IP address is a valid ServerName; the handshake then fails
        // because nothing speaks TLS on the other end.
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });
        let result = connect(&server, Duration::from_secs(5)).await;
        assert!(result.is_err());
        accept.await.unwrap();
    }
}
