//! Low-level SMTP transport.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::config::{Config, Security};
use crate::error::{Error, Result};

/// SMTP transport: plain TCP or TLS.
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(TcpStream),
    /// TLS-encrypted connection.
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("SmtpStream::Tcp"),
            Self::Tls(_) => f.write_str("SmtpStream::Tls"),
        }
    }
}

impl SmtpStream {
    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS or the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        match self {
            Self::Tcp(tcp) => Ok(Self::Tls(Box::new(handshake(tcp, hostname).await?))),
            Self::Tls(_) => Err(Error::Protocol("Already using TLS".into())),
        }
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Connects as described by `config`, bounded by its connect timeout.
/// With [`Security::StartTls`] the stream stays plain; the upgrade happens
/// after EHLO.
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails or times out.
pub async fn connect(config: &Config) -> Result<SmtpStream> {
    let fut = async {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        tcp.set_nodelay(true)?;
        Ok(match config.security {
            Security::Implicit => SmtpStream::Tls(Box::new(handshake(tcp, &config.host).await?)),
            Security::StartTls | Security::None => SmtpStream::Tcp(tcp),
        })
    };
    with_timeout(config.connect_timeout, fut).await
}

/// Runs `fut`, mapping expiry to [`Error::Timeout`].
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

async fn handshake(tcp: TcpStream, hostname: &str) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string())?;
    Ok(create_tls_connector().connect(server_name, tcp).await?)
}

/// Creates a TLS connector with the bundled web PKI roots.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1").port(port).build();
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err:?}");
    }

    #[tokio::test]
    async fn plain_connect_reaches_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = Config::builder("127.0.0.1")
            .security(Security::StartTls)
            .port(port)
            .build();
        let (stream, accepted) = tokio::join!(connect(&config), listener.accept());
        accepted.unwrap();
        assert!(matches!(stream.unwrap(), SmtpStream::Tcp(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout() {
        let err = with_timeout(Duration::from_millis(500), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(500)));
    }
}
