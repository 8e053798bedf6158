//! Accept loop shared by the provisioning and management modes.
//!
//! Each connection carries exactly one request and one response. A handler
//! may ask for a device restart, which happens once the connection is
//! closed and the configured delay has passed.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use picofan_protocol::Request;

use crate::connection::Connection;
use crate::context::DeviceContext;
use crate::device::{AccessPointConfig, Device};
use crate::error::ServerError;
use crate::tls;

/// Configuration for the web server and the modes it runs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_ip: IpAddr,
    /// Port used without TLS.
    pub http_port: u16,
    /// Port used when a certificate is present.
    pub https_port: u16,
    /// Wait between a settings, deletion or upload response and the restart.
    pub reboot_delay: Duration,
    /// Wait between saving Wi-Fi credentials and the restart.
    pub credentials_delay: Duration,
    /// Access point used while provisioning.
    pub access_point: AccessPointConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 80,
            https_port: 443,
            reboot_delay: Duration::from_secs(30),
            credentials_delay: Duration::from_secs(5),
            access_point: AccessPointConfig::default(),
        }
    }
}

/// Per-connection facts a handler may care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub peer: SocketAddr,
    pub secure: bool,
}

/// Result of handling one request.
#[derive(Debug)]
pub struct Handled {
    pub result: Result<(), ServerError>,
    pub restart_after: Option<Duration>,
}

impl Handled {
    pub fn done() -> Self {
        Self::from(Ok(()))
    }

    pub fn failed(err: impl Into<ServerError>) -> Self {
        Self::from(Err(err.into()))
    }

    /// Restart the device after `delay`, whatever the result.
    pub fn then_restart(mut self, delay: Duration) -> Self {
        self.restart_after = Some(delay);
        self
    }
}

impl From<Result<(), ServerError>> for Handled {
    fn from(result: Result<(), ServerError>) -> Self {
        Self {
            result,
            restart_after: None,
        }
    }
}

/// The request handlers of one mode.
pub trait Service: Send + Sync + 'static {
    /// Mode name for logs.
    fn name(&self) -> &'static str;

    /// Handle a request whose head has been read. The body, if any, is
    /// still on the connection.
    fn handle(
        &self,
        request: Request,
        conn: &mut Connection,
        session: &Session,
    ) -> impl Future<Output = Handled> + Send;

    /// Called right before the device restarts.
    fn prepare_restart(&self) {}
}

pub struct Server<S, D> {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    service: Arc<S>,
    device: Arc<D>,
}

impl<S: Service, D: Device> Server<S, D> {
    /// Bind the listener. TLS on the HTTPS port if `cert.der` and `key.der`
    /// exist in the flash root, plain text on the HTTP port otherwise.
    pub async fn bind(
        config: &ServerConfig,
        context: &DeviceContext,
        service: S,
        device: Arc<D>,
    ) -> Result<Self, ServerError> {
        let acceptor = tls::load_acceptor(context.root())?;
        let port = if acceptor.is_some() {
            config.https_port
        } else {
            config.http_port
        };
        let listener = TcpListener::bind((config.bind_ip, port)).await?;
        info!(
            "{} server listening on {}{}",
            service.name(),
            listener.local_addr()?,
            if acceptor.is_some() { " (TLS)" } else { "" }
        );

        Ok(Self {
            listener,
            acceptor,
            service: Arc::new(service),
            device,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_secure(&self) -> bool {
        self.acceptor.is_some()
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let acceptor = self.acceptor.clone();
                    let service = self.service.clone();
                    let device = self.device.clone();

                    tokio::spawn(async move {
                        let restart_after = match accept(stream, peer, acceptor).await {
                            Ok((conn, session)) => serve(&*service, conn, session).await,
                            Err(e) => {
                                error!("Connection error from {}: {}", peer, e);
                                None
                            }
                        };

                        if let Some(delay) = restart_after {
                            info!("Restarting in {:?}", delay);
                            tokio::time::sleep(delay).await;
                            service.prepare_restart();
                            device.restart();
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn accept(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
) -> Result<(Connection, Session), ServerError> {
    debug!("New connection from {}", peer);
    let secure = acceptor.is_some();
    let conn = match acceptor {
        Some(acceptor) => Connection::new(acceptor.accept(stream).await?),
        None => Connection::new(stream),
    };
    Ok((conn, Session { peer, secure }))
}

/// Read one request, dispatch it and close. Returns the requested restart
/// delay, if any.
pub async fn serve<S: Service>(
    service: &S,
    mut conn: Connection,
    session: Session,
) -> Option<Duration> {
    let handled = match conn.read_request().await {
        Ok(request) => {
            debug!(
                "{} {} {} from {}",
                service.name(),
                request.method,
                request.target,
                session.peer
            );
            service.handle(request, &mut conn, &session).await
        }
        Err(e) => Handled::failed(e),
    };

    if let Err(e) = &handled.result {
        conn.write_error(e).await;
    }
    conn.close().await;
    handled.restart_after
}

#[cfg(test)]
mod tests {
    use super::*;
    use picofan_protocol::{ResponseHead, Method};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    /// Answers `GET /` and fails everything else, always asking for a restart.
    struct Probe;

    impl Service for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        async fn handle(&self, request: Request, conn: &mut Connection, _: &Session) -> Handled {
            let result = if request.method == Method::Get && request.path() == "/" {
                conn.write_page(&ResponseHead::html(), Some("ok".to_string()))
                    .await
            } else {
                Err(ServerError::UnrecognizedForm)
            };
            Handled::from(result).then_restart(Duration::from_secs(7))
        }
    }

    fn session() -> Session {
        Session {
            peer: "127.0.0.1:50000".parse().unwrap(),
            secure: false,
        }
    }

    async fn exchange(request: &[u8]) -> (String, Option<Duration>) {
        let (server, mut client) = duplex(4096);
        client.write_all(request).await.unwrap();
        let restart = serve(&Probe, Connection::new(server), session()).await;

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        (response, restart)
    }

    #[tokio::test]
    async fn test_serve_writes_response_and_closes() {
        let (response, restart) = exchange(b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            response,
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\nok"
        );
        assert_eq!(restart, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_failed_handler_still_restarts() {
        let (response, restart) = exchange(
            b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(restart, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_400_without_restart() {
        let (response, restart) = exchange(b"DELETE / HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Invalid request line"));
        assert_eq!(restart, None);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_port, 80);
        assert_eq!(config.https_port, 443);
        assert_eq!(config.reboot_delay, Duration::from_secs(30));
        assert_eq!(config.credentials_delay, Duration::from_secs(5));
        assert_eq!(config.access_point.ssid, "picoventi");
    }
}
