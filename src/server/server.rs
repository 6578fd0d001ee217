use crate::server::{
    handler::Handler,
    server::Error::{
        BufferError, LocalSocketAddrError, PublishSocketAddrError, RouterError,
        ServerConnectionError, SocketBindError,
    },
};
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as ServerBuilder,
};
use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::oneshot::Sender,
    task::spawn,
};

#[cfg(feature = "https")]
use crate::server::server::Error::TlsError;
#[cfg(feature = "https")]
use tokio_rustls::TlsAcceptor;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, std::io::Error),
    #[error("cannot parse socket address: {0}")]
    SocketAddrParseError(#[from] std::net::AddrParseError),
    #[error("cannot obtain local address: {0}")]
    LocalSocketAddrError(std::io::Error),
    #[error("cannot publish the listening address {0}")]
    PublishSocketAddrError(SocketAddr),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("HTTP error: {0}")]
    HTTPError(#[from] http::Error),
    #[error("cannot process request: {0}")]
    RouterError(#[from] crate::server::handler::Error),
    #[error("HTTPS error: {0}")]
    TlsError(String),
    #[error("Server error: {0}")]
    ServerConnectionError(Box<dyn std::error::Error + Send + Sync>),
}

pub struct AssuredServerConfig {
    pub static_port: Option<u16>,
    pub expose: bool,
    #[cfg(feature = "https")]
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

/// Accepts TCP connections and hands every buffered request to a [`Handler`].
pub struct AssuredServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    handler: Box<H>,
    config: AssuredServerConfig,
}

impl<H> AssuredServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    /// Creates a new `AssuredServer` instance with the given handler and configuration.
    ///
    /// # Parameters
    /// - `handler`: A boxed handler that implements the `Handler` trait.
    /// - `config`: The configuration settings for the server.
    pub fn new(handler: Box<H>, config: AssuredServerConfig) -> Self {
        AssuredServer { handler, config }
    }

    /// Starts the server with support for external shutdown signals.
    ///
    /// # Parameters
    /// - `socket_addr_sender`: An optional `Sender` that receives the server's socket address
    ///   once it is bound.
    /// - `shutdown`: A future that resolves when the server should shut down.
    pub async fn start_with_signals<F>(
        self,
        socket_addr_sender: Option<Sender<SocketAddr>>,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let host = if self.config.expose {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };
        let addr: SocketAddr =
            format!("{}:{}", host, self.config.static_port.unwrap_or(0)).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SocketBindError(addr, e))?;

        let local_addr = listener.local_addr().map_err(LocalSocketAddrError)?;
        if let Some(sender) = socket_addr_sender {
            sender.send(local_addr).map_err(PublishSocketAddrError)?;
        }

        tracing::info!("Listening on {}", local_addr);
        self.run_accept_loop(listener, shutdown).await?;
        tracing::info!("Server on {} stopped", local_addr);

        Ok(())
    }

    async fn run_accept_loop<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let shutdown = shutdown.shared();
        let server = Arc::new(self);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, remote_address)) => {
                            let server = server.clone();
                            spawn(async move {
                                if let Err(err) = server.handle_tcp_stream(tcp_stream, remote_address).await {
                                    tracing::error!("{:?}", err);
                                }
                            });
                        },
                        Err(err) => {
                            tracing::error!("TCP error: {:?}", err);
                        },
                    };
                }
                _ = shutdown.clone() => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        let req = match buffer_request(req).await {
            Ok(req) => req,
            Err(err) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, BufferError(err));
            }
        };

        match self.handler.handle(req).await {
            Ok(response) => to_service_response(response),
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, RouterError(err)),
        }
    }

    async fn handle_tcp_stream(
        self: Arc<Self>,
        tcp_stream: TcpStream,
        remote_address: SocketAddr,
    ) -> Result<(), Error> {
        tracing::trace!("new TCP connection from {}", remote_address);

        #[cfg(feature = "https")]
        {
            if let Some(tls) = self.config.tls.clone() {
                let tls_stream = TlsAcceptor::from(tls)
                    .accept(tcp_stream)
                    .await
                    .map_err(|e| TlsError(format!("TLS accept failed: {:?}", e)))?;

                return serve_connection(self, tls_stream).await;
            }
        }

        serve_connection(self, tcp_stream).await
    }
}

fn serve_connection<H, S>(
    server: Arc<AssuredServer<H>>,
    stream: S,
) -> impl Future<Output = Result<(), Error>> + Send + 'static
where
    H: Handler + Send + Sync + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async move {
        let server_builder = ServerBuilder::new(TokioExecutor::new());

        server_builder
            .serve_connection(
                TokioIo::new(stream),
                service_fn(|req| server.clone().service(req)),
            )
            .await
            .map_err(ServerConnectionError)
    }
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

fn error_response(
    code: StatusCode,
    err: Error,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    tracing::error!("failed to process request: {}", err);
    Ok(Response::builder()
        .status(code)
        .body(full(err.to_string()))?)
}

fn to_service_response(
    response: Response<Bytes>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, full(body)))
}
