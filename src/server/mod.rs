//! Async TCP transport using Tokio.
//!
//! Accepts TCP connections, parses HTTP/1.1 requests, and runs each one
//! through a shared [`Host`]. Persistent connections (keep-alive) are
//! supported; a pipeline error becomes `500 Internal Server Error`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::host::Host;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// TCP front end for a [`Host`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pipewright::host::Host;
/// use pipewright::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let host = Arc::new(Host::builder().build()?);
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(host).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the listener fails, handling each on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, host: Arc<Host>) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "pipewright listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let host = Arc::clone(&host);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, host).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Serves one TCP connection until the peer closes it or asks for `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    host: Arc<Host>,
) -> Result<(), std::io::Error> {
    let max_request_size = host.config().max_request_size;
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > max_request_size {
            warn!(peer = %peer_addr, limit = max_request_size, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received, read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        // Pipeline failures never reach the peer as-is.
        let response = match host.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(peer = %peer_addr, error = %e, "pipeline failed");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        };
        stream
            .write_all(&response.keep_alive(keep_alive).into_bytes())
            .await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::cache::CacheControl;
    use crate::context::PipelineContinuation;
    use crate::error::PipelineError;
    use crate::middleware::{ContributorDescriptor, contributor_fn};
    use crate::resource::Resource;

    async fn spawn(host: Host) -> SocketAddr {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(Arc::new(host)));
        addr
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_cache_headers_over_tcp() {
        let host = Host::builder()
            .resource(
                Resource::new("/", |ctx| {
                    Box::pin(async move {
                        ctx.response_mut().set_body(b"hello".to_vec());
                        Ok(())
                    })
                })
                .cache_control(CacheControl::private().max_age(Duration::from_secs(3600))),
            )
            .build()
            .unwrap();
        let addr = spawn(host).await;

        let reply = roundtrip(addr, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(reply.contains("cache-control: private, max-age=3600\r\n"), "{reply}");
        assert!(reply.ends_with("hello"));
    }

    #[tokio::test]
    async fn pipeline_errors_become_500() {
        let host = Host::builder()
            .resource(Resource::new("/fail", |_ctx| {
                Box::pin(async { Err(PipelineError::Handler("boom".into())) })
            }))
            .build()
            .unwrap();
        let addr = spawn(host).await;

        let reply = roundtrip(addr, "GET /fail HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        assert!(reply.starts_with("HTTP/1.1 500"), "{reply}");
    }

    #[tokio::test]
    async fn aborted_run_becomes_500() {
        let give_up = contributor_fn("give-up", |_ctx| {
            Box::pin(async { Ok(PipelineContinuation::Abort) })
        });
        let host = Host::builder()
            .resource(Resource::new("/", |_ctx| Box::pin(async { Ok(()) })))
            .contributor(ContributorDescriptor::single_tap(Arc::new(give_up)))
            .build()
            .unwrap();
        let addr = spawn(host).await;

        let reply = roundtrip(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        assert!(reply.starts_with("HTTP/1.1 500"), "{reply}");
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn(Host::builder().build().unwrap()).await;
        let reply = roundtrip(addr, "NOT A REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400"), "{reply}");
    }
}
