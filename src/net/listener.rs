//! TCP listener binding and plain HTTP serving.
//!
//! # Responsibilities
//! - Bind configured addresses with actionable error messages
//! - Serve an Axum app until the shutdown future resolves
//! - Drain in-flight requests on shutdown

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error(
        "permission denied binding {addr}: ports below 1024 need root or \
         CAP_NET_BIND_SERVICE (or choose a port above 1024)"
    )]
    PermissionDenied {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("address {addr} is already in use; stop the other process or choose another port")]
    AddrInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    fn from_bind(addr: SocketAddr, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => ListenerError::PermissionDenied { addr, source },
            io::ErrorKind::AddrInUse => ListenerError::AddrInUse { addr, source },
            _ => ListenerError::Bind { addr, source },
        }
    }
}

/// Bind a TCP listener on `address`.
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| ListenerError::InvalidAddress(address.to_string()))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::from_bind(addr, source))?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr, source })?;
    tracing::debug!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// Serve `app` over plain HTTP until `shutdown` resolves, then stop accepting
/// and wait for in-flight requests.
pub async fn serve_http<F>(listener: TcpListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(address = %addr, "HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unparseable_address() {
        let err = bind("localhost:http").await.unwrap_err();
        assert!(matches!(err, ListenerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn address_in_use_is_distinct() {
        let first = bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let err = bind(&taken).await.unwrap_err();
        assert!(matches!(err, ListenerError::AddrInUse { .. }));
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn permission_denied_message_is_actionable() {
        let err = ListenerError::from_bind(
            "0.0.0.0:443".parse().unwrap(),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("CAP_NET_BIND_SERVICE"));
    }
}
