//! Accept loops (§4.2 `WAIT_STARTUP` entry point).
//!
//! pgvpd can bind two ports: the plain listener (where clients may still
//! ask for `SSLRequest`, always refused — see `handler::wait_for_startup`)
//! and, if `tls_port`/`tls_cert`/`tls_key` are configured, a second listener
//! where every accepted socket is TLS-terminated before the handler ever
//! sees a startup frame.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::handler::{handle, Shared};
use crate::stream::ClientTransport;
use crate::tls::server_acceptor;

pub async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let addr = (shared.config.listen_host.as_str(), shared.config.listen_port);
    let listener = TcpListener::bind(addr).await?;
    info!(host = %shared.config.listen_host, port = shared.config.listen_port, "plain listener started");

    let tls_acceptor = match (&shared.config.tls_port, &shared.config.tls_cert, &shared.config.tls_key) {
        (Some(port), Some(cert), Some(key)) => {
            let acceptor = server_acceptor(cert, key)?;
            let tls_listener = TcpListener::bind((shared.config.listen_host.as_str(), *port)).await?;
            info!(host = %shared.config.listen_host, port, "tls listener started");
            Some((tls_listener, acceptor))
        }
        (None, None, None) => None,
        _ => {
            warn!("tls_port, tls_cert and tls_key must all be set together; TLS listener disabled");
            None
        }
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => spawn_plain(socket, peer, shared.clone()),
                    Err(err) => warn!(error = %err, "accept failed on plain listener"),
                }
            }
            accepted = accept_tls(&tls_acceptor) => {
                if let Some((socket, peer, acceptor)) = accepted {
                    spawn_tls(socket, peer, acceptor, shared.clone());
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Awaits the TLS listener's next connection, or never resolves if no TLS
/// listener is configured — lets the `select!` above treat it uniformly.
async fn accept_tls(
    tls: &Option<(TcpListener, TlsAcceptor)>,
) -> Option<(tokio::net::TcpStream, std::net::SocketAddr, TlsAcceptor)> {
    match tls {
        Some((listener, acceptor)) => match listener.accept().await {
            Ok((socket, peer)) => Some((socket, peer, acceptor.clone())),
            Err(err) => {
                warn!(error = %err, "accept failed on tls listener");
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}

fn spawn_plain(socket: tokio::net::TcpStream, peer: std::net::SocketAddr, shared: Arc<Shared>) {
    let _ = socket.set_nodelay(true);
    tokio::spawn(async move {
        tracing::debug!(%peer, "plain connection accepted");
        handle(ClientTransport::Plain(socket), shared).await;
    });
}

fn spawn_tls(
    socket: tokio::net::TcpStream,
    peer: std::net::SocketAddr,
    acceptor: TlsAcceptor,
    shared: Arc<Shared>,
) {
    let _ = socket.set_nodelay(true);
    tokio::spawn(async move {
        match acceptor.accept(socket).await {
            Ok(stream) => {
                tracing::debug!(%peer, "tls connection accepted");
                handle(ClientTransport::Tls(Box::new(stream)), shared).await;
            }
            Err(err) => warn!(%peer, error = %err, "tls handshake failed"),
        }
    });
}
