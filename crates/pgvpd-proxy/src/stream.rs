//! Transport abstraction over plain and TLS-wrapped TCP (§4.2).
//!
//! Both the client-facing and upstream legs end up behind the same
//! `Transport` enum once their respective handshake (if any) completes, so
//! `handler.rs` can read/write without caring which side negotiated TLS.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream as ClientTlsStream, server::TlsStream as ServerTlsStream};

/// A client-facing connection: plain TCP, or TLS negotiated after SSLRequest.
pub enum ClientTransport {
    Plain(TcpStream),
    Tls(Box<ServerTlsStream<TcpStream>>),
}

/// An upstream connection: plain TCP, or TLS negotiated per `upstream_tls`.
pub enum UpstreamTransport {
    Plain(TcpStream),
    Tls(Box<ClientTlsStream<TcpStream>>),
}

macro_rules! impl_async_io {
    ($ty:ident, $plain:ident, $tls:ident) => {
        impl AsyncRead for $ty {
            fn poll_read(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
                buf: &mut ReadBuf<'_>,
            ) -> Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $ty::$plain(s) => Pin::new(s).poll_read(cx, buf),
                    $ty::$tls(s) => Pin::new(s).poll_read(cx, buf),
                }
            }
        }

        impl AsyncWrite for $ty {
            fn poll_write(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
                buf: &[u8],
            ) -> Poll<std::io::Result<usize>> {
                match self.get_mut() {
                    $ty::$plain(s) => Pin::new(s).poll_write(cx, buf),
                    $ty::$tls(s) => Pin::new(s).poll_write(cx, buf),
                }
            }

            fn poll_flush(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $ty::$plain(s) => Pin::new(s).poll_flush(cx),
                    $ty::$tls(s) => Pin::new(s).poll_flush(cx),
                }
            }

            fn poll_shutdown(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $ty::$plain(s) => Pin::new(s).poll_shutdown(cx),
                    $ty::$tls(s) => Pin::new(s).poll_shutdown(cx),
                }
            }
        }
    };
}

impl_async_io!(ClientTransport, Plain, Tls);
impl_async_io!(UpstreamTransport, Plain, Tls);
