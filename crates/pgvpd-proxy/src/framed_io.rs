//! Pulling complete wire frames off an `AsyncRead` stream (§9 "byte buffers").
//!
//! A thin adapter over `pgvpd_wire`'s framers: read into a small stack
//! buffer, feed it to the framer, try to parse, repeat until a complete
//! frame falls out or the peer closes the socket.

use bytes::Bytes;
use pgvpd_wire::{MessageFramer, StartupFramer, WireError, WireResult};
use tokio::io::AsyncReadExt;

pub async fn read_startup_frame<S: AsyncReadExt + Unpin>(
    stream: &mut S,
    framer: &mut StartupFramer,
) -> WireResult<Bytes> {
    loop {
        if let Some(frame) = framer.try_parse()? {
            return Ok(frame);
        }
        let mut buf = [0u8; 8192];
        let n = stream.read(&mut buf).await.map_err(|_| WireError::Eof)?;
        if n == 0 {
            return Err(WireError::Eof);
        }
        framer.feed(&buf[..n]);
    }
}

pub async fn read_message_frame<S: AsyncReadExt + Unpin>(
    stream: &mut S,
    framer: &mut MessageFramer,
) -> WireResult<(u8, Bytes)> {
    loop {
        if let Some(msg) = framer.try_parse()? {
            return Ok(msg);
        }
        let mut buf = [0u8; 8192];
        let n = stream.read(&mut buf).await.map_err(|_| WireError::Eof)?;
        if n == 0 {
            return Err(WireError::Eof);
        }
        framer.feed(&buf[..n]);
    }
}
