//! Frame buffering for both protocol phases.
//!
//! The startup phase has no type byte: the first four bytes are the total
//! length, length included. Every later phase uses tagged frames: one type
//! byte followed by a four-byte length that excludes the type byte itself.

use bytes::{Buf, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder};

use crate::error::{WireError, WireResult};

/// Sanity cap on startup frame size (§4.1).
pub const STARTUP_MAX_LEN: u32 = 10 * 1024;

/// Accumulates bytes read from a socket and yields complete startup frames.
///
/// Returns the *whole* frame, length prefix included, so reconstruction can
/// stay byte-faithful for anything the codec doesn't explicitly rewrite.
#[derive(Debug, Default)]
pub struct StartupFramer {
    buf: BytesMut,
}

impl StartupFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to pull one complete startup frame out of the buffer.
    pub fn try_parse(&mut self) -> WireResult<Option<Bytes>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = BigEndian::read_u32(&self.buf[..4]);
        if len < 8 {
            return Err(WireError::StartupTooShort(len));
        }
        if len > STARTUP_MAX_LEN {
            return Err(WireError::StartupTooLong(len, STARTUP_MAX_LEN));
        }
        if (self.buf.len() as u32) < len {
            return Ok(None);
        }
        let frame = self.buf.split_to(len as usize).freeze();
        Ok(Some(frame))
    }
}

/// Accumulates bytes read from a socket and yields complete tagged
/// (backend or frontend) frames: `(type_byte, payload)`.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buf: BytesMut,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn try_parse(&mut self) -> WireResult<Option<(u8, Bytes)>> {
        if self.buf.len() < 5 {
            return Ok(None);
        }
        let tag = self.buf[0];
        let len = BigEndian::read_u32(&self.buf[1..5]);
        if len < 4 {
            return Err(WireError::FrameTooShort(len));
        }
        let total = 1 + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let mut frame = self.buf.split_to(total);
        frame.advance(5);
        Ok(Some((tag, frame.freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_framer_yields_nothing_on_partial_length() {
        let mut f = StartupFramer::new();
        f.feed(&[0, 0, 0]);
        assert!(f.try_parse().unwrap().is_none());
    }

    #[test]
    fn startup_framer_rejects_short_length() {
        let mut f = StartupFramer::new();
        f.feed(&[0, 0, 0, 4]);
        assert!(matches!(f.try_parse(), Err(WireError::StartupTooShort(4))));
    }

    #[test]
    fn startup_framer_rejects_oversized_length() {
        let mut f = StartupFramer::new();
        let mut bytes = vec![0u8; 4];
        BigEndian::write_u32(&mut bytes, STARTUP_MAX_LEN + 1);
        f.feed(&bytes);
        assert!(matches!(f.try_parse(), Err(WireError::StartupTooLong(_, _))));
    }

    #[test]
    fn startup_framer_yields_complete_frame() {
        let mut f = StartupFramer::new();
        let mut frame = vec![0u8; 4];
        BigEndian::write_u32(&mut frame, 12);
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        f.feed(&frame[..6]);
        assert!(f.try_parse().unwrap().is_none());
        f.feed(&frame[6..]);
        let got = f.try_parse().unwrap().unwrap();
        assert_eq!(got.as_ref(), frame.as_slice());
    }

    #[test]
    fn message_framer_splits_tag_and_payload() {
        let mut f = MessageFramer::new();
        let mut msg = vec![b'Q'];
        let mut len_bytes = [0u8; 4];
        BigEndian::write_u32(&mut len_bytes, 4 + 6);
        msg.extend_from_slice(&len_bytes);
        msg.extend_from_slice(b"hi\0end");
        f.feed(&msg);
        let (tag, payload) = f.try_parse().unwrap().unwrap();
        assert_eq!(tag, b'Q');
        assert_eq!(payload.as_ref(), b"hi\0end");
    }

    #[test]
    fn message_framer_needs_more_data() {
        let mut f = MessageFramer::new();
        f.feed(&[b'Q', 0, 0, 0]);
        assert!(f.try_parse().unwrap().is_none());
    }

    #[test]
    fn message_framer_rejects_short_length() {
        let mut f = MessageFramer::new();
        f.feed(&[b'Q', 0, 0, 0, 2]);
        assert!(matches!(f.try_parse(), Err(WireError::FrameTooShort(2))));
    }
}
