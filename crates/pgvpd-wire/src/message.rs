//! Message tag constants, identity helpers, and builders for the messages
//! the proxy constructs itself (§4.1).

use bytes::{BufMut, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder};

use crate::error::{WireError, WireResult};

pub mod tag {
    pub const AUTHENTICATION: u8 = b'R';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const QUERY: u8 = b'Q';
    pub const TERMINATE: u8 = b'X';
    pub const PASSWORD_MESSAGE: u8 = b'p';
}

/// Decoded payload of an `AuthenticationXXX` ('R') backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMessage {
    Ok,
    KerberosV5,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Gss,
    Sasl { mechanisms: Vec<String> },
    SaslContinue { data: Bytes },
    SaslFinal { data: Bytes },
    Unknown(i32),
}

pub fn parse_auth(payload: &Bytes) -> WireResult<AuthMessage> {
    if payload.len() < 4 {
        return Err(WireError::UnexpectedMessage('R', "authentication subtype code"));
    }
    let subtype = BigEndian::read_i32(&payload[..4]);
    Ok(match subtype {
        0 => AuthMessage::Ok,
        2 => AuthMessage::KerberosV5,
        3 => AuthMessage::CleartextPassword,
        5 => {
            if payload.len() < 8 {
                return Err(WireError::UnexpectedMessage('R', "MD5 salt"));
            }
            let mut salt = [0u8; 4];
            salt.copy_from_slice(&payload[4..8]);
            AuthMessage::Md5Password { salt }
        }
        7 => AuthMessage::Gss,
        10 => {
            let mut mechanisms = Vec::new();
            let mut rest = &payload[4..];
            while !rest.is_empty() && rest[0] != 0 {
                let nul = memchr::memchr(0, rest).ok_or(WireError::MalformedParams(
                    "unterminated SASL mechanism list".into(),
                ))?;
                let name = std::str::from_utf8(&rest[..nul])
                    .map_err(|_| WireError::InvalidUtf8)?
                    .to_string();
                mechanisms.push(name);
                rest = &rest[nul + 1..];
            }
            AuthMessage::Sasl { mechanisms }
        }
        11 => AuthMessage::SaslContinue {
            data: payload.slice(4..),
        },
        12 => AuthMessage::SaslFinal {
            data: payload.slice(4..),
        },
        other => AuthMessage::Unknown(other),
    })
}

/// Wrap a payload as a full tagged frame (1-byte type + 4-byte length).
pub fn frame(type_byte: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(5 + payload.len());
    out.put_u8(type_byte);
    out.put_u32((4 + payload.len()) as u32);
    out.extend_from_slice(payload);
    out.freeze()
}

/// Build a simple-query ('Q') message.
pub fn build_query(sql: &str) -> Bytes {
    let mut body = BytesMut::with_capacity(sql.len() + 1);
    body.extend_from_slice(sql.as_bytes());
    body.put_u8(0);
    frame(tag::QUERY, &body)
}

/// Build an `ErrorResponse` ('E') from explicit field code/value pairs.
pub fn build_error_response(fields: &[(u8, &str)]) -> Bytes {
    let mut body = BytesMut::new();
    for (code, value) in fields {
        body.put_u8(*code);
        body.extend_from_slice(value.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);
    frame(tag::ERROR_RESPONSE, &body)
}

/// Build a minimal `ErrorResponse` with severity, SQLSTATE, and message,
/// optionally with a detail field (§4.1, §7).
pub fn build_error_response_simple(
    severity: &str,
    sqlstate: &str,
    message: &str,
    detail: Option<&str>,
) -> Bytes {
    let mut fields = vec![(b'S', severity), (b'V', severity), (b'C', sqlstate), (b'M', message)];
    if let Some(d) = detail {
        fields.push((b'D', d));
    }
    build_error_response(&fields)
}

/// Build a `PasswordMessage` ('p') for cleartext or MD5 password auth.
pub fn build_password_message(password: &str) -> Bytes {
    let mut body = BytesMut::with_capacity(password.len() + 1);
    body.extend_from_slice(password.as_bytes());
    body.put_u8(0);
    frame(tag::PASSWORD_MESSAGE, &body)
}

/// MD5 auth: `"md5" + md5(md5(password + user) + salt)` hex-encoded.
pub fn md5_password_response(user: &str, password: &str, salt: [u8; 4]) -> String {
    use md5::{Digest, Md5};
    let mut inner = Md5::new();
    inner.update(password.as_bytes());
    inner.update(user.as_bytes());
    let inner_hex = hex::encode(inner.finalize());

    let mut outer = Md5::new();
    outer.update(inner_hex.as_bytes());
    outer.update(salt);
    format!("md5{}", hex::encode(outer.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_frame_has_trailing_nul() {
        let built = build_query("SELECT 1");
        assert_eq!(built[0], tag::QUERY);
        assert_eq!(*built.last().unwrap(), 0);
    }

    #[test]
    fn error_response_contains_all_fields() {
        let built = build_error_response_simple("FATAL", "28000", "bad user", Some("detail"));
        let s = String::from_utf8_lossy(&built);
        assert!(s.contains("FATAL"));
        assert!(s.contains("28000"));
        assert!(s.contains("bad user"));
        assert!(s.contains("detail"));
    }

    #[test]
    fn parses_authentication_ok() {
        let payload = Bytes::from_static(&[0, 0, 0, 0]);
        assert_eq!(parse_auth(&payload).unwrap(), AuthMessage::Ok);
    }

    #[test]
    fn parses_md5_salt() {
        let mut payload = vec![0, 0, 0, 5];
        payload.extend_from_slice(&[1, 2, 3, 4]);
        match parse_auth(&Bytes::from(payload)).unwrap() {
            AuthMessage::Md5Password { salt } => assert_eq!(salt, [1, 2, 3, 4]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_sasl_mechanism_list() {
        let mut payload = vec![0, 0, 0, 10];
        payload.extend_from_slice(b"SCRAM-SHA-256\0");
        payload.push(0);
        match parse_auth(&Bytes::from(payload)).unwrap() {
            AuthMessage::Sasl { mechanisms } => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn md5_response_is_deterministic() {
        let a = md5_password_response("app_user", "secret", [1, 2, 3, 4]);
        let b = md5_password_response("app_user", "secret", [1, 2, 3, 4]);
        assert_eq!(a, b);
        assert!(a.starts_with("md5"));
        assert_eq!(a.len(), 3 + 32);
    }
}
