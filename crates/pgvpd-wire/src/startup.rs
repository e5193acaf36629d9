//! Startup/SSL/cancel/GSS request parsing and startup reconstruction.

use bytes::{BufMut, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder};
use memchr::memchr;

use crate::error::{WireError, WireResult};

pub const PROTOCOL_VERSION_3_0: i32 = 196_608;
pub const SSL_REQUEST_CODE: i32 = 80_877_103;
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;
pub const GSSENC_REQUEST_CODE: i32 = 80_877_104;

/// An ordered parameter list — order matters for faithful reconstruction.
pub type ParamList = Vec<(String, String)>;

#[derive(Debug, Clone)]
pub enum StartupRequest {
    Ssl,
    Gssenc,
    Cancel { process_id: i32, secret_key: i32 },
    Startup { version: i32, params: ParamList },
}

/// Look up a parameter by name, first match wins.
pub fn param_get<'a>(params: &'a ParamList, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Replace (or, if absent, do nothing to — callers must not rely on insert)
/// the value for `name`, preserving position.
pub fn param_set(params: &mut ParamList, name: &str, value: String) {
    if let Some(entry) = params.iter_mut().find(|(k, _)| k == name) {
        entry.1 = value;
    } else {
        params.push((name.to_string(), value));
    }
}

/// Parse a complete startup-phase frame (length prefix included).
pub fn parse_startup(frame: &[u8]) -> WireResult<StartupRequest> {
    debug_assert!(frame.len() >= 8);
    let code = BigEndian::read_i32(&frame[4..8]);
    match code {
        SSL_REQUEST_CODE => Ok(StartupRequest::Ssl),
        GSSENC_REQUEST_CODE => Ok(StartupRequest::Gssenc),
        CANCEL_REQUEST_CODE => {
            if frame.len() < 16 {
                return Err(WireError::MalformedParams(
                    "cancel request too short".into(),
                ));
            }
            Ok(StartupRequest::Cancel {
                process_id: BigEndian::read_i32(&frame[8..12]),
                secret_key: BigEndian::read_i32(&frame[12..16]),
            })
        }
        version => {
            let params = parse_params(&frame[8..])?;
            Ok(StartupRequest::Startup { version, params })
        }
    }
}

fn parse_params(mut rest: &[u8]) -> WireResult<ParamList> {
    let mut params = Vec::new();
    loop {
        if rest.is_empty() {
            return Err(WireError::MalformedParams(
                "missing terminating null byte".into(),
            ));
        }
        if rest[0] == 0 {
            return Ok(params);
        }
        let (key, after_key) = read_cstr(rest)?;
        let (value, after_value) = read_cstr(after_key)?;
        params.push((key, value));
        rest = after_value;
    }
}

fn read_cstr(buf: &[u8]) -> WireResult<(String, &[u8])> {
    let nul = memchr(0, buf).ok_or(WireError::MalformedParams(
        "unterminated parameter string".into(),
    ))?;
    let s = std::str::from_utf8(&buf[..nul]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s.to_string(), &buf[nul + 1..]))
}

/// Rebuild a startup frame with the given version and parameter list, in
/// the order given. `user` is the only parameter the proxy ever rewrites,
/// but this function is oblivious to that — it just serializes whatever
/// it's given.
pub fn build_startup(version: i32, params: &ParamList) -> Bytes {
    let mut body = BytesMut::new();
    body.put_i32(version);
    for (k, v) in params {
        body.put_slice(k.as_bytes());
        body.put_u8(0);
        body.put_slice(v.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);

    let total_len = 4 + body.len();
    let mut out = BytesMut::with_capacity(total_len);
    out.put_u32(total_len as u32);
    out.extend_from_slice(&body);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> ParamList {
        vec![
            ("user".into(), "app_user".into()),
            ("database".into(), "db".into()),
            ("application_name".into(), "psql".into()),
        ]
    }

    #[test]
    fn round_trip_startup_is_exact() {
        let built = build_startup(PROTOCOL_VERSION_3_0, &sample_params());
        let parsed = parse_startup(&built).unwrap();
        match parsed {
            StartupRequest::Startup { version, params } => {
                assert_eq!(version, PROTOCOL_VERSION_3_0);
                assert_eq!(params, sample_params());
            }
            _ => panic!("expected Startup variant"),
        }
    }

    #[test]
    fn rewriting_user_preserves_other_params_and_order() {
        let mut params = sample_params();
        param_set(&mut params, "user", "app_user_login".into());
        let built = build_startup(PROTOCOL_VERSION_3_0, &params);
        let parsed = parse_startup(&built).unwrap();
        match parsed {
            StartupRequest::Startup { params, .. } => {
                assert_eq!(param_get(&params, "user"), Some("app_user_login"));
                assert_eq!(param_get(&params, "database"), Some("db"));
                assert_eq!(params[0].0, "user");
                assert_eq!(params[1].0, "database");
            }
            _ => panic!("expected Startup variant"),
        }
    }

    #[test]
    fn recognizes_ssl_request() {
        let mut frame = vec![0u8; 4];
        BigEndian::write_u32(&mut frame, 8);
        let mut code = [0u8; 4];
        BigEndian::write_i32(&mut code, SSL_REQUEST_CODE);
        frame.extend_from_slice(&code);
        assert!(matches!(parse_startup(&frame).unwrap(), StartupRequest::Ssl));
    }

    #[test]
    fn recognizes_cancel_request() {
        let mut frame = vec![0u8; 4];
        BigEndian::write_u32(&mut frame, 16);
        let mut code = [0u8; 4];
        BigEndian::write_i32(&mut code, CANCEL_REQUEST_CODE);
        frame.extend_from_slice(&code);
        frame.extend_from_slice(&42i32.to_be_bytes());
        frame.extend_from_slice(&99i32.to_be_bytes());
        match parse_startup(&frame).unwrap() {
            StartupRequest::Cancel { process_id, secret_key } => {
                assert_eq!(process_id, 42);
                assert_eq!(secret_key, 99);
            }
            _ => panic!("expected Cancel variant"),
        }
    }

    #[test]
    fn unterminated_params_is_malformed() {
        let mut frame = vec![0u8; 4];
        let mut code = [0u8; 4];
        BigEndian::write_i32(&mut code, PROTOCOL_VERSION_3_0);
        frame.extend_from_slice(&code);
        frame.extend_from_slice(b"user\0app");
        BigEndian::write_u32(&mut frame[0..4], frame.len() as u32);
        assert!(matches!(
            parse_startup(&frame),
            Err(WireError::MalformedParams(_))
        ));
    }
}
