//! SCRAM-SHA-256 client side (RFC 5802), used only for pool-mode upstream
//! authentication. No channel binding is negotiated (`gs2-cbind-flag = n`) —
//! pgvpd does not terminate the upstream TLS session on the client's behalf
//! the way a channel-bound proxy would need to.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum ScramError {
    #[error("malformed server-first-message: {0}")]
    MalformedServerFirst(String),
    #[error("malformed server-final-message: {0}")]
    MalformedServerFinal(String),
    #[error("server signature mismatch")]
    ServerSignatureMismatch,
    #[error("server returned an error: {0}")]
    ServerError(String),
}

/// Client state threaded across the two SCRAM round trips.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    client_first_bare: String,
    server_first: Option<String>,
    salted_password: Option<[u8; 32]>,
    auth_message: Option<String>,
}

impl ScramClient {
    pub fn new(username: &str, password: &str) -> Self {
        let client_nonce = generate_nonce();
        let client_first_bare = format!("n={},r={}", escape_username(username), client_nonce);
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            client_first_bare,
            server_first: None,
            salted_password: None,
            auth_message: None,
        }
    }

    /// The `client-first-message` to send as the SASL initial response.
    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Consumes the server's `server-first-message` (from `SASLContinue`)
    /// and produces the `client-final-message` to send next.
    pub fn handle_server_first(&mut self, server_first: &str) -> Result<String, ScramError> {
        let fields = parse_fields(server_first);
        let server_nonce = fields
            .get("r")
            .ok_or_else(|| ScramError::MalformedServerFirst("missing r".into()))?;
        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(ScramError::MalformedServerFirst("server nonce does not extend client nonce".into()));
        }
        let salt_b64 = fields
            .get("s")
            .ok_or_else(|| ScramError::MalformedServerFirst("missing s".into()))?;
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| ScramError::MalformedServerFirst(format!("bad salt: {e}")))?;
        let iterations: u32 = fields
            .get("i")
            .ok_or_else(|| ScramError::MalformedServerFirst("missing i".into()))?
            .parse()
            .map_err(|_| ScramError::MalformedServerFirst("bad iteration count".into()))?;

        let salted_password = hi(self.password.as_bytes(), &salt, iterations);
        self.salted_password = Some(salted_password);

        let channel_binding = BASE64.encode("n,,");
        let client_final_without_proof = format!("c={channel_binding},r={server_nonce}");

        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_without_proof
        );

        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(client_key);
        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let client_proof = xor(&client_key, &client_signature);

        self.server_first = Some(server_first.to_string());
        self.auth_message = Some(auth_message.clone());

        Ok(format!(
            "{client_final_without_proof},p={}",
            BASE64.encode(client_proof)
        ))
    }

    /// Verifies the server's `server-final-message` (from `SASLFinal`).
    /// A mismatch here means the upstream is not who it claims to be.
    pub fn verify_server_final(&self, server_final: &str) -> Result<(), ScramError> {
        let fields = parse_fields(server_final);
        if let Some(err) = fields.get("e") {
            return Err(ScramError::ServerError(err.clone()));
        }
        let server_signature_b64 = fields
            .get("v")
            .ok_or_else(|| ScramError::MalformedServerFinal("missing v".into()))?;
        let expected = BASE64
            .decode(server_signature_b64)
            .map_err(|e| ScramError::MalformedServerFinal(format!("bad signature: {e}")))?;

        let salted_password = self
            .salted_password
            .ok_or_else(|| ScramError::MalformedServerFinal("no prior server-first processed".into()))?;
        let auth_message = self
            .auth_message
            .as_ref()
            .ok_or_else(|| ScramError::MalformedServerFinal("no prior server-first processed".into()))?;

        let server_key = hmac(&salted_password, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());

        if server_signature.as_slice() != expected.as_slice() {
            return Err(ScramError::ServerSignatureMismatch);
        }
        let _ = &self.username;
        Ok(())
    }
}

fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(password).expect("hmac accepts any key length");
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u = mac.finalize().into_bytes();
    let mut result = u;

    for _ in 1..iterations {
        let mut mac = HmacSha256::new_from_slice(password).expect("hmac accepts any key length");
        mac.update(&u);
        u = mac.finalize().into_bytes();
        for (r, b) in result.iter_mut().zip(u.iter()) {
            *r ^= b;
        }
    }
    result.into()
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn escape_username(username: &str) -> String {
    stringprep::saslprep(username)
        .map(|s| s.replace('=', "=3D").replace(',', "=2C"))
        .unwrap_or_else(|_| username.replace('=', "=3D").replace(',', "=2C"))
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

fn parse_fields(message: &str) -> std::collections::HashMap<String, String> {
    message
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_first_has_gs2_header_and_nonce() {
        let client = ScramClient::new("app_user", "hunter2");
        let first = client.client_first();
        assert!(first.starts_with("n,,n=app_user,r="));
    }

    #[test]
    fn full_round_trip_verifies_server_signature() {
        let mut client = ScramClient::new("app_user", "hunter2");
        let client_nonce = client.client_nonce.clone();

        let salt = BASE64.encode([1u8; 16]);
        let server_nonce = format!("{client_nonce}server-extra");
        let server_first = format!("r={server_nonce},s={salt},i=4096");

        let client_final = client.handle_server_first(&server_first).unwrap();
        assert!(client_final.contains("p="));

        let auth_message = client.auth_message.clone().unwrap();
        let salted_password = client.salted_password.unwrap();
        let server_key = hmac(&salted_password, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());
        let server_final = format!("v={}", BASE64.encode(server_signature));

        assert!(client.verify_server_final(&server_final).is_ok());
    }

    #[test]
    fn mismatched_server_signature_rejected() {
        let mut client = ScramClient::new("app_user", "hunter2");
        let client_nonce = client.client_nonce.clone();
        let salt = BASE64.encode([1u8; 16]);
        let server_first = format!("r={client_nonce}x,s={salt},i=4096");
        client.handle_server_first(&server_first).unwrap();

        let bogus = format!("v={}", BASE64.encode([0u8; 32]));
        assert!(matches!(
            client.verify_server_final(&bogus),
            Err(ScramError::ServerSignatureMismatch)
        ));
    }

    #[test]
    fn server_error_field_surfaces() {
        let mut client = ScramClient::new("app_user", "hunter2");
        let client_nonce = client.client_nonce.clone();
        let salt = BASE64.encode([1u8; 16]);
        let server_first = format!("r={client_nonce}x,s={salt},i=4096");
        client.handle_server_first(&server_first).unwrap();

        assert!(matches!(
            client.verify_server_final("e=invalid-proof"),
            Err(ScramError::ServerError(_))
        ));
    }
}
