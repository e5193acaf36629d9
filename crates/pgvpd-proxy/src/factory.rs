//! Upstream connection factory: full startup + authentication, capturing
//! `ParameterStatus`/`BackendKeyData` for replay (§4.5 "Synthesized client
//! handshake"). Only used in pool mode — passthrough mode never goes
//! through a `ConnectionFactory`, it relays the client's own handshake.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use pgvpd_pool::{ConnMeta, ConnectFuture, ConnectionFactory, PoolError, PoolKey, PoolResult};
use pgvpd_wire::startup::{build_startup, PROTOCOL_VERSION_3_0};
use pgvpd_wire::{message, tag, AuthMessage, MessageFramer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::auth::scram::ScramClient;
use crate::framed_io::read_message_frame;
use crate::stream::UpstreamTransport;
use crate::tls::UpstreamTls;

pub struct UpstreamConn {
    pub transport: UpstreamTransport,
    pub framer: MessageFramer,
}

pub struct PgConnectionFactory {
    pub upstream_host: String,
    pub upstream_port: u16,
    pub upstream_tls: Option<UpstreamTls>,
    pub upstream_password: Option<String>,
    pub handshake_timeout: Duration,
}

impl ConnectionFactory<UpstreamConn> for PgConnectionFactory {
    fn connect<'a>(&'a self, key: &'a PoolKey) -> ConnectFuture<'a, UpstreamConn> {
        Box::pin(async move {
            timeout(self.handshake_timeout, self.connect_inner(key))
                .await
                .map_err(|_| PoolError::Connect("handshake timed out".into()))?
        })
    }
}

impl PgConnectionFactory {
    async fn connect_inner(&self, key: &PoolKey) -> PoolResult<(UpstreamConn, ConnMeta)> {
        let tcp = TcpStream::connect((self.upstream_host.as_str(), self.upstream_port))
            .await
            .map_err(|e| PoolError::Connect(format!("tcp connect: {e}")))?;

        let mut transport = if let Some(tls) = &self.upstream_tls {
            upgrade_to_tls(tcp, tls).await?
        } else {
            UpstreamTransport::Plain(tcp)
        };

        let params = vec![
            ("user".to_string(), key.effective_role.clone()),
            ("database".to_string(), key.database.clone()),
        ];
        let startup = build_startup(PROTOCOL_VERSION_3_0, &params);
        write_all(&mut transport, &startup).await?;

        let mut framer = MessageFramer::new();
        self.authenticate(&mut transport, &mut framer, &key.effective_role).await?;

        let (backend_key_data, parameter_status) =
            drain_post_auth(&mut transport, &mut framer).await?;

        Ok((
            UpstreamConn { transport, framer },
            ConnMeta {
                backend_key_data,
                parameter_status,
                last_used: Instant::now(),
            },
        ))
    }

    async fn authenticate(
        &self,
        transport: &mut UpstreamTransport,
        framer: &mut MessageFramer,
        effective_role: &str,
    ) -> PoolResult<()> {
        loop {
            let (msg_tag, payload) = read_message_frame(transport, framer)
                .await
                .map_err(|e| PoolError::Connect(format!("reading auth frame: {e}")))?;
            match msg_tag {
                t if t == tag::AUTHENTICATION => {
                    let auth = message::parse_auth(&payload)
                        .map_err(|e| PoolError::Connect(format!("parsing auth: {e}")))?;
                    match auth {
                        AuthMessage::Ok => return Ok(()),
                        AuthMessage::CleartextPassword => {
                            let password = self.password()?;
                            let msg = message::build_password_message(password);
                            write_all(transport, &msg).await?;
                        }
                        AuthMessage::Md5Password { salt } => {
                            let password = self.password()?;
                            let response =
                                message::md5_password_response(effective_role, password, salt);
                            let msg = message::build_password_message(&response);
                            write_all(transport, &msg).await?;
                        }
                        AuthMessage::Sasl { mechanisms } => {
                            if !mechanisms.iter().any(|m| m == "SCRAM-SHA-256") {
                                return Err(PoolError::Connect(
                                    "server does not offer SCRAM-SHA-256".into(),
                                ));
                            }
                            self.scram_exchange(transport, framer, effective_role).await?;
                            return Ok(());
                        }
                        other => {
                            return Err(PoolError::Connect(format!(
                                "unsupported authentication method: {other:?}"
                            )))
                        }
                    }
                }
                t if t == tag::ERROR_RESPONSE => {
                    return Err(PoolError::Connect(format!(
                        "upstream rejected authentication: {}",
                        String::from_utf8_lossy(&payload)
                    )))
                }
                other => {
                    return Err(PoolError::Connect(format!(
                        "unexpected message '{}' during authentication",
                        other as char
                    )))
                }
            }
        }
    }

    async fn scram_exchange(
        &self,
        transport: &mut UpstreamTransport,
        framer: &mut MessageFramer,
        effective_role: &str,
    ) -> PoolResult<()> {
        let password = self.password()?;
        let mut client = ScramClient::new(effective_role, password);

        let initial = client.client_first();
        let msg = sasl_initial_response("SCRAM-SHA-256", initial.as_bytes());
        write_all(transport, &msg).await?;

        let (msg_tag, payload) = read_message_frame(transport, framer)
            .await
            .map_err(|e| PoolError::Connect(format!("reading SASLContinue: {e}")))?;
        if msg_tag != tag::AUTHENTICATION {
            return Err(PoolError::Connect("expected SASLContinue".into()));
        }
        let continue_msg = message::parse_auth(&payload)
            .map_err(|e| PoolError::Connect(format!("parsing SASLContinue: {e}")))?;
        let server_first = match continue_msg {
            AuthMessage::SaslContinue { data } => String::from_utf8(data.to_vec())
                .map_err(|_| PoolError::Connect("non-utf8 SASLContinue".into()))?,
            other => return Err(PoolError::Connect(format!("expected SASLContinue, got {other:?}"))),
        };

        let client_final = client
            .handle_server_first(&server_first)
            .map_err(|e| PoolError::Connect(format!("scram: {e}")))?;
        let msg = sasl_response(client_final.as_bytes());
        write_all(transport, &msg).await?;

        // Tolerate either ordering: a SASLFinal followed by AuthenticationOk
        // as two frames, or (per some server implementations) coalesced.
        let (msg_tag, payload) = read_message_frame(transport, framer)
            .await
            .map_err(|e| PoolError::Connect(format!("reading SASLFinal: {e}")))?;
        if msg_tag != tag::AUTHENTICATION {
            return Err(PoolError::Connect("expected SASLFinal".into()));
        }
        let final_msg = message::parse_auth(&payload)
            .map_err(|e| PoolError::Connect(format!("parsing SASLFinal: {e}")))?;
        match final_msg {
            AuthMessage::SaslFinal { data } => {
                let server_final = String::from_utf8(data.to_vec())
                    .map_err(|_| PoolError::Connect("non-utf8 SASLFinal".into()))?;
                client
                    .verify_server_final(&server_final)
                    .map_err(|e| PoolError::Connect(format!("scram: {e}")))?;

                let (msg_tag, payload) = read_message_frame(transport, framer)
                    .await
                    .map_err(|e| PoolError::Connect(format!("reading AuthenticationOk: {e}")))?;
                if msg_tag != tag::AUTHENTICATION {
                    return Err(PoolError::Connect("expected AuthenticationOk".into()));
                }
                match message::parse_auth(&payload) {
                    Ok(AuthMessage::Ok) => Ok(()),
                    other => Err(PoolError::Connect(format!("expected AuthenticationOk, got {other:?}"))),
                }
            }
            AuthMessage::Ok => Ok(()),
            other => Err(PoolError::Connect(format!("expected SASLFinal, got {other:?}"))),
        }
    }

    fn password(&self) -> PoolResult<&str> {
        self.upstream_password
            .as_deref()
            .ok_or_else(|| PoolError::Connect("upstream_password not configured".into()))
    }
}

async fn upgrade_to_tls(tcp: TcpStream, tls: &UpstreamTls) -> PoolResult<UpstreamTransport> {
    let mut tcp = tcp;
    let ssl_request = {
        let mut body = BytesMut::new();
        body.extend_from_slice(&8i32.to_be_bytes());
        body.extend_from_slice(&pgvpd_wire::startup::SSL_REQUEST_CODE.to_be_bytes());
        body.freeze()
    };
    tcp.write_all(&ssl_request)
        .await
        .map_err(|e| PoolError::Connect(format!("sending SSLRequest: {e}")))?;

    let mut reply = [0u8; 1];
    tokio::io::AsyncReadExt::read_exact(&mut tcp, &mut reply)
        .await
        .map_err(|e| PoolError::Connect(format!("reading SSLRequest reply: {e}")))?;
    if reply[0] != b'S' {
        return Err(PoolError::Connect("upstream refused TLS".into()));
    }

    let stream = tls
        .connector
        .connect(tls.server_name.clone(), tcp)
        .await
        .map_err(|e| PoolError::Connect(format!("tls handshake: {e}")))?;
    Ok(UpstreamTransport::Tls(Box::new(stream)))
}

async fn write_all(transport: &mut UpstreamTransport, data: &[u8]) -> PoolResult<()> {
    AsyncWriteExt::write_all(transport, data)
        .await
        .map_err(|e| PoolError::Connect(format!("write: {e}")))
}

fn sasl_initial_response(mechanism: &str, initial: &[u8]) -> Bytes {
    let mut body = BytesMut::new();
    body.extend_from_slice(mechanism.as_bytes());
    body.extend_from_slice(&[0]);
    body.extend_from_slice(&(initial.len() as i32).to_be_bytes());
    body.extend_from_slice(initial);
    message::frame(tag::PASSWORD_MESSAGE, &body)
}

fn sasl_response(data: &[u8]) -> Bytes {
    message::frame(tag::PASSWORD_MESSAGE, data)
}

/// Consumes `ParameterStatus`/`BackendKeyData`/`NoticeResponse` frames
/// after `AuthenticationOk`, stopping at the first `ReadyForQuery`.
async fn drain_post_auth(
    transport: &mut UpstreamTransport,
    framer: &mut MessageFramer,
) -> PoolResult<(Bytes, Vec<Bytes>)> {
    let mut backend_key_data = Bytes::new();
    let mut parameter_status = Vec::new();

    loop {
        let (msg_tag, payload) = read_message_frame(transport, framer)
            .await
            .map_err(|e| PoolError::Connect(format!("reading post-auth frame: {e}")))?;
        match msg_tag {
            t if t == tag::PARAMETER_STATUS => {
                parameter_status.push(message::frame(tag::PARAMETER_STATUS, &payload));
            }
            t if t == tag::BACKEND_KEY_DATA => {
                backend_key_data = message::frame(tag::BACKEND_KEY_DATA, &payload);
            }
            t if t == tag::NOTICE_RESPONSE => {}
            t if t == tag::READY_FOR_QUERY => {
                return Ok((backend_key_data, parameter_status));
            }
            t if t == tag::ERROR_RESPONSE => {
                return Err(PoolError::Connect(format!(
                    "server error after auth: {}",
                    String::from_utf8_lossy(&payload)
                )))
            }
            other => {
                return Err(PoolError::Connect(format!(
                    "unexpected post-auth message '{}'",
                    other as char
                )))
            }
        }
    }
}
