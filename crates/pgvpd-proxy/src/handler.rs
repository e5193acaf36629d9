//! The per-connection state machine (§4.3). One handler task owns one
//! client stream and at most one upstream stream; transitions are
//! straight-line control flow, not a dispatched enum, per §9 ("a faithful
//! port should use a tagged variant... side-channel state lives on the
//! handler struct") — here the side-channel state is simply the local
//! variables threaded through `run`, since Rust's ownership model makes a
//! literal state-object handoff unnecessary for a single-task handler.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pgvpd_config::{Config, PoolMode};
use pgvpd_metrics::Metrics;
use pgvpd_pool::{Checkout, PoolKey, PoolManager};
use pgvpd_resolver::ResolverEngine;
use pgvpd_tenant::TenantRegistry;
use pgvpd_wire::startup::{build_startup, param_get, param_set, ParamList, StartupRequest};
use pgvpd_wire::{escape, message, parse_startup, tag, AuthMessage, MessageFramer, StartupFramer, WireError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::HandlerError;
use crate::factory::UpstreamConn;
use crate::framed_io::{read_message_frame, read_startup_frame};
use crate::identity::{is_bypass, parse_identity, Identity};
use crate::stream::{ClientTransport, UpstreamTransport};
use crate::tls::UpstreamTls;

/// Shared, read-only (or internally-synchronized) state every handler task
/// needs. One instance is built at startup and cloned (cheap, `Arc`) into
/// every spawned connection task.
pub struct Shared {
    pub config: Arc<Config>,
    pub tenant: Arc<TenantRegistry>,
    pub resolver: Arc<ResolverEngine>,
    pub pool: Option<Arc<PoolManager<UpstreamConn>>>,
    pub metrics: Arc<Metrics>,
    pub upstream_tls: Option<UpstreamTls>,
}

static NEXT_BACKEND_PID: AtomicI32 = AtomicI32::new(1);

pub async fn handle(mut client: ClientTransport, shared: Arc<Shared>) {
    shared.metrics.connection_opened();
    if let Err(err) = run(&mut client, &shared).await {
        if let Some((sqlstate, msg)) = err.client_facing() {
            let frame = message::build_error_response_simple("FATAL", sqlstate, &msg, None);
            let _ = client.write_all(&frame).await;
        }
        tracing::warn!(error = %err, "connection handler exited with error");
    }
    shared.metrics.connection_closed();
}

async fn run(client: &mut ClientTransport, shared: &Shared) -> Result<(), HandlerError> {
    let mut client_framer = StartupFramer::new();
    let params = timeout(
        shared.config.handshake_timeout,
        wait_for_startup(client, &mut client_framer),
    )
    .await
    .map_err(|_| HandlerError::HandshakeTimeout)??;

    let raw_user = param_get(&params, "user")
        .ok_or(HandlerError::NoValidUser)?
        .to_string();
    let database = param_get(&params, "database")
        .unwrap_or(&raw_user)
        .to_string();

    if is_bypass(&raw_user, &shared.config.superuser_bypass) {
        return bypass_connect(client, &params, shared).await;
    }

    let identity = parse_identity(
        &raw_user,
        shared.config.tenant_separator,
        shared.config.value_separator,
        &shared.config.context_variables,
    )
    .map_err(|e| HandlerError::MalformedIdentity(e.to_string()))?;

    let tenant_key = identity
        .context
        .first()
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| identity.effective_role.clone());
    let _guard = shared
        .tenant
        .admit(&tenant_key, Instant::now())
        .map_err(HandlerError::TenantRejected)?;

    match shared.config.pool_mode {
        PoolMode::None => tenant_connect_passthrough(client, &params, &database, &identity, shared).await,
        PoolMode::Session => tenant_connect_pooled(client, &database, &identity, shared).await,
    }
}

/// `WAIT_STARTUP`: classify SSL/GSS/Cancel/Startup, answering SSL/GSS with
/// a single 'N' and staying in this state, per §4.2.
async fn wait_for_startup(
    client: &mut ClientTransport,
    framer: &mut StartupFramer,
) -> Result<ParamList, HandlerError> {
    loop {
        let frame = read_startup_frame(client, framer).await?;
        match parse_startup(&frame)? {
            StartupRequest::Ssl | StartupRequest::Gssenc => {
                client.write_all(b"N").await.map_err(|_| HandlerError::TransportClosed)?;
            }
            StartupRequest::Cancel { .. } => return Err(HandlerError::TransportClosed),
            StartupRequest::Startup { params, .. } => return Ok(params),
        }
    }
}

/// `BYPASS_CONNECT`: open upstream, forward the original startup verbatim,
/// splice byte-streams to EOF. Never pooled, never context-injected.
async fn bypass_connect(
    client: &mut ClientTransport,
    params: &ParamList,
    shared: &Shared,
) -> Result<(), HandlerError> {
    let mut upstream = timeout(shared.config.handshake_timeout, async {
        let mut upstream = connect_upstream(shared).await?;
        let startup = build_startup(pgvpd_wire::startup::PROTOCOL_VERSION_3_0, params);
        upstream
            .write_all(&startup)
            .await
            .map_err(|_| HandlerError::TransportClosed)?;
        Ok::<_, HandlerError>(upstream)
    })
    .await
    .map_err(|_| HandlerError::HandshakeTimeout)??;

    tokio::io::copy_bidirectional(client, &mut upstream)
        .await
        .map_err(|_| HandlerError::TransportClosed)?;
    Ok(())
}

async fn connect_upstream(shared: &Shared) -> Result<UpstreamTransport, HandlerError> {
    let tcp = tokio::net::TcpStream::connect((
        shared.config.upstream_host.as_str(),
        shared.config.upstream_port,
    ))
    .await
    .map_err(|_| HandlerError::TransportClosed)?;

    if let Some(tls) = &shared.upstream_tls {
        let mut tcp = tcp;
        let ssl_request = {
            let mut body = bytes::BytesMut::new();
            body.extend_from_slice(&8i32.to_be_bytes());
            body.extend_from_slice(&pgvpd_wire::startup::SSL_REQUEST_CODE.to_be_bytes());
            body.freeze()
        };
        tcp.write_all(&ssl_request).await.map_err(|_| HandlerError::TransportClosed)?;
        let mut reply = [0u8; 1];
        tcp.read_exact(&mut reply).await.map_err(|_| HandlerError::TransportClosed)?;
        if reply[0] != b'S' {
            return Err(HandlerError::TransportClosed);
        }
        let tls_stream = tls
            .connector
            .connect(tls.server_name.clone(), tcp)
            .await
            .map_err(|_| HandlerError::TransportClosed)?;
        Ok(UpstreamTransport::Tls(Box::new(tls_stream)))
    } else {
        Ok(UpstreamTransport::Plain(tcp))
    }
}

/// `TENANT_CONNECT` → `UPSTREAM_AUTH` (passthrough): open a direct
/// upstream, rewrite `user`, relay the auth exchange byte-for-byte.
async fn tenant_connect_passthrough(
    client: &mut ClientTransport,
    params: &ParamList,
    database: &str,
    identity: &Identity,
    shared: &Shared,
) -> Result<(), HandlerError> {
    let _ = database;
    let mut upstream = timeout(
        shared.config.handshake_timeout,
        passthrough_handshake(client, params, identity, shared),
    )
    .await
    .map_err(|_| HandlerError::HandshakeTimeout)??;

    copy_bidirectional_with_idle(client, &mut upstream, shared.config.tenant_query_timeout).await?;
    Ok(())
}

/// Everything between accept and `TRANSPARENT` — connect, auth relay,
/// resolving, injection, and the synthesized client handshake reply. Bounded
/// as one unit by `handshake_timeout` (§5); the pipe that follows is not.
async fn passthrough_handshake(
    client: &mut ClientTransport,
    params: &ParamList,
    identity: &Identity,
    shared: &Shared,
) -> Result<UpstreamTransport, HandlerError> {
    let mut upstream = connect_upstream(shared).await?;

    let mut rewritten = params.clone();
    param_set(&mut rewritten, "user", identity.effective_role.clone());
    let startup = build_startup(pgvpd_wire::startup::PROTOCOL_VERSION_3_0, &rewritten);
    upstream
        .write_all(&startup)
        .await
        .map_err(|_| HandlerError::TransportClosed)?;

    let mut upstream_framer = MessageFramer::new();
    relay_auth(client, &mut upstream, &mut upstream_framer).await?;

    let (backend_key_data, parameter_status, buffered_rfq) =
        drain_post_auth(&mut upstream, &mut upstream_framer).await?;

    let effective_role = shared
        .config
        .set_role
        .clone()
        .unwrap_or_else(|| identity.effective_role.clone());
    resolve_and_inject(client, &mut upstream, &mut upstream_framer, shared, identity, &effective_role).await?;

    client
        .write_all(&backend_key_data)
        .await
        .map_err(|_| HandlerError::TransportClosed)?;
    for ps in &parameter_status {
        client.write_all(ps).await.map_err(|_| HandlerError::TransportClosed)?;
    }
    client
        .write_all(&buffered_rfq)
        .await
        .map_err(|_| HandlerError::TransportClosed)?;

    Ok(upstream)
}

/// Relays raw auth frames bidirectionally until the server answers
/// `AuthenticationOk` or `ErrorResponse` (§4.3 `UPSTREAM_AUTH`, passthrough
/// mode). The client drives the exchange; pgvpd never inspects the
/// password it forwards.
async fn relay_auth(
    client: &mut ClientTransport,
    upstream: &mut UpstreamTransport,
    upstream_framer: &mut MessageFramer,
) -> Result<(), HandlerError> {
    let mut client_framer = MessageFramer::new();
    loop {
        let (msg_tag, payload) = read_message_frame(upstream, upstream_framer).await?;
        match msg_tag {
            t if t == tag::AUTHENTICATION => {
                let auth = message::parse_auth(&payload)?;
                let frame = message::frame(tag::AUTHENTICATION, &payload);
                client.write_all(&frame).await.map_err(|_| HandlerError::TransportClosed)?;
                match auth {
                    AuthMessage::Ok => return Ok(()),
                    // Server verifies SASLFinal itself and sends AuthenticationOk next,
                    // no client reply in between; reading here would deadlock.
                    AuthMessage::SaslFinal { .. } => {}
                    _ => {
                        let (client_tag, client_payload) = read_message_frame(client, &mut client_framer).await?;
                        let reply = message::frame(client_tag, &client_payload);
                        upstream.write_all(&reply).await.map_err(|_| HandlerError::TransportClosed)?;
                    }
                }
            }
            t if t == tag::ERROR_RESPONSE => {
                let frame = message::frame(tag::ERROR_RESPONSE, &payload);
                let _ = client.write_all(&frame).await;
                return Err(HandlerError::TransportClosed);
            }
            other => {
                let frame = message::frame(other, &payload);
                client.write_all(&frame).await.map_err(|_| HandlerError::TransportClosed)?;
            }
        }
    }
}

/// `POST_AUTH`: forward `ParameterStatus`/`BackendKeyData`/`NoticeResponse`
/// as they arrive but buffer (don't forward) the first `ReadyForQuery`.
async fn drain_post_auth<S>(
    upstream: &mut S,
    framer: &mut MessageFramer,
) -> Result<(Bytes, Vec<Bytes>, Bytes), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut backend_key_data = Bytes::new();
    let mut parameter_status = Vec::new();
    loop {
        let (msg_tag, payload) = read_message_frame(upstream, framer).await?;
        match msg_tag {
            t if t == tag::PARAMETER_STATUS => {
                parameter_status.push(message::frame(tag::PARAMETER_STATUS, &payload));
            }
            t if t == tag::BACKEND_KEY_DATA => {
                backend_key_data = message::frame(tag::BACKEND_KEY_DATA, &payload);
            }
            t if t == tag::NOTICE_RESPONSE => {}
            t if t == tag::READY_FOR_QUERY => {
                let rfq = message::frame(tag::READY_FOR_QUERY, &payload);
                return Ok((backend_key_data, parameter_status, rfq));
            }
            t if t == tag::ERROR_RESPONSE => return Err(HandlerError::TransportClosed),
            _ => {}
        }
    }
}

/// `RESOLVING` + `INJECTING`: run every configured resolver in topological
/// order on `upstream`, then emit the single SET-batch query (§4.4, §4.1
/// "Injection wire format").
async fn resolve_and_inject<S>(
    client: &mut ClientTransport,
    upstream: &mut S,
    framer: &mut MessageFramer,
    shared: &Shared,
    identity: &Identity,
    effective_role: &str,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session: std::collections::HashMap<String, String> = identity.context.iter().cloned().collect();
    let mut extra_injections: Vec<(String, String)> = Vec::new();

    for def in shared.resolver.ordered() {
        let bound_params: Vec<String> = def
            .params
            .iter()
            .map(|name| session.get(name).cloned().unwrap_or_default())
            .collect();

        let now = Instant::now();
        let cached = if def.cacheable() {
            shared.resolver.cache().get(&def.name, &bound_params, now)
        } else {
            None
        };

        let row = if let Some(row) = cached {
            row
        } else {
            let sql = substitute_params(&def.sql, &bound_params)
                .map_err(|_| HandlerError::ResolverRequired(def.name.clone()))?;
            let rows = run_simple_query(client, upstream, framer, &sql).await?;

            if rows.is_empty() {
                if def.required {
                    shared.resolver.metrics.record_error(&def.name);
                    return Err(HandlerError::ResolverRequired(def.name.clone()));
                }
                continue;
            }
            if rows.len() > 1 && def.unique {
                shared.resolver.metrics.record_error(&def.name);
                return Err(HandlerError::ResolverRequired(def.name.clone()));
            }
            shared.resolver.metrics.record_execution(&def.name);
            let row = rows.into_iter().next().unwrap();
            if def.cacheable() {
                let ttl = Duration::from_secs(def.cache_ttl_secs.unwrap_or(0));
                shared.resolver.cache().put(&def.name, bound_params, row.clone(), ttl, now);
            }
            row
        };

        for (column, var) in &def.injects {
            if let Some(value) = row.get(column) {
                session.insert(var.clone(), value.clone());
                extra_injections.push((var.clone(), value.clone()));
            }
        }
    }

    let injection_sql = build_injection_sql(&identity.context, &extra_injections, effective_role)
        .map_err(|_| HandlerError::InjectionFailed)?;
    run_injection_batch(Some(client), upstream, framer, &injection_sql).await
}

fn substitute_params(sql: &str, params: &[String]) -> Result<String, WireError> {
    let mut out = sql.to_string();
    for (i, value) in params.iter().enumerate() {
        let placeholder = format!("${}", i + 1);
        let escaped = escape::escape_literal(value)?;
        out = out.replace(&placeholder, &escaped);
    }
    Ok(out)
}

fn build_injection_sql(
    context: &[(String, String)],
    extra: &[(String, String)],
    effective_role: &str,
) -> Result<String, WireError> {
    let mut stmts = Vec::new();
    for (var, value) in context.iter().chain(extra.iter()) {
        let var_ident = quote_variable(var)?;
        let literal = escape::escape_literal(value)?;
        stmts.push(format!("SET {var_ident} = {literal}"));
    }
    let role_ident = escape::escape_identifier(effective_role)?;
    stmts.push(format!("SET ROLE {role_ident}"));
    Ok(format!("{};", stmts.join("; ")))
}

/// Variables containing a dot must still pass the identifier charset —
/// only the quoting form differs (`"x.y"` vs bare), per §6 "Injection wire
/// format".
fn quote_variable(name: &str) -> Result<String, WireError> {
    if name.contains('.') {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(WireError::UnsafeIdentifier(name.to_string()));
        }
        Ok(format!("\"{name}\""))
    } else {
        escape::escape_identifier(name)
    }
}

/// Runs a single simple-query that is expected to return at most one
/// `RowDescription`/`DataRow` set, consuming through `ReadyForQuery`. A
/// server `ErrorResponse` is forwarded to the client verbatim before the
/// connection closes (§4.4, §7).
async fn run_simple_query<S>(
    client: &mut ClientTransport,
    upstream: &mut S,
    framer: &mut MessageFramer,
    sql: &str,
) -> Result<Vec<std::collections::HashMap<String, String>>, HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let query = message::build_query(sql);
    upstream.write_all(&query).await.map_err(|_| HandlerError::TransportClosed)?;

    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    loop {
        let (msg_tag, payload) = read_message_frame(upstream, framer).await?;
        match msg_tag {
            t if t == tag::ROW_DESCRIPTION => columns = parse_row_description(&payload),
            t if t == tag::DATA_ROW => rows.push(parse_data_row(&columns, &payload)),
            t if t == tag::COMMAND_COMPLETE => {}
            t if t == tag::READY_FOR_QUERY => return Ok(rows),
            t if t == tag::ERROR_RESPONSE => {
                let frame = message::frame(tag::ERROR_RESPONSE, &payload);
                let _ = client.write_all(&frame).await;
                return Err(HandlerError::TransportClosed);
            }
            _ => {}
        }
    }
}

/// Runs the injection SET-batch, consuming frames until exactly one
/// `ReadyForQuery`. `ParameterStatus`/`NoticeResponse` are forwarded to the
/// client as they arrive so its view of server parameters stays current; an
/// `ErrorResponse` is forwarded verbatim and ends the connection (§4.3
/// `INJECTING`). `client` is `None` for the post-pipe `CLEANUP` batches
/// (`ROLLBACK;`/`DISCARD ALL;`), which the client never sees.
async fn run_injection_batch<S>(
    client: Option<&mut ClientTransport>,
    upstream: &mut S,
    framer: &mut MessageFramer,
    sql: &str,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let query = message::build_query(sql);
    upstream.write_all(&query).await.map_err(|_| HandlerError::TransportClosed)?;

    let mut client = client;
    loop {
        let (msg_tag, payload) = read_message_frame(upstream, framer).await?;
        match msg_tag {
            t if t == tag::READY_FOR_QUERY => return Ok(()),
            t if t == tag::PARAMETER_STATUS || t == tag::NOTICE_RESPONSE => {
                if let Some(client) = client.as_deref_mut() {
                    let frame = message::frame(msg_tag, &payload);
                    client.write_all(&frame).await.map_err(|_| HandlerError::TransportClosed)?;
                }
            }
            t if t == tag::ERROR_RESPONSE => {
                if let Some(client) = client.as_deref_mut() {
                    let frame = message::frame(tag::ERROR_RESPONSE, &payload);
                    let _ = client.write_all(&frame).await;
                }
                return Err(HandlerError::InjectionFailed);
            }
            _ => {}
        }
    }
}

fn parse_row_description(payload: &Bytes) -> Vec<String> {
    use byteorder::{BigEndian, ByteOrder};
    let mut names = Vec::new();
    if payload.len() < 2 {
        return names;
    }
    let count = BigEndian::read_i16(&payload[..2]);
    let mut rest = &payload[2..];
    for _ in 0..count {
        let nul = match memchr::memchr(0, rest) {
            Some(i) => i,
            None => break,
        };
        let name = String::from_utf8_lossy(&rest[..nul]).to_string();
        names.push(name);
        rest = &rest[nul + 1..];
        if rest.len() < 18 {
            break;
        }
        rest = &rest[18..];
    }
    names
}

fn parse_data_row(columns: &[String], payload: &Bytes) -> std::collections::HashMap<String, String> {
    use byteorder::{BigEndian, ByteOrder};
    let mut out = std::collections::HashMap::new();
    if payload.len() < 2 {
        return out;
    }
    let count = BigEndian::read_i16(&payload[..2]) as usize;
    let mut offset = 2;
    for i in 0..count {
        if offset + 4 > payload.len() {
            break;
        }
        let len = BigEndian::read_i32(&payload[offset..offset + 4]);
        offset += 4;
        let value = if len < 0 {
            None
        } else {
            let len = len as usize;
            let v = payload.get(offset..offset + len).map(|b| String::from_utf8_lossy(b).to_string());
            offset += len;
            v
        };
        if let (Some(name), Some(value)) = (columns.get(i), value) {
            out.insert(name.clone(), value);
        }
    }
    out
}

/// `TENANT_CONNECT` → `UPSTREAM_AUTH` → ... (pool mode): authenticate the
/// client itself against `pool_password`, check out a pooled upstream
/// (already authenticated by the factory), run resolving/injection fresh
/// every time, then pipe with `Terminate` interception (§4.5, §9 "Duplex
/// piping").
async fn tenant_connect_pooled(
    client: &mut ClientTransport,
    database: &str,
    identity: &Identity,
    shared: &Shared,
) -> Result<(), HandlerError> {
    let pool = shared
        .pool
        .as_ref()
        .expect("pool manager configured when pool_mode = session");

    let effective_role = shared
        .config
        .set_role
        .clone()
        .unwrap_or_else(|| identity.effective_role.clone());
    let key = PoolKey::new(database.to_string(), identity.effective_role.clone());

    let mut checkout = timeout(
        shared.config.handshake_timeout,
        pooled_handshake(client, shared, pool, &key, identity, &effective_role),
    )
    .await
    .map_err(|_| HandlerError::HandshakeTimeout)??;

    let result = serve_pooled_connection(client, &mut checkout.pooled.conn, shared).await;

    pool.checkin(&key, checkout.pooled, result.is_ok()).await;
    result
}

/// Everything between accept and `TRANSPARENT` for pool mode: authenticate
/// the client against `pool_password`, check out a pooled upstream, and run
/// resolving/injection fresh for this connection. Bounded as one unit by
/// `handshake_timeout` (§5); the pipe that follows is not.
async fn pooled_handshake(
    client: &mut ClientTransport,
    shared: &Shared,
    pool: &PoolManager<UpstreamConn>,
    key: &PoolKey,
    identity: &Identity,
    effective_role: &str,
) -> Result<Checkout<UpstreamConn>, HandlerError> {
    authenticate_client_cleartext(client, shared).await?;
    let mut checkout = pool.checkout(key).await?;

    resolve_and_inject(
        client,
        &mut checkout.pooled.conn.transport,
        &mut checkout.pooled.conn.framer,
        shared,
        identity,
        effective_role,
    )
    .await?;

    let backend_pid = NEXT_BACKEND_PID.fetch_add(1, Ordering::Relaxed);
    let mut key_data = bytes::BytesMut::new();
    key_data.extend_from_slice(&backend_pid.to_be_bytes());
    key_data.extend_from_slice(&rand_secret().to_be_bytes());
    let backend_key_data = message::frame(tag::BACKEND_KEY_DATA, &key_data);

    client.write_all(&backend_key_data).await.map_err(|_| HandlerError::TransportClosed)?;
    for ps in &checkout.pooled.meta.parameter_status {
        client.write_all(ps).await.map_err(|_| HandlerError::TransportClosed)?;
    }
    let rfq = message::frame(tag::READY_FOR_QUERY, b"I");
    client.write_all(&rfq).await.map_err(|_| HandlerError::TransportClosed)?;

    Ok(checkout)
}

async fn authenticate_client_cleartext(client: &mut ClientTransport, shared: &Shared) -> Result<(), HandlerError> {
    let Some(expected) = &shared.config.pool_password else {
        return Ok(());
    };
    let prompt = message::frame(tag::AUTHENTICATION, &3i32.to_be_bytes());
    client.write_all(&prompt).await.map_err(|_| HandlerError::TransportClosed)?;

    let mut framer = MessageFramer::new();
    let (msg_tag, payload) = read_message_frame(client, &mut framer).await?;
    if msg_tag != tag::PASSWORD_MESSAGE {
        return Err(HandlerError::TransportClosed);
    }
    let nul = memchr::memchr(0, &payload).unwrap_or(payload.len());
    let given = String::from_utf8_lossy(&payload[..nul]);
    if &*given != expected {
        return Err(HandlerError::NoValidUser);
    }
    let ok = message::frame(tag::AUTHENTICATION, &0i32.to_be_bytes());
    client.write_all(&ok).await.map_err(|_| HandlerError::TransportClosed)
}

async fn serve_pooled_connection(
    client: &mut ClientTransport,
    upstream: &mut UpstreamConn,
    shared: &Shared,
) -> Result<(), HandlerError> {
    pipe_pooled(client, upstream, shared.config.tenant_query_timeout).await?;
    cleanup_pooled(upstream).await
}

fn rand_secret() -> i32 {
    use rand::RngCore;
    (rand::thread_rng().next_u32() & 0x7fff_ffff) as i32
}

/// `PIPE` (pool mode): client→upstream is message-framed so a client
/// `Terminate` is intercepted rather than forwarded (the upstream must
/// survive to be checked in); upstream→client stays a raw byte copy. When
/// `idle` is set, every transferred frame/chunk resets an inactivity timer;
/// a full interval with no data in either direction closes the connection
/// (§5/§6).
///
/// Both directions need an independent mutable borrow of `client` at once
/// (read its frames, write the upstream's bytes back to it), so the pipe
/// splits each side into read/write halves via `tokio::io::split` rather
/// than juggling one shared `&mut` across the two `select!` arms.
async fn pipe_pooled(
    client: &mut ClientTransport,
    upstream: &mut UpstreamConn,
    idle: Option<Duration>,
) -> Result<(), HandlerError> {
    let mut client_framer = MessageFramer::new();
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(&mut upstream.transport);
    loop {
        let step = async {
            tokio::select! {
                incoming = read_message_frame(&mut client_read, &mut client_framer) => {
                    match incoming {
                        Ok((t, _)) if t == tag::TERMINATE => Ok(true),
                        Ok((t, payload)) => {
                            let frame = message::frame(t, &payload);
                            upstream_write.write_all(&frame).await.map_err(|_| HandlerError::TransportClosed)?;
                            Ok(false)
                        }
                        Err(_) => Ok(true),
                    }
                }
                outgoing = forward_one_chunk(&mut upstream_read, &mut client_write) => {
                    outgoing.map(|_| false)
                }
            }
        };

        let done = match idle {
            Some(d) => timeout(d, step).await.map_err(|_| HandlerError::InactivityTimeout)??,
            None => step.await?,
        };
        if done {
            return Ok(());
        }
    }
}

async fn forward_one_chunk<R, W>(reader: &mut R, writer: &mut W) -> Result<(), HandlerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    let n = reader.read(&mut buf).await.map_err(|_| HandlerError::TransportClosed)?;
    if n == 0 {
        return Err(HandlerError::TransportClosed);
    }
    writer.write_all(&buf[..n]).await.map_err(|_| HandlerError::TransportClosed)
}

/// Bidirectional byte copy used for `PIPE` in passthrough mode. When `idle`
/// is set, every chunk transferred in either direction resets an
/// inactivity timer; a full interval with no data in either direction
/// closes the connection (§5/§6). With no timeout configured this is
/// exactly `tokio::io::copy_bidirectional`.
async fn copy_bidirectional_with_idle<A, B>(a: &mut A, b: &mut B, idle: Option<Duration>) -> Result<(), HandlerError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let Some(idle) = idle else {
        tokio::io::copy_bidirectional(a, b).await.map_err(|_| HandlerError::TransportClosed)?;
        return Ok(());
    };

    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    loop {
        let step = async {
            tokio::select! {
                r = forward_one_chunk(&mut a_read, &mut b_write) => r,
                r = forward_one_chunk(&mut b_read, &mut a_write) => r,
            }
        };
        timeout(idle, step).await.map_err(|_| HandlerError::InactivityTimeout)??;
    }
}

/// `CLEANUP` (pool mode, healthy upstream): `ROLLBACK;` then `DISCARD
/// ALL;` as two separate simple queries, since `DISCARD ALL` is illegal
/// inside a transaction block. The client is long gone from these batches'
/// perspective (PIPE has already ended), so nothing is forwarded to it.
async fn cleanup_pooled(upstream: &mut UpstreamConn) -> Result<(), HandlerError> {
    run_injection_batch(None, &mut upstream.transport, &mut upstream.framer, "ROLLBACK;").await?;
    run_injection_batch(None, &mut upstream.transport, &mut upstream.framer, "DISCARD ALL;").await
}
