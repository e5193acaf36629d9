use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::cli::Command;
use crate::error::{ConfigError, ConfigResult};
use crate::raw::{RawConfig, RawResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    None,
    Session,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub name: String,
    pub sql: String,
    pub params: Vec<String>,
    pub injects: Vec<(String, String)>,
    pub required: bool,
    pub unique: bool,
    pub cache_ttl: Option<u64>,
    pub depends_on: Vec<String>,
}

impl From<RawResolver> for ResolverConfig {
    fn from(r: RawResolver) -> Self {
        Self {
            name: r.name,
            sql: r.sql,
            params: r.params,
            injects: r.injects,
            required: r.required,
            unique: r.unique,
            cache_ttl: r.cache_ttl,
            depends_on: r.depends_on,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub upstream_host: String,
    pub upstream_port: u16,

    pub tls_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,

    pub upstream_tls: bool,
    pub upstream_tls_verify: bool,
    pub upstream_tls_ca: Option<String>,

    pub tenant_separator: char,
    pub value_separator: char,
    pub context_variables: Vec<String>,
    pub superuser_bypass: Vec<String>,

    pub pool_mode: PoolMode,
    pub pool_size: u32,
    pub pool_password: Option<String>,
    pub upstream_password: Option<String>,
    pub pool_idle_timeout: Duration,
    pub pool_checkout_timeout: Duration,

    pub handshake_timeout: Duration,
    pub admin_port: u16,

    pub set_role: Option<String>,

    pub tenant_allow: Vec<String>,
    pub tenant_deny: Vec<String>,
    pub tenant_max_connections: Option<u32>,
    pub tenant_rate_limit: Option<u32>,
    pub tenant_query_timeout: Option<Duration>,

    pub log_level: String,

    pub resolvers: Vec<ResolverConfig>,

    /// Set while merging the config file; consumed immediately after to
    /// load resolvers from a separate file, then cleared. Not part of the
    /// validated, externally-meaningful config surface.
    resolver_file_hint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            listen_port: 6432,
            upstream_host: "127.0.0.1".into(),
            upstream_port: 5432,

            tls_port: None,
            tls_cert: None,
            tls_key: None,

            upstream_tls: false,
            upstream_tls_verify: true,
            upstream_tls_ca: None,

            tenant_separator: '.',
            value_separator: ':',
            context_variables: Vec::new(),
            superuser_bypass: vec!["postgres".to_string()],

            pool_mode: PoolMode::None,
            pool_size: 10,
            pool_password: None,
            upstream_password: None,
            pool_idle_timeout: Duration::from_secs(300),
            pool_checkout_timeout: Duration::from_secs(5),

            handshake_timeout: Duration::from_secs(10),
            admin_port: 9930,

            set_role: None,

            tenant_allow: Vec::new(),
            tenant_deny: Vec::new(),
            tenant_max_connections: None,
            tenant_rate_limit: None,
            tenant_query_timeout: None,

            log_level: "info".into(),

            resolvers: Vec::new(),
            resolver_file_hint: None,
        }
    }
}

const ENV_PREFIX: &str = "PGVPD_";

/// Load config from defaults, then file, then environment (prefix
/// `PGVPD_`), then CLI flags — in that priority order (§6).
pub fn load(cli: &Command, env: &HashMap<String, String>) -> ConfigResult<Config> {
    let Command::Serve {
        config: config_path,
        port,
        admin_port,
        log_level,
    } = cli;

    let mut cfg = Config::default();

    if let Some(path) = config_path {
        apply_file(&mut cfg, path)?;
    }

    apply_env(&mut cfg, env);

    if let Some(port) = port {
        cfg.listen_port = *port;
    }
    if let Some(admin_port) = admin_port {
        cfg.admin_port = *admin_port;
    }
    if let Some(level) = log_level {
        cfg.log_level = level.clone();
    }

    validate(&cfg)?;
    Ok(cfg)
}

fn apply_file(cfg: &mut Config, path: &str) -> ConfigResult<()> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    merge_raw(cfg, raw)?;

    if let Some(resolver_file) = cfg.resolver_file_hint.take() {
        let text = std::fs::read_to_string(&resolver_file).map_err(|source| ConfigError::Read {
            path: resolver_file.clone(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: resolver_file.clone(),
            source,
        })?;
        cfg.resolvers = raw.resolvers.into_iter().map(ResolverConfig::from).collect();
    }
    Ok(())
}

fn merge_raw(cfg: &mut Config, raw: RawConfig) -> ConfigResult<()> {
    macro_rules! set {
        ($field:ident) => {
            if let Some(v) = raw.$field {
                cfg.$field = v;
            }
        };
    }
    set!(listen_host);
    set!(listen_port);
    set!(upstream_host);
    set!(upstream_port);
    set!(tls_port);
    set!(tls_cert);
    set!(tls_key);
    set!(upstream_tls);
    set!(upstream_tls_verify);
    set!(upstream_tls_ca);
    set!(context_variables);
    set!(superuser_bypass);
    set!(pool_size);
    set!(pool_password);
    set!(upstream_password);
    set!(admin_port);
    set!(set_role);
    set!(tenant_allow);
    set!(tenant_deny);
    set!(tenant_max_connections);
    set!(tenant_rate_limit);
    set!(log_level);

    if let Some(sep) = raw.tenant_separator {
        cfg.tenant_separator = one_char(&sep, "tenant_separator")?;
    }
    if let Some(sep) = raw.value_separator {
        cfg.value_separator = one_char(&sep, "value_separator")?;
    }
    if let Some(mode) = raw.pool_mode {
        cfg.pool_mode = match mode.as_str() {
            "none" => PoolMode::None,
            "session" => PoolMode::Session,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "pool_mode must be \"none\" or \"session\", got {other:?}"
                )))
            }
        };
    }
    if let Some(secs) = raw.pool_idle_timeout_secs {
        cfg.pool_idle_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = raw.pool_checkout_timeout_secs {
        cfg.pool_checkout_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = raw.handshake_timeout_secs {
        cfg.handshake_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = raw.tenant_query_timeout_secs {
        cfg.tenant_query_timeout = Some(Duration::from_secs(secs));
    }
    if !raw.resolvers.is_empty() {
        cfg.resolvers = raw.resolvers.into_iter().map(ResolverConfig::from).collect();
    }
    cfg.resolver_file_hint = raw.resolver_file;
    Ok(())
}

fn one_char(s: &str, field: &str) -> ConfigResult<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be exactly one character, got {s:?}"
        ))),
    }
}

fn apply_env(cfg: &mut Config, env: &HashMap<String, String>) {
    macro_rules! env_str {
        ($key:literal, $field:ident) => {
            if let Some(v) = env.get(concat!($key)) {
                cfg.$field = v.clone();
            }
        };
    }
    env_str!("PGVPD_LISTEN_HOST", listen_host);
    env_str!("PGVPD_UPSTREAM_HOST", upstream_host);
    env_str!("PGVPD_LOG_LEVEL", log_level);

    if let Some(v) = env.get("PGVPD_LISTEN_PORT").and_then(|v| v.parse().ok()) {
        cfg.listen_port = v;
    }
    if let Some(v) = env.get("PGVPD_UPSTREAM_PORT").and_then(|v| v.parse().ok()) {
        cfg.upstream_port = v;
    }
    if let Some(v) = env.get("PGVPD_ADMIN_PORT").and_then(|v| v.parse().ok()) {
        cfg.admin_port = v;
    }
    if let Some(v) = env.get("PGVPD_POOL_PASSWORD") {
        cfg.pool_password = Some(v.clone());
    }
    if let Some(v) = env.get("PGVPD_UPSTREAM_PASSWORD") {
        cfg.upstream_password = Some(v.clone());
    }
    let _ = ENV_PREFIX;
}

/// Startup-time fail-closed validation (§9 "Resolver safety").
fn validate(cfg: &Config) -> ConfigResult<()> {
    let literal_re = Regex::new(r"^[A-Za-z0-9_\-.]+$").unwrap();
    let identifier_re = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();

    for var in &cfg.context_variables {
        if !identifier_re.is_match(var) && !var.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "context variable {var:?} is not a safe session-variable name"
            )));
        }
    }
    for resolver in &cfg.resolvers {
        for (_, var) in &resolver.injects {
            if !identifier_re.is_match(var) && !var.contains('.') {
                return Err(ConfigError::Invalid(format!(
                    "resolver {:?} injects into unsafe session variable {var:?}",
                    resolver.name
                )));
            }
        }
    }
    if cfg.pool_mode == PoolMode::Session && cfg.pool_password.is_none() {
        return Err(ConfigError::Invalid(
            "pool_mode = session requires pool_password".into(),
        ));
    }
    let _ = literal_re;
    Ok(())
}
