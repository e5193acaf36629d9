//! Serde-deserialized shape of the TOML config file — mirrors §6's
//! recognized option list before validation and layering.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RawConfig {
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
    pub upstream_host: Option<String>,
    pub upstream_port: Option<u16>,

    pub tls_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,

    pub upstream_tls: Option<bool>,
    pub upstream_tls_verify: Option<bool>,
    pub upstream_tls_ca: Option<String>,

    pub tenant_separator: Option<String>,
    pub value_separator: Option<String>,
    pub context_variables: Option<Vec<String>>,
    pub superuser_bypass: Option<Vec<String>>,

    pub pool_mode: Option<String>,
    pub pool_size: Option<u32>,
    pub pool_password: Option<String>,
    pub upstream_password: Option<String>,
    pub pool_idle_timeout_secs: Option<u64>,
    pub pool_checkout_timeout_secs: Option<u64>,

    pub handshake_timeout_secs: Option<u64>,
    pub admin_port: Option<u16>,

    pub resolver_file: Option<String>,
    pub set_role: Option<String>,

    pub tenant_allow: Option<Vec<String>>,
    pub tenant_deny: Option<Vec<String>>,
    pub tenant_max_connections: Option<u32>,
    pub tenant_rate_limit: Option<u32>,
    pub tenant_query_timeout_secs: Option<u64>,

    pub log_level: Option<String>,

    #[serde(default, rename = "resolver")]
    pub resolvers: Vec<RawResolver>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawResolver {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// `result_column = session_variable` pairs.
    #[serde(default)]
    pub injects: Vec<(String, String)>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    pub cache_ttl: Option<u64>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}
