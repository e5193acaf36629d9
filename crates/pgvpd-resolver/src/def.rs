//! Resolver definitions (§3 "Resolver definition").

#[derive(Debug, Clone)]
pub struct ResolverDef {
    /// Unique name.
    pub name: String,
    /// SQL text; parameter bindings are substituted as escaped literals by
    /// the caller, not by this crate.
    pub sql: String,
    /// Ordered list of session-variable names to bind as query parameters.
    pub params: Vec<String>,
    /// Result column name -> session-variable name to set on success.
    pub injects: Vec<(String, String)>,
    pub required: bool,
    pub unique: bool,
    /// `None` or `Some(0)` means "do not cache".
    pub cache_ttl_secs: Option<u64>,
    pub depends_on: Vec<String>,
}

impl ResolverDef {
    pub fn cacheable(&self) -> bool {
        matches!(self.cache_ttl_secs, Some(ttl) if ttl > 0)
    }
}
