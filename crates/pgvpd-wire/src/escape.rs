//! Regex-restricted escaping for values substituted into injection and
//! resolver queries (§4.1, §9 "Resolver safety"). Anything not matching the
//! allowed charset is refused rather than escaped harder — the charset
//! itself is the trust boundary.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{WireError, WireResult};

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-.]+$").unwrap());
static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Validate and single-quote a literal, doubling internal quotes.
pub fn escape_literal(value: &str) -> WireResult<String> {
    if !LITERAL_RE.is_match(value) {
        return Err(WireError::UnsafeLiteral(value.to_string()));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Validate and double-quote an identifier.
pub fn escape_identifier(value: &str) -> WireResult<String> {
    if !IDENTIFIER_RE.is_match(value) {
        return Err(WireError::UnsafeIdentifier(value.to_string()));
    }
    Ok(format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_plain_literal() {
        assert_eq!(escape_literal("acme").unwrap(), "'acme'");
    }

    #[test]
    fn doubles_internal_quotes() {
        // Single quotes fail the charset check — they are never legal input,
        // this just documents that IF they slipped through the regex would
        // catch it first.
        assert!(escape_literal("o'brien").is_err());
    }

    #[test]
    fn rejects_literal_outside_charset() {
        assert!(escape_literal("acme; DROP TABLE x").is_err());
    }

    #[test]
    fn escapes_plain_identifier() {
        assert_eq!(escape_identifier("app_user").unwrap(), "\"app_user\"");
    }

    #[test]
    fn rejects_identifier_with_dot() {
        assert!(escape_identifier("app.current_tenant_id").is_err());
    }
}
