//! Identity payload parsing (§3, §6 "Username grammar").
//!
//! `<role><sep><payload>` where `payload` splits on `value_separator` into
//! positional values, one per configured context variable.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("username does not contain the tenant separator")]
    MissingSeparator,
    #[error("expected {expected} values, found {found}")]
    ValueCountMismatch { expected: usize, found: usize },
    #[error("context value at position {0} is empty")]
    EmptyValue(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub effective_role: String,
    /// Context variable name → value, in `context_variables` order.
    pub context: Vec<(String, String)>,
}

/// Parses `raw_user` per the tenant/value separator grammar. Callers must
/// check the superuser-bypass list *before* calling this — a bypass match
/// forwards `raw_user` unchanged and never reaches this parser.
pub fn parse_identity(
    raw_user: &str,
    tenant_separator: char,
    value_separator: char,
    context_variables: &[String],
) -> Result<Identity, IdentityError> {
    let (role, payload) = raw_user
        .split_once(tenant_separator)
        .ok_or(IdentityError::MissingSeparator)?;

    let values: Vec<&str> = if context_variables.is_empty() {
        if payload.is_empty() {
            Vec::new()
        } else {
            payload.split(value_separator).collect()
        }
    } else {
        payload.split(value_separator).collect()
    };

    if values.len() != context_variables.len() {
        return Err(IdentityError::ValueCountMismatch {
            expected: context_variables.len(),
            found: values.len(),
        });
    }

    for (i, v) in values.iter().enumerate() {
        if v.is_empty() {
            return Err(IdentityError::EmptyValue(i));
        }
    }

    let context = context_variables
        .iter()
        .cloned()
        .zip(values.into_iter().map(str::to_string))
        .collect();

    Ok(Identity {
        effective_role: role.to_string(),
        context,
    })
}

/// True if `raw_user` matches the configured superuser-bypass list exactly.
pub fn is_bypass(raw_user: &str, superuser_bypass: &[String]) -> bool {
    superuser_bypass.iter().any(|b| b == raw_user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_variable() {
        let id = parse_identity("app_user.acme", '.', ':', &vars(&["app.current_tenant_id"])).unwrap();
        assert_eq!(id.effective_role, "app_user");
        assert_eq!(id.context, vec![("app.current_tenant_id".to_string(), "acme".to_string())]);
    }

    #[test]
    fn two_variables() {
        let id = parse_identity("app_user.L1:U7", '.', ':', &vars(&["app.list", "app.user"])).unwrap();
        assert_eq!(id.effective_role, "app_user");
        assert_eq!(
            id.context,
            vec![
                ("app.list".to_string(), "L1".to_string()),
                ("app.user".to_string(), "U7".to_string()),
            ]
        );
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert_eq!(
            parse_identity("baduser", '.', ':', &vars(&["app.current_tenant_id"])),
            Err(IdentityError::MissingSeparator)
        );
    }

    #[test]
    fn value_count_mismatch_rejected() {
        assert!(matches!(
            parse_identity("app_user.L1", '.', ':', &vars(&["app.list", "app.user"])),
            Err(IdentityError::ValueCountMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn empty_value_rejected() {
        assert_eq!(
            parse_identity("app_user.", '.', ':', &vars(&["app.current_tenant_id"])),
            Err(IdentityError::EmptyValue(0))
        );
    }

    #[test]
    fn bypass_exact_match_only() {
        let bypass = vars(&["postgres"]);
        assert!(is_bypass("postgres", &bypass));
        assert!(!is_bypass("postgres.x", &bypass));
    }
}
