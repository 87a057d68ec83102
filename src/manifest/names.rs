//! Name and namespace legality checks
//!
//! The cluster API rejects illegal names only at apply time; these checks run
//! at generation time so a bad catalog entry never costs a network round trip.

use crate::Result;

/// Maximum length of a resource name (RFC 1123 subdomain)
pub const MAX_NAME_LEN: usize = 253;

/// Maximum length of a namespace (RFC 1123 label)
pub const MAX_NAMESPACE_LEN: usize = 63;

/// True if the value is lowercase alphanumeric segments separated by single
/// hyphens, with no leading or trailing hyphen
pub fn is_legal(value: &str) -> bool {
    if value.is_empty() || value.starts_with('-') || value.ends_with('-') {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate a resource name (length ceiling 253)
pub fn validate_name(name: &str) -> Result<()> {
    if !is_legal(name) {
        return Err(crate::Error::validation(format!(
            "illegal resource name {name:?}: must be lowercase alphanumeric segments separated by hyphens"
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(crate::Error::validation(format!(
            "resource name {:?}... exceeds {} characters",
            &name[..32],
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Validate a namespace (length ceiling 63)
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if !is_legal(namespace) {
        return Err(crate::Error::validation(format!(
            "illegal namespace {namespace:?}: must be lowercase alphanumeric segments separated by hyphens"
        )));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(crate::Error::validation(format!(
            "namespace {:?}... exceeds {} characters",
            &namespace[..32],
            MAX_NAMESPACE_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_hyphenated_names() {
        for name in ["api", "billing-api", "a", "svc-2", "0ok"] {
            validate_name(name).unwrap();
        }
    }

    #[test]
    fn rejects_uppercase_leading_hyphen_and_symbols() {
        for name in ["Api", "-api", "api-", "api_v2", "api.v2", ""] {
            assert!(validate_name(name).is_err(), "{name:?} should be illegal");
        }
    }

    #[test]
    fn name_length_ceiling_is_253() {
        let ok = "a".repeat(253);
        let too_long = "a".repeat(254);
        validate_name(&ok).unwrap();
        assert!(validate_name(&too_long).is_err());
    }

    #[test]
    fn namespace_length_ceiling_is_63() {
        let ok = "n".repeat(63);
        let too_long = "n".repeat(64);
        validate_namespace(&ok).unwrap();
        assert!(validate_namespace(&too_long).is_err());
    }
}
