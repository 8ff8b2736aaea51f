//! Domain validation and routing-pattern compilation
//!
//! A link is reachable through a set of operator-chosen hostnames. The
//! routing layer matches incoming names against a single anchored
//! alternation pattern, so the whole set is compiled down to one regex
//! string (e.g. `^(alice\.example\.com|alice\.example\.net)$`) that is
//! both handed to the proxy registrar and persisted for change detection.

use thiserror::Error;

/// Errors from domain validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain syntax: {0}")]
    InvalidDomain(String),

    #[error("Domain set cannot be empty")]
    EmptyDomainSet,
}

/// Compile an ordered set of hostnames into a single anchored alternation.
///
/// Every hostname is validated with [`validate_hostname`], then periods are
/// escaped and the names are joined with `|` and wrapped as `^(...)$`.
///
/// Deterministic: identical input order and content always yield the same
/// string. The output is *not* order-normalized — the same set in a
/// different order compiles to a different (still correct) pattern, and
/// will register as a config change downstream. Callers that need stable
/// comparison must supply domains in a canonical order.
pub fn compile_domain_regex(domains: &[String]) -> Result<String, DomainError> {
    if domains.is_empty() {
        return Err(DomainError::EmptyDomainSet);
    }

    for domain in domains {
        validate_hostname(domain)?;
    }

    let escaped: Vec<String> = domains.iter().map(|d| d.replace('.', "\\.")).collect();
    Ok(format!("^({})$", escaped.join("|")))
}

/// Validate a hostname against DNS label rules.
///
/// - total length at most 255 characters
/// - at most one trailing dot is stripped before checking
/// - every dot-separated label is 1-63 characters of `[A-Za-z0-9-]`,
///   not starting or ending with a hyphen
pub fn validate_hostname(hostname: &str) -> Result<(), DomainError> {
    let invalid = || DomainError::InvalidDomain(hostname.to_string());

    if hostname.is_empty() || hostname.len() > 255 {
        return Err(invalid());
    }

    // "example.com." is a valid absolute name; strip exactly one dot
    let stripped = hostname.strip_suffix('.').unwrap_or(hostname);
    if stripped.is_empty() {
        return Err(invalid());
    }

    for label in stripped.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(invalid());
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid());
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid());
        }
    }

    Ok(())
}
