// src/checker/validate.rs
// =============================================================================
// Local syntax rules for every identifier kind.
//
// Nothing in here touches the network. The dispatcher runs these checks
// before it asks the rate limiter for a permit, so a malformed identifier
// never costs a request and never waits on a budget.
//
// Rules:
// - GitHub logins: ASCII alphanumerics and single hyphens, 1-39 characters,
//   no hyphen at either end
// - GitHub repository names: ASCII alphanumerics, '-', '_' and '.',
//   1-100 characters, not "." or ".."
// - Domains: two or more labels, at most 253 characters, labels of 1-63
//   alphanumerics/hyphens without a hyphen at either end, and a top-level
//   label that is not all digits
// =============================================================================

use thiserror::Error;

pub const MAX_LOGIN_LENGTH: usize = 39;
pub const MAX_REPO_NAME_LENGTH: usize = 100;
pub const MAX_DOMAIN_LENGTH: usize = 253;
pub const MAX_LABEL_LENGTH: usize = 63;

/// Why an identifier was rejected before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidIdentifier {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("`{value}` is too long ({len} characters, max {max})")]
    TooLong { value: String, len: usize, max: usize },
    #[error("invalid character `{ch}` in `{value}`")]
    IllegalChar { ch: char, value: String },
    #[error("`{value}` cannot start or end with a hyphen")]
    EdgeHyphen { value: String },
    #[error("`{value}` cannot contain consecutive hyphens")]
    ConsecutiveHyphens { value: String },
    #[error("`{value}` is a reserved name")]
    Reserved { value: String },
    #[error("`{value}` needs at least one dot (e.g. example.com)")]
    MissingDot { value: String },
    #[error("`{value}` contains an empty label")]
    EmptyLabel { value: String },
    #[error("label `{label}` is longer than {MAX_LABEL_LENGTH} characters")]
    LabelTooLong { label: String },
    #[error("top-level label `{label}` cannot be all digits")]
    NumericTld { label: String },
}

// Validates a GitHub login (user or organization name)
//
// Example:
//   "octocat"   -> Ok
//   "-octocat"  -> EdgeHyphen
//   "bad_name!" -> IllegalChar('_')
pub fn validate_username(name: &str) -> Result<(), InvalidIdentifier> {
    if name.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }

    let len = name.chars().count();
    if len > MAX_LOGIN_LENGTH {
        return Err(InvalidIdentifier::TooLong {
            value: name.to_string(),
            len,
            max: MAX_LOGIN_LENGTH,
        });
    }

    if let Some(ch) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(InvalidIdentifier::IllegalChar {
            ch,
            value: name.to_string(),
        });
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(InvalidIdentifier::EdgeHyphen {
            value: name.to_string(),
        });
    }

    if name.contains("--") {
        return Err(InvalidIdentifier::ConsecutiveHyphens {
            value: name.to_string(),
        });
    }

    Ok(())
}

// Validates a repository name (the part after "owner/")
pub fn validate_repo_name(name: &str) -> Result<(), InvalidIdentifier> {
    if name.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }

    let len = name.chars().count();
    if len > MAX_REPO_NAME_LENGTH {
        return Err(InvalidIdentifier::TooLong {
            value: name.to_string(),
            len,
            max: MAX_REPO_NAME_LENGTH,
        });
    }

    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(InvalidIdentifier::IllegalChar {
            ch,
            value: name.to_string(),
        });
    }

    if name == "." || name == ".." {
        return Err(InvalidIdentifier::Reserved {
            value: name.to_string(),
        });
    }

    Ok(())
}

// Validates that a string is a plausible registrable domain name
//
// A single trailing dot (fully-qualified form) is accepted.
pub fn validate_domain(domain: &str) -> Result<(), InvalidIdentifier> {
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);

    if trimmed.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }

    let len = trimmed.chars().count();
    if len > MAX_DOMAIN_LENGTH {
        return Err(InvalidIdentifier::TooLong {
            value: domain.to_string(),
            len,
            max: MAX_DOMAIN_LENGTH,
        });
    }

    if let Some(ch) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.')))
    {
        return Err(InvalidIdentifier::IllegalChar {
            ch,
            value: domain.to_string(),
        });
    }

    if !trimmed.contains('.') {
        return Err(InvalidIdentifier::MissingDot {
            value: domain.to_string(),
        });
    }

    let labels: Vec<&str> = trimmed.split('.').collect();
    for label in &labels {
        if label.is_empty() {
            return Err(InvalidIdentifier::EmptyLabel {
                value: domain.to_string(),
            });
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(InvalidIdentifier::LabelTooLong {
                label: label.to_string(),
            });
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(InvalidIdentifier::EdgeHyphen {
                value: label.to_string(),
            });
        }
    }

    // split() on a string containing '.' yields at least two items
    if let Some(tld) = labels.last() {
        if tld.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidIdentifier::NumericTld {
                label: tld.to_string(),
            });
        }
    }

    Ok(())
}
