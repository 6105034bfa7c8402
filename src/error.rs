// src/error.rs
// =============================================================================
// Errors that stop a batch before any identifier is probed.
//
// Per-identifier problems (timeouts, throttling, malformed names) never show
// up here. They become verdicts and diagnostics inside the result aggregate.
// =============================================================================

use thiserror::Error;

use crate::checker::InvalidIdentifier;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("the repository checker needs an owner (user or organization)")]
    MissingOwner,
    #[error("`{owner}` is not a valid repository owner: {source}")]
    InvalidOwner {
        owner: String,
        #[source]
        source: InvalidIdentifier,
    },
    #[error("invalid GitHub API base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("GITHUB_TOKEN contains characters that cannot be sent in an HTTP header")]
    InvalidToken,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
