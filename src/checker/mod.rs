// src/checker/mod.rs
// =============================================================================
// This module contains the per-identifier probing logic.
//
// Submodules:
// - validate: Local syntax rules (no network)
// - github: Username and repository lookups against the GitHub REST API
// - domain: Name resolution for domains
//
// Every checker implements the `Checker` trait. A probe is split in two:
// `validate` (pure, local) and `lookup` (exactly one network call). The
// dispatcher only takes a rate-limit permit between the two.
// =============================================================================

mod domain;
mod github;
pub mod validate;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::engine::Service;
use crate::error::EngineError;
use crate::outcome::{Diagnostic, DiagnosticKind, Verdict};

pub use domain::{DomainChecker, Resolution, Resolver, SystemResolver};
pub use github::{classify_response, GitHubClient, GitHubRepoChecker, GitHubUserChecker};
pub use validate::InvalidIdentifier;

/// The closed set of things we know how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    GitHubUsername,
    GitHubRepo,
    Domain,
}

impl CheckKind {
    /// The remote service whose rate budget a lookup of this kind spends.
    pub fn service(self) -> Service {
        match self {
            Self::GitHubUsername | Self::GitHubRepo => Service::GitHub,
            Self::Domain => Service::Dns,
        }
    }

    pub fn requires_owner(self) -> bool {
        matches!(self, Self::GitHubRepo)
    }

    /// Builds the production checker for this kind.
    ///
    /// GitHub kinds share one HTTP client configured from `settings`
    /// (base URL, timeout, optional token).
    pub fn build(self, settings: &Settings) -> Result<Arc<dyn Checker>, EngineError> {
        let checker: Arc<dyn Checker> = match self {
            Self::GitHubUsername => Arc::new(GitHubUserChecker::new(GitHubClient::from_settings(settings)?)),
            Self::GitHubRepo => Arc::new(GitHubRepoChecker::new(GitHubClient::from_settings(settings)?)),
            Self::Domain => Arc::new(DomainChecker::new(SystemResolver::new(settings.request_timeout))),
        };
        Ok(checker)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHubUsername => write!(f, "GitHub username"),
            Self::GitHubRepo => write!(f, "GitHub repository"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// Batch-wide auxiliary input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckContext {
    /// Repository owner; required by the repository checker.
    pub owner: Option<String>,
}

impl CheckContext {
    pub fn with_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
        }
    }
}

/// Failures worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeouts, connection errors, 5xx and other unexpected answers.
    Transient,
    /// The remote service told us to slow down.
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub diagnostic: Diagnostic,
    /// How long the service asked us to wait, when it said so.
    pub retry_after: Option<Duration>,
}

impl ProbeFailure {
    pub fn transient(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            diagnostic: Diagnostic::new(kind, message),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            diagnostic: Diagnostic::new(DiagnosticKind::RateLimited, message),
            retry_after,
        }
    }
}

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Confirmed {
        verdict: Verdict,
        diagnostic: Option<Diagnostic>,
    },
    Failed(ProbeFailure),
}

impl ProbeResult {
    pub fn confirmed(verdict: Verdict, diagnostic: Diagnostic) -> Self {
        Self::Confirmed {
            verdict,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn invalid(reason: &InvalidIdentifier) -> Self {
        Self::confirmed(
            Verdict::Invalid,
            Diagnostic::new(DiagnosticKind::MalformedIdentifier, reason.to_string()),
        )
    }
}

/// One availability strategy.
#[async_trait]
pub trait Checker: Send + Sync {
    fn kind(&self) -> CheckKind;

    /// Local syntax check. Must not perform I/O.
    fn validate(&self, identifier: &str) -> Result<(), InvalidIdentifier>;

    /// Exactly one remote call for an identifier that already passed `validate`.
    async fn lookup(&self, identifier: &str, context: &CheckContext) -> ProbeResult;
}

/// Full probe: validation first, a lookup only for well-formed identifiers.
pub async fn probe(checker: &dyn Checker, identifier: &str, context: &CheckContext) -> ProbeResult {
    match checker.validate(identifier) {
        Ok(()) => checker.lookup(identifier, context).await,
        Err(reason) => ProbeResult::invalid(&reason),
    }
}

/// Rejects a context the selected checker cannot work with.
///
/// Called once per batch, before any identifier is probed.
pub fn validate_context(kind: CheckKind, context: &CheckContext) -> Result<(), EngineError> {
    if !kind.requires_owner() {
        return Ok(());
    }
    match context.owner.as_deref() {
        None | Some("") => Err(EngineError::MissingOwner),
        Some(owner) => validate::validate_username(owner).map_err(|source| EngineError::InvalidOwner {
            owner: owner.to_string(),
            source,
        }),
    }
}
