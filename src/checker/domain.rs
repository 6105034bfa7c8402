// src/checker/domain.rs
// =============================================================================
// Domain availability through name resolution.
//
// A domain that resolves to at least one address is in use. A resolver
// answer of "no such name" is treated as available. Anything else
// (timeouts, temporary resolver failures) is transient and gets retried.
//
// A name that exists but has no address records (EAI_NODATA) is in use too.
// This is still a heuristic: a registered domain that is not delegated at
// all reads as available. A WHOIS/RDAP lookup would be needed to be certain.
// =============================================================================

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tracing::debug;

use super::validate::{validate_domain, InvalidIdentifier};
use super::{CheckContext, CheckKind, Checker, ProbeFailure, ProbeResult};
use crate::outcome::{Diagnostic, DiagnosticKind, Verdict};

// Fragments of getaddrinfo error messages meaning NXDOMAIN, across glibc,
// musl, macOS and Windows
const NO_SUCH_NAME_MARKERS: &[&str] = &[
    "name or service not known",
    "nodename nor servname provided",
    "no such host is known",
    "name does not resolve",
];

// The name exists, it just has no A/AAAA records
const NO_ADDRESS_MARKERS: &[&str] = &["no address associated with hostname", "no data of the requested type"];

/// What a resolver said about one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The name has this many addresses.
    Resolved(usize),
    /// Authoritative "this name does not exist".
    NoSuchName(String),
    /// The name exists but has no address records.
    NoAddresses(String),
    TimedOut,
    Failed(String),
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Resolution;
}

/// Resolver backed by the operating system (getaddrinfo via tokio).
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, domain: &str) -> Resolution {
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host((domain, 80))).await {
            Err(_) => Resolution::TimedOut,
            Ok(Ok(addrs)) => match addrs.count() {
                0 => Resolution::NoAddresses("no addresses returned".to_string()),
                n => Resolution::Resolved(n),
            },
            Ok(Err(error)) => classify_resolver_error(&error),
        }
    }
}

fn classify_resolver_error(error: &io::Error) -> Resolution {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if NO_ADDRESS_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        Resolution::NoAddresses(message)
    } else if NO_SUCH_NAME_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        Resolution::NoSuchName(message)
    } else {
        Resolution::Failed(message)
    }
}

/// Checks whether a domain name is unregistered.
#[derive(Debug, Clone)]
pub struct DomainChecker<R> {
    resolver: R,
}

impl<R: Resolver> DomainChecker<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: Resolver + 'static> Checker for DomainChecker<R> {
    fn kind(&self) -> CheckKind {
        CheckKind::Domain
    }

    fn validate(&self, identifier: &str) -> Result<(), InvalidIdentifier> {
        validate_domain(identifier)
    }

    async fn lookup(&self, identifier: &str, _context: &CheckContext) -> ProbeResult {
        let resolution = self.resolver.resolve(identifier).await;
        debug!(domain = identifier, ?resolution, "dns lookup");

        match resolution {
            Resolution::Resolved(count) => ProbeResult::confirmed(
                Verdict::Taken,
                Diagnostic::new(DiagnosticKind::Dns, format!("resolves to {count} address(es)")),
            ),
            Resolution::NoAddresses(_) => ProbeResult::confirmed(
                Verdict::Taken,
                Diagnostic::new(DiagnosticKind::Dns, "name exists without address records"),
            ),
            Resolution::NoSuchName(_) => ProbeResult::confirmed(
                Verdict::Available,
                Diagnostic::new(DiagnosticKind::Dns, "no such name"),
            ),
            Resolution::TimedOut => {
                ProbeResult::Failed(ProbeFailure::transient(DiagnosticKind::Timeout, "DNS lookup timed out"))
            }
            Resolution::Failed(message) => {
                ProbeResult::Failed(ProbeFailure::transient(DiagnosticKind::Network, message))
            }
        }
    }
}
