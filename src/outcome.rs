// src/outcome.rs
// =============================================================================
// The result model handed back to callers of the engine.
//
// - Verdict: the four final classifications
// - Diagnostic: a tagged, human-readable explanation attached to a verdict
// - CheckOutcome: one finalized result per identifier
// - ResultAggregate: all outcomes of a batch, in input order
// - Progress: the event emitted whenever one identifier finalizes
// =============================================================================

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Final classification of one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing is registered under this identifier.
    Available,
    /// The identifier is already registered or in use.
    Taken,
    /// The identifier fails the syntax rules of its kind.
    Invalid,
    /// No definitive answer (retries exhausted or the run was cancelled).
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Taken => write!(f, "taken"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Tag that tells apart the different reasons behind a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A definitive HTTP answer (e.g. "HTTP 404").
    Http,
    /// A definitive answer from name resolution.
    Dns,
    /// The identifier failed local validation.
    MalformedIdentifier,
    /// The remote service throttled us.
    RateLimited,
    /// The request or lookup timed out.
    Timeout,
    /// Connection-level or resolver failure.
    Network,
    /// The service answered with something that is neither "found" nor "not found".
    UnexpectedResponse,
    /// The batch was cancelled before this identifier finished.
    Cancelled,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Http => "http",
            Self::Dns => "dns",
            Self::MalformedIdentifier => "malformed identifier",
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Network => "network error",
            Self::UnexpectedResponse => "unexpected response",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn http(status: u16) -> Self {
        Self::new(DiagnosticKind::Http, format!("HTTP {status}"))
    }

    pub fn cancelled() -> Self {
        Self::new(DiagnosticKind::Cancelled, "cancelled before a verdict was reached")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::Http | DiagnosticKind::Dns => f.write_str(&self.message),
            kind => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// The finalized result for one identifier.
///
/// Created exactly once by the dispatcher; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub identifier: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    /// Lookups performed; zero for identifiers rejected locally or never started.
    pub attempts: u32,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
}

impl CheckOutcome {
    pub fn is_available(&self) -> bool {
        self.verdict == Verdict::Available
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.diagnostic,
            Some(Diagnostic {
                kind: DiagnosticKind::Cancelled,
                ..
            })
        )
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
}

/// Outcomes of a whole batch, always in the order the identifiers were submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultAggregate {
    outcomes: Vec<CheckOutcome>,
}

impl ResultAggregate {
    pub(crate) fn new(outcomes: Vec<CheckOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CheckOutcome> {
        self.outcomes.iter()
    }

    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.outcomes.iter().filter(|o| o.verdict == verdict).count()
    }

    pub fn all_available(&self) -> bool {
        self.outcomes.iter().all(CheckOutcome::is_available)
    }

    pub fn into_vec(self) -> Vec<CheckOutcome> {
        self.outcomes
    }
}

impl<'a> IntoIterator for &'a ResultAggregate {
    type Item = &'a CheckOutcome;
    type IntoIter = std::slice::Iter<'a, CheckOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

/// Emitted once per identifier, as soon as its outcome is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Position of the identifier in the submitted batch.
    pub index: usize,
    pub identifier: String,
    pub verdict: Verdict,
    pub attempts: u32,
}
