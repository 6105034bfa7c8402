// src/checker/github.rs
// =============================================================================
// Username and repository lookups against the GitHub REST API.
//
// Key functionality:
// - GET /users/{name} and GET /repos/{owner}/{name}
// - 404 means available, 2xx means taken
// - 403/429 carrying rate-limit headers becomes a RateLimited failure with
//   the reset hint the API advertised
// - Transport errors and any other status become Transient failures
//
// The response classification is a pure function over (status, headers) so
// it can be tested without a server.
// =============================================================================

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

use super::validate::{validate_repo_name, validate_username, InvalidIdentifier};
use super::{CheckContext, CheckKind, Checker, ProbeFailure, ProbeResult};
use crate::config::{ApiToken, Settings};
use crate::error::EngineError;
use crate::outcome::{Diagnostic, DiagnosticKind, Verdict};

const API_VERSION: &str = "2022-11-28";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Shared HTTP plumbing for both GitHub checkers.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base: Url,
    authenticated: bool,
}

impl GitHubClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        Self::new(
            &settings.github_api_url,
            settings.github_token.as_ref(),
            settings.request_timeout,
        )
    }

    pub fn new(base_url: &str, token: Option<&ApiToken>, timeout: Duration) -> Result<Self, EngineError> {
        let base = Url::parse(base_url).map_err(|source| EngineError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| EngineError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        // Loopback targets (local mirrors, tests) never go through a proxy
        if matches!(base.host_str(), Some("127.0.0.1" | "localhost" | "[::1]")) {
            builder = builder.no_proxy();
        }

        Ok(Self {
            http: builder.build()?,
            base,
            authenticated: token.is_some(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    // Appends escaped path segments to the base url
    //
    // Example:
    //   base "https://api.github.com", ["repos", "rust-lang", "rust"]
    //   -> "https://api.github.com/repos/rust-lang/rust"
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn lookup(&self, segments: &[&str]) -> ProbeResult {
        let url = self.endpoint(segments);
        debug!(%url, "github lookup");

        match self.http.get(url).send().await {
            Ok(response) => classify_response(response.status(), response.headers(), SystemTime::now()),
            Err(error) => categorize_error(&error),
        }
    }
}

// Maps a GitHub API answer to a probe result
//
// HTTP status codes:
// - 200-299: the account/repository exists
// - 404: nothing by that name
// - 403/429 with rate-limit headers: throttled
// - everything else: neither answer, try again later
pub fn classify_response(status: StatusCode, headers: &HeaderMap, now: SystemTime) -> ProbeResult {
    let code = status.as_u16();

    if status.is_success() {
        return ProbeResult::confirmed(Verdict::Taken, Diagnostic::http(code));
    }

    if status == StatusCode::NOT_FOUND {
        return ProbeResult::confirmed(Verdict::Available, Diagnostic::http(code));
    }

    if is_rate_limited(status, headers) {
        let hint = reset_hint(headers, now);
        let message = match hint {
            Some(wait) => format!("HTTP {code}, budget resets in {}s", wait.as_secs()),
            None => format!("HTTP {code}"),
        };
        return ProbeResult::Failed(ProbeFailure::rate_limited(message, hint));
    }

    ProbeResult::Failed(ProbeFailure::transient(
        DiagnosticKind::UnexpectedResponse,
        format!("HTTP {code}"),
    ))
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (headers.contains_key(RETRY_AFTER) || header_u64(headers, RATE_LIMIT_REMAINING) == Some(0))
}

// How long until the API will take requests again
//
// retry-after (seconds) takes precedence over x-ratelimit-reset (epoch seconds).
fn reset_hint(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(secs));
    }

    let reset_at = UNIX_EPOCH + Duration::from_secs(header_u64(headers, RATE_LIMIT_RESET)?);
    Some(reset_at.duration_since(now).unwrap_or(Duration::ZERO))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn categorize_error(error: &reqwest::Error) -> ProbeResult {
    let failure = if error.is_timeout() {
        ProbeFailure::transient(DiagnosticKind::Timeout, "request timed out")
    } else if error.is_connect() {
        ProbeFailure::transient(DiagnosticKind::Network, format!("connection failed: {error}"))
    } else if error.is_decode() || error.is_body() {
        ProbeFailure::transient(DiagnosticKind::UnexpectedResponse, format!("malformed response: {error}"))
    } else {
        ProbeFailure::transient(DiagnosticKind::Network, error.to_string())
    };
    ProbeResult::Failed(failure)
}

/// Checks whether a GitHub login is free.
#[derive(Debug, Clone)]
pub struct GitHubUserChecker {
    client: GitHubClient,
}

impl GitHubUserChecker {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for GitHubUserChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::GitHubUsername
    }

    fn validate(&self, identifier: &str) -> Result<(), InvalidIdentifier> {
        validate_username(identifier)
    }

    async fn lookup(&self, identifier: &str, _context: &CheckContext) -> ProbeResult {
        self.client.lookup(&["users", identifier]).await
    }
}

/// Checks whether a repository name is free under the batch's owner.
#[derive(Debug, Clone)]
pub struct GitHubRepoChecker {
    client: GitHubClient,
}

impl GitHubRepoChecker {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for GitHubRepoChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::GitHubRepo
    }

    fn validate(&self, identifier: &str) -> Result<(), InvalidIdentifier> {
        validate_repo_name(identifier)
    }

    async fn lookup(&self, identifier: &str, context: &CheckContext) -> ProbeResult {
        // The dispatcher rejects owner-less batches up front; this only
        // triggers when the checker is driven directly.
        let Some(owner) = context.owner.as_deref() else {
            return ProbeResult::confirmed(
                Verdict::Unknown,
                Diagnostic::new(DiagnosticKind::MalformedIdentifier, "no repository owner given"),
            );
        };
        self.client.lookup(&["repos", owner, identifier]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::FailureKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000)
    }

    #[test]
    fn test_found_is_taken_and_not_found_is_available() {
        assert_eq!(
            classify_response(StatusCode::OK, &HeaderMap::new(), now()),
            ProbeResult::confirmed(Verdict::Taken, Diagnostic::http(200))
        );
        assert_eq!(
            classify_response(StatusCode::NOT_FOUND, &HeaderMap::new(), now()),
            ProbeResult::confirmed(Verdict::Available, Diagnostic::http(404))
        );
    }

    #[test]
    fn test_exhausted_budget_is_rate_limited_with_reset_hint() {
        let map = headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1060")]);
        match classify_response(StatusCode::FORBIDDEN, &map, now()) {
            ProbeResult::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::RateLimited);
                assert_eq!(failure.retry_after, Some(Duration::from_secs(60)));
                assert_eq!(failure.diagnostic.kind, DiagnosticKind::RateLimited);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_takes_precedence() {
        let map = headers(&[("retry-after", "30"), ("x-ratelimit-reset", "5000")]);
        match classify_response(StatusCode::TOO_MANY_REQUESTS, &map, now()) {
            ProbeResult::Failed(failure) => assert_eq!(failure.retry_after, Some(Duration::from_secs(30))),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_429_is_rate_limited_without_hint() {
        match classify_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), now()) {
            ProbeResult::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::RateLimited);
                assert_eq!(failure.retry_after, None);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_403_and_5xx_are_transient() {
        for status in [StatusCode::FORBIDDEN, StatusCode::BAD_GATEWAY] {
            match classify_response(status, &headers(&[("x-ratelimit-remaining", "42")]), now()) {
                ProbeResult::Failed(failure) => {
                    assert_eq!(failure.kind, FailureKind::Transient);
                    assert_eq!(failure.diagnostic.kind, DiagnosticKind::UnexpectedResponse);
                }
                other => panic!("expected Transient for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint(&["repos", "acme", "a b"]).as_str(),
            "https://ghe.example.com/api/v3/repos/acme/a%20b"
        );
    }

    #[test]
    fn test_token_marks_client_authenticated() {
        let token = ApiToken::new("ghp_abc");
        let client = GitHubClient::new("https://api.github.com", Some(&token), Duration::from_secs(1)).unwrap();
        assert!(client.is_authenticated());
        assert!(matches!(
            GitHubClient::new("https://api.github.com", Some(&ApiToken::new("bad\ntoken")), Duration::from_secs(1)),
            Err(EngineError::InvalidToken)
        ));
    }

    // Serves exactly one canned HTTP response on a loopback port and hands
    // back the raw request head it received.
    async fn serve_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        (format!("http://{addr}"), rx)
    }

    #[tokio::test]
    async fn test_user_lookup_against_local_server() {
        let (base, request) =
            serve_once("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let token = ApiToken::new("ghp_local");
        let checker = GitHubUserChecker::new(GitHubClient::new(&base, Some(&token), Duration::from_secs(5)).unwrap());

        let result = checker.lookup("octocat", &CheckContext::default()).await;
        assert_eq!(result, ProbeResult::confirmed(Verdict::Available, Diagnostic::http(404)));

        let head = request.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /users/octocat "), "request: {head}");
        assert!(head.contains("authorization: bearer ghp_local"), "request: {head}");
        assert!(head.contains("accept: application/vnd.github+json"), "request: {head}");
    }

    #[tokio::test]
    async fn test_repo_lookup_against_local_server() {
        let (base, request) =
            serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}").await;
        let checker = GitHubRepoChecker::new(GitHubClient::new(&base, None, Duration::from_secs(5)).unwrap());

        let result = checker.lookup("rust", &CheckContext::with_owner("rust-lang")).await;
        assert_eq!(result, ProbeResult::confirmed(Verdict::Taken, Diagnostic::http(200)));

        let head = request.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /repos/rust-lang/rust "), "request: {head}");
        assert!(!head.contains("authorization:"), "request: {head}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        // Bind then drop to get a port nobody is listening on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let client = GitHubClient::new(&format!("http://{addr}"), None, Duration::from_secs(2)).unwrap();
        let checker = GitHubUserChecker::new(client);

        match checker.lookup("octocat", &CheckContext::default()).await {
            ProbeResult::Failed(failure) => assert_eq!(failure.kind, FailureKind::Transient),
            other => panic!("expected Transient, got {other:?}"),
        }
    }
}
