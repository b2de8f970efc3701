//! Reachability probes
//!
//! A probe is one bounded-time GET against a user-supplied address. Any HTTP
//! answer counts as reachable: only network-level failures are reported as
//! unreachable.

use reqwest::redirect::Policy;
use reqwest::{Client as HttpClient, Url};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Maximum number of redirects followed by a probe.
pub const MAX_REDIRECTS: usize = 5;

/// Classified probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered with an HTTP status.
    Reachable {
        /// Status code of the final response.
        status: u16,
    },
    /// No HTTP answer within the bound.
    Unreachable {
        /// What went wrong.
        reason: String,
    },
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Normalized address that was probed.
    pub target: String,
    /// Classified outcome.
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    /// Whether the target answered.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Reachable { .. })
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ProbeOutcome::Reachable { status } => write!(f, "{} is up (HTTP {status})", self.target),
            ProbeOutcome::Unreachable { reason } => write!(f, "{} is down: {reason}", self.target),
        }
    }
}

/// HTTP client dedicated to reachability probes.
#[derive(Clone)]
pub struct ProbeClient {
    client: HttpClient,
    timeout: Duration,
}

impl ProbeClient {
    /// Creates a probe client with the given upper bound per probe.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("ayumi-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self { client, timeout }
    }

    /// Upper bound of one probe.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `target` once.
    ///
    /// Never fails: every problem ends up in [`ProbeOutcome::Unreachable`].
    /// The bound is enforced by the HTTP client and again around the whole
    /// request, so a stalled body or resolver cannot hold the caller longer.
    pub async fn check(&self, target: &str) -> ProbeResult {
        let target = normalize_target(target);
        let url = match Url::parse(&target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => url,
            _ => {
                return ProbeResult {
                    target,
                    outcome: ProbeOutcome::Unreachable {
                        reason: "not a valid web address".to_string(),
                    },
                }
            }
        };

        debug!(target = %url, timeout_ms = self.timeout.as_millis(), "Probing");
        let outcome = match tokio::time::timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => ProbeOutcome::Reachable {
                status: response.status().as_u16(),
            },
            Ok(Err(e)) => ProbeOutcome::Unreachable {
                reason: self.describe(&e),
            },
            Err(_) => ProbeOutcome::Unreachable {
                reason: self.timeout_reason(),
            },
        };

        info!(target = %target, ?outcome, "Probe finished");
        ProbeResult { target, outcome }
    }

    fn timeout_reason(&self) -> String {
        format!("timed out after {:.1}s", self.timeout.as_secs_f64())
    }

    fn describe(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            self.timeout_reason()
        } else if error.is_redirect() {
            format!("too many redirects (limit {MAX_REDIRECTS})")
        } else if error.is_connect() {
            format!("connection failed: {}", root_cause(error))
        } else if error.is_builder() {
            "not a valid web address".to_string()
        } else {
            format!("request failed: {}", root_cause(error))
        }
    }
}

fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// Prefix `https://` unless the address already names a scheme.
///
/// # Examples
///
/// ```
/// use ayumi_core::probe::normalize_target;
///
/// assert_eq!(normalize_target("example.com"), "https://example.com");
/// assert_eq!(normalize_target("http://example.com"), "http://example.com");
/// ```
#[must_use]
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('<').trim_end_matches('>');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
