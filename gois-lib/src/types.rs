//! Core data types for WHOIS querying.
//!
//! This module defines the data structures that flow between the client,
//! the batch engine and whatever consumes their results: raw query
//! results, per-domain outcomes, the running batch summary, and runtime
//! configuration.

use crate::analyzer::DomainStatus;
use crate::error::WhoisError;
use crate::protocols::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Raw text returned for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Response of the registry (TLD-level) server.
    pub registry_result: String,

    /// Response of the registrar server the registry referred to.
    /// Empty when there was no referral or the referral query failed.
    pub registrar_result: String,
}

/// Final result for one domain after the retry policy has run.
///
/// Created by a worker and consumed exactly once by the batch fold, which
/// drops the text payload once the sink and classifier have seen it.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// The domain as it came from the source
    pub domain: String,

    /// Whether some attempt returned a registry response
    pub success: bool,

    /// Response text; `None` on failure or after the payload was discarded
    pub result: Option<QueryResult>,

    /// Error of the last attempt, for failed domains
    pub error: Option<WhoisError>,

    /// How many attempts were made
    pub attempts: u32,
}

impl QueryOutcome {
    pub fn succeeded<D: Into<String>>(domain: D, result: QueryResult, attempts: u32) -> Self {
        Self {
            domain: domain.into(),
            success: true,
            result: Some(result),
            error: None,
            attempts,
        }
    }

    pub fn failed<D: Into<String>>(domain: D, error: WhoisError, attempts: u32) -> Self {
        Self {
            domain: domain.into(),
            success: false,
            result: None,
            error: Some(error),
            attempts,
        }
    }

    /// Release the response text, keeping only the scalar fields.
    pub fn discard_payload(&mut self) {
        self.result = None;
    }
}

/// Counters folded over a batch.
///
/// Only the engine's single folding loop mutates a summary; the value it
/// returns is final.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Expected number of domains, `None` when it could not be represented
    pub requested: Option<u64>,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub available: u64,
    pub registered: u64,
    pub unknown: u64,
}

impl BatchSummary {
    pub fn new(requested: Option<u64>) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub(crate) fn record_status(&mut self, status: DomainStatus) {
        match status {
            DomainStatus::Available => self.available += 1,
            DomainStatus::Registered => self.registered += 1,
            DomainStatus::Unknown => self.unknown += 1,
        }
    }
}

/// How results are presented.
///
/// `Simple` additionally turns on availability classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Full registry and registrar text per domain
    #[default]
    Normal,

    /// One availability verdict per domain
    Simple,
}

impl FromStr for OutputMode {
    type Err = WhoisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(OutputMode::Normal),
            "simple" => Ok(OutputMode::Simple),
            other => Err(WhoisError::config(format!(
                "invalid mode '{}', expected 'normal' or 'simple'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Normal => write!(f, "normal"),
            OutputMode::Simple => write!(f, "simple"),
        }
    }
}

/// Upper bound on worker count.
pub const MAX_CONCURRENCY: usize = 1000;

/// Runtime configuration for queries and batches.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Connection deadline for each WHOIS exchange
    /// Default: 10 seconds
    pub timeout: Duration,

    /// Optional proxy for outbound connections
    pub proxy: Option<ProxyConfig>,

    /// Output mode
    /// Default: normal
    pub mode: OutputMode,

    /// Attempts per domain (including the first)
    /// Default: 3, Minimum: 1
    pub max_retries: u32,

    /// Fixed delay between attempts
    /// Default: 2 seconds
    pub retry_delay: Duration,

    /// Number of batch workers
    /// Default: 5, Range: 1-1000
    pub concurrency: usize,

    /// Query this server instead of resolving one per TLD
    pub whois_server: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            proxy: None,
            mode: OutputMode::Normal,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            concurrency: 5,
            whois_server: None,
        }
    }
}

impl QueryConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set attempts per domain; values below 1 become 1.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set worker count, clamped to 1..=MAX_CONCURRENCY.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Pin every query to one server; blank values clear the override.
    pub fn with_whois_server(mut self, server: Option<String>) -> Self {
        self.whois_server = server
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_config_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.mode, OutputMode::Normal);
        assert!(config.proxy.is_none());
        assert!(config.whois_server.is_none());
    }

    #[test]
    fn test_builder_clamps() {
        let config = QueryConfig::default()
            .with_concurrency(0)
            .with_max_retries(0)
            .with_whois_server(Some("   ".to_string()));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 1);
        assert!(config.whois_server.is_none());

        let config = QueryConfig::default().with_concurrency(50_000);
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("simple".parse::<OutputMode>().unwrap(), OutputMode::Simple);
        assert_eq!(" Normal ".parse::<OutputMode>().unwrap(), OutputMode::Normal);
        assert!("verbose".parse::<OutputMode>().is_err());
        assert_eq!(OutputMode::Simple.to_string(), "simple");
    }

    #[test]
    fn test_outcome_discard_payload() {
        let mut outcome = QueryOutcome::succeeded(
            "example.com",
            QueryResult {
                registry_result: "Domain Name: EXAMPLE.COM".to_string(),
                registrar_result: String::new(),
            },
            1,
        );
        assert!(outcome.result.is_some());
        outcome.discard_payload();
        assert!(outcome.result.is_none());
        assert!(outcome.success);
    }

    #[test]
    fn test_summary_status_counters() {
        let mut summary = BatchSummary::new(Some(3));
        summary.record_status(DomainStatus::Available);
        summary.record_status(DomainStatus::Registered);
        summary.record_status(DomainStatus::Unknown);
        assert_eq!(
            (summary.available, summary.registered, summary.unknown),
            (1, 1, 1)
        );
        assert!(!summary.has_failures());
    }
}
