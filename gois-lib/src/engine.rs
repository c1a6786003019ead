//! Batch query engine.
//!
//! A [`BatchEngine`] drains a [`DomainSource`] through a fixed pool of worker
//! tasks. Each worker takes one domain at a time, runs it through the retry
//! state machine against a [`WhoisFetch`] implementation, and sends the
//! outcome to a single folding loop that updates the [`BatchSummary`] and
//! hands each outcome to an [`OutcomeSink`].
//!
//! Memory stays bounded by the channel capacities: the source channel, the
//! results channel (twice the worker count), and one in-flight domain per
//! worker.
//!
//! ```rust,no_run
//! use gois_lib::{BatchEngine, DomainSource, NullSink, QueryConfig, WhoisClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QueryConfig::default().with_concurrency(10);
//!     let engine = BatchEngine::new(WhoisClient::new()?, &config);
//!
//!     let domains = vec!["example.com".to_string(), "example.org".to_string()];
//!     let summary = engine.run_batch(DomainSource::from(domains), &mut NullSink).await;
//!     println!("{} of {} succeeded", summary.succeeded, summary.processed);
//!     Ok(())
//! }
//! ```

use crate::analyzer::{Analyzer, DomainStatus};
use crate::error::WhoisError;
use crate::generate::DomainStream;
use crate::protocols::WhoisClient;
use crate::types::{BatchSummary, OutputMode, QueryConfig, QueryOutcome, QueryResult};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Upper bound on the feeder channel used for finite lists.
const MAX_LIST_BUFFER: usize = 100;

/// Anything that can look up one domain.
///
/// [`WhoisClient`] is the production implementation; tests inject fakes.
pub trait WhoisFetch: Send + Sync + 'static {
    fn fetch(
        &self,
        domain: &str,
        whois_server: Option<&str>,
    ) -> impl Future<Output = Result<QueryResult, WhoisError>> + Send;
}

impl WhoisFetch for WhoisClient {
    fn fetch(
        &self,
        domain: &str,
        whois_server: Option<&str>,
    ) -> impl Future<Output = Result<QueryResult, WhoisError>> + Send {
        WhoisClient::fetch(self, domain, whois_server)
    }
}

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; values below 1 become 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Initial state: no attempt made yet.
    pub fn start(&self) -> AttemptState {
        AttemptState::Attempting(0)
    }

    /// Transition after attempt number `attempt` (zero-based) finished.
    ///
    /// Structural errors fail immediately; retryable ones move on to the next
    /// attempt until the budget is spent.
    pub fn advance(
        &self,
        attempt: u32,
        result: Result<QueryResult, WhoisError>,
    ) -> AttemptState {
        let attempts = attempt + 1;
        match result {
            Ok(result) => AttemptState::Succeeded { attempts, result },
            Err(error) if error.is_retryable() && attempts < self.max_attempts => {
                AttemptState::Attempting(attempts)
            }
            Err(error) => AttemptState::Failed { attempts, error },
        }
    }
}

impl From<&QueryConfig> for RetryPolicy {
    fn from(config: &QueryConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }
}

/// Per-domain retry state.
#[derive(Debug)]
pub enum AttemptState {
    /// About to run attempt `k` (zero-based).
    Attempting(u32),
    Succeeded { attempts: u32, result: QueryResult },
    Failed { attempts: u32, error: WhoisError },
}

/// Drive one domain through the retry state machine.
pub async fn run_with_retries<F>(
    client: &F,
    domain: &str,
    whois_server: Option<&str>,
    policy: &RetryPolicy,
) -> QueryOutcome
where
    F: WhoisFetch + ?Sized,
{
    let mut state = policy.start();
    loop {
        state = match state {
            AttemptState::Attempting(attempt) => {
                let result = client.fetch(domain, whois_server).await;
                let error = result.as_ref().err().map(ToString::to_string);
                let next = policy.advance(attempt, result);

                if let AttemptState::Attempting(_) = next {
                    tracing::warn!(
                        domain,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        error = error.as_deref().unwrap_or_default(),
                        "query failed, retrying in {:?}",
                        policy.delay
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                next
            }
            AttemptState::Succeeded { attempts, result } => {
                tracing::debug!(domain, attempts, "query succeeded");
                return QueryOutcome::succeeded(domain, result, attempts);
            }
            AttemptState::Failed { attempts, error } => {
                tracing::error!(domain, attempts, error = %error, "query failed");
                return QueryOutcome::failed(domain, error, attempts);
            }
        };
    }
}

/// Where a batch gets its domains from.
#[derive(Debug)]
pub enum DomainSource {
    /// A finite, already materialized list.
    List(Vec<String>),
    /// A running generator.
    Stream(DomainStream),
}

impl DomainSource {
    /// Expected number of domains, `None` when unrepresentable.
    pub fn total_hint(&self) -> Option<u64> {
        match self {
            DomainSource::List(domains) => Some(domains.len() as u64),
            DomainSource::Stream(stream) => stream.total().as_hint(),
        }
    }

    /// Turn the source into a bounded channel the workers can share.
    fn into_receiver(self, concurrency: usize) -> mpsc::Receiver<String> {
        match self {
            DomainSource::Stream(stream) => stream.into_receiver(),
            DomainSource::List(domains) => {
                let (tx, rx) = mpsc::channel((concurrency * 2).clamp(1, MAX_LIST_BUFFER));
                tokio::spawn(async move {
                    for domain in domains {
                        if tx.send(domain).await.is_err() {
                            break;
                        }
                    }
                });
                rx
            }
        }
    }
}

impl From<Vec<String>> for DomainSource {
    fn from(domains: Vec<String>) -> Self {
        DomainSource::List(domains)
    }
}

impl From<DomainStream> for DomainSource {
    fn from(stream: DomainStream) -> Self {
        DomainSource::Stream(stream)
    }
}

/// Receives every outcome of a batch, in completion order.
pub trait OutcomeSink {
    /// Called once per domain, while the response text is still attached.
    /// `status` is set only when a classifier is configured and the query
    /// succeeded.
    fn on_outcome(&mut self, outcome: &QueryOutcome, status: Option<DomainStatus>);

    /// Called once after the last outcome.
    fn on_summary(&mut self, _summary: &BatchSummary) {}
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutcomeSink for NullSink {
    fn on_outcome(&mut self, _outcome: &QueryOutcome, _status: Option<DomainStatus>) {}
}

/// Classifier invoked on successful results.
pub type Classifier = Arc<dyn Fn(&QueryResult) -> DomainStatus + Send + Sync>;

/// How often to log progress for a batch of `total` domains.
pub fn progress_interval(total: Option<u64>) -> u64 {
    match total {
        None => 10_000,
        Some(n) if n >= 1_000_000 => 10_000,
        Some(n) if n >= 100_000 => 1_000,
        Some(n) if n >= 10_000 => 500,
        Some(n) if n >= 1_000 => 100,
        Some(_) => 10,
    }
}

/// Bounded worker pool over a [`WhoisFetch`] client.
pub struct BatchEngine<F: WhoisFetch = WhoisClient> {
    client: Arc<F>,
    concurrency: usize,
    policy: RetryPolicy,
    whois_server: Option<String>,
    classifier: Option<Classifier>,
}

impl<F: WhoisFetch> BatchEngine<F> {
    /// Create an engine from the worker, retry and server settings of
    /// `config`. Classification is enabled in simple mode.
    pub fn new(client: F, config: &QueryConfig) -> Self {
        let engine = Self {
            client: Arc::new(client),
            concurrency: config.concurrency.max(1),
            policy: RetryPolicy::from(config),
            whois_server: config.whois_server.clone(),
            classifier: None,
        };

        match config.mode {
            OutputMode::Simple => {
                let analyzer = Analyzer::new();
                engine.with_classifier(move |result| analyzer.classify(result))
            }
            OutputMode::Normal => engine,
        }
    }

    /// Classify successful results with `classify`.
    pub fn with_classifier<C>(mut self, classify: C) -> Self
    where
        C: Fn(&QueryResult) -> DomainStatus + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classify));
        self
    }

    /// Skip classification even in simple mode.
    pub fn without_classifier(mut self) -> Self {
        self.classifier = None;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn client(&self) -> &F {
        &self.client
    }

    /// Run the classifier on a successful outcome, if one is configured.
    pub fn classify(&self, outcome: &QueryOutcome) -> Option<DomainStatus> {
        match (&self.classifier, &outcome.result) {
            (Some(classify), Some(result)) if outcome.success => Some(classify(result)),
            _ => None,
        }
    }

    /// Query a single domain with the engine's retry policy.
    pub async fn query_one(&self, domain: &str) -> QueryOutcome {
        run_with_retries(
            self.client.as_ref(),
            domain,
            self.whois_server.as_deref(),
            &self.policy,
        )
        .await
    }

    /// Query every domain of `source` and fold the outcomes.
    ///
    /// Never fails as a whole: per-domain problems surface through the sink
    /// and the `failed` counter.
    pub async fn run_batch<S>(&self, source: DomainSource, sink: &mut S) -> BatchSummary
    where
        S: OutcomeSink + ?Sized,
    {
        let requested = source.total_hint();
        let interval = progress_interval(requested);
        let mut summary = BatchSummary::new(requested);

        tracing::info!(
            total = requested.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string()),
            concurrency = self.concurrency,
            "starting batch"
        );

        let domains = Arc::new(Mutex::new(source.into_receiver(self.concurrency)));
        let (result_tx, mut result_rx) = mpsc::channel::<QueryOutcome>(self.concurrency * 2);

        let workers: Vec<_> = (0..self.concurrency)
            .map(|worker_id| {
                let domains = Arc::clone(&domains);
                let results = result_tx.clone();
                let client = Arc::clone(&self.client);
                let policy = self.policy;
                let whois_server = self.whois_server.clone();

                tokio::spawn(async move {
                    loop {
                        let next = domains.lock().await.recv().await;
                        let Some(domain) = next else { break };

                        let outcome = run_with_retries(
                            client.as_ref(),
                            &domain,
                            whois_server.as_deref(),
                            &policy,
                        )
                        .await;
                        if results.send(outcome).await.is_err() {
                            break;
                        }
                    }
                    tracing::trace!(worker_id, "worker finished");
                })
            })
            .collect();
        drop(result_tx);

        // The results channel closes once every worker has exited and
        // dropped its sender.
        let supervisor = tokio::spawn(async move {
            for joined in join_all(workers).await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "worker task aborted");
                }
            }
        });

        while let Some(mut outcome) = result_rx.recv().await {
            summary.processed += 1;
            let status = if outcome.success {
                summary.succeeded += 1;
                self.classify(&outcome)
            } else {
                summary.failed += 1;
                None
            };
            if let Some(status) = status {
                summary.record_status(status);
            }

            sink.on_outcome(&outcome, status);
            outcome.discard_payload();

            if summary.processed % interval == 0 {
                tracing::info!(
                    processed = summary.processed,
                    total = requested.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string()),
                    "progress"
                );
            }
        }

        if let Err(e) = supervisor.await {
            tracing::error!(error = %e, "worker supervisor aborted");
        }

        sink.on_summary(&summary);
        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use crate::pattern::compile;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Test fixtures ───────────────────────────────────────────────────

    /// Fake client: domains starting with "flaky" fail with a socket error
    /// `flaky_failures` times, "dead" always time out, "bad" are structural
    /// failures, anything else succeeds. Registry text is "<domain> free"
    /// for names starting with "free", "Registrar: X" otherwise.
    #[derive(Default)]
    struct FakeClient {
        flaky_failures: usize,
        delay: Duration,
        calls: std::sync::Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeClient {
        fn calls(&self, domain: &str) -> usize {
            self.calls.lock().unwrap().get(domain).copied().unwrap_or(0)
        }
    }

    impl WhoisFetch for FakeClient {
        fn fetch(
            &self,
            domain: &str,
            _whois_server: Option<&str>,
        ) -> impl Future<Output = Result<QueryResult, WhoisError>> + Send {
            let domain = domain.to_string();
            async move {
                let call = {
                    let mut calls = self.calls.lock().unwrap();
                    let count = calls.entry(domain.clone()).or_insert(0);
                    *count += 1;
                    *count
                };

                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if domain.starts_with("bad") {
                    Err(WhoisError::bad_domain(&domain))
                } else if domain.starts_with("dead") {
                    Err(WhoisError::timeout("whois.fake", &domain, Duration::from_millis(1)))
                } else if domain.starts_with("flaky") && call <= self.flaky_failures {
                    Err(WhoisError::socket("whois.fake", &domain, "connection reset"))
                } else if domain.starts_with("free") {
                    Ok(QueryResult {
                        registry_result: format!("No match for {}", domain),
                        registrar_result: String::new(),
                    })
                } else {
                    Ok(QueryResult {
                        registry_result: format!("Domain Name: {}\nRegistrar: X\n", domain),
                        registrar_result: String::new(),
                    })
                }
            }
        }
    }

    fn test_config(concurrency: usize, retries: u32) -> QueryConfig {
        QueryConfig::default()
            .with_concurrency(concurrency)
            .with_max_retries(retries)
            .with_retry_delay(Duration::from_millis(1))
    }

    fn domains(names: &[&str]) -> DomainSource {
        DomainSource::from(names.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[derive(Default)]
    struct RecordingSink {
        outcomes: Vec<(String, bool, bool, Option<DomainStatus>)>,
        summaries: Vec<BatchSummary>,
    }

    impl OutcomeSink for RecordingSink {
        fn on_outcome(&mut self, outcome: &QueryOutcome, status: Option<DomainStatus>) {
            self.outcomes.push((
                outcome.domain.clone(),
                outcome.success,
                outcome.result.is_some(),
                status,
            ));
        }

        fn on_summary(&mut self, summary: &BatchSummary) {
            self.summaries.push(summary.clone());
        }
    }

    // ── Retry state machine ─────────────────────────────────────────────

    #[test]
    fn test_advance_transitions() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(matches!(policy.start(), AttemptState::Attempting(0)));

        let retry = policy.advance(0, Err(WhoisError::socket("s", "q", "reset")));
        assert!(matches!(retry, AttemptState::Attempting(1)));

        let exhausted = policy.advance(2, Err(WhoisError::socket("s", "q", "reset")));
        assert!(matches!(exhausted, AttemptState::Failed { attempts: 3, .. }));

        let structural = policy.advance(0, Err(WhoisError::bad_domain("x")));
        assert!(matches!(structural, AttemptState::Failed { attempts: 1, .. }));

        let ok = policy.advance(1, Ok(QueryResult::default()));
        assert!(matches!(ok, AttemptState::Succeeded { attempts: 2, .. }));
    }

    #[test]
    fn test_policy_minimum_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        let state = policy.advance(0, Err(WhoisError::proxy("down")));
        assert!(matches!(state, AttemptState::Failed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_eventual_success_counts_once() {
        let client = FakeClient {
            flaky_failures: 2,
            ..Default::default()
        };
        let engine = BatchEngine::new(client, &test_config(1, 3));

        let outcome = engine.query_one("flaky.com").await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(engine.client().calls("flaky.com"), 3);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_budget() {
        let engine = BatchEngine::new(FakeClient::default(), &test_config(1, 4));
        let outcome = engine.query_one("dead.com").await;
        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(WhoisError::Timeout { .. })));
        assert_eq!(engine.client().calls("dead.com"), 4);
    }

    #[tokio::test]
    async fn test_structural_failure_not_retried() {
        let engine = BatchEngine::new(FakeClient::default(), &test_config(1, 5));
        let outcome = engine.query_one("bad.com").await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(engine.client().calls("bad.com"), 1);
    }

    // ── Batch folding ───────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_domain_processed_once() {
        for concurrency in [1, 3, 16] {
            let names: Vec<String> = (0..40)
                .map(|i| match i % 4 {
                    0 => format!("bad{}.com", i),
                    1 => format!("flaky{}.com", i),
                    _ => format!("ok{}.com", i),
                })
                .collect();
            let client = FakeClient {
                flaky_failures: 1,
                ..Default::default()
            };
            let engine = BatchEngine::new(client, &test_config(concurrency, 2));
            let mut sink = RecordingSink::default();

            let summary = engine.run_batch(DomainSource::from(names.clone()), &mut sink).await;

            assert_eq!(summary.requested, Some(40));
            assert_eq!(summary.processed, 40);
            assert_eq!(summary.succeeded + summary.failed, summary.processed);
            assert_eq!(summary.failed, 10);

            let mut seen: Vec<String> = sink.outcomes.iter().map(|o| o.0.clone()).collect();
            seen.sort();
            let mut expected = names;
            expected.sort();
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_cap_respected() {
        let client = FakeClient {
            delay: Duration::from_millis(10),
            ..Default::default()
        };
        let engine = BatchEngine::new(client, &test_config(3, 1));
        let names: Vec<String> = (0..30).map(|i| format!("d{}.com", i)).collect();

        let summary = engine.run_batch(DomainSource::from(names), &mut NullSink).await;
        assert_eq!(summary.processed, 30);
        let peak = engine.client().max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight {} exceeds concurrency", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_classification_only_in_simple_mode() {
        let names = ["free1.com", "free2.com", "taken.com", "bad.com"];

        let normal = BatchEngine::new(FakeClient::default(), &test_config(2, 1));
        let summary = normal.run_batch(domains(&names), &mut NullSink).await;
        assert_eq!((summary.available, summary.registered, summary.unknown), (0, 0, 0));

        let simple_config = test_config(2, 1).with_mode(OutputMode::Simple);
        let simple = BatchEngine::new(FakeClient::default(), &simple_config);
        let mut sink = RecordingSink::default();
        let summary = simple.run_batch(domains(&names), &mut sink).await;

        assert_eq!(summary.available, 2);
        assert_eq!(summary.registered, 1);
        assert_eq!(summary.unknown, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.available + summary.registered + summary.unknown,
            summary.succeeded
        );

        let failed = sink.outcomes.iter().find(|o| o.0 == "bad.com").unwrap();
        assert_eq!(failed.3, None);

        // Simple mode can still opt out of classification.
        let unclassified =
            BatchEngine::new(FakeClient::default(), &simple_config).without_classifier();
        let summary = unclassified.run_batch(domains(&names), &mut NullSink).await;
        assert_eq!(summary.succeeded, 3);
        assert_eq!((summary.available, summary.registered, summary.unknown), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let engine = BatchEngine::new(FakeClient::default(), &test_config(2, 1))
            .with_classifier(|_| DomainStatus::Unknown);
        let summary = engine.run_batch(domains(&["a.com", "b.com"]), &mut NullSink).await;
        assert_eq!(summary.unknown, 2);
    }

    #[tokio::test]
    async fn test_sink_sees_payload_and_summary() {
        let engine = BatchEngine::new(FakeClient::default(), &test_config(2, 1));
        let mut sink = RecordingSink::default();
        let summary = engine
            .run_batch(domains(&["a.com", "bad.com"]), &mut sink)
            .await;

        assert_eq!(sink.outcomes.len(), 2);
        for (domain, success, has_payload, _) in &sink.outcomes {
            assert_eq!(*has_payload, *success, "payload mismatch for {}", domain);
        }
        assert_eq!(sink.summaries, vec![summary]);
    }

    #[tokio::test]
    async fn test_empty_list() {
        let engine = BatchEngine::new(FakeClient::default(), &test_config(4, 1));
        let summary = engine.run_batch(DomainSource::from(Vec::new()), &mut NullSink).await;
        assert_eq!(summary, BatchSummary::new(Some(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stream_source() {
        let (plan, _) = compile("[a-z]{2}.test").unwrap();
        let source = DomainSource::from(generate(plan));
        assert_eq!(source.total_hint(), Some(676));

        let engine = BatchEngine::new(FakeClient::default(), &test_config(8, 1));
        let summary = engine.run_batch(source, &mut NullSink).await;
        assert_eq!(summary.requested, Some(676));
        assert_eq!(summary.processed, 676);
        assert_eq!(summary.succeeded, 676);
    }

    #[tokio::test]
    async fn test_overflowing_stream_has_unknown_total() {
        let (plan, _) = compile("[a-z0-9]{13}.com").unwrap();
        let source = DomainSource::from(generate(plan));
        assert_eq!(source.total_hint(), None);
    }

    #[test]
    fn test_progress_interval() {
        assert_eq!(progress_interval(None), 10_000);
        assert_eq!(progress_interval(Some(50)), 10);
        assert_eq!(progress_interval(Some(5_000)), 100);
        assert_eq!(progress_interval(Some(20_000)), 500);
        assert_eq!(progress_interval(Some(250_000)), 1_000);
        assert_eq!(progress_interval(Some(3_000_000)), 10_000);
    }
}
