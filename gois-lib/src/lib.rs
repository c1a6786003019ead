//! # gois Library
//!
//! Lazy domain-name generation and concurrent WHOIS batch querying.
//!
//! Patterns such as `[a-z]{3}.com` compile into a plan whose combinations are
//! produced on demand into a bounded channel, so spaces of billions of names
//! never sit in memory. A [`BatchEngine`] drains that stream, or a plain
//! list, through a fixed pool of workers speaking WHOIS over TCP, with
//! registrar referral following, retries and encoding fallback.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gois_lib::{compile, generate, BatchEngine, DomainSource, NullSink, QueryConfig, WhoisClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (plan, total) = compile("[a-z]{2}.io")?;
//!     println!("{} candidates", total);
//!
//!     let config = QueryConfig::default().with_concurrency(20);
//!     let engine = BatchEngine::new(WhoisClient::new()?, &config);
//!     let summary = engine
//!         .run_batch(DomainSource::from(generate(plan)), &mut NullSink)
//!         .await;
//!     println!("{} processed, {} failed", summary.processed, summary.failed);
//!     Ok(())
//! }
//! ```

// Re-export main public API types and functions
// This makes them available as gois_lib::TypeName
pub use analyzer::{Analyzer, DomainStatus};
pub use config::{
    load_env_config, parse_duration_string, ConfigManager, DefaultsConfig, EnvConfig, FileConfig,
};
pub use engine::{
    progress_interval, run_with_retries, AttemptState, BatchEngine, DomainSource, NullSink,
    OutcomeSink, RetryPolicy, WhoisFetch,
};
pub use error::{CompileError, WhoisError};
pub use generate::{generate, generate_with_capacity, DomainStream};
pub use pattern::{compile, CharsetGroup, PatternPlan, TotalCount};
pub use protocols::{
    normalize_domain, ProxyConfig, ProxyKind, ServerTable, WhoisClient, WhoisClientBuilder,
};
pub use types::{BatchSummary, OutputMode, QueryConfig, QueryOutcome, QueryResult};
pub use utils::{load_domains_from_file, parse_domain_list};

// Public modules
pub mod generate;
pub mod pattern;
pub mod protocols;

// Internal modules - their public items are re-exported above
mod analyzer;
mod config;
mod engine;
mod error;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, WhoisError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
