//! Protocol implementations for WHOIS lookups.
//!
//! This module contains the socket client, the TLD server table it resolves
//! against, proxy handling, and response decoding.

/// Response byte decoding with encoding fallbacks
pub mod encoding;

/// Proxy URI parsing
pub mod proxy;

/// TLD to WHOIS server table
pub mod servers;

/// WHOIS protocol client
pub mod whois;

// Re-export commonly used functions and types
pub use encoding::decode_text;
pub use proxy::{ProxyConfig, ProxyKind};
pub use servers::{get_builtin_server_map, ServerTable};
pub use whois::{normalize_domain, WhoisClient, WhoisClientBuilder};
