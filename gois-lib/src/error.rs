//! Error handling for pattern compilation and WHOIS operations.
//!
//! Two error families live here: [`CompileError`] for the pattern grammar,
//! and [`WhoisError`] for everything that can go wrong while resolving a
//! server, talking to it, or loading configuration.

use std::time::Duration;
use thiserror::Error;

/// Failures while compiling a `[charset]{n}` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The pattern contains no bracket expression at all.
    #[error("no pattern found in '{pattern}': use [charset]{{n}}, e.g. [a-z]{{3}}.com")]
    NoPatternFound { pattern: String },

    /// A bracket expression expanded to zero characters.
    #[error("charset [{charset}] is empty")]
    EmptyCharset { charset: String },

    /// A `{n}` suffix that is zero or not representable.
    #[error("invalid repeat count '{value}' in '{segment}'")]
    InvalidRepeat { segment: String, value: String },
}

/// Main error type for WHOIS operations.
///
/// Only the network-class variants are worth retrying; see
/// [`WhoisError::is_retryable`].
#[derive(Debug, Clone, Error)]
pub enum WhoisError {
    /// Malformed domain input (fewer than two labels, empty TLD).
    #[error("invalid domain: {domain}")]
    BadDomain { domain: String },

    /// The TLD has no known server and IANA did not name one.
    #[error("no whois server found for TLD: {tld}")]
    NoWhoisServerFound { tld: String },

    /// Dial, write or read failure on the WHOIS socket.
    #[error("error querying {server} for {query}: {message}")]
    Socket {
        server: String,
        query: String,
        message: String,
    },

    /// The connection deadline fired before the exchange completed.
    #[error("timeout after {duration:?} querying {server} for {query}")]
    Timeout {
        server: String,
        query: String,
        duration: Duration,
    },

    /// SOCKS5 dial or authentication failure.
    #[error("proxy error: {message}")]
    Proxy { message: String },

    /// A proxy URI that could not be understood.
    #[error("invalid proxy '{value}': {reason}")]
    InvalidProxy { value: String, reason: String },

    /// A TLD server table that could not be parsed.
    #[error("tld data error at {source_name}: {message}")]
    ServerTable {
        source_name: String,
        message: String,
    },

    /// Configuration errors (invalid settings, unparsable files).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// File I/O errors when reading domain lists or config files.
    #[error("file error at '{path}': {message}")]
    File { path: String, message: String },
}

impl WhoisError {
    pub fn bad_domain<D: Into<String>>(domain: D) -> Self {
        Self::BadDomain {
            domain: domain.into(),
        }
    }

    pub fn no_server<T: Into<String>>(tld: T) -> Self {
        Self::NoWhoisServerFound { tld: tld.into() }
    }

    pub fn socket<S, Q, M>(server: S, query: Q, message: M) -> Self
    where
        S: Into<String>,
        Q: Into<String>,
        M: ToString,
    {
        Self::Socket {
            server: server.into(),
            query: query.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout<S: Into<String>, Q: Into<String>>(
        server: S,
        query: Q,
        duration: Duration,
    ) -> Self {
        Self::Timeout {
            server: server.into(),
            query: query.into(),
            duration,
        }
    }

    pub fn proxy<M: Into<String>>(message: M) -> Self {
        Self::Proxy {
            message: message.into(),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn file_error<P: Into<String>, M: ToString>(path: P, message: M) -> Self {
        Self::File {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error suggests the operation should be retried.
    ///
    /// Structural failures (bad input, unknown TLD) cannot change on a second
    /// attempt, so only transport failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Socket { .. } | Self::Timeout { .. } | Self::Proxy { .. }
        )
    }
}

impl From<serde_json::Error> for WhoisError {
    fn from(err: serde_json::Error) -> Self {
        Self::ServerTable {
            source_name: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for WhoisError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("failed to parse TOML configuration: {}", err))
    }
}
