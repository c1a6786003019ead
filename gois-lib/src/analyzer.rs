//! Keyword heuristics for registration status.
//!
//! WHOIS text has no common schema, so status is guessed from phrases that
//! registries use for free and taken names. The verdict is advisory: it
//! feeds summary counters and simple-mode output, never success accounting.

use crate::types::QueryResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration status guessed from WHOIS text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Available,
    Registered,
    Unknown,
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainStatus::Available => write!(f, "available"),
            DomainStatus::Registered => write!(f, "registered"),
            DomainStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Phrases registries use when a name is free.
const AVAILABLE_KEYWORDS: &[&str] = &[
    "no match",
    "not found",
    "no entries found",
    "no data found",
    "not registered",
    "available for registration",
    "status: free",
    "status: available",
    "no matching record",
    "nothing found",
    "no object found",
    "domain not found",
    "is available",
    "is free",
    "未找到",
    "无匹配",
];

/// Fields that only appear in records of registered names.
const REGISTERED_KEYWORDS: &[&str] = &[
    "registrar:",
    "registrant:",
    "creation date:",
    "created:",
    "expiration date:",
    "expires:",
    "expiry date:",
    "registry expiry date:",
    "domain status:",
    "name server:",
    "nameserver:",
    "dnssec:",
    "注册商",
    "注册人",
    "创建时间",
    "到期时间",
];

/// Default classifier over a [`QueryResult`].
#[derive(Debug, Clone)]
pub struct Analyzer {
    available: Vec<String>,
    registered: Vec<String>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            available: AVAILABLE_KEYWORDS.iter().map(|k| k.to_lowercase()).collect(),
            registered: REGISTERED_KEYWORDS.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Classify the combined registry and registrar text.
    ///
    /// Any registered-style field wins over availability phrases, since
    /// "not found" also shows up inside records of taken names.
    pub fn classify(&self, result: &QueryResult) -> DomainStatus {
        let combined = format!("{}\n{}", result.registry_result, result.registrar_result)
            .to_lowercase();
        self.classify_text(&combined)
    }

    /// Classify already lower-cased text.
    fn classify_text(&self, text: &str) -> DomainStatus {
        if text.trim().is_empty() {
            return DomainStatus::Unknown;
        }

        let hits = |keywords: &[String]| keywords.iter().filter(|k| text.contains(k.as_str())).count();
        let available = hits(&self.available);
        let registered = hits(&self.registered);

        match (available, registered) {
            (_, r) if r > 0 => DomainStatus::Registered,
            (a, 0) if a > 0 => DomainStatus::Available,
            _ => DomainStatus::Unknown,
        }
    }
}
