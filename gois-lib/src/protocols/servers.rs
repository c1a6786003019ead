//! TLD to WHOIS server mappings.
//!
//! A [`ServerTable`] is loaded once when a client is built and then shared
//! by every worker. Servers learned from IANA referrals are written back
//! into it for the rest of the process; nothing is persisted.

use crate::error::WhoisError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded TLD → WHOIS host table.
///
/// Concurrent inserts for the same TLD are last-writer-wins; a lost race
/// only costs a redundant IANA lookup.
#[derive(Debug, Default)]
pub struct ServerTable {
    servers: Mutex<HashMap<String, String>>,
}

impl ServerTable {
    /// An empty table: every lookup goes to IANA.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in table of common registries.
    pub fn builtin() -> Self {
        Self::from_map(get_builtin_server_map())
    }

    /// Build a table from any TLD → host pairs.
    pub fn from_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let table = Self::empty();
        table.extend(entries);
        table
    }

    /// Parse a flat JSON object of `{ "tld": "host" }`.
    ///
    /// Non-string values are stringified rather than rejected.
    pub fn from_json_str(json: &str) -> Result<Self, WhoisError> {
        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| WhoisError::ServerTable {
                source_name: "inline json".to_string(),
                message: e.to_string(),
            })?;

        let entries = raw.into_iter().map(|(tld, value)| {
            let server = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (tld, server)
        });
        Ok(Self::from_map(entries))
    }

    /// Load a JSON table from disk.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, WhoisError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WhoisError::file_error(path.to_string_lossy(), e))?;

        Self::from_json_str(&content).map_err(|e| match e {
            WhoisError::ServerTable { message, .. } => WhoisError::ServerTable {
                source_name: path.to_string_lossy().into_owned(),
                message,
            },
            other => other,
        })
    }

    /// Merge entries into the table; later entries override earlier ones.
    pub fn extend<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut servers = self.lock();
        for (tld, server) in entries {
            let server: String = server.into();
            let server = server.trim();
            if !server.is_empty() {
                servers.insert(normalize_tld(tld.as_ref()), server.to_string());
            }
        }
    }

    pub fn get(&self, tld: &str) -> Option<String> {
        self.lock().get(&normalize_tld(tld)).cloned()
    }

    pub fn insert(&self, tld: &str, server: &str) {
        self.lock()
            .insert(normalize_tld(tld), server.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All known TLDs, sorted alphabetically.
    pub fn tlds(&self) -> Vec<String> {
        let mut tlds: Vec<String> = self.lock().keys().cloned().collect();
        tlds.sort();
        tlds
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written,
        // so a poisoned table is still usable.
        self.servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize_tld(tld: &str) -> String {
    tld.trim().trim_start_matches('.').to_lowercase()
}

/// Get the built-in WHOIS server mappings.
///
/// Covers the TLDs people query most; anything else is discovered through
/// `whois.iana.org` on first use.
pub fn get_builtin_server_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        // Verisign
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("cc", "ccwhois.verisign-grs.com"),
        ("tv", "tvwhois.verisign-grs.com"),
        // Popular gTLDs
        ("org", "whois.publicinterestregistry.org"),
        ("info", "whois.nic.info"),
        ("biz", "whois.nic.biz"),
        ("name", "whois.nic.name"),
        ("mobi", "whois.nic.mobi"),
        ("pro", "whois.nic.pro"),
        // Google Registry
        ("app", "whois.nic.google"),
        ("dev", "whois.nic.google"),
        ("page", "whois.nic.google"),
        // CentralNic managed gTLDs
        ("xyz", "whois.nic.xyz"),
        ("tech", "whois.nic.tech"),
        ("online", "whois.nic.online"),
        ("site", "whois.nic.site"),
        ("store", "whois.nic.store"),
        ("shop", "whois.nic.shop"),
        // Identity Digital
        ("io", "whois.nic.io"),
        ("ai", "whois.nic.ai"),
        ("me", "whois.nic.me"),
        ("co", "whois.nic.co"),
        // Country code TLDs
        ("us", "whois.nic.us"),
        ("uk", "whois.nic.uk"),
        ("de", "whois.denic.de"),
        ("fr", "whois.nic.fr"),
        ("nl", "whois.domain-registry.nl"),
        ("eu", "whois.eu"),
        ("ca", "whois.cira.ca"),
        ("au", "whois.auda.org.au"),
        ("jp", "whois.jprs.jp"),
        ("cn", "whois.cnnic.cn"),
        ("ru", "whois.tcinet.ru"),
        ("br", "whois.registro.br"),
        ("in", "whois.registry.in"),
        ("it", "whois.nic.it"),
        ("ch", "whois.nic.ch"),
        ("se", "whois.iis.se"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_contains_common_tlds() {
        let table = ServerTable::builtin();
        assert_eq!(table.get("com").as_deref(), Some("whois.verisign-grs.com"));
        assert_eq!(table.get("org").as_deref(), Some("whois.publicinterestregistry.org"));
        assert!(table.get("definitely-not-a-tld").is_none());
    }

    #[test]
    fn test_lookup_is_case_and_dot_insensitive() {
        let table = ServerTable::builtin();
        assert_eq!(table.get("COM"), table.get("com"));
        assert_eq!(table.get(".net"), table.get("net"));
    }

    #[test]
    fn test_insert_last_writer_wins() {
        let table = ServerTable::empty();
        assert!(table.is_empty());
        table.insert("zz", "whois.first.zz");
        table.insert("zz", "whois.second.zz");
        assert_eq!(table.get("zz").as_deref(), Some("whois.second.zz"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_extend_overrides_and_skips_blank() {
        let table = ServerTable::builtin();
        table.extend([("com", "whois.mirror.example"), ("blank", "  ")]);
        assert_eq!(table.get("com").as_deref(), Some("whois.mirror.example"));
        assert!(table.get("blank").is_none());
    }

    #[test]
    fn test_from_json_stringifies_non_strings() {
        let table =
            ServerTable::from_json_str(r#"{"com": "whois.verisign-grs.com", "num": 42}"#).unwrap();
        assert_eq!(table.get("com").as_deref(), Some("whois.verisign-grs.com"));
        assert_eq!(table.get("num").as_deref(), Some("42"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = ServerTable::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, WhoisError::ServerTable { .. }));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"example": "whois.nic.example"}"#).unwrap();
        file.flush().unwrap();

        let table = ServerTable::from_json_file(file.path()).unwrap();
        assert_eq!(table.tlds(), vec!["example".to_string()]);

        let missing = ServerTable::from_json_file("/nonexistent/tlds.json").unwrap_err();
        assert!(matches!(missing, WhoisError::File { .. }));
    }

    #[test]
    fn test_concurrent_writers() {
        let table = Arc::new(ServerTable::empty());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        table.insert(&format!("t{}", j), &format!("whois{}.example", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.len(), 50);
    }
}
