//! Utility functions for domain list handling.

use crate::error::WhoisError;
use std::path::Path;

/// Parse a newline-separated domain list.
///
/// Blank lines and `#` comments are skipped and whitespace is trimmed.
/// Entries are not validated here; malformed ones fail individually when
/// queried.
pub fn parse_domain_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read a domain list file.
///
/// # Errors
///
/// Returns [`WhoisError::File`] if the file cannot be read or contains no
/// domains.
pub fn load_domains_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, WhoisError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| WhoisError::file_error(path.to_string_lossy(), e))?;

    let domains = parse_domain_list(&content);
    if domains.is_empty() {
        return Err(WhoisError::file_error(
            path.to_string_lossy(),
            "no domains found in file",
        ));
    }

    tracing::debug!(path = %path.display(), count = domains.len(), "loaded domain list");
    Ok(domains)
}
