//! WHOIS protocol client (RFC 3912) over raw TCP.
//!
//! A query is one line, `<domain>\r\n`, sent to port 43; the server answers
//! with free text and closes the connection. Lookups go to the TLD's registry
//! server first, then to the registrar server the registry refers to, if any.

use super::encoding::decode_text;
use super::proxy::{ProxyConfig, ProxyKind};
use super::servers::ServerTable;
use crate::error::WhoisError;
use crate::types::QueryResult;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

/// Well-known WHOIS port.
pub const DEFAULT_WHOIS_PORT: u16 = 43;

/// Server asked for the WHOIS host of TLDs missing from the table.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

/// Responses up to this size are read line by line as UTF-8.
pub const MAX_BUFFERED_RESPONSE: usize = 256 * 1024;

/// Hard cap on bytes kept from a single response.
pub const MAX_RAW_RESPONSE: usize = 512 * 1024;

const IANA_SERVER_PATTERN: &str = r"(?mi)^.*whois:.*$";
const REGISTRAR_SERVER_PATTERNS: [&str; 2] =
    [r"(?mi)^.*whois server.*$", r"(?mi)^.*registrar whois.*$"];

/// Builder for [`WhoisClient`].
#[derive(Debug, Clone)]
pub struct WhoisClientBuilder {
    timeout: Duration,
    proxy: Option<ProxyConfig>,
    servers: Option<Arc<ServerTable>>,
    port: u16,
    iana_server: String,
}

impl Default for WhoisClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            proxy: None,
            servers: None,
            port: DEFAULT_WHOIS_PORT,
            iana_server: IANA_WHOIS_SERVER.to_string(),
        }
    }
}

impl WhoisClientBuilder {
    /// Deadline for dialing and for each full request/response exchange.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Share an existing TLD table. Defaults to [`ServerTable::builtin`].
    pub fn servers(mut self, servers: Arc<ServerTable>) -> Self {
        self.servers = Some(servers);
        self
    }

    /// Port used for every WHOIS server, IANA included.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn iana_server<S: Into<String>>(mut self, server: S) -> Self {
        self.iana_server = server.into();
        self
    }

    pub fn build(self) -> Result<WhoisClient, WhoisError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| WhoisError::config(format!("invalid referral pattern: {}", e)))
        };

        if let Some(proxy) = &self.proxy {
            if proxy.kind() == ProxyKind::Direct {
                tracing::warn!(
                    proxy = %proxy,
                    "only socks5 proxies are supported; connecting directly"
                );
            }
        }

        Ok(WhoisClient {
            timeout: self.timeout,
            proxy: self.proxy.filter(|p| p.kind() == ProxyKind::Socks5),
            servers: self
                .servers
                .unwrap_or_else(|| Arc::new(ServerTable::builtin())),
            port: self.port,
            iana_server: self.iana_server,
            iana_pattern: compile(IANA_SERVER_PATTERN)?,
            registrar_patterns: [
                compile(REGISTRAR_SERVER_PATTERNS[0])?,
                compile(REGISTRAR_SERVER_PATTERNS[1])?,
            ],
        })
    }
}

/// WHOIS client shared by every worker of a batch.
///
/// Holds no per-query state; the only mutation is recording servers
/// discovered through IANA in the shared [`ServerTable`].
#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
    /// Only ever a SOCKS5 proxy; other schemes are dropped at build time.
    proxy: Option<ProxyConfig>,
    servers: Arc<ServerTable>,
    port: u16,
    iana_server: String,
    iana_pattern: Regex,
    registrar_patterns: [Regex; 2],
}

impl WhoisClient {
    /// Client with the built-in server table and default settings.
    pub fn new() -> Result<Self, WhoisError> {
        Self::builder().build()
    }

    pub fn builder() -> WhoisClientBuilder {
        WhoisClientBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn servers(&self) -> &Arc<ServerTable> {
        &self.servers
    }

    /// Look up `domain`, following one registrar referral.
    ///
    /// With `whois_server` set, that host is queried instead of resolving
    /// one for the TLD. A failed referral query is not an error: the result
    /// simply has an empty `registrar_result`.
    ///
    /// # Errors
    ///
    /// - [`WhoisError::BadDomain`] before any network activity
    /// - [`WhoisError::NoWhoisServerFound`] when neither the table nor IANA
    ///   knows the TLD
    /// - transport errors from the registry query
    pub async fn fetch(
        &self,
        domain: &str,
        whois_server: Option<&str>,
    ) -> Result<QueryResult, WhoisError> {
        let (domain, tld) = normalize_domain(domain)?;

        let server = match whois_server.map(str::trim).filter(|s| !s.is_empty()) {
            Some(server) => server.to_string(),
            None => self.find_whois_server(&tld).await?,
        };

        let registry_result = self.query(&domain, &server).await?;

        let registrar_result = match self.extract_registrar_server(&registry_result) {
            Some(registrar) => match self.query(&domain, &registrar).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(%domain, %registrar, error = %e, "registrar referral failed");
                    String::new()
                }
            },
            None => String::new(),
        };

        Ok(QueryResult {
            registry_result,
            registrar_result,
        })
    }

    /// Resolve the registry server for `tld`, asking IANA on a table miss.
    pub async fn find_whois_server(&self, tld: &str) -> Result<String, WhoisError> {
        if let Some(server) = self.servers.get(tld) {
            return Ok(server);
        }

        tracing::debug!(tld, iana = %self.iana_server, "tld not in table, asking iana");
        let response = self.query(tld, &self.iana_server).await?;

        match self.extract_iana_server(&response) {
            Some(server) => {
                self.servers.insert(tld, &server);
                Ok(server)
            }
            None => Err(WhoisError::no_server(tld)),
        }
    }

    /// Send one WHOIS query and read the full response.
    pub async fn query(&self, query: &str, server: &str) -> Result<String, WhoisError> {
        tracing::trace!(server, query, "whois query");
        let mut stream = self.dial(server, query).await?;

        let exchange = async {
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;
            read_response(&mut stream).await
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(WhoisError::socket(server, query, e)),
            Err(_) => Err(WhoisError::timeout(server, query, self.timeout)),
        }
    }

    async fn dial(&self, host: &str, query: &str) -> Result<TcpStream, WhoisError> {
        match &self.proxy {
            Some(proxy) => self.dial_socks5(proxy, host).await,
            None => {
                match tokio::time::timeout(self.timeout, TcpStream::connect((host, self.port)))
                    .await
                {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(e)) => Err(WhoisError::socket(host, query, e)),
                    Err(_) => Err(WhoisError::timeout(host, query, self.timeout)),
                }
            }
        }
    }

    async fn dial_socks5(&self, proxy: &ProxyConfig, host: &str) -> Result<TcpStream, WhoisError> {
        let address = proxy.address();
        let target = (host, self.port);

        let connect = async {
            match proxy.credentials() {
                Some((username, password)) => {
                    Socks5Stream::connect_with_password(address.as_str(), target, username, password)
                        .await
                }
                None => Socks5Stream::connect(address.as_str(), target).await,
            }
        };

        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => Ok(stream.into_inner()),
            Ok(Err(e)) => Err(WhoisError::proxy(format!(
                "failed to reach {}:{} via {}: {}",
                host, self.port, address, e
            ))),
            Err(_) => Err(WhoisError::proxy(format!(
                "timed out reaching {}:{} via {}",
                host, self.port, address
            ))),
        }
    }

    /// Server named on the first non-empty `whois:` line of an IANA answer.
    pub fn extract_iana_server(&self, response: &str) -> Option<String> {
        self.iana_pattern
            .find_iter(response)
            .filter_map(|m| value_after_colon(m.as_str()))
            .map(str::to_string)
            .next()
    }

    /// Registrar server referred to by a registry answer.
    ///
    /// Lines mentioning "whois server" are tried before "registrar whois";
    /// URL schemes and stray slashes are stripped from the value.
    pub fn extract_registrar_server(&self, response: &str) -> Option<String> {
        self.registrar_patterns
            .iter()
            .flat_map(|pattern| pattern.find_iter(response))
            .filter_map(|m| value_after_colon(m.as_str()))
            .map(clean_host)
            .find(|host| !host.is_empty())
    }
}

/// Trimmed text after the first colon, if any.
fn value_after_colon(line: &str) -> Option<&str> {
    let (_, value) = line.split_once(':')?;
    Some(value.trim()).filter(|v| !v.is_empty())
}

fn clean_host(value: &str) -> String {
    let value = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
        .unwrap_or(value);
    value.trim_matches(|c| c == '/' || c == '\\').trim().to_string()
}

/// Split user input into a normalized domain and its TLD.
///
/// Strips an `http://` or `https://` prefix and anything after the first
/// `/`, then lowercases.
///
/// ```
/// use gois_lib::protocols::whois::normalize_domain;
///
/// let (domain, tld) = normalize_domain("https://Example.COM/path").unwrap();
/// assert_eq!(domain, "example.com");
/// assert_eq!(tld, "com");
/// assert!(normalize_domain("localhost").is_err());
/// ```
pub fn normalize_domain(input: &str) -> Result<(String, String), WhoisError> {
    let lowered = input.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("http://")
        .or_else(|| lowered.strip_prefix("https://"))
        .unwrap_or(&lowered);
    let domain = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();

    let labels: Vec<&str> = domain.split('.').collect();
    match labels.last() {
        Some(tld) if labels.len() >= 2 && !tld.is_empty() => {
            Ok((domain.to_string(), (*tld).to_string()))
        }
        _ => Err(WhoisError::bad_domain(input)),
    }
}

/// Read a WHOIS response to EOF.
///
/// Lines are collected as UTF-8 (line endings normalized to `\n`) while the
/// response stays within [`MAX_BUFFERED_RESPONSE`]. Invalid UTF-8, an
/// oversized response, or a read error mid-stream switch to a raw read of
/// up to [`MAX_RAW_RESPONSE`] bytes, decoded with [`decode_text`] and
/// normalized the same way. An error before any byte arrived is returned
/// as-is.
pub async fn read_response<R>(reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut text = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let budget = (MAX_BUFFERED_RESPONSE + 1 - text.len()) as u64;
        let read = (&mut reader).take(budget).read_until(b'\n', &mut line).await;
        match read {
            Ok(0) => return Ok(text),
            Ok(_) if text.len() + line.len() <= MAX_BUFFERED_RESPONSE => {
                if let Ok(decoded) = std::str::from_utf8(&line) {
                    let decoded = decoded.strip_suffix('\n').unwrap_or(decoded);
                    text.push_str(decoded.strip_suffix('\r').unwrap_or(decoded));
                    text.push('\n');
                    continue;
                }
            }
            Ok(_) => {}
            Err(e) if text.is_empty() && line.is_empty() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "line read failed, keeping partial response"),
        }
        break;
    }

    let mut raw = text.into_bytes();
    raw.extend_from_slice(&line);
    let budget = MAX_RAW_RESPONSE.saturating_sub(raw.len()) as u64;
    if let Err(e) = (&mut reader).take(budget).read_to_end(&mut raw).await {
        tracing::debug!(error = %e, "raw read ended early");
    }
    raw.truncate(MAX_RAW_RESPONSE);

    Ok(decode_text(&raw).replace("\r\n", "\n"))
}
