//! Document sources.
//!
//! A [`Fetcher`] turns a URI into the raw bytes of a document. The
//! [`DefaultFetcher`] reads `file:` URIs and plain paths from disk and, with
//! the `http` feature, `http:` and `https:` URIs over the network.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Failure to fetch, decode, or parse a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error opening HTML document: {message}")]
pub struct DocumentError {
    pub message: String,
}

impl DocumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Settings for [`DefaultFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Whole-request timeout for network fetches.
    pub timeout: Duration,
    pub user_agent: String,
    /// Bodies larger than this are rejected.
    pub max_body_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("grok/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A pluggable source of document bytes.
pub trait Fetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, DocumentError>;
}

/// What a URI string points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Http(String),
}

impl Location {
    /// Classify a URI. Strings without a scheme are filesystem paths.
    pub fn parse(uri: &str) -> Result<Location, DocumentError> {
        let Some((scheme, rest)) = split_scheme(uri) else {
            return Ok(Location::File(PathBuf::from(uri)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(Location::Http(uri.to_string())),
            "file" => {
                // file:///abs, file://localhost/abs, or file:relative
                let path = match rest.strip_prefix("//") {
                    Some(authority_and_path) => {
                        let slash = authority_and_path.find('/').ok_or_else(|| {
                            DocumentError::new(format!("Invalid file URI: {uri}"))
                        })?;
                        let (host, path) = authority_and_path.split_at(slash);
                        if !host.is_empty() && !host.eq_ignore_ascii_case("localhost") {
                            return Err(DocumentError::new(format!(
                                "Remote file URIs are not supported: {uri}"
                            )));
                        }
                        path
                    }
                    None => rest,
                };
                Ok(Location::File(PathBuf::from(percent_decode(path)?)))
            }
            other => Err(DocumentError::new(format!("Unsupported URI scheme '{other}'"))),
        }
    }
}

/// Split `scheme:rest` when `scheme` is a valid URI scheme of two or more
/// characters, so Windows drive letters stay paths.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let colon = uri.find(':')?;
    let scheme = &uri[..colon];
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| (scheme, &uri[colon + 1..]))
}

fn percent_decode(input: &str) -> Result<String, DocumentError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| DocumentError::new(format!("Invalid percent escape in '{input}'")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| DocumentError::new(format!("Path is not UTF-8: '{input}'")))
}

/// Read all of `reader`, failing once more than `limit` bytes arrive.
pub fn read_limited(reader: impl Read, limit: u64, what: &str) -> Result<Vec<u8>, DocumentError> {
    let mut body = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| DocumentError::new(format!("Failed to read {what}: {e}")))?;
    if body.len() as u64 > limit {
        return Err(DocumentError::new(format!(
            "{what} exceeds the {limit} byte limit"
        )));
    }
    Ok(body)
}

/// Reads files from disk and, with the `http` feature, fetches over HTTP.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    config: FetchConfig,
}

impl DefaultFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn read_limited(&self, reader: impl Read, what: &str) -> Result<Vec<u8>, DocumentError> {
        read_limited(reader, self.config.max_body_bytes, what)
    }

    fn fetch_file(&self, path: PathBuf) -> Result<Vec<u8>, DocumentError> {
        let file = File::open(&path)
            .map_err(|e| DocumentError::new(format!("Failed to open {}: {e}", path.display())))?;
        self.read_limited(file, &path.display().to_string())
    }

    #[cfg(feature = "http")]
    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, DocumentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| DocumentError::new(format!("Failed to build HTTP client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| DocumentError::new(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocumentError::new(format!("{url} returned HTTP {status}")));
        }
        self.read_limited(response, url)
    }

    #[cfg(not(feature = "http"))]
    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, DocumentError> {
        Err(DocumentError::new(format!(
            "Cannot fetch {url}: built without the `http` feature"
        )))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, DocumentError> {
        match Location::parse(uri)? {
            Location::File(path) => self.fetch_file(path),
            Location::Http(url) => self.fetch_http(&url),
        }
    }
}

/// Serves fixed bodies keyed by URI. Lets tests drive `from_uri` offline.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    bodies: Vec<(String, Vec<u8>)>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.push((uri.to_string(), body.into()));
        self
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, DocumentError> {
        self.bodies
            .iter()
            .find(|(known, _)| known == uri)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| DocumentError::new(format!("No such document: {uri}")))
    }
}
