//! Client configuration: credentials, endpoints and transport settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// Largest document the ingest service accepts.
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

const DEFAULT_API_BASE: &str = "http://localhost:5000/api/v1";
const DEFAULT_CORE_BASE: &str = "http://localhost:5000/api";
const DEFAULT_INGEST_BASE: &str = "http://localhost:8090";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Base URLs of the three backend services.
///
/// Paths below the bases are fixed by the backend:
/// - `{api_base}/inference`
/// - `{core_base}/full-analysis`
/// - `{core_base}/simplify?stream=1`
/// - `{ingest_base}/ingest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base: String,
    pub core_base: String,
    pub ingest_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            core_base: DEFAULT_CORE_BASE.to_string(),
            ingest_base: DEFAULT_INGEST_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every service at one host, using the default path prefixes.
    pub fn from_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            api_base: format!("{}/api/v1", host),
            core_base: format!("{}/api", host),
            ingest_base: host.to_string(),
        }
    }

    pub fn inference_url(&self) -> String {
        format!("{}/inference", self.api_base.trim_end_matches('/'))
    }

    pub fn full_analysis_url(&self) -> String {
        format!("{}/full-analysis", self.core_base.trim_end_matches('/'))
    }

    pub fn stream_url(&self) -> String {
        format!("{}/simplify?stream=1", self.core_base.trim_end_matches('/'))
    }

    pub fn ingest_url(&self) -> String {
        format!("{}/ingest", self.ingest_base.trim_end_matches('/'))
    }
}

/// Options shared by every request the client makes.
///
/// # Example
/// ```rust
/// use plainclause::options::{ClientOptions, Endpoints};
/// use std::time::Duration;
///
/// let options = ClientOptions::new()
///     .with_api_key("secret")
///     .with_timeout(Duration::from_secs(30))
///     .with_endpoints(Endpoints::from_host("https://legal.example.com"));
///
/// assert_eq!(
///     options.endpoints.full_analysis_url(),
///     "https://legal.example.com/api/full-analysis"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout. Bounds single-shot calls as a whole; for event
    /// streams it bounds connecting and the silence between two reads.
    pub timeout: Option<Duration>,

    /// Credential sent on every request. Requests are still sent without one;
    /// the server decides.
    pub api_key: Option<SecretString>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Upload size limit enforced before any bytes are sent.
    pub max_upload_bytes: u64,

    pub endpoints: Endpoints,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            api_key: None,
            proxy: None,
            extra_headers: None,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from `PLAINCLAUSE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientOptions::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut options = Self::default();

        if let Some(base) = get("PLAINCLAUSE_API_BASE") {
            options.endpoints.api_base = base;
        }
        if let Some(base) = get("PLAINCLAUSE_CORE_BASE") {
            options.endpoints.core_base = base;
        }
        if let Some(base) = get("PLAINCLAUSE_INGEST_BASE") {
            options.endpoints.ingest_base = base;
        }
        if let Some(key) = get("PLAINCLAUSE_API_KEY") {
            options.api_key = Some(SecretString::new(key));
        }
        if let Some(proxy) = get("PLAINCLAUSE_PROXY") {
            options.proxy = Some(proxy);
        }
        if let Some(secs) = get("PLAINCLAUSE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ClientError::Config(format!("PLAINCLAUSE_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            options.timeout = Some(Duration::from_secs(secs));
        }

        Ok(options)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}
