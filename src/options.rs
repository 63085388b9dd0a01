//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::reader::ReaderConfig;

/// Service address used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Path of the streaming chat endpoint.
pub const DEFAULT_STREAM_PATH: &str = "/chat/stream";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "CHATSTREAM_BASE_URL";

/// Environment variable holding a request timeout in seconds.
pub const TIMEOUT_ENV: &str = "CHATSTREAM_TIMEOUT_SECS";

/// Options for [`ChatClient`](crate::client::ChatClient).
///
/// # Example
/// ```rust
/// use chatstream::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("http://localhost:8000")
///     .with_timeout(Duration::from_secs(30))
///     .with_header("x-trace".to_string(), "on".to_string());
///
/// assert_eq!(options.stream_path, "/chat/stream");
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the chat service
    pub base_url: String,

    /// Path of the streaming endpoint, relative to `base_url`
    pub stream_path: String,

    /// Request timeout. Applies to the whole response, stream included.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Limits applied while reading event streams
    pub reader: ReaderConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            timeout: None,
            proxy: None,
            extra_headers: None,
            reader: ReaderConfig::default(),
        }
    }

    /// Defaults overridden by `CHATSTREAM_BASE_URL` and `CHATSTREAM_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut options = match std::env::var(BASE_URL_ENV) {
            Ok(base_url) if !base_url.is_empty() => Self::new(base_url),
            _ => Self::default(),
        };

        if let Some(secs) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            options.timeout = Some(Duration::from_secs(secs));
        }

        options
    }

    pub fn with_stream_path(mut self, stream_path: impl Into<String>) -> Self {
        self.stream_path = stream_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    pub fn with_reader_config(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    /// Join `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        let options = ClientOptions::new("http://localhost:8000/");
        assert_eq!(options.endpoint("/chat"), "http://localhost:8000/chat");
        assert_eq!(options.endpoint("chat"), "http://localhost:8000/chat");

        let options = ClientOptions::new("http://localhost:8000/api");
        assert_eq!(
            options.endpoint(&options.stream_path),
            "http://localhost:8000/api/chat/stream"
        );
    }

    #[test]
    fn test_with_header_accumulates() {
        let options = ClientOptions::default()
            .with_header("a".to_string(), "1".to_string())
            .with_header("b".to_string(), "2".to_string());

        let headers = options.extra_headers.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["a"], "1");
    }
}
