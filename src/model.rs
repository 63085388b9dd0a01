//! Request and response models of the chat service.

use nonempty::NonEmpty;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Results requested when the caller does not say otherwise.
pub const DEFAULT_MAX_RESULTS: u8 = 3;

/// Largest number of search results the service accepts.
pub const MAX_RESULTS_LIMIT: u8 = 10;

/// Search region meaning "no region".
pub const DEFAULT_REGION: &str = "wt-wt";

/// Tools the service agent can run on behalf of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    DuckduckgoSearch,
    FetchUrl,
}

impl Tool {
    /// Wire name of the tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::DuckduckgoSearch => "duckduckgo_search",
            Tool::FetchUrl => "fetch_url",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "duckduckgo_search" => Some(Tool::DuckduckgoSearch),
            "fetch_url" => Some(Tool::FetchUrl),
            _ => None,
        }
    }
}

/// Safe-search level passed to the web search tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Moderate,
    Strict,
}

/// Problems found before a request is sent.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("max_results must be between 1 and {max}, got {0}", max = MAX_RESULTS_LIMIT)]
    MaxResultsOutOfRange(u8),

    #[error("url is required when using tool 'fetch_url'")]
    MissingUrl,

    #[error("invalid url '{0}': expected an absolute http(s) URL")]
    InvalidUrl(String),
}

/// A user query, optionally naming the tool to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// User prompt or search query.
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,

    /// Page to fetch when `tool` is [`Tool::FetchUrl`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_results")]
    pub max_results: u8,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub safesearch: SafeSearch,
}

fn default_max_results() -> u8 {
    DEFAULT_MAX_RESULTS
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl ChatRequest {
    /// Plain chat message without a tool.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool: None,
            url: None,
            max_results: DEFAULT_MAX_RESULTS,
            region: DEFAULT_REGION.to_string(),
            safesearch: SafeSearch::default(),
        }
    }

    /// Web search for `query`.
    pub fn search(query: impl Into<String>) -> Self {
        Self::new(query).with_tool(Tool::DuckduckgoSearch)
    }

    /// Fetch and summarize `url`.
    pub fn fetch(message: impl Into<String>, url: impl Into<String>) -> Self {
        let mut request = Self::new(message).with_tool(Tool::FetchUrl);
        request.url = Some(url.into());
        request
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_max_results(mut self, max_results: u8) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_safesearch(mut self, safesearch: SafeSearch) -> Self {
        self.safesearch = safesearch;
        self
    }

    /// Check the constraints the service enforces, without a round trip.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(ValidationError::MaxResultsOutOfRange(self.max_results));
        }

        if let Some(url) = &self.url {
            let valid = Url::parse(url)
                .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
                .unwrap_or(false);
            if !valid {
                return Err(ValidationError::InvalidUrl(url.clone()));
            }
        }

        if self.tool == Some(Tool::FetchUrl) && self.url.is_none() {
            return Err(ValidationError::MissingUrl);
        }

        Ok(())
    }
}

/// One web search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// Metadata extracted from a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlContent {
    /// Final URL after redirects.
    pub url: String,
    pub status_code: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// First `h1`/`h2` headings of the page.
    #[serde(default, deserialize_with = "non_empty_or_none")]
    pub headings: Option<NonEmpty<String>>,
    /// Leading paragraph text.
    #[serde(default)]
    pub preview: Option<String>,
}

/// Final result of a chat request, carried by the `message` event.
///
/// Every field is optional on the wire so that partial results and tools
/// newer than this client still arrive as a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: String,

    #[serde(default)]
    pub used_tool: bool,

    /// Name of the tool that ran, see [`ChatResponse::known_tool`].
    #[serde(default)]
    pub tool: Option<String>,

    #[serde(default, deserialize_with = "non_empty_or_none")]
    pub results: Option<NonEmpty<SearchResult>>,

    #[serde(default)]
    pub url_content: Option<UrlContent>,
}

impl ChatResponse {
    pub fn search_results(&self) -> impl Iterator<Item = &SearchResult> {
        self.results.iter().flat_map(|results| results.iter())
    }

    /// The tool that ran, if this client knows it.
    pub fn known_tool(&self) -> Option<Tool> {
        self.tool.as_deref().and_then(Tool::from_name)
    }

    pub fn result_count(&self) -> usize {
        self.results.as_ref().map_or(0, NonEmpty::len)
    }
}

/// Body of `GET /hello/{input}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HelloResponse {
    pub message: String,
}

/// Error body returned by the service on non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn describe(&self) -> String {
        match &self.detail {
            serde_json::Value::String(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Lists the service sends as absent, `null` or `[]` all become `None`.
fn non_empty_or_none<'de, D, T>(deserializer: D) -> Result<Option<NonEmpty<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(items.and_then(NonEmpty::from_vec))
}
