//! HTTP client for the chat service and its error type.

use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::StreamEvent;
use crate::http::{add_extra_headers, build_http_client};
use crate::model::{ChatRequest, ChatResponse, ErrorBody, HelloResponse, ValidationError};
use crate::options::ClientOptions;
use crate::reader::{ReaderError, StreamSummary, StreamingEventReader};
use crate::sse::SseResponseExt;

const EVENT_STREAM: &str = "text/event-stream";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Service error ({status}): {detail}")]
    Service { status: StatusCode, detail: String },

    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Stream error: {0}")]
    Stream(#[from] ReaderError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the call ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Stream(e) if e.is_cancelled())
    }
}

/// Client for the chat service.
///
/// # Example
/// ```no_run
/// use chatstream::{ChatClient, ChatRequest, ClientOptions, StreamEvent};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ChatClient::new(ClientOptions::new("http://localhost:8000"))?;
///
///     let request = ChatRequest::search("rust async streams").with_max_results(5);
///     client
///         .chat_stream(&request, CancellationToken::new(), |event| match event {
///             StreamEvent::Token(text) => print!("{text}"),
///             StreamEvent::Message(response) => println!("\n{} result(s)", response.result_count()),
///             StreamEvent::Other { .. } => {}
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct ChatClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl ChatClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        Url::parse(&options.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{}': {}", options.base_url, e)))?;

        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Greeting probe, `GET /hello/{input}`.
    pub async fn hello(&self, input: &str) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.options.base_url)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("hello")
            .push(input);

        let req = add_extra_headers(self.http.get(url), &self.options.extra_headers);
        let response = Self::check_status(req.send().await?).await?;

        let hello: HelloResponse = response.json().await?;
        Ok(hello.message)
    }

    /// Non-streaming chat, `POST /chat`.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        request.validate()?;

        let req = self
            .http
            .post(self.options.endpoint("/chat"))
            .header(CONTENT_TYPE, "application/json");
        let req = add_extra_headers(req, &self.options.extra_headers);

        let response = Self::check_status(req.json(request).send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Streaming chat: dispatch every event of the response to `on_event`.
    ///
    /// `cancel` aborts both the pending request and the body read, ending
    /// the call with a cancelled [`ReaderError`].
    pub async fn chat_stream<F>(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        on_event: F,
    ) -> Result<StreamSummary, ClientError>
    where
        F: FnMut(StreamEvent<ChatResponse>),
    {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.open_stream(request) => Some(opened),
        };
        let response = match opened {
            Some(response) => response?,
            None => return Err(ReaderError::Cancelled { delivered: 0 }.into()),
        };

        let mut reader = StreamingEventReader::new()
            .with_config(self.options.reader.clone())
            .with_cancellation(cancel);

        let summary = reader.consume(response.bytes_stream(), on_event).await?;
        debug!(events = summary.events, faults = summary.faults, "chat stream finished");
        Ok(summary)
    }

    /// Streaming chat as a pull-based stream of events.
    pub async fn chat_events(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<StreamEvent<ChatResponse>, ReaderError>> + Send, ClientError>
    {
        let response = self.open_stream(request).await?;
        let reader = StreamingEventReader::new().with_config(self.options.reader.clone());
        Ok(response.sse_events(reader))
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<reqwest::Response, ClientError> {
        request.validate()?;

        let url = self.options.endpoint(&self.options.stream_path);
        debug!(%url, tool = ?request.tool, "opening chat stream");

        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM);
        let req = add_extra_headers(req, &self.options.extra_headers);

        Self::check_status(req.json(request).send().await?).await
    }

    /// Turn non-success statuses into [`ClientError::Service`].
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::handle_error_response(status, &body))
    }

    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        let detail = match serde_json::from_str::<ErrorBody>(body) {
            Ok(error_body) => error_body.describe(),
            Err(_) => body.to_string(),
        };
        ClientError::Service { status, detail }
    }
}
