//! # chatstream - Streaming Chat Client
//!
//! A small async client for a chat service that answers over a
//! Server-Sent Events stream, built around an incremental event reader.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary-safe stream decoding (split characters, split separators)
//! - Typed events with forward-compatible unknown kinds
//! - Cooperative cancellation via `CancellationToken`
//! - Recoverable faults logged with `tracing` instead of aborting the stream
//!
//! ## Architecture
//!
//! - **`StreamingEventReader`**: turns a byte stream into `StreamEvent`s
//! - **`ChatClient`**: posts a `ChatRequest` and feeds the response body to the reader
//! - **`Thread`**: conversation state that events are merged into
//!
//! ## Example
//! ```no_run
//! use chatstream::{ChatClient, ChatRequest, ClientOptions, Thread};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChatClient::new(ClientOptions::from_env())?;
//!
//!     let mut thread = Thread::new();
//!     thread.push_user("What is new in Rust?");
//!     thread.begin_assistant();
//!
//!     let request = ChatRequest::search("What is new in Rust?");
//!     let summary = client
//!         .chat_stream(&request, CancellationToken::new(), |event| {
//!             thread.apply(event);
//!         })
//!         .await?;
//!
//!     println!("{} event(s): {:?}", summary.events, thread.last());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decode;
pub mod event;
pub mod http;
pub mod model;
pub mod options;
pub mod reader;
pub mod sse;
pub mod thread;

// Re-exports for convenience
pub use client::{ChatClient, ClientError};
pub use event::StreamEvent;
pub use model::{ChatRequest, ChatResponse, SafeSearch, SearchResult, Tool, UrlContent};
pub use options::ClientOptions;
pub use reader::{ReaderConfig, ReaderError, StreamFault, StreamSummary, StreamingEventReader};
pub use thread::Thread;
