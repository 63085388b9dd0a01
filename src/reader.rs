//! Incremental consumer of the chat event stream.
//!
//! [`StreamingEventReader`] turns a transport of raw byte chunks into typed
//! [`StreamEvent`]s. Chunks may split characters, lines or block separators
//! anywhere; the reader reassembles blocks, decodes their `data:` payloads
//! and hands events to the caller in arrival order.
//!
//! Per-block problems never end the stream. They are logged and forwarded to
//! an optional fault handler:
//! - a payload that fails to decode is dropped ([`StreamFault::Decode`])
//! - an unterminated block at end of stream is discarded ([`StreamFault::Truncated`])
//!
//! Transport failure, cancellation and buffer overflow end the call with a
//! [`ReaderError`] that records how many events were delivered before it.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::decode::Utf8Decoder;
use crate::event::{EventError, StreamEvent};
use crate::sse::{parse_block, BlockBuffer};

/// Default bound on the unterminated block held between reads (1 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type FaultHandler = Box<dyn FnMut(&StreamFault) + Send>;

/// Terminal outcomes of a read.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("transport failed after {delivered} event(s): {source}")]
    Transport {
        delivered: usize,
        #[source]
        source: BoxError,
    },

    #[error("stream cancelled after {delivered} event(s)")]
    Cancelled { delivered: usize },

    #[error("unterminated block exceeded {limit} bytes after {delivered} event(s)")]
    BufferOverflow { limit: usize, delivered: usize },
}

impl ReaderError {
    /// Events dispatched before the stream was aborted.
    pub fn delivered(&self) -> usize {
        match self {
            ReaderError::Transport { delivered, .. }
            | ReaderError::Cancelled { delivered }
            | ReaderError::BufferOverflow { delivered, .. } => *delivered,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReaderError::Cancelled { .. })
    }
}

/// Recoverable problems reported on the side channel.
#[derive(Error, Debug)]
pub enum StreamFault {
    #[error("dropped block {block}: {error}")]
    Decode {
        block: usize,
        payload: String,
        #[source]
        error: EventError,
    },

    #[error("stream ended inside a block, discarded {len} byte(s)", len = .remainder.len())]
    Truncated { remainder: String },

    #[error("replaced {count} invalid UTF-8 sequence(s)")]
    InvalidText { count: usize },
}

/// Outcome of a stream that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events handed to the caller.
    pub events: usize,
    /// Complete blocks seen, including skipped ones.
    pub blocks: usize,
    /// Faults reported on the side channel.
    pub faults: usize,
    /// Whether the stream ended inside an unterminated block.
    pub truncated: bool,
}

/// Reader limits.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Largest unterminated block kept between reads.
    pub max_buffer_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

impl ReaderConfig {
    pub fn with_max_buffer_bytes(mut self, max_buffer_bytes: usize) -> Self {
        self.max_buffer_bytes = max_buffer_bytes;
        self
    }
}

/// Per-call state, owned exclusively by one read loop.
#[derive(Debug, Default)]
struct ReaderState {
    decoder: Utf8Decoder,
    blocks: BlockBuffer,
    closed: bool,
    summary: StreamSummary,
}

impl ReaderState {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.blocks.push(&text)
    }

    fn pending_bytes(&self) -> usize {
        self.blocks.len() + self.decoder.pending_len()
    }
}

enum Read<T> {
    Cancelled,
    Next(Option<T>),
}

/// Reads a chunked event stream and dispatches decoded events.
///
/// # Example
/// ```
/// # #[tokio::main]
/// # async fn main() {
/// use chatstream::{StreamEvent, StreamingEventReader};
/// use futures::stream;
///
/// let chunks = vec![
///     Ok::<_, std::io::Error>(&b"data: {\"type\":\"token\",\"valu"[..]),
///     Ok(&b"e\":\"He\"}\n\n"[..]),
/// ];
///
/// let mut tokens = Vec::new();
/// let summary = StreamingEventReader::new()
///     .consume(stream::iter(chunks), |event: StreamEvent| {
///         tokens.extend(event.as_token().map(str::to_string));
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(tokens, vec!["He"]);
/// assert_eq!(summary.events, 1);
/// # }
/// ```
pub struct StreamingEventReader {
    config: ReaderConfig,
    cancel: CancellationToken,
    on_fault: Option<FaultHandler>,
}

impl Default for StreamingEventReader {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingEventReader {
    pub fn new() -> Self {
        Self {
            config: ReaderConfig::default(),
            cancel: CancellationToken::new(),
            on_fault: None,
        }
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `cancel` to stop the read from elsewhere.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive recoverable faults in addition to the `tracing` warning.
    pub fn with_fault_handler(mut self, handler: impl FnMut(&StreamFault) + Send + 'static) -> Self {
        self.on_fault = Some(Box::new(handler));
        self
    }

    /// A handle that cancels this reader.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Read `transport` to its end, calling `on_event` once per decoded event.
    ///
    /// Events are dispatched synchronously and in the order their blocks
    /// arrived. Returns the summary of a completed stream, or the terminal
    /// error that stopped it.
    pub async fn consume<S, B, E, M, F>(
        &mut self,
        transport: S,
        mut on_event: F,
    ) -> Result<StreamSummary, ReaderError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<BoxError>,
        M: DeserializeOwned,
        F: FnMut(StreamEvent<M>),
    {
        let mut transport = std::pin::pin!(transport);
        let mut state = ReaderState::default();
        let cancel = self.cancel.clone();

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => Read::Cancelled,
                next = transport.next() => Read::Next(next),
            };

            match read {
                Read::Cancelled => return Err(self.cancelled(&state)),
                Read::Next(Some(Ok(chunk))) => {
                    for block in state.push(chunk.as_ref()) {
                        if cancel.is_cancelled() {
                            return Err(self.cancelled(&state));
                        }
                        if let Some(event) = self.decode_block(&mut state, &block) {
                            state.summary.events += 1;
                            on_event(event);
                        }
                    }
                    self.check_overflow(&state)?;
                }
                Read::Next(Some(Err(e))) => return Err(self.transport_failed(&state, e.into())),
                Read::Next(None) => break,
            }
        }

        self.finish(&mut state);
        Ok(state.summary)
    }

    /// Pull-based variant of [`consume`](Self::consume).
    ///
    /// Yields events in arrival order and ends after the first error.
    /// Dropping the stream releases the transport.
    pub fn into_stream<S, B, E, M>(
        self,
        transport: S,
    ) -> impl Stream<Item = Result<StreamEvent<M>, ReaderError>>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<BoxError>,
        M: DeserializeOwned,
    {
        stream::unfold(
            (self, Box::pin(transport), ReaderState::default(), VecDeque::<String>::new()),
            |(mut reader, mut transport, mut state, mut ready)| async move {
                loop {
                    if state.closed {
                        return None;
                    }

                    if let Some(block) = ready.pop_front() {
                        if reader.cancel.is_cancelled() {
                            state.closed = true;
                            let err = reader.cancelled(&state);
                            return Some((Err(err), (reader, transport, state, ready)));
                        }
                        if let Some(event) = reader.decode_block::<M>(&mut state, &block) {
                            state.summary.events += 1;
                            return Some((Ok(event), (reader, transport, state, ready)));
                        }
                        continue;
                    }

                    // Blocks completed before an overflow are delivered first.
                    if let Err(err) = reader.check_overflow(&state) {
                        state.closed = true;
                        return Some((Err(err), (reader, transport, state, ready)));
                    }

                    let cancel = reader.cancel.clone();
                    let read = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Read::Cancelled,
                        next = transport.next() => Read::Next(next),
                    };

                    let err = match read {
                        Read::Cancelled => reader.cancelled(&state),
                        Read::Next(Some(Ok(chunk))) => {
                            ready.extend(state.push(chunk.as_ref()));
                            continue;
                        }
                        Read::Next(Some(Err(e))) => reader.transport_failed(&state, e.into()),
                        Read::Next(None) => {
                            reader.finish(&mut state);
                            state.closed = true;
                            continue;
                        }
                    };

                    state.closed = true;
                    return Some((Err(err), (reader, transport, state, ready)));
                }
            },
        )
    }

    fn decode_block<M: DeserializeOwned>(
        &mut self,
        state: &mut ReaderState,
        block: &str,
    ) -> Option<StreamEvent<M>> {
        let index = state.summary.blocks;
        state.summary.blocks += 1;

        let payload = match parse_block(block) {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                trace!(block = index, "skipping block without payload");
                return None;
            }
        };

        match StreamEvent::from_payload(&payload) {
            Ok(event) => Some(event),
            Err(error) => {
                self.report(
                    state,
                    StreamFault::Decode {
                        block: index,
                        payload,
                        error,
                    },
                );
                None
            }
        }
    }

    fn check_overflow(&self, state: &ReaderState) -> Result<(), ReaderError> {
        let limit = self.config.max_buffer_bytes;
        if state.pending_bytes() > limit {
            warn!(limit, pending = state.pending_bytes(), "event block exceeds buffer limit");
            return Err(ReaderError::BufferOverflow {
                limit,
                delivered: state.summary.events,
            });
        }
        Ok(())
    }

    fn finish(&mut self, state: &mut ReaderState) {
        // A flushed decoder tail can never complete a block.
        let mut remainder = state.blocks.take_remainder();
        remainder.push_str(&state.decoder.finish());

        let replaced = state.decoder.replaced();
        if replaced > 0 {
            self.report(state, StreamFault::InvalidText { count: replaced });
        }

        if !remainder.is_empty() {
            state.summary.truncated = true;
            self.report(state, StreamFault::Truncated { remainder });
        }

        state.closed = true;
        debug!(
            events = state.summary.events,
            blocks = state.summary.blocks,
            faults = state.summary.faults,
            "event stream completed"
        );
    }

    fn report(&mut self, state: &mut ReaderState, fault: StreamFault) {
        state.summary.faults += 1;
        warn!(%fault, "recoverable stream fault");
        if let Some(handler) = self.on_fault.as_mut() {
            handler(&fault);
        }
    }

    fn cancelled(&self, state: &ReaderState) -> ReaderError {
        debug!(delivered = state.summary.events, "event stream cancelled");
        ReaderError::Cancelled {
            delivered: state.summary.events,
        }
    }

    fn transport_failed(&self, state: &ReaderState, source: BoxError) -> ReaderError {
        warn!(delivered = state.summary.events, error = %source, "event stream transport failed");
        ReaderError::Transport {
            delivered: state.summary.events,
            source,
        }
    }
}
