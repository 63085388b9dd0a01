//! Server-Sent Events block framing.
//!
//! The chat service frames its stream as blank-line separated blocks whose
//! `data:` lines carry one JSON payload each:
//! ```text
//! data: {"type": "token", "value": "Hel"}
//!
//! data: {"type": "token", "value": "lo"}
//!
//! data: {"type": "message", "value": {"reply": "Hello", "used_tool": false}}
//! ```

use futures::Stream;
use itertools::Itertools;
use serde::de::DeserializeOwned;

use crate::event::StreamEvent;
use crate::reader::{ReaderError, StreamingEventReader};

/// Separator between two event blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Field prefix of payload-carrying lines.
pub const DATA_PREFIX: &str = "data:";

/// Reassembles event blocks from decoded text fragments.
///
/// Holds at most one incomplete block: every terminated block is handed back
/// from [`BlockBuffer::push`] as soon as its separator is seen.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    buffer: String,
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and drain every block it completes, in order.
    ///
    /// # Example
    /// ```
    /// use chatstream::sse::BlockBuffer;
    ///
    /// let mut blocks = BlockBuffer::new();
    /// assert!(blocks.push("data: a\n").is_empty());
    /// assert_eq!(blocks.push("\ndata: b"), vec!["data: a".to_string()]);
    /// assert_eq!(blocks.pending(), "data: b");
    /// ```
    pub fn push(&mut self, text: &str) -> Vec<String> {
        let separator = BLOCK_SEPARATOR.as_bytes();

        // Only the tail of the old buffer can start a separator that `text` completes.
        let mut search = self.buffer.len().saturating_sub(separator.len() - 1);
        self.buffer.push_str(text);

        let mut blocks = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer.as_bytes()[search..]
            .windows(separator.len())
            .position(|window| window == separator)
        {
            let end = search + offset;
            blocks.push(self.buffer[consumed..end].to_string());
            consumed = end + separator.len();
            search = consumed;
        }

        self.buffer.drain(..consumed);
        blocks
    }

    /// The incomplete trailing block.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the incomplete trailing block, leaving the buffer empty.
    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Parse a single line to extract its data payload.
///
/// # Example
/// ```
/// use chatstream::sse::parse_data_line;
///
/// assert_eq!(parse_data_line("data: {\"type\":\"token\"}"), Some("{\"type\":\"token\"}"));
/// assert_eq!(parse_data_line("data:compact"), Some("compact"));
/// assert_eq!(parse_data_line("event: ping"), None);
/// ```
pub fn parse_data_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(str::trim)
}

/// Extract the payload of a complete block.
///
/// Returns `None` when the block has no `data:` line at all. Several `data:`
/// lines are joined with `\n`. The payload may be empty.
pub fn parse_block(block: &str) -> Option<String> {
    let mut data = block.lines().filter_map(parse_data_line).peekable();
    data.peek()?;
    Some(data.join("\n").trim().to_string())
}

/// Extension trait for `reqwest::Response` to read the body as chat events.
///
/// # Example
/// ```ignore
/// use chatstream::sse::SseResponseExt;
/// use chatstream::{ChatResponse, StreamingEventReader};
///
/// let response = http.post(url).json(&request).send().await?;
/// let mut events = response.sse_events::<ChatResponse>(StreamingEventReader::new());
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// ```
pub trait SseResponseExt {
    /// Convert the response body into a stream of decoded events.
    fn sse_events<M>(
        self,
        reader: StreamingEventReader,
    ) -> impl Stream<Item = Result<StreamEvent<M>, ReaderError>> + Send
    where
        M: DeserializeOwned + Send;
}

impl SseResponseExt for reqwest::Response {
    fn sse_events<M>(
        self,
        reader: StreamingEventReader,
    ) -> impl Stream<Item = Result<StreamEvent<M>, ReaderError>> + Send
    where
        M: DeserializeOwned + Send,
    {
        reader.into_stream(self.bytes_stream())
    }
}
