//! Conversation state that stream events are merged into.

use serde::{Deserialize, Serialize};

use crate::event::StreamEvent;
use crate::model::ChatResponse;

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub role: Role,
    pub text: String,
    /// Final structured result, once the `message` event arrived.
    pub response: Option<ChatResponse>,
    /// False while tokens may still be appended.
    pub complete: bool,
    /// Set when the stream stopped before its final message.
    pub interrupted: bool,
}

impl ThreadMessage {
    fn user(text: String) -> Self {
        Self {
            role: Role::User,
            text,
            response: None,
            complete: true,
            interrupted: false,
        }
    }

    fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            text: String::new(),
            response: None,
            complete: false,
            interrupted: false,
        }
    }
}

/// Ordered list of user and assistant messages.
///
/// # Example
/// ```
/// use chatstream::thread::Thread;
/// use chatstream::StreamEvent;
///
/// let mut thread = Thread::new();
/// thread.push_user("hi");
/// thread.begin_assistant();
/// thread.apply(StreamEvent::Token("Hel".to_string()));
/// thread.apply(StreamEvent::Token("lo".to_string()));
///
/// assert_eq!(thread.in_progress().unwrap().text, "Hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Thread {
    messages: Vec<ThreadMessage>,
}

impl Thread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ThreadMessage::user(text.into()));
    }

    /// Open an empty assistant message for the next response.
    pub fn begin_assistant(&mut self) {
        self.messages.push(ThreadMessage::assistant());
    }

    /// Merge one event into the in-progress assistant message.
    ///
    /// Opens a message if none is in progress. Returns `false` for kinds the
    /// thread does not render.
    pub fn apply(&mut self, event: StreamEvent<ChatResponse>) -> bool {
        match event {
            StreamEvent::Token(text) => {
                self.current().text.push_str(&text);
                true
            }
            StreamEvent::Message(response) => {
                let message = self.current();
                if message.text.is_empty() {
                    message.text = response.reply.clone();
                }
                message.response = Some(response);
                message.complete = true;
                true
            }
            StreamEvent::Other { .. } => false,
        }
    }

    /// Close the in-progress message without a final result.
    pub fn interrupt(&mut self) {
        if let Some(message) = self.in_progress_mut() {
            message.complete = true;
            message.interrupted = true;
        }
    }

    pub fn in_progress(&self) -> Option<&ThreadMessage> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant && !m.complete)
    }

    pub fn messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ThreadMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn in_progress_mut(&mut self) -> Option<&mut ThreadMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant && !m.complete)
    }

    fn current(&mut self) -> &mut ThreadMessage {
        if self.in_progress().is_none() {
            self.begin_assistant();
        }
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }
}
