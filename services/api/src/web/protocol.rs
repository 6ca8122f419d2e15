//! services/api/src/web/protocol.rs
//!
//! Defines the server-sent event protocol used to stream a chat answer to the
//! browser client. Each event is JSON in the `data` field, with the variant name
//! as the SSE event name.

use serde::Serialize;

/// Events the server emits while answering a question.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The next piece of the answer, in arrival order.
    Fragment { text: String },

    /// The answer is complete and recorded at `index` in the session's turns.
    /// `stored` is false when the conversation log write failed.
    Done {
        index: usize,
        text: String,
        stored: bool,
    },

    /// The cycle failed. The client should display the message.
    Error { message: String },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Fragment { .. } => "fragment",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
        }
    }
}
