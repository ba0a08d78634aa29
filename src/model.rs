//! Core data model.
//!
//! A message is the unit of work handed to the dispatcher. It has no identity
//! beyond its text: two equal messages are the same mailbox entry, but each
//! submission is still executed on its own.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A validated message payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Message(String);

impl Message {
    /// Validate and wrap a payload. Blank payloads are rejected.
    pub fn new(payload: impl Into<String>) -> Result<Self> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            return Err(Error::InvalidPayload(
                "message must contain at least one non-whitespace character".to_string(),
            ));
        }
        Ok(Self(payload))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Message {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Message> for String {
    fn from(message: Message) -> Self {
        message.0
    }
}

// Lets the mailbox set be queried with a plain `&str`.
impl Borrow<str> for Message {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Accepted into the submission queue.
    Submitted,
    /// Picked up by a worker.
    Executing,
    /// Recorded in the mailbox. Terminal.
    Completed,
    /// Execution faulted; recorded as a failure. Terminal.
    Failed,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Submitted, Executing) | (Executing, Completed) | (Executing, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Submitted => "submitted",
            State::Executing => "executing",
            State::Completed => "completed",
            State::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// What the mailbox hook is told about a finished submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Delivered(Message),
    Failed { message: Message, reason: String },
}

impl Completion {
    pub fn message(&self) -> &Message {
        match self {
            Completion::Delivered(message) => message,
            Completion::Failed { message, .. } => message,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Completion::Failed { .. })
    }

    /// Terminal state this completion represents.
    pub fn state(&self) -> State {
        match self {
            Completion::Delivered(_) => State::Completed,
            Completion::Failed { .. } => State::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Record id
// ---------------------------------------------------------------------------

/// Identifier handed out by a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidPayload(format!("bad record id '{s}': {e}")))
    }
}
