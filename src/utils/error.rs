//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with one enum per concern.
//! Unrecognized runtime events are not errors: they are logged and dropped.

use thiserror::Error;

/// Errors raised while replaying the binary event log
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventLogError {
    #[error("corrupt event log: unexpected marker {marker:#04x} at buffer {buffer}, offset {offset}")]
    CorruptMarker {
        buffer: usize,
        offset: usize,
        marker: u8,
    },

    #[error("corrupt event log: unknown event kind {kind} at buffer {buffer}, offset {offset}")]
    UnknownEventKind {
        buffer: usize,
        offset: usize,
        kind: u8,
    },

    #[error("corrupt event log: truncated event at buffer {buffer}, offset {offset}")]
    Truncated { buffer: usize, offset: usize },
}

/// Errors raised by a host code object when asked for its source or bytecode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source of {0} is unavailable")]
    Unavailable(String),

    #[error("bytecode of {function} could not be decoded: {reason}")]
    Undecodable { function: String, reason: String },
}

/// Errors raised while splitting a compiled trace into sections and chunks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("trace has {labels} label operations, at most {max} are supported")]
    TooManySections { labels: usize, max: usize },

    #[error("no source line for bytecode offset {offset} in {function}")]
    UnknownOffset { function: String, offset: usize },

    #[error("line {lineno} lies outside the source of {function} (lines {first}..{end})")]
    LineOutOfRange {
        function: String,
        lineno: u32,
        first: u32,
        end: u32,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Errors raised by the recording session state machine
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot {action} a session that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: crate::recorder::SessionState,
    },

    #[error("invalid record options: {0}")]
    InvalidOptions(String),

    #[error("call tree reconstruction failed: {0}")]
    EventLog(#[from] EventLogError),
}

/// Errors raised while serializing or persisting a session
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Unknown serializer: {0}")]
    UnknownSerializer(String),

    #[error("Failed to materialize traces: {0}")]
    Segment(#[from] SegmentError),
}
