//! Recording sessions against a JIT-enabled host runtime.
//!
//! This module handles:
//! - The host runtime seam (hook slots, clock, output streams, options)
//! - The binary call/return event log and call tree reconstruction
//! - The session state machine and its scoped `record` form

pub mod call_tree;
pub mod event_log;
pub mod hooks;
pub mod session;
pub mod stream;

// Re-export main types
pub use call_tree::{CallNode, CallTreeBuilder};
pub use event_log::{EventLog, LogEvent};
pub use hooks::{Frame, Hook, HookEvent, HookSlot, HostRuntime, OptionCategory, OutputStream};
pub use session::{record, AbortEvent, Recording, RecordingSession, RuntimeOptions, SessionState};
pub use stream::{RecordingStream, SharedSink};
