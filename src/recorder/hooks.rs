//! Host runtime interface and hook events.
//!
//! The runtime being profiled owns three process-wide hook slots. A session
//! fills them on start and empties them on stop; in between, the runtime calls
//! the installed hook synchronously with one `HookEvent` per notification.

use super::stream::SharedSink;
use crate::trace::{CodeRef, Greenkey, Operation};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Callback installed into a hook slot
pub type Hook = Rc<dyn Fn(HookEvent<'_>)>;

/// Hook slots exposed by the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSlot {
    /// Compilation finished
    Compile,
    /// Compilation abandoned
    Abort,
    /// Function entry/exit
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Option categories snapshotted at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionCategory {
    Build,
    Gc,
    Jit,
}

impl OptionCategory {
    pub const ALL: [OptionCategory; 3] = [OptionCategory::Build, OptionCategory::Gc, OptionCategory::Jit];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionCategory::Build => "build",
            OptionCategory::Gc => "gc",
            OptionCategory::Jit => "jit",
        }
    }
}

/// A user-code frame: the function and the line it is executing
#[derive(Debug, Clone)]
pub struct Frame {
    pub code: CodeRef,
    pub lineno: u32,
}

/// One notification from the host runtime
pub enum HookEvent<'a> {
    /// A compilation finished
    CompileCompleted {
        driver: &'a str,
        kind: &'a str,
        greenkey: Greenkey,
        operations: Vec<Operation>,
        native_code: &'a [u8],
    },

    /// A compilation was abandoned
    CompileAborted {
        driver: &'a str,
        greenkey: Greenkey,
        reason: &'a str,
        /// Frame one level above the hook invocation
        caller: Frame,
    },

    /// A function was entered
    Call { timestamp: f64, target: &'a str },

    /// A function returned (normally or by unwinding)
    Return { timestamp: f64 },
}

impl HookEvent<'_> {
    pub fn slot(&self) -> HookSlot {
        match self {
            HookEvent::CompileCompleted { .. } => HookSlot::Compile,
            HookEvent::CompileAborted { .. } => HookSlot::Abort,
            HookEvent::Call { .. } | HookEvent::Return { .. } => HookSlot::Profile,
        }
    }
}

impl fmt::Debug for HookEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::CompileCompleted {
                driver,
                kind,
                operations,
                ..
            } => write!(f, "CompileCompleted({driver}, {kind}, {} ops)", operations.len()),
            HookEvent::CompileAborted { driver, reason, .. } => {
                write!(f, "CompileAborted({driver}, {reason})")
            }
            HookEvent::Call { timestamp, target } => write!(f, "Call({target} @ {timestamp})"),
            HookEvent::Return { timestamp } => write!(f, "Return(@ {timestamp})"),
        }
    }
}

/// The runtime being profiled, as seen by a recording session
///
/// Implemented by the embedding. All methods are called on the thread that
/// runs the profiled program.
pub trait HostRuntime {
    /// Install `hook` into `slot`, or empty the slot with `None`
    fn set_hook(&mut self, slot: HookSlot, hook: Option<Hook>);

    /// Monotonic high-resolution clock, in seconds
    fn high_res_time(&self) -> f64;

    /// Current sink of `stream`
    fn output(&self, stream: OutputStream) -> SharedSink;

    /// Replace the sink of `stream`
    fn set_output(&mut self, stream: OutputStream, sink: SharedSink);

    /// Key/value options of one category; empty when the runtime exposes none
    fn options(&self, category: OptionCategory) -> BTreeMap<String, String>;
}
