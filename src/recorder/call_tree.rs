//! Rebuild the nested call tree from the flat binary event log.
//!
//! The log only holds CALL and RETURN events. Nesting is recovered by replaying
//! them against an explicit stack of open frames.

use super::event_log::{EventLog, LogEvent};
use crate::utils::error::EventLogError;
use log::debug;

/// A finished call with its direct sub-calls
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub subcalls: Vec<CallNode>,
}

impl CallNode {
    pub fn new(name: impl Into<String>, start_time: f64, end_time: f64, subcalls: Vec<CallNode>) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time,
            subcalls,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        1 + self.subcalls.iter().map(CallNode::node_count).sum::<usize>()
    }
}

/// A call whose RETURN has not been seen yet
#[derive(Debug)]
struct OpenFrame {
    name: String,
    start_time: f64,
    children: Vec<CallNode>,
}

/// Stack-based call tree reconstruction
///
/// **Public** - fed event by event, or in one go through `replay`
#[derive(Debug, Default)]
pub struct CallTreeBuilder {
    stack: Vec<OpenFrame>,
    roots: Vec<CallNode>,
    discarded_returns: usize,
}

impl CallTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the call forest from a whole log
    ///
    /// **Public** - main entry point, called once when a profiling session stops
    ///
    /// # Arguments
    /// * `log` - Event log, consumed by the replay
    /// * `end_time` - Session end timestamp, used to close frames still open
    ///
    /// # Returns
    /// Top-level calls in the order their RETURN (or synthetic close) was seen
    ///
    /// # Errors
    /// * `EventLogError` - the log is corrupt; reconstruction is abandoned
    pub fn replay(log: EventLog, end_time: f64) -> Result<Vec<CallNode>, EventLogError> {
        let mut builder = Self::new();

        for event in log.replay() {
            match event? {
                LogEvent::Call { timestamp, name } => builder.on_call(name.into_owned(), timestamp),
                LogEvent::Return { timestamp } => builder.on_return(timestamp),
            }
        }

        Ok(builder.finish(end_time))
    }

    pub fn on_call(&mut self, name: String, timestamp: f64) {
        self.stack.push(OpenFrame {
            name,
            start_time: timestamp,
            children: Vec::new(),
        });
    }

    /// Close the innermost open frame
    ///
    /// A RETURN with nothing open belongs to the frame that was already running
    /// when recording started; it never had a CALL, so it is dropped.
    pub fn on_return(&mut self, timestamp: f64) {
        match self.stack.pop() {
            Some(frame) => self.close(frame, timestamp),
            None => self.discarded_returns += 1,
        }
    }

    fn close(&mut self, frame: OpenFrame, end_time: f64) {
        let node = CallNode::new(frame.name, frame.start_time, end_time, frame.children);

        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    /// Close every frame still open with `end_time` and return the forest
    pub fn finish(mut self, end_time: f64) -> Vec<CallNode> {
        let unclosed = self.stack.len();

        while let Some(frame) = self.stack.pop() {
            self.close(frame, end_time);
        }

        debug!(
            "Rebuilt {} top-level calls ({} closed at session end, {} unmatched returns)",
            self.roots.len(),
            unclosed,
            self.discarded_returns
        );

        self.roots
    }
}
