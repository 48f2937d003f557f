//! Append-only binary log of call/return events.
//!
//! Record layout (little-endian):
//!
//! ```text
//! CALL:   [marker: u8 = 72][kind: u8 = 0][timestamp: f64][name_len: u32][name: name_len bytes]
//! RETURN: [marker: u8 = 72][kind: u8 = 1][timestamp: f64]
//! ```
//!
//! Buffers are zero-filled, so a zero marker during replay means the rest of
//! the buffer is unused.

use crate::utils::config::{
    BUFFER_CAPACITY, CALL_EVENT, EVENT_HEADER_LEN, NAME_PREFIX_LEN, PROFILE_MARKER, RETURN_EVENT,
};
use crate::utils::error::EventLogError;
use log::debug;
use std::borrow::Cow;

/// A single call or return event
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent<'a> {
    Call { timestamp: f64, name: Cow<'a, str> },
    Return { timestamp: f64 },
}

impl<'a> LogEvent<'a> {
    pub fn call(timestamp: f64, name: &'a str) -> Self {
        LogEvent::Call {
            timestamp,
            name: Cow::Borrowed(name),
        }
    }

    pub fn ret(timestamp: f64) -> Self {
        LogEvent::Return { timestamp }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            LogEvent::Call { timestamp, .. } | LogEvent::Return { timestamp } => *timestamp,
        }
    }

    /// Number of bytes this event occupies once encoded
    pub fn encoded_len(&self) -> usize {
        match self {
            LogEvent::Call { name, .. } => EVENT_HEADER_LEN + NAME_PREFIX_LEN + name_len(name),
            LogEvent::Return { .. } => EVENT_HEADER_LEN,
        }
    }
}

/// Names longer than the length prefix can express are cut at the limit
fn name_len(name: &str) -> usize {
    name.len().min(u32::MAX as usize)
}

/// One fixed-size, zero-filled buffer and its write position
#[derive(Debug)]
struct Buffer {
    data: Vec<u8>,
    pos: usize,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }
}

/// Sequence of append-only event buffers
///
/// **Public** - written by the profile hook, consumed by `CallTreeBuilder`
#[derive(Debug)]
pub struct EventLog {
    buffers: Vec<Buffer>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create a log with the default 4 MiB buffers
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    /// Create a log whose buffers hold `capacity` bytes each
    ///
    /// The first buffer is allocated up front so the first event does not pay for it.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: vec![Buffer::new(capacity)],
            capacity,
        }
    }

    /// Append one event, rolling over to a new buffer when the current one is full
    ///
    /// **Public** - called on every function entry/exit of the profiled program
    pub fn append(&mut self, event: &LogEvent<'_>) {
        let needed = event.encoded_len();
        let has_room = self
            .buffers
            .last()
            .is_some_and(|buffer| buffer.remaining() >= needed);

        if !has_room {
            self.roll_over(needed);
        }

        let Some(buffer) = self.buffers.last_mut() else {
            return;
        };

        match event {
            LogEvent::Call { timestamp, name } => {
                let len = name_len(name);
                buffer.put(&[PROFILE_MARKER, CALL_EVENT]);
                buffer.put(&timestamp.to_le_bytes());
                buffer.put(&(len as u32).to_le_bytes());
                buffer.put(&name.as_bytes()[..len]);
            }
            LogEvent::Return { timestamp } => {
                buffer.put(&[PROFILE_MARKER, RETURN_EVENT]);
                buffer.put(&timestamp.to_le_bytes());
            }
        }
    }

    fn roll_over(&mut self, needed: usize) {
        let capacity = self.capacity.max(needed);
        debug!(
            "Event log buffer {} full, allocating {} bytes",
            self.buffers.len(),
            capacity
        );
        self.buffers.push(Buffer::new(capacity));
    }

    /// Number of buffers allocated so far
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Bytes written across all buffers
    pub fn bytes_written(&self) -> usize {
        self.buffers.iter().map(|b| b.pos).sum()
    }

    /// Replay events in the order they were appended
    pub fn replay(&self) -> Replay<'_> {
        Replay {
            log: self,
            buffer: 0,
            offset: 0,
            failed: false,
        }
    }

    /// Raw access for corruption tests
    #[cfg(test)]
    pub(crate) fn buffer_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.buffers[index].data
    }
}

/// Iterator over the events of an `EventLog`
///
/// Stops after the first error; a corrupt log is never guessed through.
pub struct Replay<'a> {
    log: &'a EventLog,
    buffer: usize,
    offset: usize,
    failed: bool,
}

impl<'a> Replay<'a> {
    fn next_buffer(&mut self) {
        self.buffer += 1;
        self.offset = 0;
    }

    fn read(&mut self, data: &'a [u8], len: usize, start: usize) -> Result<&'a [u8], EventLogError> {
        let end = self.offset + len;
        if end > data.len() {
            return Err(EventLogError::Truncated {
                buffer: self.buffer,
                offset: start,
            });
        }
        let bytes = &data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn decode(&mut self, data: &'a [u8]) -> Result<LogEvent<'a>, EventLogError> {
        let start = self.offset;
        let header = self.read(data, 2, start)?;
        let (marker, kind) = (header[0], header[1]);

        if marker != PROFILE_MARKER {
            return Err(EventLogError::CorruptMarker {
                buffer: self.buffer,
                offset: start,
                marker,
            });
        }

        let mut ts = [0u8; 8];
        ts.copy_from_slice(self.read(data, 8, start)?);
        let timestamp = f64::from_le_bytes(ts);

        match kind {
            CALL_EVENT => {
                let mut len = [0u8; 4];
                len.copy_from_slice(self.read(data, NAME_PREFIX_LEN, start)?);
                let len = u32::from_le_bytes(len) as usize;
                let name = String::from_utf8_lossy(self.read(data, len, start)?);
                Ok(LogEvent::Call { timestamp, name })
            }
            RETURN_EVENT => Ok(LogEvent::Return { timestamp }),
            other => Err(EventLogError::UnknownEventKind {
                buffer: self.buffer,
                offset: start,
                kind: other,
            }),
        }
    }
}

impl<'a> Iterator for Replay<'a> {
    type Item = Result<LogEvent<'a>, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let log = self.log;
            let data = &log.buffers.get(self.buffer)?.data[..];

            match data.get(self.offset) {
                None | Some(0) => self.next_buffer(),
                Some(_) => {
                    let result = self.decode(data);
                    self.failed = result.is_err();
                    return Some(result);
                }
            }
        }
    }
}
