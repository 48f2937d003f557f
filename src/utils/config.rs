//! Configuration and constants for recording sessions.

use super::error::SessionError;

/// Capacity of one binary event log buffer (4 MiB)
pub const BUFFER_CAPACITY: usize = 4 * 1024 * 1024;

/// Sentinel written before every binary event, used to detect misaligned replay
pub const PROFILE_MARKER: u8 = 72;

// Event kind bytes in the binary log
pub const CALL_EVENT: u8 = 0;
pub const RETURN_EVENT: u8 = 1;

/// Bytes every event needs: marker + kind + timestamp
pub const EVENT_HEADER_LEN: usize = 1 + 1 + 8;

/// Extra bytes a CALL event needs before its name: the length prefix
pub const NAME_PREFIX_LEN: usize = 4;

/// Smallest buffer that can hold any RETURN and a CALL with an empty name
pub const MIN_BUFFER_CAPACITY: usize = EVENT_HEADER_LEN + NAME_PREFIX_LEN;

/// JIT driver whose compilations and aborts belong to user code
pub const DEFAULT_JIT_DRIVER: &str = "pypyjit";

/// The only compilation kind a session keeps
pub const LOOP_KIND: &str = "loop";

/// Operation name that opens a new trace section
pub const LABEL_OP: &str = "label";

/// Wire type tags
pub const SOURCE_TYPE_TAG: &str = "python";
pub const RESOP_TYPE_TAG: &str = "resop";

/// Top-level keys of a serialized session, in the order they are written
pub const SESSION_KEYS: [&str; 7] = [
    "traces", "aborts", "calls", "options", "runtime", "stdout", "stderr",
];

/// Options controlling a single recording session
///
/// **Public** - passed to `RecordingSession::new` or `record`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// Record every call/return and rebuild the call tree on stop
    pub profile: bool,

    /// Name of the JIT driver whose events are accepted
    pub driver: String,

    /// Capacity of each binary event log buffer
    pub buffer_capacity: usize,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            profile: false,
            driver: DEFAULT_JIT_DRIVER.to_string(),
            buffer_capacity: BUFFER_CAPACITY,
        }
    }
}

impl RecordOptions {
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Validate options before a session starts
    ///
    /// **Public** - called by `RecordingSession::start`, usable for early checks
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.driver.is_empty() {
            return Err(SessionError::InvalidOptions(
                "JIT driver name cannot be empty".to_string(),
            ));
        }

        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(SessionError::InvalidOptions(format!(
                "buffer capacity must be at least {} bytes (got {})",
                MIN_BUFFER_CAPACITY, self.buffer_capacity
            )));
        }

        Ok(())
    }
}
