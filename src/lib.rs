//! Tracebin
//!
//! Recording sessions for tracing-JIT diagnostics. While a program runs under
//! a JIT-enabled host runtime, a session collects:
//!
//! - compiled loops, segmented into Entry / Preamble / Loop body sections whose
//!   chunks interleave compiler operations with the source lines they came from
//! - aborted compilations, located in user code
//! - optionally, every function call and return, rebuilt into a call tree
//! - the program's stdout/stderr and the runtime's options
//!
//! ## Getting Started
//!
//! ```ignore
//! use tracebin::{record, serialize_recording, write_session, RecordOptions};
//!
//! let options = RecordOptions::default().with_profile(true);
//! let (mut recording, ()) = record(&mut host, options, |host| host.run_program())?;
//!
//! let session = serialize_recording(&mut recording)?;
//! write_session(&session, "session.json")?;
//! ```
//!
//! The host runtime is reached through the `HostRuntime` and `CodeObject` traits,
//! implemented by the embedding.

pub mod output;
pub mod recorder;
pub mod trace;
pub mod utils;

pub use output::{read_session, serialize_recording, serializer_for, write_session, SessionDocument};
pub use recorder::{record, HostRuntime, Recording, RecordingSession, SessionState};
pub use trace::{CodeObject, CompiledTrace};
pub use utils::{RecordOptions, SessionError};
