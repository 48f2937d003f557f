//! Serialization and persistence of finished recordings.
//!
//! This module handles:
//! - Structured conversion of a recording into ordered JSON values
//! - Named serializers (JSON)
//! - Writing sessions to disk and reading them back as typed documents

pub mod json;
pub mod schema;
pub mod serializer;

// Re-export main functions
pub use json::{available_serializers, read_session, serializer_for, write_session, JsonSerializer, Serializer};
pub use schema::{
    AbortDocument, CallDocument, ChunkDocument, OptionsDocument, SectionDocument, SessionDocument,
    TraceDocument,
};
pub use serializer::{serialize_recording, Structured};
