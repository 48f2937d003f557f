//! Compiled trace capture and segmentation.
//!
//! This module handles:
//! - The compiled trace data model (sections, chunks, operations)
//! - The host code object seam and its disassembly cache
//! - Segmenting raw operation lists into source-correlated chunks

pub mod schema;
pub mod segmenter;
pub mod source;

// Re-export main types
pub use schema::{
    Chunk, CompiledTrace, Greenkey, MachineOpChunk, MergePoint, Operation, RawTrace,
    SectionLabel, SourceChunk, TraceCell, TraceSection,
};
pub use segmenter::{split_sections, TraceSegmenter};
pub use source::{CodeId, CodeObject, CodeRef, SourceCache, SourceListing};
