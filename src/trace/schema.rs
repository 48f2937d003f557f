//! Compiled trace data model.
//!
//! A compiled loop arrives from the JIT as a flat list of operations. It is kept
//! raw until someone reads it, then segmented into three labelled sections whose
//! chunks alternate between compiler operations and the source lines they came from.

use super::source::CodeRef;
use std::fmt;

/// Position in user code that a depth-tagged operation refers back to
#[derive(Debug, Clone)]
pub struct MergePoint {
    /// Inlining depth; 0 is the loop's own function
    pub call_depth: u32,

    /// Identifier of the inlined call at this depth. Only printed in the
    /// operation's arguments; segmentation nests by `call_depth` alone.
    pub call_id: u32,

    pub code: CodeRef,

    /// Bytecode offset inside `code`
    pub bytecode_no: usize,
}

/// One low-level operation of a compiled trace
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,

    /// Arguments as the JIT prints them
    pub args: String,

    /// Present only on depth-tagged operations
    pub merge_point: Option<MergePoint>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: String::new(),
            merge_point: None,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    /// A depth-tagged operation pointing at `bytecode_no` in `code`
    pub fn merge_point(name: impl Into<String>, call_depth: u32, call_id: u32, code: CodeRef, bytecode_no: usize) -> Self {
        Self {
            name: name.into(),
            args: format!("{}, {}, {} #{}", call_depth, call_id, code.name(), bytecode_no),
            merge_point: Some(MergePoint {
                call_depth,
                call_id,
                code,
                bytecode_no,
            }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args)
    }
}

/// Source-level key of a compiled loop: the function and offset it starts at
#[derive(Debug, Clone)]
pub struct Greenkey {
    pub code: CodeRef,
    pub bytecode_no: usize,
}

/// A compilation as captured by the compile hook, before segmentation
#[derive(Debug, Clone)]
pub struct RawTrace {
    pub greenkey: Greenkey,
    pub operations: Vec<Operation>,
    pub native_code: Vec<u8>,
}

/// The three phases of a compiled loop, in trace order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionLabel {
    Entry,
    Preamble,
    LoopBody,
}

impl SectionLabel {
    pub const ORDER: [SectionLabel; 3] = [
        SectionLabel::Entry,
        SectionLabel::Preamble,
        SectionLabel::LoopBody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionLabel::Entry => "Entry",
            SectionLabel::Preamble => "Preamble",
            SectionLabel::LoopBody => "Loop body",
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive operations introduced by the compiler
#[derive(Debug, Clone)]
pub struct MachineOpChunk {
    pub ops: Vec<Operation>,
}

impl MachineOpChunk {
    pub fn op_names(&self) -> Vec<&str> {
        self.ops.iter().map(|op| op.name.as_str()).collect()
    }
}

/// Source lines the surrounding operations were compiled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChunk {
    pub lines: Vec<String>,

    /// 1-based, contiguous and ascending
    pub linenos: Vec<u32>,
}

#[derive(Debug, Clone)]
pub enum Chunk {
    MachineOps(MachineOpChunk),
    Source(SourceChunk),
}

impl Chunk {
    pub fn as_machine_ops(&self) -> Option<&MachineOpChunk> {
        match self {
            Chunk::MachineOps(chunk) => Some(chunk),
            Chunk::Source(_) => None,
        }
    }

    pub fn as_source(&self) -> Option<&SourceChunk> {
        match self {
            Chunk::Source(chunk) => Some(chunk),
            Chunk::MachineOps(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceSection {
    pub label: SectionLabel,
    pub chunks: Vec<Chunk>,
}

/// A segmented compiled loop
#[derive(Debug, Clone)]
pub struct CompiledTrace {
    pub root_file: String,
    pub root_function: String,
    pub sections: Vec<TraceSection>,

    /// Machine code emitted for the loop; kept for completeness, never serialized
    pub native_code: Vec<u8>,
}

impl CompiledTrace {
    pub fn section(&self, label: SectionLabel) -> Option<&TraceSection> {
        self.sections.iter().find(|s| s.label == label)
    }
}

/// Lazily materialized trace: raw until first read, segmented from then on
#[derive(Debug)]
pub enum TraceCell {
    Pending(RawTrace),
    Materialized(CompiledTrace),
}

impl TraceCell {
    pub fn is_pending(&self) -> bool {
        matches!(self, TraceCell::Pending(_))
    }

    pub fn materialized(&self) -> Option<&CompiledTrace> {
        match self {
            TraceCell::Materialized(trace) => Some(trace),
            TraceCell::Pending(_) => None,
        }
    }
}
