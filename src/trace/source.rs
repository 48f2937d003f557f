//! Host code objects and the per-pass disassembly cache.
//!
//! A code object is the host runtime's handle on one function: where it lives,
//! its source text, and the mapping from bytecode offsets to source lines.
//! Decoding that mapping is expensive, so the segmenter asks for it at most once
//! per distinct code identity.

use crate::utils::error::{SegmentError, SourceError};
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Stable identity token of a code object
///
/// Two handles with the same id are the same function, regardless of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(pub u64);

/// Source text of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListing {
    /// 1-based line number of `lines[0]`
    pub first_line: u32,

    /// Source lines, each keeping its trailing newline
    pub lines: Vec<String>,
}

/// A function known to the host runtime
pub trait CodeObject {
    fn id(&self) -> CodeId;

    fn filename(&self) -> &str;

    fn name(&self) -> &str;

    /// Decode the bytecode into an offset -> source line table
    fn line_table(&self) -> Result<HashMap<usize, u32>, SourceError>;

    fn source(&self) -> Result<SourceListing, SourceError>;
}

/// Shared handle on a host code object
pub type CodeRef = Rc<dyn CodeObject>;

impl fmt::Debug for dyn CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<code {} {}:{}>", self.id().0, self.filename(), self.name())
    }
}

/// Line table and listing of one decoded code object
#[derive(Debug)]
struct DecodedCode {
    name: String,
    lines_by_offset: HashMap<usize, u32>,
    listing: SourceListing,
}

impl DecodedCode {
    fn line_at(&self, offset: usize) -> Result<u32, SegmentError> {
        self.lines_by_offset
            .get(&offset)
            .copied()
            .ok_or_else(|| SegmentError::UnknownOffset {
                function: self.name.clone(),
                offset,
            })
    }

    /// Index into `listing.lines` for `lineno`
    fn index_of(&self, lineno: u32) -> Result<usize, SegmentError> {
        let first = self.listing.first_line;
        let end = first + self.listing.lines.len() as u32;

        if lineno < first || lineno >= end {
            return Err(SegmentError::LineOutOfRange {
                function: self.name.clone(),
                lineno,
                first,
                end,
            });
        }

        Ok((lineno - first) as usize)
    }
}

/// Disassembly cache keyed by code identity
///
/// Lives for a single segmentation pass; it is dropped with the segmenter so no
/// identity outlives the pass.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<CodeId, DecodedCode>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of code objects decoded so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decoded(&mut self, code: &CodeRef) -> Result<&DecodedCode, SegmentError> {
        match self.entries.entry(code.id()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!("Decoding {} ({})", code.name(), code.filename());
                Ok(entry.insert(DecodedCode {
                    name: code.name().to_string(),
                    lines_by_offset: code.line_table()?,
                    listing: code.source()?,
                }))
            }
        }
    }

    /// Source line of the bytecode instruction at `offset`
    pub fn line_for(&mut self, code: &CodeRef, offset: usize) -> Result<u32, SegmentError> {
        self.decoded(code)?.line_at(offset)
    }

    /// Lines from the start of the function through `lineno`, inclusive
    pub fn lines_through(
        &mut self,
        code: &CodeRef,
        lineno: u32,
    ) -> Result<(Vec<String>, Vec<u32>), SegmentError> {
        let decoded = self.decoded(code)?;
        let end = decoded.index_of(lineno)?;
        let first = decoded.listing.first_line;

        Ok((
            decoded.listing.lines[..=end].to_vec(),
            (first..=lineno).collect(),
        ))
    }

    /// The single line `lineno`
    pub fn line(&mut self, code: &CodeRef, lineno: u32) -> Result<(Vec<String>, Vec<u32>), SegmentError> {
        let decoded = self.decoded(code)?;
        let index = decoded.index_of(lineno)?;

        Ok((vec![decoded.listing.lines[index].clone()], vec![lineno]))
    }
}
