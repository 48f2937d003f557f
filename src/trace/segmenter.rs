//! Split a compiled trace into sections and source-correlated chunks.
//!
//! Sections are delimited by `label` operations. Within a section, depth-tagged
//! operations (merge points) say which source line the following operations were
//! compiled from and at which inlining depth. The walk recurses whenever the depth
//! increases, so an inlined callee gets its own source chunks between the caller's.

use super::schema::{
    Chunk, CompiledTrace, MachineOpChunk, Operation, RawTrace, SectionLabel, SourceChunk,
    TraceCell, TraceSection,
};
use super::source::SourceCache;
use crate::utils::config::LABEL_OP;
use crate::utils::error::SegmentError;
use log::debug;

/// Depth of the compiled loop's own function
const ROOT_DEPTH: u32 = 0;

/// Segments raw traces, sharing one disassembly cache across them
///
/// **Public** - one instance per materialization pass
#[derive(Debug, Default)]
pub struct TraceSegmenter {
    cache: SourceCache,
}

impl TraceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code objects decoded during this pass
    pub fn decoded_code_count(&self) -> usize {
        self.cache.len()
    }

    /// Turn one raw compilation into a segmented trace
    ///
    /// **Public** - main entry point for segmentation
    ///
    /// # Errors
    /// * `SegmentError::TooManySections` - more than two `label` operations
    /// * `SegmentError::UnknownOffset` / `LineOutOfRange` - merge point cannot be mapped to source
    /// * `SegmentError::Source` - the host could not provide source or bytecode
    pub fn segment(&mut self, raw: &RawTrace) -> Result<CompiledTrace, SegmentError> {
        let code = &raw.greenkey.code;
        debug!(
            "Segmenting trace for {} ({} operations)",
            code.name(),
            raw.operations.len()
        );

        let sections = split_sections(&raw.operations)?
            .into_iter()
            .map(|(label, ops)| {
                Ok(TraceSection {
                    label,
                    chunks: self.split_section(ops)?,
                })
            })
            .collect::<Result<Vec<_>, SegmentError>>()?;

        Ok(CompiledTrace {
            root_file: code.filename().to_string(),
            root_function: code.name().to_string(),
            sections,
            native_code: raw.native_code.clone(),
        })
    }

    /// Materialize a cell in place; a no-op when it already holds a segmented trace
    pub fn materialize(&mut self, cell: &mut TraceCell) -> Result<(), SegmentError> {
        if let TraceCell::Pending(raw) = cell {
            let trace = self.segment(raw)?;
            *cell = TraceCell::Materialized(trace);
        }
        Ok(())
    }

    /// Chunks of one section
    pub fn split_section(&mut self, ops: &[Operation]) -> Result<Vec<Chunk>, SegmentError> {
        let mut chunks = Vec::new();
        self.split_depth(ops, 0, ROOT_DEPTH, &mut chunks)?;
        Ok(chunks)
    }

    /// Walk `ops` from `start` at inlining depth `depth`
    ///
    /// Returns the index of the first operation that belongs to a shallower depth,
    /// or `ops.len()` when the section ends first.
    fn split_depth(
        &mut self,
        ops: &[Operation],
        start: usize,
        depth: u32,
        chunks: &mut Vec<Chunk>,
    ) -> Result<usize, SegmentError> {
        let mut i = start;
        let mut run_start = start;
        let mut current_line: Option<u32> = None;

        while i < ops.len() {
            let Some(point) = &ops[i].merge_point else {
                i += 1;
                continue;
            };

            if point.call_depth > depth {
                flush_run(&ops[run_start..i], chunks);
                i = self.split_depth(ops, i, point.call_depth, chunks)?;
                run_start = i;
                continue;
            }

            if point.call_depth < depth {
                flush_run(&ops[run_start..i], chunks);
                return Ok(i);
            }

            let lineno = self.cache.line_for(&point.code, point.bytecode_no)?;
            if current_line.map_or(true, |line| lineno > line) {
                flush_run(&ops[run_start..i], chunks);

                let (lines, linenos) = match current_line {
                    None => self.cache.lines_through(&point.code, lineno)?,
                    Some(_) => self.cache.line(&point.code, lineno)?,
                };
                chunks.push(Chunk::Source(SourceChunk { lines, linenos }));

                current_line = Some(lineno);
                run_start = i;
            }

            i += 1;
        }

        flush_run(&ops[run_start..], chunks);
        Ok(ops.len())
    }
}

/// Emit the pending operations as a machine-op chunk, skipping empty runs
fn flush_run(ops: &[Operation], chunks: &mut Vec<Chunk>) {
    if !ops.is_empty() {
        chunks.push(Chunk::MachineOps(MachineOpChunk { ops: ops.to_vec() }));
    }
}

/// Split a trace at its `label` operations
///
/// **Public** - section boundaries without chunking
///
/// Each label opens a new section and belongs to it. With no labels the whole trace
/// is the Entry section; with one, Entry and Preamble; with two, all three.
///
/// # Errors
/// * `SegmentError::TooManySections` - a third label has no section name left
pub fn split_sections(ops: &[Operation]) -> Result<Vec<(SectionLabel, &[Operation])>, SegmentError> {
    let boundaries: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| op.name == LABEL_OP)
        .map(|(idx, _)| idx)
        .collect();

    let max = SectionLabel::ORDER.len() - 1;
    if boundaries.len() > max {
        return Err(SegmentError::TooManySections {
            labels: boundaries.len(),
            max,
        });
    }

    let mut sections = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;

    for (label, end) in SectionLabel::ORDER.iter().zip(boundaries.iter()) {
        sections.push((*label, &ops[start..*end]));
        start = *end;
    }
    sections.push((SectionLabel::ORDER[boundaries.len()], &ops[start..]));

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(names: &[&str]) -> Vec<Operation> {
        names.iter().map(|name| Operation::new(*name)).collect()
    }

    fn labels(sections: &[(SectionLabel, &[Operation])]) -> Vec<SectionLabel> {
        sections.iter().map(|(label, _)| *label).collect()
    }

    #[test]
    fn test_no_labels_is_entry_only() {
        let trace = ops(&["int_add", "jump"]);
        let sections = split_sections(&trace).unwrap();
        assert_eq!(labels(&sections), vec![SectionLabel::Entry]);
        assert_eq!(sections[0].1.len(), 2);
    }

    #[test]
    fn test_one_label_gives_entry_and_preamble() {
        let trace = ops(&["int_add", "label", "int_sub", "jump"]);
        let sections = split_sections(&trace).unwrap();
        assert_eq!(
            labels(&sections),
            vec![SectionLabel::Entry, SectionLabel::Preamble]
        );
        assert_eq!(sections[0].1.len(), 1);
        assert_eq!(sections[1].1[0].name, "label");
        assert_eq!(sections[1].1.len(), 3);
    }

    #[test]
    fn test_two_labels_give_all_sections() {
        let trace = ops(&["label", "int_add", "label", "jump"]);
        let sections = split_sections(&trace).unwrap();
        assert_eq!(labels(&sections), SectionLabel::ORDER.to_vec());
        assert!(sections[0].1.is_empty());
        assert_eq!(sections[1].1.len(), 2);
        assert_eq!(sections[2].1.len(), 2);
    }

    #[test]
    fn test_three_labels_rejected() {
        let trace = ops(&["label", "label", "label"]);
        assert_eq!(
            split_sections(&trace).unwrap_err(),
            SegmentError::TooManySections { labels: 3, max: 2 }
        );
    }

    #[test]
    fn test_section_without_merge_points_is_one_chunk() {
        let mut segmenter = TraceSegmenter::new();
        let chunks = segmenter
            .split_section(&ops(&["label", "int_add", "jump"]))
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_machine_ops().unwrap().op_names(),
            vec!["label", "int_add", "jump"]
        );
    }

    #[test]
    fn test_empty_section_has_no_chunks() {
        let mut segmenter = TraceSegmenter::new();
        assert!(segmenter.split_section(&[]).unwrap().is_empty());
    }
}
