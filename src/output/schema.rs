//! Typed mirror of the serialized session shape.
//!
//! Writing goes through the generic structured value; these structs exist so a
//! stored session can be read back into something with named fields. Field order
//! matches the written key order, so re-serializing a document reproduces the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub traces: Vec<TraceDocument>,
    pub aborts: Vec<AbortDocument>,

    /// `None` when the session was recorded without call profiling
    pub calls: Option<Vec<CallDocument>>,

    pub options: OptionsDocument,

    /// Wall time of the session in seconds
    pub runtime: f64,

    pub stdout: String,
    pub stderr: String,
}

/// One compiled loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub root_file: String,
    pub root_function: String,
    pub sections: Vec<SectionDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDocument {
    /// "Entry", "Preamble" or "Loop body"
    pub label: String,
    pub chunks: Vec<ChunkDocument>,
}

/// A chunk, discriminated by its `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChunkDocument {
    #[serde(rename = "resop")]
    MachineOps { ops: String },

    #[serde(rename = "python")]
    Source { source: String, linenos: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: String,
    pub lineno: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub subcalls: Vec<CallDocument>,
}

impl CallDocument {
    /// Number of calls in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        1 + self.subcalls.iter().map(CallDocument::node_count).sum::<usize>()
    }
}

/// Runtime options snapshotted when the session started
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsDocument {
    pub build: BTreeMap<String, String>,
    pub gc: BTreeMap<String, String>,
    pub jit: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_tags() {
        let ops: ChunkDocument = serde_json::from_value(json!({"type": "resop", "ops": "jump()"})).unwrap();
        assert_eq!(
            ops,
            ChunkDocument::MachineOps {
                ops: "jump()".to_string()
            }
        );

        let source: ChunkDocument =
            serde_json::from_value(json!({"type": "python", "source": "x = 1\n", "linenos": [2]})).unwrap();
        assert_eq!(
            source,
            ChunkDocument::Source {
                source: "x = 1\n".to_string(),
                linenos: vec![2],
            }
        );
    }

    #[test]
    fn test_unknown_chunk_tag_rejected() {
        let result: Result<ChunkDocument, _> = serde_json::from_value(json!({"type": "asm", "ops": ""}));
        assert!(result.is_err());
    }

    #[test]
    fn test_null_calls() {
        let doc: SessionDocument = serde_json::from_value(json!({
            "traces": [],
            "aborts": [],
            "calls": null,
            "options": {"build": {}, "gc": {}, "jit": {}},
            "runtime": 0.5,
            "stdout": "",
            "stderr": "",
        }))
        .unwrap();

        assert!(doc.calls.is_none());
        assert_eq!(doc.runtime, 0.5);
    }
}
