//! Structured conversion of a finished recording.
//!
//! Every entity converts itself into a `serde_json::Value` with keys in wire
//! order. The resulting value is what a named `Serializer` turns into bytes.

use crate::recorder::{AbortEvent, CallNode, Recording, RuntimeOptions};
use crate::trace::{Chunk, CompiledTrace, MachineOpChunk, SourceChunk, TraceSection};
use crate::utils::config::{RESOP_TYPE_TAG, SESSION_KEYS, SOURCE_TYPE_TAG};
use crate::utils::error::OutputError;
use log::debug;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Conversion into a generic structured value
pub trait Structured {
    fn to_structured(&self) -> Value;
}

impl Structured for MachineOpChunk {
    fn to_structured(&self) -> Value {
        let ops = self
            .ops
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        json!({
            "type": RESOP_TYPE_TAG,
            "ops": ops,
        })
    }
}

impl Structured for SourceChunk {
    fn to_structured(&self) -> Value {
        json!({
            "type": SOURCE_TYPE_TAG,
            "source": self.lines.concat(),
            "linenos": self.linenos,
        })
    }
}

impl Structured for Chunk {
    fn to_structured(&self) -> Value {
        match self {
            Chunk::MachineOps(chunk) => chunk.to_structured(),
            Chunk::Source(chunk) => chunk.to_structured(),
        }
    }
}

impl Structured for TraceSection {
    fn to_structured(&self) -> Value {
        json!({
            "label": self.label.as_str(),
            "chunks": list(&self.chunks),
        })
    }
}

impl Structured for CompiledTrace {
    fn to_structured(&self) -> Value {
        json!({
            "type": SOURCE_TYPE_TAG,
            "root_file": self.root_file,
            "root_function": self.root_function,
            "sections": list(&self.sections),
        })
    }
}

impl Structured for AbortEvent {
    fn to_structured(&self) -> Value {
        json!({
            "type": SOURCE_TYPE_TAG,
            "filename": self.filename,
            "lineno": self.lineno,
            "reason": self.reason,
        })
    }
}

impl Structured for CallNode {
    fn to_structured(&self) -> Value {
        json!({
            "type": SOURCE_TYPE_TAG,
            "name": self.name,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "subcalls": list(&self.subcalls),
        })
    }
}

impl Structured for RuntimeOptions {
    fn to_structured(&self) -> Value {
        json!({
            "build": string_map(&self.build),
            "gc": string_map(&self.gc),
            "jit": string_map(&self.jit),
        })
    }
}

fn list<T: Structured>(items: &[T]) -> Value {
    Value::Array(items.iter().map(Structured::to_structured).collect())
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect::<Map<String, Value>>(),
    )
}

/// Convert a whole recording, segmenting its traces first
///
/// **Public** - main entry point for serialization
///
/// # Arguments
/// * `recording` - Finished recording; pending traces are materialized in place
///
/// # Returns
/// Object keyed by `SESSION_KEYS`, in that order. `calls` is `null` when
/// profiling was off.
///
/// # Errors
/// * `OutputError::Segment` - a trace could not be segmented
pub fn serialize_recording(recording: &mut Recording) -> Result<Value, OutputError> {
    let traces: Vec<Value> = recording
        .traces()?
        .into_iter()
        .map(Structured::to_structured)
        .collect();

    let calls = match &recording.calls {
        Some(calls) => list(calls),
        None => Value::Null,
    };

    debug!(
        "Serialized {} traces, {} aborts",
        traces.len(),
        recording.aborts.len()
    );

    let values = [
        Value::Array(traces),
        list(&recording.aborts),
        calls,
        recording.options.to_structured(),
        json!(recording.runtime),
        json!(recording.stdout),
        json!(recording.stderr),
    ];

    let session: Map<String, Value> = SESSION_KEYS
        .iter()
        .zip(values)
        .map(|(key, value)| (key.to_string(), value))
        .collect();

    Ok(Value::Object(session))
}
