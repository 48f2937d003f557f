//! Named serializers and session file output.
//!
//! A serializer turns the structured session value into bytes and back. Sessions
//! are written to disk as pretty JSON and read back into typed documents.

use super::schema::SessionDocument;
use crate::utils::error::OutputError;
use log::{debug, info};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Turns a structured session value into bytes and back
pub trait Serializer {
    /// Name the serializer is looked up by
    fn name(&self) -> &'static str;

    fn dump(&self, value: &Value) -> Result<Vec<u8>, OutputError>;

    fn load(&self, bytes: &[u8]) -> Result<Value, OutputError>;
}

/// Compact JSON, keys in insertion order
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn dump(&self, value: &Value) -> Result<Vec<u8>, OutputError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn load(&self, bytes: &[u8]) -> Result<Value, OutputError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

static SERIALIZERS: &[&(dyn Serializer + Sync)] = &[&JsonSerializer];

/// Names of every registered serializer
pub fn available_serializers() -> Vec<&'static str> {
    SERIALIZERS.iter().map(|s| s.name()).collect()
}

/// Look up a serializer by name
///
/// **Public** - entry point for callers choosing a format by name
///
/// # Errors
/// * `OutputError::UnknownSerializer` - no serializer is registered under `name`
pub fn serializer_for(name: &str) -> Result<&'static dyn Serializer, OutputError> {
    SERIALIZERS
        .iter()
        .find(|s| s.name() == name)
        .map(|s| *s as &'static dyn Serializer)
        .ok_or_else(|| OutputError::UnknownSerializer(name.to_string()))
}

/// Write a serialized session to a JSON file
///
/// **Public** - main entry point for file output
///
/// # Arguments
/// * `session` - Structured session value, as built by `serialize_recording`
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
///
/// # Example
/// ```ignore
/// let session = serialize_recording(&mut recording)?;
/// write_session(&session, "session.json")?;
/// ```
pub fn write_session(session: &Value, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing session to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, session)?;
    writer.flush()?;

    info!(
        "Session written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a session file into a typed document
///
/// **Public** - useful for inspection and testing
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error or unexpected shape
pub fn read_session(input_path: impl AsRef<Path>) -> Result<SessionDocument, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading session from: {}", input_path.display());

    let file = File::open(input_path)?;
    let session: SessionDocument = serde_json::from_reader(BufReader::new(file))?;

    debug!(
        "Session loaded: {} traces, {} aborts, runtime {:.3}s",
        session.traces.len(),
        session.aborts.len(),
        session.runtime
    );

    Ok(session)
}
