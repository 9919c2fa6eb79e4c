//! Format codec between in-memory tables and the two wire encodings.
//!
//! Two encodings are supported:
//!
//! - **Row-delimited**: one JSON object per row, newline-delimited, optionally
//!   gzip-compressed. A leading schema record pins exact column types so the
//!   encoding loses nothing on the way back in.
//! - **Columnar**: a Parquet container with explicit per-column types; logical
//!   types Arrow has no native shape for travel in field metadata.
//!
//! Round-trip law: `decode(encode(t)) == t` for every supported column type.
//! Table equality is by column identity, so reordering on the wire is
//! harmless. Foreign-key columns must already carry their `_id` wire names;
//! the codec never renames columns.
//!
//! Decoding auto-detects the format from leading magic bytes (gzip `1f 8b`,
//! Parquet `PAR1`), with a file-extension hint as fallback. All decode
//! failures surface as `CorruptData` before any network call.

pub mod jsonl;
pub mod parquet;

use std::path::Path;

use crate::error::BulkError;
use crate::table::Table;

/// Wire encoding of a table payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Newline-delimited JSON records.
    Jsonl,
    /// Newline-delimited JSON records, gzip-compressed.
    #[default]
    JsonlGz,
    /// Parquet columnar container.
    Parquet,
}

impl WireFormat {
    /// Canonical file extension, with leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            WireFormat::Jsonl => ".jsonl",
            WireFormat::JsonlGz => ".jsonl.gz",
            WireFormat::Parquet => ".parquet",
        }
    }

    /// Format label used in request bodies. Compression is a transfer detail,
    /// so both row-delimited variants share one label.
    pub fn wire_name(&self) -> &'static str {
        match self {
            WireFormat::Jsonl | WireFormat::JsonlGz => "jsonl",
            WireFormat::Parquet => "parquet",
        }
    }

    /// Infer a format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".jsonl.gz") {
            Some(WireFormat::JsonlGz)
        } else if name.ends_with(".jsonl") {
            Some(WireFormat::Jsonl)
        } else if name.ends_with(".parquet") {
            Some(WireFormat::Parquet)
        } else {
            None
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Detect the wire format of a byte stream.
///
/// Magic bytes win over the extension hint; a stream that matches neither is
/// assumed to be plain row-delimited text.
///
/// # Errors
///
/// `CorruptData` on empty input.
pub fn detect(bytes: &[u8], path_hint: Option<&Path>) -> Result<WireFormat, BulkError> {
    if bytes.is_empty() {
        return Err(BulkError::CorruptData {
            message: "empty input".to_string(),
        });
    }
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        return Ok(WireFormat::JsonlGz);
    }
    if bytes.len() >= 4 && &bytes[..4] == b"PAR1" {
        return Ok(WireFormat::Parquet);
    }
    if let Some(format) = path_hint.and_then(WireFormat::from_path) {
        return Ok(format);
    }
    Ok(WireFormat::Jsonl)
}

/// Encode a table into the given wire format.
///
/// # Errors
///
/// `InvalidRequest` for a column-less table; `CorruptData` when the columnar
/// writer rejects the data.
pub fn encode(table: &Table, format: WireFormat) -> Result<Vec<u8>, BulkError> {
    if table.is_empty() {
        return Err(BulkError::InvalidRequest {
            message: "cannot encode a table with no columns".to_string(),
        });
    }
    match format {
        WireFormat::Jsonl => jsonl::encode(table, false),
        WireFormat::JsonlGz => jsonl::encode(table, true),
        WireFormat::Parquet => parquet::encode(table),
    }
}

/// Decode a byte stream, auto-detecting the format.
///
/// # Errors
///
/// `CorruptData` on truncated or malformed input.
pub fn decode(bytes: &[u8]) -> Result<Table, BulkError> {
    decode_with_hint(bytes, None)
}

/// Decode a byte stream with a file-name hint for ambiguous content.
pub fn decode_with_hint(bytes: &[u8], path_hint: Option<&Path>) -> Result<Table, BulkError> {
    let format = detect(bytes, path_hint)?;
    decode_as(bytes, format)
}

/// Decode a byte stream as a known format.
pub fn decode_as(bytes: &[u8], format: WireFormat) -> Result<Table, BulkError> {
    match format {
        WireFormat::Jsonl => jsonl::decode(bytes, false),
        WireFormat::JsonlGz => jsonl::decode(bytes, true),
        WireFormat::Parquet => parquet::decode(bytes),
    }
}
