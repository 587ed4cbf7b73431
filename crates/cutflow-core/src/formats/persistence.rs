//! # Persistence Format
//!
//! Binary serialization for cutflow summaries and record tables.
//!
//! File I/O operations are in `sink`; this module only transforms bytes.
//!
//! Format: Header (6 bytes) + postcard-serialized payload.
//! - 4 bytes: Magic ("CFLW")
//! - 1 byte: Version
//! - 1 byte: Payload kind (summary, table or row stream)
//!
//! A row stream is written incrementally: after the header come
//! length-prefixed frames (u32 little-endian length, then postcard bytes).
//! The first frame is the column schema, every later frame one row.
//!
//! Size and header are validated before any payload is deserialized.

use crate::{Column, CutflowError, CutflowSummary, RecordTable, Row, Value, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed payload size for persistence format.
///
/// Validated BEFORE attempting deserialization.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 2 * 1024 * 1024 * 1024; // 2 GB

/// Header length in bytes.
const HEADER_LEN: usize = 6;

/// Length prefix of one row stream frame.
const FRAME_PREFIX_LEN: usize = 4;

// =============================================================================
// FILE HEADER
// =============================================================================

/// What a persisted payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Summary,
    Table,
    RowStream,
}

impl PayloadKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Summary => 1,
            Self::Table => 2,
            Self::RowStream => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CutflowError> {
        match tag {
            1 => Ok(Self::Summary),
            2 => Ok(Self::Table),
            3 => Ok(Self::RowStream),
            other => Err(CutflowError::DeserializationError(format!(
                "Unknown payload kind: {}",
                other
            ))),
        }
    }
}

/// The persistence header precedes all payload data.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub kind: PayloadKind,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            kind,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), CutflowError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(CutflowError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(CutflowError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.kind.tag();
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CutflowError> {
        if bytes.len() < HEADER_LEN {
            return Err(CutflowError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
            kind: PayloadKind::from_tag(bytes[5])?,
        })
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

fn encode<T: Serialize>(kind: PayloadKind, value: &T) -> Result<Vec<u8>, CutflowError> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| CutflowError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&PersistenceHeader::new(kind).to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Validate size and header, returning the payload kind and bytes.
fn open_payload(bytes: &[u8]) -> Result<(PayloadKind, &[u8]), CutflowError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(CutflowError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;
    Ok((header.kind, &bytes[HEADER_LEN..]))
}

fn payload_error(e: postcard::Error) -> CutflowError {
    CutflowError::DeserializationError(format!("Failed to deserialize payload: {}", e))
}

fn decode<T: DeserializeOwned>(expected: PayloadKind, bytes: &[u8]) -> Result<T, CutflowError> {
    let (kind, payload) = open_payload(bytes)?;
    if kind != expected {
        return Err(CutflowError::DeserializationError(format!(
            "Expected {:?} payload, found {:?}",
            expected, kind
        )));
    }
    postcard::from_bytes(payload).map_err(payload_error)
}

// =============================================================================
// ROW STREAM FRAMES
// =============================================================================

fn frame<T: Serialize>(value: &T) -> Result<Vec<u8>, CutflowError> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| CutflowError::SerializationError(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CutflowError::SerializationError(format!("Frame of {} bytes is too large", payload.len()))
    })?;

    let mut result = Vec::with_capacity(FRAME_PREFIX_LEN + payload.len());
    result.extend_from_slice(&len.to_le_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Split one frame off the front of `bytes`.
fn split_frame(bytes: &[u8]) -> Result<(&[u8], &[u8]), CutflowError> {
    let truncated = || CutflowError::DeserializationError("Truncated row stream frame".to_string());
    if bytes.len() < FRAME_PREFIX_LEN {
        return Err(truncated());
    }
    let (prefix, rest) = bytes.split_at(FRAME_PREFIX_LEN);
    let mut len = [0u8; FRAME_PREFIX_LEN];
    len.copy_from_slice(prefix);
    let len = u32::from_le_bytes(len) as usize;
    if rest.len() < len {
        return Err(truncated());
    }
    Ok(rest.split_at(len))
}

/// Header and schema frame that open a row stream.
pub fn row_stream_start(columns: &[Column]) -> Result<Vec<u8>, CutflowError> {
    let mut result = PersistenceHeader::new(PayloadKind::RowStream).to_bytes().to_vec();
    result.extend_from_slice(&frame(&columns)?);
    Ok(result)
}

/// One row frame of a row stream.
pub fn row_frame(row: &[Value]) -> Result<Vec<u8>, CutflowError> {
    frame(&row)
}

fn decode_row_stream(payload: &[u8]) -> Result<RecordTable, CutflowError> {
    let (schema, mut rest) = split_frame(payload)?;
    let columns: Vec<Column> = postcard::from_bytes(schema).map_err(payload_error)?;

    let mut rows = Vec::new();
    while !rest.is_empty() {
        let (row, tail) = split_frame(rest)?;
        let row: Row = postcard::from_bytes(row).map_err(payload_error)?;
        if row.len() != columns.len() {
            return Err(CutflowError::DeserializationError(format!(
                "Row {} has {} values for {} columns",
                rows.len(),
                row.len(),
                columns.len()
            )));
        }
        rows.push(row);
        rest = tail;
    }

    Ok(RecordTable {
        columns,
        rows,
        finalized: true,
    })
}

// =============================================================================
// PUBLIC ENCODERS
// =============================================================================

/// Serialize a cutflow summary to bytes (header + payload).
pub fn summary_to_bytes(summary: &CutflowSummary) -> Result<Vec<u8>, CutflowError> {
    encode(PayloadKind::Summary, summary)
}

/// Deserialize a cutflow summary, re-validating its network.
pub fn summary_from_bytes(bytes: &[u8]) -> Result<CutflowSummary, CutflowError> {
    decode(PayloadKind::Summary, bytes)
}

/// Serialize a record table to bytes (header + payload).
pub fn table_to_bytes(table: &RecordTable) -> Result<Vec<u8>, CutflowError> {
    encode(PayloadKind::Table, table)
}

/// Deserialize a record table, whole or written as a row stream.
pub fn table_from_bytes(bytes: &[u8]) -> Result<RecordTable, CutflowError> {
    match open_payload(bytes)? {
        (PayloadKind::Table, payload) => postcard::from_bytes(payload).map_err(payload_error),
        (PayloadKind::RowStream, payload) => decode_row_stream(payload),
        (PayloadKind::Summary, _) => Err(CutflowError::DeserializationError(
            "Expected Table payload, found Summary".to_string(),
        )),
    }
}

/// BLAKE3 hash of the persisted summary bytes, as hex.
#[cfg(feature = "crypto-hash")]
pub fn summary_crypto_hash(summary: &CutflowSummary) -> Result<String, CutflowError> {
    let bytes = summary_to_bytes(summary)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
