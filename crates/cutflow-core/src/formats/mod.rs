//! # Persistence Formats
//!
//! Byte-level encodings of run results. File handling lives in `sink`.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PayloadKind, PersistenceHeader, row_frame, row_stream_start,
    summary_from_bytes, summary_to_bytes, table_from_bytes, table_to_bytes,
};

#[cfg(feature = "crypto-hash")]
pub use persistence::summary_crypto_hash;
