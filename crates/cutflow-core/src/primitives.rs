//! # Engine Constants
//!
//! Compiled-in constants shared by the engine, the persistence formats and
//! the event loop.

/// Magic bytes for the Cutflow binary format header.
///
/// - File Header = Magic Bytes ("CFLW") + Version (u8) + Payload kind (u8).
pub const MAGIC_BYTES: &[u8; 4] = b"CFLW";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Placeholder for a missing link in the `.cflow` text format.
pub const CFLOW_NULL: &str = "null";

/// Field separator of the `.cflow` text format.
pub const CFLOW_DELIMITER: char = ',';

/// Default number of events between two progress log lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// Default number of accepted rows buffered before a sink write.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"CFLW");
    }

    #[test]
    fn batching_is_enabled_by_default() {
        assert!(DEFAULT_BATCH_SIZE > 0);
        assert!(DEFAULT_PROGRESS_EVERY > 0);
    }
}
