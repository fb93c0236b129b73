//! Format constants and small shared types
//!
//! The MaxMind DB image is three regions laid end to end: the search tree,
//! a 16-byte zero separator, and the data section. A marker near the end of
//! the file introduces the metadata map.

use crate::error::{Error, Result};

/// Metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Width of the zero separator between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Record size in bits
///
/// Each search-tree node packs two records of this width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32,
}

impl RecordSize {
    /// Size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record width in bits
    pub fn bits(self) -> u16 {
        match self {
            RecordSize::Bits24 => 24,
            RecordSize::Bits28 => 28,
            RecordSize::Bits32 => 32,
        }
    }

    /// Create from the bit width stored in metadata
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(Error::InvalidDatabase(format!(
                "unsupported record size: {} bits",
                bits
            ))),
        }
    }
}
