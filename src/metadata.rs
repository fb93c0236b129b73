//! Metadata locating and decoding
//!
//! The metadata map sits at the very end of the database image, introduced
//! by the 14-byte marker `\xAB\xCD\xEF MaxMind.com`. It is found by
//! scanning the tail of the image backwards and decoded once at open time
//! with the same streaming decoder used for the data section, with the
//! pointer base anchored at the start of the metadata block.

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::types::{RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use std::collections::HashMap;

/// The marker appears within the last 128KB of the file. If several occur
/// (possible when a data value happens to contain the byte sequence), the
/// last one wins, matching libmaxminddb.
const METADATA_SEARCH_WINDOW: usize = 128 * 1024;

/// Decoded database header.
///
/// All fields are read-only and fixed for the lifetime of the reader.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Major version of the binary format (2 for current databases)
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Unix timestamp of the database build
    pub build_epoch: u64,
    /// Free-form database type, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Localized descriptions, keyed by language code
    pub description: HashMap<String, String>,
    /// IP version the search tree covers: 4 or 6
    pub ip_version: u16,
    /// Locale codes the record data is available in
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Search-tree record width in bits: 24, 28 or 32
    pub record_size: u16,
}

impl Metadata {
    /// Decode the metadata map beginning at `start` (the byte right after
    /// the marker). Fails if a required field is missing or malformed.
    pub(crate) fn decode(data: &[u8], start: usize) -> Result<Self> {
        let mut decoder = Decoder::new(data, start);
        decoder.seek(start)?;

        let mut binary_format_major_version = None;
        let mut binary_format_minor_version = None;
        let mut build_epoch = None;
        let mut database_type = None;
        let mut description = None;
        let mut ip_version = None;
        let mut languages = None;
        let mut node_count = None;
        let mut record_size = None;

        let entries = decoder.read_meta_map_header()?;
        for _ in 0..entries {
            let key = decoder.decode_key()?;
            match key {
                "binary_format_major_version" => {
                    binary_format_major_version = Some(decoder.read_meta_uint()? as u16)
                }
                "binary_format_minor_version" => {
                    binary_format_minor_version = Some(decoder.read_meta_uint()? as u16)
                }
                "build_epoch" => build_epoch = Some(decoder.read_meta_uint()?),
                "database_type" => database_type = Some(decoder.read_meta_string()?),
                "description" => {
                    description = Some(decoder.read_meta_string_map()?.into_iter().collect())
                }
                "ip_version" => ip_version = Some(decoder.read_meta_uint()? as u16),
                "languages" => languages = Some(decoder.read_meta_string_array()?),
                "node_count" => node_count = Some(decoder.read_meta_uint()? as u32),
                "record_size" => record_size = Some(decoder.read_meta_uint()? as u16),
                _ => decoder.skip_entry()?,
            }
        }

        let metadata = Metadata {
            binary_format_major_version: required(
                binary_format_major_version,
                "binary_format_major_version",
            )?,
            binary_format_minor_version: required(
                binary_format_minor_version,
                "binary_format_minor_version",
            )?,
            build_epoch: required(build_epoch, "build_epoch")?,
            database_type: required(database_type, "database_type")?,
            description: required(description, "description")?,
            ip_version: required(ip_version, "ip_version")?,
            languages: required(languages, "languages")?,
            node_count: required(node_count, "node_count")?,
            record_size: required(record_size, "record_size")?,
        };

        RecordSize::from_bits(metadata.record_size)?;
        if metadata.ip_version != 4 && metadata.ip_version != 6 {
            return Err(Error::InvalidDatabase(format!(
                "invalid IP version: {}",
                metadata.ip_version
            )));
        }

        Ok(metadata)
    }

    /// Size of the search tree in bytes
    pub fn search_tree_size(&self) -> usize {
        // record_size was validated at decode time
        let node_bytes = match self.record_size {
            24 => 6,
            28 => 7,
            _ => 8,
        };
        self.node_count as usize * node_bytes
    }

    /// Base added to data-section pointer payloads: the tree plus the
    /// 16-byte separator that follows it
    pub(crate) fn pointer_base(&self) -> usize {
        self.search_tree_size() + DATA_SECTION_SEPARATOR_SIZE
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        Error::InvalidDatabase(format!("metadata is missing the '{}' field", key))
    })
}

/// Find the offset just past the metadata marker, scanning the tail of the
/// image backwards. `name` identifies the database in the error message.
pub(crate) fn find_metadata_start(data: &[u8], name: &str) -> Result<usize> {
    let marker_len = METADATA_MARKER.len();
    if data.len() >= marker_len {
        let window_start = data.len().saturating_sub(METADATA_SEARCH_WINDOW);
        let mut i = data.len() - marker_len;
        loop {
            if &data[i..i + marker_len] == METADATA_MARKER {
                return Ok(i + marker_len);
            }
            if i == window_start {
                break;
            }
            i -= 1;
        }
    }
    Err(Error::InvalidDatabase(format!(
        "could not find a MaxMind DB metadata marker in this file ({}); \
         is this a valid MaxMind DB file?",
        name
    )))
}
