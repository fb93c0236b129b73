//! mmdb-sift - Zero-Allocation MaxMind DB Reader
//!
//! mmdb-sift reads MaxMind DB files (GeoIP2, GeoLite2 and anything else in
//! the MMDB format) through a callback-driven query interface. Instead of
//! materializing each matched record as a tree of owned values, you declare
//! the fields you care about up front; the decoder streams the record and
//! fires your sinks for exactly those fields, skipping everything else.
//! After warm-up, a lookup allocates zero bytes on the heap.
//!
//! # Quick Start
//!
//! ```no_run
//! use mmdb_sift::{Reader, RecordBuilder};
//!
//! #[derive(Default)]
//! struct CityInfo {
//!     city: String,
//!     latitude: f64,
//!     prefix_len: u32,
//! }
//!
//! let reader = Reader::open("GeoIP2-City.mmdb")?;
//!
//! // Describe the areas of interest once; reuse the spec for every lookup.
//! let mut builder = RecordBuilder::<CityInfo>::new();
//! builder.on_network(|state: &mut CityInfo, _addr, prefix_len| {
//!     state.prefix_len = prefix_len;
//! })?;
//! builder
//!     .obj("city")?
//!     .obj("names")?
//!     .text("en", |state: &mut CityInfo, name| {
//!         state.city.clear();
//!         state.city.push_str(name); // views are transient - copy to keep
//!     })?;
//! builder
//!     .obj("location")?
//!     .number("latitude", |state: &mut CityInfo, v| state.latitude = v)?;
//! let spec = builder.build();
//!
//! let mut info = CityInfo::default();
//! reader.lookup("81.2.69.160".parse()?, &spec, &mut info)?;
//! println!("{} ({}) /{}", info.city, info.latitude, info.prefix_len);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Key Properties
//!
//! - **Zero-Allocation Lookups**: strings, bytes and big integers reach
//!   sinks as borrowed views over the mapped file
//! - **Selective Decoding**: fields outside the spec are skipped
//!   structurally, never decoded
//! - **Zero-Copy Loading**: memory-mapped files are ready immediately
//! - **Thread-Safe**: one `Reader`, arbitrarily many concurrent lookups
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  MaxMind DB Image                   │
//! ├─────────────────────────────────────┤
//! │  1. Search Tree (binary trie)       │
//! │  2. 16-byte separator               │
//! │  3. Data Section (self-describing)  │
//! │  4. Metadata (marker + map)         │
//! └─────────────────────────────────────┘
//!        │ lookup(ip)
//!        ▼
//!   tree walk ──▶ data pointer ──▶ streaming decode
//!                                  against the callback spec
//! ```
//!
//! Callbacks fire in depth-first document order: object fields in stored
//! order, array elements by ascending index, begin strictly before and end
//! strictly after children.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
/// Areas-of-interest callback trees and builders
pub mod callback;
mod decoder;
/// Error types for reader operations
pub mod error;
mod metadata;
mod reader;
mod tree;
/// Format constants and record-size handling
pub mod types;

// Re-exports for the common path

/// Database reader
pub use crate::reader::Reader;

/// Decoded database metadata
pub use crate::metadata::Metadata;

pub use crate::callback::{Callback, ObjectBuilder, RecordBuilder, RecordSpec};
pub use crate::error::{Error, Result};
pub use crate::types::RecordSize;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library major version
pub const VERSION_MAJOR: u32 = 0;

/// Library minor version
pub const VERSION_MINOR: u32 = 1;

/// Library patch version
pub const VERSION_PATCH: u32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION_MAJOR, 0);
        assert_eq!(VERSION_MINOR, 1);
        assert_eq!(VERSION_PATCH, 0);
    }
}
