//! Top-level database reader
//!
//! A [`Reader`] owns the database image (memory-mapped or fully loaded),
//! decodes the metadata once at open time and serves lookups. The image
//! and metadata are immutable after open, so any number of threads may
//! call [`Reader::lookup`] concurrently on one shared instance; per-lookup
//! scratch is a stack-local cursor.

use crate::callback::RecordSpec;
use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::metadata::{find_metadata_start, Metadata};
use crate::tree::TreeWalker;
use crate::types::{RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::sync::RwLock;

/// Storage for the database image - either owned or memory-mapped
#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mapped(m) => &m[..],
        }
    }
}

/// Reader for the MaxMind DB format.
///
/// Open one per database; share it freely across threads. Lookups stream
/// the matched record against a caller-built [`RecordSpec`] and allocate
/// nothing on the heap.
///
/// # Example
///
/// ```no_run
/// use mmdb_sift::{Reader, RecordBuilder};
///
/// #[derive(Default)]
/// struct Hit {
///     prefix_len: u32,
/// }
///
/// let reader = Reader::open("GeoIP2-Country.mmdb")?;
///
/// let mut builder = RecordBuilder::<Hit>::new();
/// builder.on_network(|state: &mut Hit, _addr, prefix_len| {
///     state.prefix_len = prefix_len;
/// })?;
/// let spec = builder.build();
///
/// let mut hit = Hit::default();
/// reader.lookup("81.2.69.160".parse()?, &spec, &mut hit)?;
/// println!("matched /{}", hit.prefix_len);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Reader {
    storage: RwLock<Option<Storage>>,
    metadata: Metadata,
    record_size: RecordSize,
    node_count: u32,
    search_tree_size: usize,
    pointer_base: usize,
    ipv4_start: u32,
}

impl Reader {
    /// Open a database file using a read-only memory mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Io(format!("failed to open {}: {}", path.display(), e)))?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::Io(format!("failed to mmap {}: {}", path.display(), e)))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_storage(Storage::Mapped(mmap), &name)
    }

    /// Create a reader from an in-memory image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(Storage::Owned(data), "<bytes>")
    }

    /// Load a database image fully from a stream.
    pub fn from_read<R: Read>(mut source: R) -> Result<Self> {
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| Error::Io(format!("failed to read database stream: {}", e)))?;
        Self::from_storage(Storage::Owned(data), "<stream>")
    }

    fn from_storage(storage: Storage, name: &str) -> Result<Self> {
        let data = storage.as_slice();

        let metadata_start = find_metadata_start(data, name)?;
        let metadata = Metadata::decode(data, metadata_start)?;

        let record_size = RecordSize::from_bits(metadata.record_size)?;
        let node_count = metadata.node_count;
        let search_tree_size = metadata.search_tree_size();

        if search_tree_size + DATA_SECTION_SEPARATOR_SIZE > metadata_start {
            return Err(Error::InvalidDatabase(format!(
                "search tree of {} bytes does not fit in the image",
                search_tree_size
            )));
        }

        let ipv4_start = if metadata.ip_version == 4 {
            0
        } else {
            TreeWalker::new(data, node_count, record_size).ipv4_start()?
        };

        let pointer_base = metadata.pointer_base();

        Ok(Self {
            storage: RwLock::new(Some(storage)),
            metadata,
            record_size,
            node_count,
            search_tree_size,
            pointer_base,
            ipv4_start,
        })
    }

    /// The decoded database metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up an IP address, reporting results through `spec`.
    ///
    /// The network notification fires exactly once with the raw queried
    /// address and the matched prefix length, whether or not a data record
    /// exists for it; value sinks fire only for fields of interest that are
    /// present in the matched record.
    pub fn lookup<S>(&self, address: IpAddr, spec: &RecordSpec<S>, state: &mut S) -> Result<()> {
        match address {
            IpAddr::V4(v4) => self.lookup_bytes(&v4.octets(), spec, state),
            IpAddr::V6(v6) => self.lookup_bytes(&v6.octets(), spec, state),
        }
    }

    /// Look up a raw address: 4 bytes for IPv4, 16 for IPv6.
    pub fn lookup_bytes<S>(
        &self,
        address: &[u8],
        spec: &RecordSpec<S>,
        state: &mut S,
    ) -> Result<()> {
        if address.len() != 4 && address.len() != 16 {
            return Err(Error::CallerContract(format!(
                "address must be 4 or 16 bytes, got {}",
                address.len()
            )));
        }

        let guard = match self.storage.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let storage = guard.as_ref().ok_or(Error::ClosedDatabase)?;
        let buf = storage.as_slice();

        let walker = TreeWalker::new(buf, self.node_count, self.record_size);
        let bit_length = address.len() * 8;

        let mut record = self.start_node(bit_length);
        let mut prefix_len = 0usize;
        while prefix_len < bit_length && record < self.node_count {
            let byte = address[prefix_len / 8];
            let bit = (byte >> (7 - (prefix_len % 8))) & 1;
            record = walker.read_child(record, bit)?;
            prefix_len += 1;
        }

        // The matched network is known at this point, data or not.
        spec.network(state, address, prefix_len as u32);

        if record > self.node_count {
            let offset = (record - self.node_count) as usize + self.search_tree_size;
            let mut decoder = Decoder::new(buf, self.pointer_base);
            decoder.decode_at(offset, spec.root(), state)?;
        }

        Ok(())
    }

    /// Starting node for a walk: IPv4 queries against an IPv6 tree skip
    /// the 96 zero bits of the IPv4-mapped prefix, precomputed at open.
    fn start_node(&self, bit_length: usize) -> u32 {
        if self.metadata.ip_version == 6 && bit_length == 32 {
            self.ipv4_start
        } else {
            0
        }
    }

    /// Release the database image. Idempotent; lookups after this fail
    /// with [`Error::ClosedDatabase`]. A memory-mapped image is unmapped
    /// once the last in-flight lookup finishes.
    pub fn close(&self) {
        let mut guard = match self.storage.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }
}
