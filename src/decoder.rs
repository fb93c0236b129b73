//! Streaming decoder for the self-describing data section
//!
//! Every entry starts with a control byte: the top 3 bits carry the type
//! tag, the low 5 bits the size. Values are decoded directly against an
//! areas-of-interest callback tree; positions the tree does not cover are
//! skipped structurally. No heap allocation happens on any decode path:
//! strings, bytes and big integers are handed to sinks as borrowed views
//! over the database image.
//!
//! Pointers are chased with full cursor save/restore so that a record can
//! reference earlier (deduplicated) data without disturbing the position of
//! the enclosing entry. Skip paths never chase: they step over the pointer
//! payload only.

use crate::callback::Callback;
use crate::error::{Error, Result};

/// Value offsets folded into pointer payloads, indexed by pointer size.
/// Sizes 2 and 3 bias the payload so that smaller encodings cover disjoint
/// ranges (2048 = 1 << 11, 526336 = (1 << 19) + (1 << 11)).
const POINTER_VALUE_OFFSETS: [usize; 5] = [0, 0, 2048, 526336, 0];

/// Cap on chained pointer chases. The format forms a DAG in practice;
/// anything deeper than this is treated as corruption.
const MAX_POINTER_DEPTH: u32 = 32;

/// Data section type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Type {
    Extended,
    Pointer,
    Utf8String,
    Double,
    Bytes,
    Uint16,
    Uint32,
    Map,
    Int32,
    Uint64,
    Uint128,
    Array,
    Container,
    EndMarker,
    Boolean,
    Float,
}

impl Type {
    /// Map a numeric tag (0..=15) to its type
    fn from_tag(tag: u8) -> Result<Type> {
        Ok(match tag {
            0 => Type::Extended,
            1 => Type::Pointer,
            2 => Type::Utf8String,
            3 => Type::Double,
            4 => Type::Bytes,
            5 => Type::Uint16,
            6 => Type::Uint32,
            7 => Type::Map,
            8 => Type::Int32,
            9 => Type::Uint64,
            10 => Type::Uint128,
            11 => Type::Array,
            12 => Type::Container,
            13 => Type::EndMarker,
            14 => Type::Boolean,
            15 => Type::Float,
            _ => {
                return Err(Error::InvalidDatabase(
                    "the data section contains bad data".to_string(),
                ))
            }
        })
    }

    /// The type encoded in the first 3 bits of a control byte
    fn from_control_byte(ctrl: u8) -> Type {
        // 3 bits cover tags 0..=7, all of which are valid.
        match ctrl >> 5 {
            0 => Type::Extended,
            1 => Type::Pointer,
            2 => Type::Utf8String,
            3 => Type::Double,
            4 => Type::Bytes,
            5 => Type::Uint16,
            6 => Type::Uint32,
            _ => Type::Map,
        }
    }
}

/// Cursor-based decoder over the full database image.
///
/// Cheap to construct; one lives on the stack for the duration of a lookup.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pointer_base: usize,
    pos: usize,
    ptr_depth: u32,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8], pointer_base: usize) -> Self {
        Self {
            buf,
            pointer_base,
            pos: 0,
            ptr_depth: 0,
        }
    }

    /// Decode the entry at an absolute offset against a callback tree.
    pub(crate) fn decode_at<S>(
        &mut self,
        offset: usize,
        callback: &Callback<S>,
        state: &mut S,
    ) -> Result<()> {
        if offset >= self.buf.len() {
            return Err(Error::InvalidDatabase(
                "the data section contains bad data: pointer larger than the database".to_string(),
            ));
        }
        self.pos = offset;
        self.decode_entry(callback, state)
    }

    /// Position the cursor at an absolute offset (metadata decoding).
    pub(crate) fn seek(&mut self, offset: usize) -> Result<()> {
        if offset >= self.buf.len() {
            return Err(Error::InvalidDatabase(
                "offset beyond the end of the database".to_string(),
            ));
        }
        self.pos = offset;
        Ok(())
    }

    // ==================== primitives ====================

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or_else(truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn skip_bytes(&mut self, len: usize) -> Result<()> {
        let end = self.pos.checked_add(len).ok_or_else(truncated)?;
        if end > self.buf.len() {
            return Err(truncated());
        }
        self.pos = end;
        Ok(())
    }

    /// Big-endian unsigned integer of `len` bytes folded onto `base`
    /// high bits (the pointer prefix). `len` must be at most 4.
    fn read_uint(&mut self, base: u32, len: usize) -> Result<u32> {
        let mut value = base;
        for &b in self.read_bytes(len)? {
            value = (value << 8) | b as u32;
        }
        Ok(value)
    }

    /// Big-endian unsigned integer of up to 8 bytes
    fn read_u64(&mut self, len: usize) -> Result<u64> {
        let mut value = 0u64;
        for &b in self.read_bytes(len)? {
            value = (value << 8) | b as u64;
        }
        Ok(value)
    }

    fn read_str(&mut self, len: usize) -> Result<&'a str> {
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::BadUtf8)
    }

    // ==================== header handling ====================

    /// Resolve an extended type tag and the (possibly extended) size for a
    /// non-pointer control byte.
    fn entry_header(&mut self, ctrl: u8) -> Result<(Type, usize)> {
        let mut ty = Type::from_control_byte(ctrl);
        if ty == Type::Extended {
            let next = self.read_u8()?;
            let tag = next.checked_add(7).ok_or_else(|| {
                Error::InvalidDatabase("extended type tag out of range".to_string())
            })?;
            // next == 0 would alias the EXTENDED tag itself.
            if tag < 8 {
                return Err(Error::InvalidDatabase(format!(
                    "an extended type resolved to a type number < 8 ({})",
                    tag
                )));
            }
            ty = Type::from_tag(tag)?;
        }

        let mut size = (ctrl & 0x1f) as usize;
        if size >= 29 {
            size = match size {
                29 => 29 + self.read_u8()? as usize,
                30 => 285 + self.read_uint(0, 2)? as usize,
                _ => 65821 + self.read_uint(0, 3)? as usize,
            };
        }
        Ok((ty, size))
    }

    /// Absolute target offset of a pointer entry; consumes the payload.
    fn pointer_target(&mut self, ctrl: u8) -> Result<usize> {
        let pointer_size = (((ctrl >> 3) & 0x3) + 1) as usize;
        let prefix = if pointer_size == 4 {
            0
        } else {
            (ctrl & 0x7) as u32
        };
        let packed = self.read_uint(prefix, pointer_size)? as usize;
        let target = packed + self.pointer_base + POINTER_VALUE_OFFSETS[pointer_size];
        if target >= self.buf.len() {
            return Err(Error::InvalidDatabase(
                "the data section contains bad data: pointer larger than the database".to_string(),
            ));
        }
        Ok(target)
    }

    fn enter_pointer(&mut self) -> Result<()> {
        self.ptr_depth += 1;
        if self.ptr_depth > MAX_POINTER_DEPTH {
            return Err(Error::InvalidDatabase(
                "pointer chain exceeds the maximum depth".to_string(),
            ));
        }
        Ok(())
    }

    // ==================== decode paths ====================

    fn decode_entry<S>(&mut self, callback: &Callback<S>, state: &mut S) -> Result<()> {
        let ctrl = self.read_u8()?;

        // Pointers don't carry a payload of 'size' bytes; the size bits
        // select the pointer width and we follow it, restoring the cursor
        // afterwards so the enclosing entry keeps its position.
        if Type::from_control_byte(ctrl) == Type::Pointer {
            let target = self.pointer_target(ctrl)?;
            let saved = self.pos;
            self.enter_pointer()?;
            self.pos = target;
            self.decode_entry(callback, state)?;
            self.ptr_depth -= 1;
            self.pos = saved;
            return Ok(());
        }

        let (ty, size) = self.entry_header(ctrl)?;
        self.dispatch(ty, size, callback, state)
    }

    fn dispatch<S>(
        &mut self,
        ty: Type,
        size: usize,
        callback: &Callback<S>,
        state: &mut S,
    ) -> Result<()> {
        match ty {
            Type::Map => match callback {
                Callback::Object(node) => self.decode_map(size, node, state),
                _ => self.skip_map(size),
            },
            Type::Array => match callback {
                Callback::Array(node) => self.decode_array(size, node, state),
                _ => self.skip_entries(size),
            },
            Type::Utf8String => match callback {
                Callback::Text(sink) => {
                    let value = self.read_str(size)?;
                    sink(state, value);
                    Ok(())
                }
                _ => self.skip_bytes(size),
            },
            Type::Double => {
                let value = self.decode_double(size)?;
                if let Callback::Float(sink) = callback {
                    sink(state, value);
                }
                Ok(())
            }
            Type::Float => {
                let value = self.decode_float(size)?;
                if let Callback::Float(sink) = callback {
                    sink(state, f64::from(value));
                }
                Ok(())
            }
            Type::Uint16 => {
                self.check_int_width(ty, size, 2)?;
                match callback {
                    Callback::Int(sink) => {
                        let value = self.read_u64(size)?;
                        sink(state, value as i64);
                        Ok(())
                    }
                    _ => self.skip_bytes(size),
                }
            }
            Type::Uint32 => {
                self.check_int_width(ty, size, 4)?;
                match callback {
                    Callback::Int(sink) => {
                        let value = self.read_u64(size)?;
                        sink(state, value as i64);
                        Ok(())
                    }
                    _ => self.skip_bytes(size),
                }
            }
            Type::Int32 => {
                self.check_int_width(ty, size, 4)?;
                match callback {
                    Callback::Int(sink) => {
                        // Stored as minimal-width two's complement,
                        // zero-extended from the most significant byte.
                        let raw = self.read_u64(size)? as u32;
                        sink(state, i64::from(raw as i32));
                        Ok(())
                    }
                    _ => self.skip_bytes(size),
                }
            }
            Type::Uint64 => {
                self.check_int_width(ty, size, 8)?;
                self.dispatch_big_int(size, callback, state)
            }
            Type::Uint128 => {
                self.check_int_width(ty, size, 16)?;
                self.dispatch_big_int(size, callback, state)
            }
            Type::Bytes => match callback {
                Callback::Bytes(sink) => {
                    let value = self.read_bytes(size)?;
                    sink(state, value);
                    Ok(())
                }
                _ => self.skip_bytes(size),
            },
            Type::Boolean => {
                let value = decode_boolean(size)?;
                if let Callback::Bool(sink) = callback {
                    sink(state, value);
                }
                Ok(())
            }
            Type::Extended | Type::Pointer | Type::Container | Type::EndMarker => Err(
                Error::InvalidDatabase(format!("unknown or unexpected type: {:?}", ty)),
            ),
        }
    }

    fn dispatch_big_int<S>(
        &mut self,
        size: usize,
        callback: &Callback<S>,
        state: &mut S,
    ) -> Result<()> {
        match callback {
            Callback::BigInt(sink) => {
                let magnitude = self.read_bytes(size)?;
                sink(state, magnitude);
                Ok(())
            }
            _ => self.skip_bytes(size),
        }
    }

    fn decode_map<S>(
        &mut self,
        size: usize,
        node: &crate::callback::ObjectNode<S>,
        state: &mut S,
    ) -> Result<()> {
        node.begin(state);
        for _ in 0..size {
            let key = self.decode_key()?;
            match node.callback_for_field(key) {
                Some(child) => self.decode_entry(child, state)?,
                None => self.skip_entry()?,
            }
        }
        node.end(state);
        Ok(())
    }

    fn decode_array<S>(
        &mut self,
        size: usize,
        node: &crate::callback::ArrayNode<S>,
        state: &mut S,
    ) -> Result<()> {
        node.begin(state, size);
        for i in 0..size {
            match node.child_for_element(state, i, size) {
                Some(child) => self.decode_entry(child, state)?,
                None => self.skip_entry()?,
            }
        }
        node.end(state);
        Ok(())
    }

    /// Decode a map key as a transient string view, chasing pointers.
    /// The view is valid until the underlying buffer goes away; the decoder
    /// itself never invalidates it.
    pub(crate) fn decode_key(&mut self) -> Result<&'a str> {
        let ctrl = self.read_u8()?;

        if Type::from_control_byte(ctrl) == Type::Pointer {
            let target = self.pointer_target(ctrl)?;
            let saved = self.pos;
            self.enter_pointer()?;
            self.pos = target;
            let key = self.decode_key()?;
            self.ptr_depth -= 1;
            self.pos = saved;
            return Ok(key);
        }

        let (ty, size) = self.entry_header(ctrl)?;
        if ty != Type::Utf8String {
            return Err(Error::InvalidDatabase(format!(
                "map key has type {:?}, expected a string",
                ty
            )));
        }
        self.read_str(size)
    }

    fn decode_double(&mut self, size: usize) -> Result<f64> {
        if size != 8 {
            return Err(Error::InvalidDatabase(
                "the data section contains bad data: invalid size of double".to_string(),
            ));
        }
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    fn decode_float(&mut self, size: usize) -> Result<f32> {
        if size != 4 {
            return Err(Error::InvalidDatabase(
                "the data section contains bad data: invalid size of float".to_string(),
            ));
        }
        let bytes = self.read_bytes(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(f32::from_be_bytes(raw))
    }

    fn check_int_width(&self, ty: Type, size: usize, max: usize) -> Result<()> {
        if size > max {
            return Err(Error::InvalidDatabase(format!(
                "the data section contains bad data: {:?} stored in {} bytes",
                ty, size
            )));
        }
        Ok(())
    }

    // ==================== skip paths ====================

    /// Step over one entry without dispatching anything. Compound types
    /// descend structurally; pointers are not chased.
    pub(crate) fn skip_entry(&mut self) -> Result<()> {
        let ctrl = self.read_u8()?;

        if Type::from_control_byte(ctrl) == Type::Pointer {
            let pointer_size = (((ctrl >> 3) & 0x3) + 1) as usize;
            return self.skip_bytes(pointer_size);
        }

        let (ty, size) = self.entry_header(ctrl)?;
        match ty {
            Type::Map => self.skip_map(size),
            Type::Array => self.skip_entries(size),
            Type::Boolean => decode_boolean(size).map(|_| ()),
            Type::Double => {
                if size != 8 {
                    return Err(Error::InvalidDatabase(
                        "the data section contains bad data: invalid size of double".to_string(),
                    ));
                }
                self.skip_bytes(8)
            }
            Type::Float => {
                if size != 4 {
                    return Err(Error::InvalidDatabase(
                        "the data section contains bad data: invalid size of float".to_string(),
                    ));
                }
                self.skip_bytes(4)
            }
            Type::Utf8String
            | Type::Bytes
            | Type::Uint16
            | Type::Uint32
            | Type::Int32
            | Type::Uint64
            | Type::Uint128 => self.skip_bytes(size),
            Type::Extended | Type::Pointer | Type::Container | Type::EndMarker => Err(
                Error::InvalidDatabase(format!("unknown or unexpected type: {:?}", ty)),
            ),
        }
    }

    fn skip_map(&mut self, size: usize) -> Result<()> {
        for _ in 0..size {
            self.skip_entry()?; // key
            self.skip_entry()?; // value
        }
        Ok(())
    }

    fn skip_entries(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.skip_entry()?;
        }
        Ok(())
    }

    // ==================== metadata helpers ====================
    //
    // Open-time decoding of the metadata map. These materialize owned
    // values; allocation is fine here, it happens once per Reader.

    /// Expect a map header at the cursor and return its entry count.
    pub(crate) fn read_meta_map_header(&mut self) -> Result<usize> {
        let ctrl = self.read_u8()?;
        let (ty, size) = self.entry_header(ctrl)?;
        if ty != Type::Map {
            return Err(Error::InvalidDatabase("metadata is not a map".to_string()));
        }
        Ok(size)
    }

    /// Decode an unsigned integer entry of any legal width.
    pub(crate) fn read_meta_uint(&mut self) -> Result<u64> {
        let ctrl = self.read_u8()?;

        if Type::from_control_byte(ctrl) == Type::Pointer {
            let target = self.pointer_target(ctrl)?;
            let saved = self.pos;
            self.enter_pointer()?;
            self.pos = target;
            let value = self.read_meta_uint()?;
            self.ptr_depth -= 1;
            self.pos = saved;
            return Ok(value);
        }

        let (ty, size) = self.entry_header(ctrl)?;
        let max = match ty {
            Type::Uint16 => 2,
            Type::Uint32 => 4,
            Type::Uint64 => 8,
            _ => {
                return Err(Error::InvalidDatabase(format!(
                    "metadata field has type {:?}, expected an unsigned integer",
                    ty
                )))
            }
        };
        self.check_int_width(ty, size, max)?;
        self.read_u64(size)
    }

    /// Decode a string entry into an owned `String`.
    pub(crate) fn read_meta_string(&mut self) -> Result<String> {
        Ok(self.decode_key()?.to_string())
    }

    /// Decode an array-of-strings entry.
    pub(crate) fn read_meta_string_array(&mut self) -> Result<Vec<String>> {
        let ctrl = self.read_u8()?;

        if Type::from_control_byte(ctrl) == Type::Pointer {
            let target = self.pointer_target(ctrl)?;
            let saved = self.pos;
            self.enter_pointer()?;
            self.pos = target;
            let value = self.read_meta_string_array()?;
            self.ptr_depth -= 1;
            self.pos = saved;
            return Ok(value);
        }

        let (ty, size) = self.entry_header(ctrl)?;
        if ty != Type::Array {
            return Err(Error::InvalidDatabase(format!(
                "metadata field has type {:?}, expected an array",
                ty
            )));
        }
        let mut values = Vec::with_capacity(size);
        for _ in 0..size {
            values.push(self.read_meta_string()?);
        }
        Ok(values)
    }

    /// Decode a map-of-strings entry (e.g. the description map).
    pub(crate) fn read_meta_string_map(&mut self) -> Result<Vec<(String, String)>> {
        let ctrl = self.read_u8()?;

        if Type::from_control_byte(ctrl) == Type::Pointer {
            let target = self.pointer_target(ctrl)?;
            let saved = self.pos;
            self.enter_pointer()?;
            self.pos = target;
            let value = self.read_meta_string_map()?;
            self.ptr_depth -= 1;
            self.pos = saved;
            return Ok(value);
        }

        let (ty, size) = self.entry_header(ctrl)?;
        if ty != Type::Map {
            return Err(Error::InvalidDatabase(format!(
                "metadata field has type {:?}, expected a map",
                ty
            )));
        }
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let key = self.read_meta_string()?;
            let value = self.read_meta_string()?;
            entries.push((key, value));
        }
        Ok(entries)
    }
}

fn decode_boolean(size: usize) -> Result<bool> {
    match size {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidDatabase(
            "the data section contains bad data: invalid size of boolean".to_string(),
        )),
    }
}

fn truncated() -> Error {
    Error::InvalidDatabase("the data section contains bad data: unexpected end of data".to_string())
}
