//! Areas-of-interest callback trees
//!
//! A lookup does not materialize the matched record. Instead the caller
//! builds a [`RecordSpec`] describing which fields are of interest, and the
//! decoder streams the record against it: registered sinks fire with typed
//! values, everything else is skipped structurally without allocation.
//!
//! Sinks receive the caller-owned state by mutable reference plus the
//! decoded value. Text, bytes and big-integer sinks receive *borrowed*
//! views backed by the database image; they are valid only for the duration
//! of the sink call and must be copied if retention is desired.
//!
//! # Example
//!
//! ```
//! use mmdb_sift::RecordBuilder;
//!
//! #[derive(Default)]
//! struct Geo {
//!     country: String,
//! }
//!
//! let mut builder = RecordBuilder::<Geo>::new();
//! builder
//!     .obj("country")?
//!     .obj("names")?
//!     .text("en", |state: &mut Geo, value| {
//!         state.country.clear();
//!         state.country.push_str(value);
//!     })?;
//! let spec = builder.build();
//! # let _ = spec;
//! # Ok::<(), mmdb_sift::Error>(())
//! ```

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;

/// Sink for string values. The `&str` is transient: it borrows decoder
/// scratch and is invalidated when the sink returns.
pub type TextSink<S> = Box<dyn Fn(&mut S, &str) + Send + Sync>;

/// Sink for `UINT16`, `UINT32` and `INT32` values, widened to `i64`.
pub type IntSink<S> = Box<dyn Fn(&mut S, i64) + Send + Sync>;

/// Sink for `DOUBLE` and `FLOAT` values, widened to `f64`.
pub type FloatSink<S> = Box<dyn Fn(&mut S, f64) + Send + Sync>;

/// Sink for raw byte values. The slice is transient.
pub type BytesSink<S> = Box<dyn Fn(&mut S, &[u8]) + Send + Sync>;

/// Sink for boolean values.
pub type BoolSink<S> = Box<dyn Fn(&mut S, bool) + Send + Sync>;

/// Sink for `UINT64` and `UINT128` values, delivered as the big-endian
/// magnitude bytes exactly as stored. The slice is transient.
pub type BigIntSink<S> = Box<dyn Fn(&mut S, &[u8]) + Send + Sync>;

/// Callback fired when an object of interest begins or ends.
pub type ObjectEdgeSink<S> = Box<dyn Fn(&mut S) + Send + Sync>;

/// Callback fired when an array of interest begins; receives the length.
pub type ArrayBeginSink<S> = Box<dyn Fn(&mut S, usize) + Send + Sync>;

/// Per-element dispatcher for arrays: given `(state, index, len)`, returns
/// the index of the child callback to decode the element with, or `None`
/// to skip it.
pub type ElementSelector<S> = Box<dyn Fn(&mut S, usize, usize) -> Option<usize> + Send + Sync>;

/// Callback fired once per lookup with the raw queried address bytes and
/// the matched prefix length.
pub type NetworkSink<S> = Box<dyn Fn(&mut S, &[u8], u32) + Send + Sync>;

/// One node of the areas-of-interest tree.
///
/// The decoder matches the on-disk type against the variant; a mismatch
/// (say, a `Text` callback registered where the data holds a map) skips the
/// value instead of firing the sink.
pub enum Callback<S> {
    /// Sink for a `UTF8_STRING` value
    Text(TextSink<S>),
    /// Sink for an integer value (`UINT16`, `UINT32`, `INT32`)
    Int(IntSink<S>),
    /// Sink for a floating-point value (`DOUBLE`, `FLOAT`)
    Float(FloatSink<S>),
    /// Sink for a `BYTES` value
    Bytes(BytesSink<S>),
    /// Sink for a `BOOLEAN` value
    Bool(BoolSink<S>),
    /// Sink for a `UINT64` or `UINT128` value
    BigInt(BigIntSink<S>),
    /// Interest in an array and (some of) its elements
    Array(ArrayNode<S>),
    /// Interest in a map and (some of) its fields
    Object(ObjectNode<S>),
}

impl<S> Callback<S> {
    /// Leaf callback for a string value
    pub fn text(sink: impl Fn(&mut S, &str) + Send + Sync + 'static) -> Self {
        Callback::Text(Box::new(sink))
    }

    /// Leaf callback for an integer value
    pub fn integer(sink: impl Fn(&mut S, i64) + Send + Sync + 'static) -> Self {
        Callback::Int(Box::new(sink))
    }

    /// Leaf callback for a floating-point value
    pub fn number(sink: impl Fn(&mut S, f64) + Send + Sync + 'static) -> Self {
        Callback::Float(Box::new(sink))
    }

    /// Leaf callback for a raw byte value
    pub fn bytes(sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static) -> Self {
        Callback::Bytes(Box::new(sink))
    }

    /// Leaf callback for a boolean value
    pub fn boolean(sink: impl Fn(&mut S, bool) + Send + Sync + 'static) -> Self {
        Callback::Bool(Box::new(sink))
    }

    /// Leaf callback for a big-integer value
    pub fn big_int(sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static) -> Self {
        Callback::BigInt(Box::new(sink))
    }
}

/// Interest specification for a map: a field-name lookup table plus
/// optional begin/end notifications.
pub struct ObjectNode<S> {
    fields: FxHashMap<Box<str>, Callback<S>>,
    on_begin: Option<ObjectEdgeSink<S>>,
    on_end: Option<ObjectEdgeSink<S>>,
}

impl<S> ObjectNode<S> {
    /// Look up the callback registered for a field, comparing against the
    /// transient key view without copying.
    pub(crate) fn callback_for_field(&self, field: &str) -> Option<&Callback<S>> {
        self.fields.get(field)
    }

    pub(crate) fn begin(&self, state: &mut S) {
        if let Some(f) = &self.on_begin {
            f(state);
        }
    }

    pub(crate) fn end(&self, state: &mut S) {
        if let Some(f) = &self.on_end {
            f(state);
        }
    }
}

/// Interest specification for an array.
///
/// `children` holds the candidate callbacks; the selector picks one of
/// them (by index) per element, or `None` to skip that element. An
/// out-of-range selection also skips.
pub struct ArrayNode<S> {
    on_begin: Option<ArrayBeginSink<S>>,
    children: Vec<Callback<S>>,
    selector: ElementSelector<S>,
    on_end: Option<ObjectEdgeSink<S>>,
}

impl<S> ArrayNode<S> {
    pub(crate) fn begin(&self, state: &mut S, len: usize) {
        if let Some(f) = &self.on_begin {
            f(state, len);
        }
    }

    pub(crate) fn child_for_element(
        &self,
        state: &mut S,
        index: usize,
        len: usize,
    ) -> Option<&Callback<S>> {
        let chosen = (self.selector)(state, index, len)?;
        self.children.get(chosen)
    }

    pub(crate) fn end(&self, state: &mut S) {
        if let Some(f) = &self.on_end {
            f(state);
        }
    }
}

/// Compiled record-level specification: the root object interest plus an
/// optional network notification. Built with [`RecordBuilder`].
pub struct RecordSpec<S> {
    root: Callback<S>,
    on_network: Option<NetworkSink<S>>,
}

impl<S> RecordSpec<S> {
    pub(crate) fn root(&self) -> &Callback<S> {
        &self.root
    }

    pub(crate) fn network(&self, state: &mut S, address: &[u8], prefix_len: u32) {
        if let Some(f) = &self.on_network {
            f(state, address, prefix_len);
        }
    }
}

/// Builder for object interest nodes.
///
/// Each `(object, key)` slot holds at most one registration; a duplicate or
/// a leaf/sub-object conflict fails immediately with
/// [`Error::CallerContract`].
pub struct ObjectBuilder<S> {
    here: FxHashMap<String, Callback<S>>,
    deeper: FxHashMap<String, ObjectBuilder<S>>,
    on_begin: Option<ObjectEdgeSink<S>>,
    on_end: Option<ObjectEdgeSink<S>>,
}

impl<S> Default for ObjectBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for ObjectBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBuilder")
            .field("here", &self.here.keys().collect::<Vec<_>>())
            .field("deeper", &self.deeper.keys().collect::<Vec<_>>())
            .field("on_begin", &self.on_begin.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

impl<S> ObjectBuilder<S> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            here: FxHashMap::default(),
            deeper: FxHashMap::default(),
            on_begin: None,
            on_end: None,
        }
    }

    fn register(&mut self, key: &str, callback: Callback<S>) -> Result<&mut Self> {
        if self.deeper.contains_key(key) {
            return Err(Error::CallerContract(format!(
                "an inner object is already registered at '{}'",
                key
            )));
        }
        if self.here.contains_key(key) {
            return Err(Error::CallerContract(format!(
                "another callback is already registered at '{}'",
                key
            )));
        }
        self.here.insert(key.to_string(), callback);
        Ok(self)
    }

    /// Register a string sink for `key`
    pub fn text(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &str) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::text(sink))
    }

    /// Register an integer sink for `key`
    pub fn integer(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, i64) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::integer(sink))
    }

    /// Register a floating-point sink for `key` (fires for both `DOUBLE`
    /// and `FLOAT` values)
    pub fn number(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, f64) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::number(sink))
    }

    /// Register a raw-bytes sink for `key`
    pub fn bytes(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::bytes(sink))
    }

    /// Register a boolean sink for `key`
    pub fn boolean(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, bool) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::boolean(sink))
    }

    /// Register a big-integer sink for `key` (fires for `UINT64` and
    /// `UINT128` values, delivering the stored big-endian bytes)
    pub fn big_int(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register(key, Callback::big_int(sink))
    }

    /// Register interest in the array stored at `key`.
    ///
    /// `selector` is consulted once per element with `(state, index, len)`
    /// and picks which of `children` decodes the element; `None` skips it.
    pub fn array(
        &mut self,
        key: &str,
        on_begin: Option<ArrayBeginSink<S>>,
        children: Vec<Callback<S>>,
        selector: impl Fn(&mut S, usize, usize) -> Option<usize> + Send + Sync + 'static,
        on_end: Option<ObjectEdgeSink<S>>,
    ) -> Result<&mut Self> {
        self.register(
            key,
            Callback::Array(ArrayNode {
                on_begin,
                children,
                selector: Box::new(selector),
                on_end,
            }),
        )
    }

    /// Descend into (or create) the sub-object builder for `key`
    pub fn obj(&mut self, key: &str) -> Result<&mut ObjectBuilder<S>> {
        if self.here.contains_key(key) {
            return Err(Error::CallerContract(format!(
                "another callback is already registered at '{}'",
                key
            )));
        }
        Ok(self
            .deeper
            .entry(key.to_string())
            .or_insert_with(ObjectBuilder::new))
    }

    /// Register a notification fired when this object begins decoding
    pub fn on_begin(&mut self, sink: impl Fn(&mut S) + Send + Sync + 'static) -> Result<&mut Self> {
        if self.on_begin.is_some() {
            return Err(Error::CallerContract(
                "an on_begin callback is already registered on this object".to_string(),
            ));
        }
        self.on_begin = Some(Box::new(sink));
        Ok(self)
    }

    /// Register a notification fired when this object finishes decoding
    pub fn on_end(&mut self, sink: impl Fn(&mut S) + Send + Sync + 'static) -> Result<&mut Self> {
        if self.on_end.is_some() {
            return Err(Error::CallerContract(
                "an on_end callback is already registered on this object".to_string(),
            ));
        }
        self.on_end = Some(Box::new(sink));
        Ok(self)
    }

    fn build_node(self) -> ObjectNode<S> {
        let mut fields: FxHashMap<Box<str>, Callback<S>> = FxHashMap::default();
        for (key, callback) in self.here {
            fields.insert(key.into_boxed_str(), callback);
        }
        for (key, sub) in self.deeper {
            fields.insert(
                key.into_boxed_str(),
                Callback::Object(sub.build_node()),
            );
        }
        ObjectNode {
            fields,
            on_begin: self.on_begin,
            on_end: self.on_end,
        }
    }

    /// Compile into an immutable interest node (for use as an array child
    /// or a nested object)
    pub fn build(self) -> Callback<S> {
        Callback::Object(self.build_node())
    }
}

/// Builder for a record-level specification. Same surface as
/// [`ObjectBuilder`] plus the network notification.
pub struct RecordBuilder<S> {
    object: ObjectBuilder<S>,
    on_network: Option<NetworkSink<S>>,
}

impl<S> Default for RecordBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for RecordBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("object", &self.object)
            .field("on_network", &self.on_network.is_some())
            .finish()
    }
}

impl<S> RecordBuilder<S> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            object: ObjectBuilder::new(),
            on_network: None,
        }
    }

    /// Register a string sink for `key`
    pub fn text(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &str) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.text(key, sink)?;
        Ok(self)
    }

    /// Register an integer sink for `key`
    pub fn integer(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, i64) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.integer(key, sink)?;
        Ok(self)
    }

    /// Register a floating-point sink for `key`
    pub fn number(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, f64) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.number(key, sink)?;
        Ok(self)
    }

    /// Register a raw-bytes sink for `key`
    pub fn bytes(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.bytes(key, sink)?;
        Ok(self)
    }

    /// Register a boolean sink for `key`
    pub fn boolean(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, bool) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.boolean(key, sink)?;
        Ok(self)
    }

    /// Register a big-integer sink for `key`
    pub fn big_int(
        &mut self,
        key: &str,
        sink: impl Fn(&mut S, &[u8]) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.object.big_int(key, sink)?;
        Ok(self)
    }

    /// Register interest in the array stored at `key`
    pub fn array(
        &mut self,
        key: &str,
        on_begin: Option<ArrayBeginSink<S>>,
        children: Vec<Callback<S>>,
        selector: impl Fn(&mut S, usize, usize) -> Option<usize> + Send + Sync + 'static,
        on_end: Option<ObjectEdgeSink<S>>,
    ) -> Result<&mut Self> {
        self.object.array(key, on_begin, children, selector, on_end)?;
        Ok(self)
    }

    /// Descend into (or create) the sub-object builder for `key`
    pub fn obj(&mut self, key: &str) -> Result<&mut ObjectBuilder<S>> {
        self.object.obj(key)
    }

    /// Register a notification fired when the record object begins
    pub fn on_begin(&mut self, sink: impl Fn(&mut S) + Send + Sync + 'static) -> Result<&mut Self> {
        self.object.on_begin(sink)?;
        Ok(self)
    }

    /// Register a notification fired when the record object ends
    pub fn on_end(&mut self, sink: impl Fn(&mut S) + Send + Sync + 'static) -> Result<&mut Self> {
        self.object.on_end(sink)?;
        Ok(self)
    }

    /// Register the network notification, fired once per lookup with the
    /// raw queried address and the matched prefix length
    pub fn on_network(
        &mut self,
        sink: impl Fn(&mut S, &[u8], u32) + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        if self.on_network.is_some() {
            return Err(Error::CallerContract(
                "an on_network callback is already registered on this record".to_string(),
            ));
        }
        self.on_network = Some(Box::new(sink));
        Ok(self)
    }

    /// Compile into an immutable record specification
    pub fn build(self) -> RecordSpec<S> {
        RecordSpec {
            root: self.object.build(),
            on_network: self.on_network,
        }
    }
}
