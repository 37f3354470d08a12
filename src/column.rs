//! Chunked append-only column builders.
//!
//! A [`ColumnBuilder`] grows one property column in lock-step with a logical
//! row cursor owned by the surrounding table: rows the column has no value
//! for are back-filled with nulls on demand ([`ColumnBuilder::pad_to`]), and
//! whole-chunk null runs are `Arc` clones of the [`ConstantPool`] chunk for
//! the column's type rather than per-row appends. [`LabelColumnBuilder`] is
//! the boolean variant whose filler is `false` instead of null.
//!
//! Incoming values are GraphML text. Scalars parse by the declared type;
//! list columns expect Neo4j-style bracketed literals (`["a","b"]`,
//! `[1,2,3]`). A value that does not coerce to its column's declared type is
//! a fatal [`TypeParseError`] — the data model forbids mixed-type columns.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayBuilder, ArrayRef, BooleanArray, BooleanBuilder, Float32Array, Float32Builder,
    Float64Array, Float64Builder, Int32Array, Int32Builder, Int64Array, Int64Builder, ListArray,
    ListBuilder, StringArray, StringBuilder,
};
use thiserror::Error;
use tracing::warn;

use crate::chunk::{ConstantPool, ScalarType, ValueType};

/// A property value that cannot be coerced to its column's declared type.
///
/// Fatal by policy: a type mismatch means the producer and consumer disagree
/// about the schema, and silently coercing would corrupt the column.
#[derive(Debug, Error)]
#[error("cannot parse {value:?} as {ty}")]
pub struct TypeParseError {
    /// GraphML name of the declared type (`long`, `double`, ...).
    pub ty: &'static str,
    /// The offending text value.
    pub value: String,
}

// ============================================================================
// Typed builder dispatch
// ============================================================================

/// One concrete Arrow builder per column element type.
enum TypedBuilder {
    Utf8(StringBuilder),
    Int64(Int64Builder),
    Int32(Int32Builder),
    Float64(Float64Builder),
    Float32(Float32Builder),
    Boolean(BooleanBuilder),
    Utf8List(ListBuilder<StringBuilder>),
    Int64List(ListBuilder<Int64Builder>),
    Int32List(ListBuilder<Int32Builder>),
    Float64List(ListBuilder<Float64Builder>),
    Float32List(ListBuilder<Float32Builder>),
    BooleanList(ListBuilder<BooleanBuilder>),
}

impl TypedBuilder {
    fn new(ty: ValueType) -> Self {
        if !ty.is_list {
            match ty.scalar {
                ScalarType::Utf8 => TypedBuilder::Utf8(StringBuilder::new()),
                ScalarType::Int64 => TypedBuilder::Int64(Int64Builder::new()),
                ScalarType::Int32 => TypedBuilder::Int32(Int32Builder::new()),
                ScalarType::Float64 => TypedBuilder::Float64(Float64Builder::new()),
                ScalarType::Float32 => TypedBuilder::Float32(Float32Builder::new()),
                ScalarType::Boolean => TypedBuilder::Boolean(BooleanBuilder::new()),
            }
        } else {
            match ty.scalar {
                ScalarType::Utf8 => TypedBuilder::Utf8List(ListBuilder::new(StringBuilder::new())),
                ScalarType::Int64 => TypedBuilder::Int64List(ListBuilder::new(Int64Builder::new())),
                ScalarType::Int32 => TypedBuilder::Int32List(ListBuilder::new(Int32Builder::new())),
                ScalarType::Float64 => {
                    TypedBuilder::Float64List(ListBuilder::new(Float64Builder::new()))
                }
                ScalarType::Float32 => {
                    TypedBuilder::Float32List(ListBuilder::new(Float32Builder::new()))
                }
                ScalarType::Boolean => {
                    TypedBuilder::BooleanList(ListBuilder::new(BooleanBuilder::new()))
                }
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            TypedBuilder::Utf8(b) => b.len(),
            TypedBuilder::Int64(b) => b.len(),
            TypedBuilder::Int32(b) => b.len(),
            TypedBuilder::Float64(b) => b.len(),
            TypedBuilder::Float32(b) => b.len(),
            TypedBuilder::Boolean(b) => b.len(),
            TypedBuilder::Utf8List(b) => b.len(),
            TypedBuilder::Int64List(b) => b.len(),
            TypedBuilder::Int32List(b) => b.len(),
            TypedBuilder::Float64List(b) => b.len(),
            TypedBuilder::Float32List(b) => b.len(),
            TypedBuilder::BooleanList(b) => b.len(),
        }
    }

    fn append_null(&mut self) {
        match self {
            TypedBuilder::Utf8(b) => b.append_null(),
            TypedBuilder::Int64(b) => b.append_null(),
            TypedBuilder::Int32(b) => b.append_null(),
            TypedBuilder::Float64(b) => b.append_null(),
            TypedBuilder::Float32(b) => b.append_null(),
            TypedBuilder::Boolean(b) => b.append_null(),
            TypedBuilder::Utf8List(b) => b.append(false),
            TypedBuilder::Int64List(b) => b.append(false),
            TypedBuilder::Int32List(b) => b.append(false),
            TypedBuilder::Float64List(b) => b.append(false),
            TypedBuilder::Float32List(b) => b.append(false),
            TypedBuilder::BooleanList(b) => b.append(false),
        }
    }

    /// Parse a GraphML text value by the declared type and append it.
    fn append_raw(&mut self, raw: &str) -> Result<(), TypeParseError> {
        match self {
            TypedBuilder::Utf8(b) => b.append_value(raw),
            TypedBuilder::Int64(b) => b.append_value(parse_scalar::<i64>(raw, "long")?),
            TypedBuilder::Int32(b) => b.append_value(parse_scalar::<i32>(raw, "int")?),
            TypedBuilder::Float64(b) => b.append_value(parse_scalar::<f64>(raw, "double")?),
            TypedBuilder::Float32(b) => b.append_value(parse_scalar::<f32>(raw, "float")?),
            TypedBuilder::Boolean(b) => b.append_value(parse_bool(raw)),
            TypedBuilder::Utf8List(b) => {
                for item in parse_string_list(raw) {
                    b.values().append_value(item);
                }
                b.append(true);
            }
            TypedBuilder::Int64List(b) => {
                for item in parse_number_list::<i64>(raw, "long")? {
                    b.values().append_value(item);
                }
                b.append(true);
            }
            TypedBuilder::Int32List(b) => {
                for item in parse_number_list::<i32>(raw, "int")? {
                    b.values().append_value(item);
                }
                b.append(true);
            }
            TypedBuilder::Float64List(b) => {
                for item in parse_number_list::<f64>(raw, "double")? {
                    b.values().append_value(item);
                }
                b.append(true);
            }
            TypedBuilder::Float32List(b) => {
                for item in parse_number_list::<f32>(raw, "float")? {
                    b.values().append_value(item);
                }
                b.append(true);
            }
            TypedBuilder::BooleanList(b) => {
                for item in parse_boolean_list(raw) {
                    b.values().append_value(item);
                }
                b.append(true);
            }
        }
        Ok(())
    }

    /// Copy the (non-null) value at `index` of an existing chunk into this
    /// builder. Used by the edge permuter when reordering columns.
    ///
    /// # Panics
    /// Panics if the chunk's type diverges from this builder's declared type;
    /// both come from the same column, so a mismatch is a builder bug.
    fn append_from(&mut self, chunk: &ArrayRef, index: usize) {
        const MISMATCH: &str = "edge column chunk diverged from its declared type";
        match self {
            TypedBuilder::Utf8(b) => {
                let arr = chunk.as_any().downcast_ref::<StringArray>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Int64(b) => {
                let arr = chunk.as_any().downcast_ref::<Int64Array>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Int32(b) => {
                let arr = chunk.as_any().downcast_ref::<Int32Array>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Float64(b) => {
                let arr = chunk.as_any().downcast_ref::<Float64Array>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Float32(b) => {
                let arr = chunk.as_any().downcast_ref::<Float32Array>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Boolean(b) => {
                let arr = chunk.as_any().downcast_ref::<BooleanArray>().expect(MISMATCH);
                b.append_value(arr.value(index));
            }
            TypedBuilder::Utf8List(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<StringArray>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
            TypedBuilder::Int64List(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<Int64Array>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
            TypedBuilder::Int32List(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<Int32Array>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
            TypedBuilder::Float64List(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<Float64Array>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
            TypedBuilder::Float32List(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<Float32Array>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
            TypedBuilder::BooleanList(b) => {
                let values = list_values(chunk, index);
                let arr = values.as_any().downcast_ref::<BooleanArray>().expect(MISMATCH);
                for i in 0..arr.len() {
                    if arr.is_null(i) {
                        b.values().append_null();
                    } else {
                        b.values().append_value(arr.value(i));
                    }
                }
                b.append(true);
            }
        }
    }

    /// Flush the in-progress buffer as an immutable chunk, resetting the
    /// builder.
    fn finish_chunk(&mut self) -> ArrayRef {
        match self {
            TypedBuilder::Utf8(b) => Arc::new(b.finish()),
            TypedBuilder::Int64(b) => Arc::new(b.finish()),
            TypedBuilder::Int32(b) => Arc::new(b.finish()),
            TypedBuilder::Float64(b) => Arc::new(b.finish()),
            TypedBuilder::Float32(b) => Arc::new(b.finish()),
            TypedBuilder::Boolean(b) => Arc::new(b.finish()),
            TypedBuilder::Utf8List(b) => Arc::new(b.finish()),
            TypedBuilder::Int64List(b) => Arc::new(b.finish()),
            TypedBuilder::Int32List(b) => Arc::new(b.finish()),
            TypedBuilder::Float64List(b) => Arc::new(b.finish()),
            TypedBuilder::Float32List(b) => Arc::new(b.finish()),
            TypedBuilder::BooleanList(b) => Arc::new(b.finish()),
        }
    }
}

/// Pull the sub-array for row `index` of a list chunk.
fn list_values(chunk: &ArrayRef, index: usize) -> ArrayRef {
    chunk
        .as_any()
        .downcast_ref::<ListArray>()
        .expect("edge column chunk diverged from its declared type")
        .value(index)
}

// ============================================================================
// Column builder
// ============================================================================

/// An append-only property column: flushed chunks plus an in-progress buffer.
///
/// The column's logical length is `chunks * chunk_size + buffer`. Callers
/// drive it against a row cursor: [`pad_to`](Self::pad_to) the cursor, then
/// append, so that every column in a table stays row-aligned without eagerly
/// touching columns a row has no values for.
pub struct ColumnBuilder {
    ty: ValueType,
    chunk_size: usize,
    builder: TypedBuilder,
    chunks: Vec<ArrayRef>,
}

impl ColumnBuilder {
    pub fn new(ty: ValueType, pool: &ConstantPool) -> Self {
        Self {
            ty,
            chunk_size: pool.chunk_size(),
            builder: TypedBuilder::new(ty),
            chunks: Vec::new(),
        }
    }

    /// The declared element type of this column.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Logical length: total rows appended, including nulls.
    pub fn len(&self) -> usize {
        self.chunks.len() * self.chunk_size + self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append nulls until the logical length reaches `target`.
    ///
    /// Idempotent: a `target` at or below the current length is a no-op.
    /// Whole-chunk runs are `Arc` clones of the pool's null chunk; only the
    /// partial head and tail of a run append per-row nulls, so back-filling a
    /// column discovered at row `R` costs `O(R / chunk_size)` pointer copies.
    pub fn pad_to(&mut self, pool: &ConstantPool, target: usize) {
        debug_assert_eq!(pool.chunk_size(), self.chunk_size);
        let len = self.len();
        if target <= len {
            return;
        }
        let mut needed = target - len;

        // Fill out the in-progress buffer first. If that doesn't complete a
        // chunk, the run is over.
        if self.builder.len() != 0 {
            let head = needed.min(self.chunk_size - self.builder.len());
            for _ in 0..head {
                self.builder.append_null();
            }
            needed -= head;
            if self.builder.len() == self.chunk_size {
                self.flush();
            } else {
                return;
            }
        }

        // The buffer is now empty: whole-chunk runs share the pool constant.
        while needed >= self.chunk_size {
            self.chunks.push(Arc::clone(pool.null_chunk(self.ty)));
            needed -= self.chunk_size;
        }
        for _ in 0..needed {
            self.builder.append_null();
        }
    }

    /// Pad to `cursor`, then parse `raw` by the declared type and append it,
    /// flushing a chunk if the buffer fills.
    pub fn append_raw(
        &mut self,
        raw: &str,
        pool: &ConstantPool,
        cursor: usize,
    ) -> Result<(), TypeParseError> {
        self.pad_to(pool, cursor);
        self.builder.append_raw(raw)?;
        if self.builder.len() == self.chunk_size {
            self.flush();
        }
        Ok(())
    }

    /// Pad to `cursor`, then copy the value at `chunk[index]` (which must be
    /// non-null) into this column. Used by the edge permuter.
    pub(crate) fn append_from_chunk(
        &mut self,
        chunk: &ArrayRef,
        index: usize,
        pool: &ConstantPool,
        cursor: usize,
    ) {
        self.pad_to(pool, cursor);
        self.builder.append_from(chunk, index);
        if self.builder.len() == self.chunk_size {
            self.flush();
        }
    }

    /// Pad to `total` rows and flush the remaining partial chunk, yielding
    /// the column's final chunk list.
    pub fn finish(mut self, pool: &ConstantPool, total: usize) -> Vec<ArrayRef> {
        self.pad_to(pool, total);
        if self.builder.len() != 0 {
            self.flush();
        }
        self.chunks
    }

    fn flush(&mut self) {
        self.chunks.push(self.builder.finish_chunk());
    }
}

// ============================================================================
// Label column builder
// ============================================================================

/// A boolean one-hot column whose filler is `false` rather than null.
///
/// Label and edge-type columns never hold nulls: a row either carries the
/// label (`true`) or it does not (`false`). Padding shares the pool's
/// all-false chunk the same way property columns share null chunks.
pub struct LabelColumnBuilder {
    chunk_size: usize,
    builder: BooleanBuilder,
    chunks: Vec<ArrayRef>,
}

impl LabelColumnBuilder {
    pub fn new(pool: &ConstantPool) -> Self {
        Self {
            chunk_size: pool.chunk_size(),
            builder: BooleanBuilder::new(),
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len() * self.chunk_size + self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `false` until the logical length reaches `target`. Idempotent.
    pub fn pad_to(&mut self, pool: &ConstantPool, target: usize) {
        debug_assert_eq!(pool.chunk_size(), self.chunk_size);
        let len = self.len();
        if target <= len {
            return;
        }
        let mut needed = target - len;

        if self.builder.len() != 0 {
            let head = needed.min(self.chunk_size - self.builder.len());
            for _ in 0..head {
                self.builder.append_value(false);
            }
            needed -= head;
            if self.builder.len() == self.chunk_size {
                self.flush();
            } else {
                return;
            }
        }

        while needed >= self.chunk_size {
            self.chunks.push(Arc::clone(pool.false_chunk()));
            needed -= self.chunk_size;
        }
        for _ in 0..needed {
            self.builder.append_value(false);
        }
    }

    /// Pad to `cursor` with falses, then append `true` for the row at the
    /// cursor.
    pub fn mark(&mut self, pool: &ConstantPool, cursor: usize) {
        self.pad_to(pool, cursor);
        self.builder.append_value(true);
        if self.builder.len() == self.chunk_size {
            self.flush();
        }
    }

    /// Pad to `total` rows with falses and flush the remaining partial chunk.
    pub fn finish(mut self, pool: &ConstantPool, total: usize) -> Vec<ArrayRef> {
        self.pad_to(pool, total);
        if self.builder.len() != 0 {
            self.flush();
        }
        self.chunks
    }

    fn flush(&mut self) {
        self.chunks.push(Arc::new(self.builder.finish()));
    }
}

// ============================================================================
// GraphML text value parsing
// ============================================================================

fn parse_scalar<T: std::str::FromStr>(raw: &str, ty: &'static str) -> Result<T, TypeParseError> {
    raw.parse::<T>().map_err(|_| TypeParseError {
        ty,
        value: raw.to_string(),
    })
}

/// GraphML booleans follow the Neo4j export convention: a leading `t` or `T`
/// is true, anything else is false. Never a parse failure.
fn parse_bool(raw: &str) -> bool {
    matches!(raw.as_bytes().first(), Some(b't' | b'T'))
}

/// Tokenize a Neo4j-style string list literal: `["a","b\"c",""]`.
///
/// Fields are delimited by unescaped double quotes; a quote is unescaped when
/// preceded by an even number of consecutive backslashes. A value without the
/// surrounding brackets is not a list literal — it is kept whole, as a
/// single-element list, with a warning.
fn parse_string_list(raw: &str) -> Vec<String> {
    let Some(inner) = strip_list_brackets(raw) else {
        warn!("string list value is not bracketed like neo4j, keeping it whole");
        return vec![raw.to_string()];
    };

    let bytes = inner.as_bytes();
    let mut list = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let mut first_quote_found = false;
        let mut found_end = false;
        let mut start = i;
        let mut consecutive_slashes = 0;

        while !found_end && i < bytes.len() {
            match bytes[i] {
                b'"' => {
                    if consecutive_slashes % 2 == 0 {
                        if !first_quote_found {
                            first_quote_found = true;
                            start = i + 1;
                        } else {
                            found_end = true;
                        }
                    }
                    consecutive_slashes = 0;
                }
                b'\\' => consecutive_slashes += 1,
                _ => consecutive_slashes = 0,
            }
            i += 1;
        }

        // `i - 1` is the closing quote (or the last byte scanned).
        let end = i - 1;
        if end <= start {
            list.push(String::new());
        } else {
            list.push(unescape_field(&inner[start..end]));
        }
    }
    list
}

/// Decode the backslash escapes of one string-list field.
///
/// Recognized escapes: `\n \\ \r \0 \b \' \" \t \f \v`. An unrecognized
/// escape warns and emits the escaped character literally.
fn unescape_field(rough: &str) -> String {
    let mut out = String::with_capacity(rough.len());
    let mut chars = rough.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{0008}'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{000C}'),
            Some('v') => out.push('\u{000B}'),
            Some(other) => {
                warn!("unhandled escape character: \\{other}");
                out.push(other);
            }
            None => warn!("dangling backslash at end of list element"),
        }
    }
    out
}

/// Parse a Neo4j-style numeric list literal: `[1,2,3]`. Elements split on
/// `,` and each must parse as the column's scalar type.
fn parse_number_list<T: std::str::FromStr>(
    raw: &str,
    ty: &'static str,
) -> Result<Vec<T>, TypeParseError> {
    let Some(inner) = strip_list_brackets(raw) else {
        warn!("numeric list value is not bracketed like neo4j, treating as empty");
        return Ok(Vec::new());
    };
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner.split(',').map(|s| parse_scalar(s, ty)).collect()
}

/// Parse a Neo4j-style boolean list literal: `[true,false]`.
fn parse_boolean_list(raw: &str) -> Vec<bool> {
    let Some(inner) = strip_list_brackets(raw) else {
        warn!("boolean list value is not bracketed like neo4j, treating as empty");
        return Vec::new();
    };
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(parse_bool).collect()
}

fn strip_list_brackets(raw: &str) -> Option<&str> {
    raw.strip_prefix('[')?.strip_suffix(']')
}
