//! Property and label table builders.
//!
//! A table is an ordered set of columns sharing one logical row count. The
//! GraphML stream only ever touches the columns a row actually has values
//! for; everything else catches up lazily through the null/false padding in
//! [`crate::column`]. Columns come into existence two ways: declared up
//! front by a `<key>` header, or discovered mid-stream on first sight of an
//! unknown property key or label — a discovered column is back-filled to the
//! current row cursor at creation.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::datatypes::{Field, Schema, SchemaRef};
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::warn;

use crate::chunk::{ConstantPool, ScalarType, ValueType};
use crate::column::{ColumnBuilder, LabelColumnBuilder, TypeParseError};

// ============================================================================
// Finished tables
// ============================================================================

/// An immutable chunked columnar table: an Arrow schema plus, per column, the
/// list of chunks that make up the column.
///
/// Row `i` of every column refers to the same node (or edge). All columns
/// have the same total length; every chunk except possibly the last has
/// exactly `chunk_size` rows.
pub struct ColumnTable {
    schema: SchemaRef,
    columns: Vec<Vec<ArrayRef>>,
}

impl ColumnTable {
    pub(crate) fn new(schema: SchemaRef, columns: Vec<Vec<ArrayRef>>) -> Self {
        Self { schema, columns }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The chunks of column `index`, in row order.
    pub fn column(&self, index: usize) -> &[ArrayRef] {
        &self.columns[index]
    }

    /// Total row count (0 for a table with no columns).
    pub fn num_rows(&self) -> usize {
        self.columns
            .first()
            .map(|chunks| chunks.iter().map(|c| c.len()).sum())
            .unwrap_or(0)
    }

    /// Density statistics for a property table: how many values are set, and
    /// how many chunks are the shared null constant.
    pub fn null_stats(&self, pool: &ConstantPool) -> TableStats {
        let mut stats = TableStats::default();
        for (field, chunks) in self.schema.fields().iter().zip(&self.columns) {
            let ty = ValueType::from_data_type(field.data_type());
            for chunk in chunks {
                stats.total_chunks += 1;
                stats.total_values += chunk.len();
                let is_constant = ty
                    .map(|ty| Arc::ptr_eq(chunk, pool.null_chunk(ty)))
                    .unwrap_or(false);
                if is_constant {
                    stats.constant_chunks += 1;
                } else {
                    stats.set_values += chunk.len() - chunk.null_count();
                }
            }
        }
        stats
    }

    /// Density statistics for a label table: how many flags are true, and how
    /// many chunks are the shared all-false constant.
    pub fn false_stats(&self, pool: &ConstantPool) -> TableStats {
        let mut stats = TableStats::default();
        for chunks in &self.columns {
            for chunk in chunks {
                stats.total_chunks += 1;
                stats.total_values += chunk.len();
                if Arc::ptr_eq(chunk, pool.false_chunk()) {
                    stats.constant_chunks += 1;
                } else if let Some(arr) = chunk.as_any().downcast_ref::<BooleanArray>() {
                    stats.set_values += arr.true_count();
                }
            }
        }
        stats
    }
}

/// Table density counters, logged after conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableStats {
    /// Values actually present (non-null, or true for label tables).
    pub set_values: usize,
    /// Total cells across all columns.
    pub total_values: usize,
    /// Chunks that are the shared null/false constant.
    pub constant_chunks: usize,
    /// Total chunks across all columns.
    pub total_chunks: usize,
}

// ============================================================================
// Property tables
// ============================================================================

/// Builder for a property table: declared-or-discovered key → typed column.
pub struct PropertyTableBuilder {
    /// Key id (or discovered data key) → column index.
    keys: IndexMap<String, usize>,
    fields: Vec<Field>,
    columns: Vec<ColumnBuilder>,
}

impl PropertyTableBuilder {
    pub fn new() -> Self {
        Self {
            keys: IndexMap::new(),
            fields: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Register a column declared by a `<key>` header. Idempotent on
    /// `key_id`: the first declaration wins and later ones are ignored,
    /// matching the GraphML header convention.
    pub fn declare(&mut self, key_id: &str, name: &str, ty: ValueType, pool: &ConstantPool) {
        if self.keys.contains_key(key_id) {
            warn!("key {key_id:?} declared more than once, keeping the first");
            return;
        }
        self.keys.insert(key_id.to_string(), self.columns.len());
        self.fields.push(Field::new(name, ty.data_type(), true));
        self.columns.push(ColumnBuilder::new(ty, pool));
    }

    /// Look up a data key, materializing an utf8 column back-filled to the
    /// row cursor when the key was never declared.
    pub fn ensure(&mut self, key: &str, pool: &ConstantPool, cursor: usize) -> usize {
        if let Some(&index) = self.keys.get(key) {
            return index;
        }
        let index = self.columns.len();
        let ty = ValueType::scalar(ScalarType::Utf8);
        self.keys.insert(key.to_string(), index);
        self.fields.push(Field::new(key, ty.data_type(), true));
        let mut column = ColumnBuilder::new(ty, pool);
        column.pad_to(pool, cursor);
        self.columns.push(column);
        index
    }

    /// Append a text value to column `index` for the row at `cursor`.
    ///
    /// A second value for the same key on one element would desynchronize
    /// the column from the row cursor; it is dropped with a warning and the
    /// first value kept.
    pub fn append(
        &mut self,
        index: usize,
        raw: &str,
        pool: &ConstantPool,
        cursor: usize,
    ) -> Result<(), TypeParseError> {
        let column = &mut self.columns[index];
        if column.len() > cursor {
            warn!("duplicate property value on one element, keeping the first");
            return Ok(());
        }
        column.append_raw(raw, pool, cursor)
    }

    /// Pad every column to `total` rows and flush, one rayon task per column.
    pub fn finish(self, pool: &ConstantPool, total: usize) -> ColumnTable {
        let columns = self
            .columns
            .into_par_iter()
            .map(|column| column.finish(pool, total))
            .collect();
        ColumnTable::new(Arc::new(Schema::new(self.fields)), columns)
    }
}

impl Default for PropertyTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Label tables
// ============================================================================

/// Builder for a label (or edge-type) table: one boolean column per distinct
/// label, one-hot per row.
pub struct LabelTableBuilder {
    keys: IndexMap<String, usize>,
    fields: Vec<Field>,
    columns: Vec<LabelColumnBuilder>,
}

impl LabelTableBuilder {
    pub fn new() -> Self {
        Self {
            keys: IndexMap::new(),
            fields: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Mark `label` as present for the row at `cursor`, materializing the
    /// column on first sight.
    pub fn mark(&mut self, label: &str, pool: &ConstantPool, cursor: usize) {
        let index = match self.keys.get(label) {
            Some(&index) => index,
            None => {
                let index = self.columns.len();
                self.keys.insert(label.to_string(), index);
                self.fields.push(Field::new(label, arrow::datatypes::DataType::Boolean, false));
                self.columns.push(LabelColumnBuilder::new(pool));
                index
            }
        };
        let column = &mut self.columns[index];
        if column.len() > cursor {
            warn!("label {label:?} repeated on one element, ignoring the repeat");
            return;
        }
        column.mark(pool, cursor);
    }

    /// Pad every column to `total` rows with falses and flush, one rayon
    /// task per column.
    pub fn finish(self, pool: &ConstantPool, total: usize) -> ColumnTable {
        let columns = self
            .columns
            .into_par_iter()
            .map(|column| column.finish(pool, total))
            .collect();
        ColumnTable::new(Arc::new(Schema::new(self.fields)), columns)
    }
}

impl Default for LabelTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
