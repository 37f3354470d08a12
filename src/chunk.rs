//! Column value types and the shared null/false constant pool.
//!
//! Every column in the converter is stored as a sequence of fixed-size Arrow
//! chunks. Runs of missing values are the common case in real property-graph
//! exports, so whole-chunk null (or, for label columns, false) runs are not
//! built row by row: the [`ConstantPool`] holds one immutable all-null chunk
//! per column type plus one all-false boolean chunk, and builders push `Arc`
//! clones of those. A column that is null for a million rows costs a handful
//! of pointer copies, not a million appends.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float32Builder, Float64Builder, Int32Builder, Int64Builder,
    ListBuilder, StringBuilder,
};
use arrow::datatypes::DataType;

/// Default number of rows per materialized column chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 25_000;

/// The scalar types a GraphML property column can carry.
///
/// These mirror the `attr.type` domain of a GraphML `<key>` header:
/// `string`, `long`, `int`, `double`, `float`, `boolean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Utf8,
    Int64,
    Int32,
    Float64,
    Float32,
    Boolean,
}

impl ScalarType {
    pub(crate) const ALL: [ScalarType; 6] = [
        ScalarType::Utf8,
        ScalarType::Int64,
        ScalarType::Int32,
        ScalarType::Float64,
        ScalarType::Float32,
        ScalarType::Boolean,
    ];

    /// The Arrow data type backing this scalar.
    pub fn data_type(self) -> DataType {
        match self {
            ScalarType::Utf8 => DataType::Utf8,
            ScalarType::Int64 => DataType::Int64,
            ScalarType::Int32 => DataType::Int32,
            ScalarType::Float64 => DataType::Float64,
            ScalarType::Float32 => DataType::Float32,
            ScalarType::Boolean => DataType::Boolean,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A column's declared element type: a scalar, or a list of one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    pub scalar: ScalarType,
    pub is_list: bool,
}

impl ValueType {
    pub fn scalar(scalar: ScalarType) -> Self {
        Self {
            scalar,
            is_list: false,
        }
    }

    pub fn list(scalar: ScalarType) -> Self {
        Self {
            scalar,
            is_list: true,
        }
    }

    /// The Arrow data type backing a column of this element type.
    pub fn data_type(self) -> DataType {
        if self.is_list {
            DataType::new_list(self.scalar.data_type(), true)
        } else {
            self.scalar.data_type()
        }
    }

    /// Recover the element type from an Arrow data type, for columns this
    /// converter built. Returns `None` for any other Arrow type.
    pub(crate) fn from_data_type(data_type: &DataType) -> Option<Self> {
        let scalar_of = |dt: &DataType| match dt {
            DataType::Utf8 => Some(ScalarType::Utf8),
            DataType::Int64 => Some(ScalarType::Int64),
            DataType::Int32 => Some(ScalarType::Int32),
            DataType::Float64 => Some(ScalarType::Float64),
            DataType::Float32 => Some(ScalarType::Float32),
            DataType::Boolean => Some(ScalarType::Boolean),
            _ => None,
        };
        match data_type {
            DataType::List(field) => Some(ValueType::list(scalar_of(field.data_type())?)),
            other => Some(ValueType::scalar(scalar_of(other)?)),
        }
    }
}

// ============================================================================
// Constant Pool
// ============================================================================

/// Immutable all-null and all-false chunks, one per column type, each of
/// length `chunk_size`.
///
/// Built once at converter construction and shared by reference from every
/// column builder (and across the rayon rearrange tasks — the pool is
/// read-only after construction). Chunk identity is observable: a fully-null
/// chunk in a finished column is `Arc::ptr_eq` to the pool chunk for its type.
pub struct ConstantPool {
    chunk_size: usize,
    nulls: [ArrayRef; 6],
    list_nulls: [ArrayRef; 6],
    falses: ArrayRef,
}

impl ConstantPool {
    /// Build the pool for a given chunk size.
    ///
    /// # Panics
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            nulls: ScalarType::ALL.map(|s| null_scalar_chunk(s, chunk_size)),
            list_nulls: ScalarType::ALL.map(|s| null_list_chunk(s, chunk_size)),
            falses: false_chunk(chunk_size),
        }
    }

    /// The row count of every chunk in the pool (and of every full chunk any
    /// builder flushes).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The shared all-null chunk for a column element type.
    pub fn null_chunk(&self, ty: ValueType) -> &ArrayRef {
        if ty.is_list {
            &self.list_nulls[ty.scalar.index()]
        } else {
            &self.nulls[ty.scalar.index()]
        }
    }

    /// The shared all-false boolean chunk used by label columns.
    pub fn false_chunk(&self) -> &ArrayRef {
        &self.falses
    }
}

fn null_scalar_chunk(scalar: ScalarType, len: usize) -> ArrayRef {
    match scalar {
        ScalarType::Utf8 => {
            let mut b = StringBuilder::new();
            for _ in 0..len {
                b.append_null();
            }
            Arc::new(b.finish())
        }
        ScalarType::Int64 => {
            let mut b = Int64Builder::new();
            b.append_nulls(len);
            Arc::new(b.finish())
        }
        ScalarType::Int32 => {
            let mut b = Int32Builder::new();
            b.append_nulls(len);
            Arc::new(b.finish())
        }
        ScalarType::Float64 => {
            let mut b = Float64Builder::new();
            b.append_nulls(len);
            Arc::new(b.finish())
        }
        ScalarType::Float32 => {
            let mut b = Float32Builder::new();
            b.append_nulls(len);
            Arc::new(b.finish())
        }
        ScalarType::Boolean => {
            let mut b = BooleanBuilder::new();
            for _ in 0..len {
                b.append_null();
            }
            Arc::new(b.finish())
        }
    }
}

fn null_list_chunk(scalar: ScalarType, len: usize) -> ArrayRef {
    match scalar {
        ScalarType::Utf8 => {
            let mut b = ListBuilder::new(StringBuilder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
        ScalarType::Int64 => {
            let mut b = ListBuilder::new(Int64Builder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
        ScalarType::Int32 => {
            let mut b = ListBuilder::new(Int32Builder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
        ScalarType::Float64 => {
            let mut b = ListBuilder::new(Float64Builder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
        ScalarType::Float32 => {
            let mut b = ListBuilder::new(Float32Builder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
        ScalarType::Boolean => {
            let mut b = ListBuilder::new(BooleanBuilder::new());
            for _ in 0..len {
                b.append(false);
            }
            Arc::new(b.finish())
        }
    }
}

fn false_chunk(len: usize) -> ArrayRef {
    let mut b = BooleanBuilder::new();
    for _ in 0..len {
        b.append_value(false);
    }
    Arc::new(b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, BooleanArray};

    #[test]
    fn test_pool_chunk_shapes() {
        let pool = ConstantPool::new(16);
        for scalar in ScalarType::ALL {
            let chunk = pool.null_chunk(ValueType::scalar(scalar));
            assert_eq!(chunk.len(), 16);
            assert_eq!(chunk.null_count(), 16, "{scalar:?} chunk is not all-null");
            assert_eq!(chunk.data_type(), &scalar.data_type());

            let list_chunk = pool.null_chunk(ValueType::list(scalar));
            assert_eq!(list_chunk.len(), 16);
            assert_eq!(
                list_chunk.null_count(),
                16,
                "list-of-{scalar:?} chunk is not all-null"
            );
        }
    }

    #[test]
    fn test_false_chunk_is_all_false_and_non_null() {
        let pool = ConstantPool::new(8);
        let falses = pool.false_chunk();
        assert_eq!(falses.len(), 8);
        assert_eq!(falses.null_count(), 0);
        let arr = falses
            .as_any()
            .downcast_ref::<BooleanArray>()
            .expect("false chunk must be boolean");
        assert_eq!(arr.true_count(), 0);
    }

    #[test]
    fn test_pool_chunks_are_shared_by_reference() {
        let pool = ConstantPool::new(4);
        let a = Arc::clone(pool.null_chunk(ValueType::scalar(ScalarType::Utf8)));
        let b = Arc::clone(pool.null_chunk(ValueType::scalar(ScalarType::Utf8)));
        assert!(Arc::ptr_eq(&a, &b));
        let c = Arc::clone(pool.null_chunk(ValueType::list(ScalarType::Utf8)));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_value_type_round_trips_through_data_type() {
        for scalar in ScalarType::ALL {
            for ty in [ValueType::scalar(scalar), ValueType::list(scalar)] {
                assert_eq!(ValueType::from_data_type(&ty.data_type()), Some(ty));
            }
        }
        assert_eq!(ValueType::from_data_type(&DataType::Date32), None);
    }

    #[test]
    #[should_panic(expected = "chunk size must be positive")]
    fn test_zero_chunk_size_rejected() {
        ConstantPool::new(0);
    }
}
