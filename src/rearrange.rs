//! CSR finalization and edge column rearrangement.
//!
//! After parsing, edges sit in XML insertion order. The CSR wants them
//! grouped by source node, so every edge table row has to move: this module
//! prefix-sums the out-degree counts into offsets, assigns each edge its CSR
//! slot (stable within a source — ties keep insertion order), records the
//! permutation `perm[csr_slot] = xml_index`, and rebuilds every edge column
//! in permuted order. The rebuild is out-of-place, one rayon task per
//! column, and preserves shared-constant padding: runs of nulls in the
//! permuted column come out as pool chunks again.

use arrow::array::{Array, ArrayRef, BooleanArray};
use rayon::prelude::*;

use crate::chunk::{ConstantPool, ValueType};
use crate::column::{ColumnBuilder, LabelColumnBuilder};
use crate::table::ColumnTable;
use crate::topology::{CsrTopology, TopologyBuilder};

/// Prefix-sum the out-degree counts into CSR offsets, scatter destinations
/// into edge-id order, and return the finished topology together with the
/// permutation mapping CSR edge index → XML insertion index.
pub(crate) fn finish_topology(builder: TopologyBuilder) -> (CsrTopology, Vec<usize>) {
    let TopologyBuilder {
        mut out_indices,
        sources,
        destinations,
        ..
    } = builder;

    for i in 1..out_indices.len() {
        out_indices[i] += out_indices[i - 1];
    }

    let edges = sources.len();
    let mut out_dests = vec![u32::MAX; edges];
    let mut perm = vec![usize::MAX; edges];
    let mut cursor = vec![0u64; out_indices.len()];

    for (xml_index, (&src, &dst)) in sources.iter().zip(&destinations).enumerate() {
        let src = src as usize;
        let base = if src == 0 { 0 } else { out_indices[src - 1] };
        let slot = (base + cursor[src]) as usize;
        cursor[src] += 1;
        out_dests[slot] = dst;
        perm[slot] = xml_index;
    }

    (
        CsrTopology {
            out_indices,
            out_dests,
        },
        perm,
    )
}

/// Rebuild every column of an edge property table in permuted order.
pub(crate) fn rearrange_properties(
    table: &ColumnTable,
    perm: &[usize],
    pool: &ConstantPool,
) -> ColumnTable {
    let schema = table.schema().clone();
    let columns = (0..table.num_columns())
        .into_par_iter()
        .map(|c| {
            let ty = ValueType::from_data_type(schema.field(c).data_type())
                .expect("edge property column has a type this converter never builds");
            rearrange_column(ty, table.column(c), perm, pool)
        })
        .collect();
    ColumnTable::new(schema, columns)
}

fn rearrange_column(
    ty: ValueType,
    chunks: &[ArrayRef],
    perm: &[usize],
    pool: &ConstantPool,
) -> Vec<ArrayRef> {
    let chunk_size = pool.chunk_size();
    let mut out = ColumnBuilder::new(ty, pool);
    for (slot, &xml_index) in perm.iter().enumerate() {
        let chunk = &chunks[xml_index / chunk_size];
        let offset = xml_index % chunk_size;
        if !chunk.is_null(offset) {
            out.append_from_chunk(chunk, offset, pool, slot);
        }
    }
    out.finish(pool, perm.len())
}

/// Rebuild every column of an edge type table in permuted order.
pub(crate) fn rearrange_flags(
    table: &ColumnTable,
    perm: &[usize],
    pool: &ConstantPool,
) -> ColumnTable {
    let schema = table.schema().clone();
    let chunk_size = pool.chunk_size();
    let columns = (0..table.num_columns())
        .into_par_iter()
        .map(|c| {
            let chunks = table.column(c);
            let mut out = LabelColumnBuilder::new(pool);
            for (slot, &xml_index) in perm.iter().enumerate() {
                let chunk = chunks[xml_index / chunk_size]
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .expect("edge type column must be boolean");
                if chunk.value(xml_index % chunk_size) {
                    out.mark(pool, slot);
                }
            }
            out.finish(pool, perm.len())
        })
        .collect();
    ColumnTable::new(schema, columns)
}
