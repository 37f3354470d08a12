//! Conversion façade: one call from a GraphML document to columnar
//! property-graph components.
//!
//! Orchestration only. The parse runs single-threaded (the XML reader is
//! inherently sequential and feeds shared maps); the finalize and
//! rearrangement phases fan out one rayon task per column. All intermediate
//! state dies with the call — nothing is persisted here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info};

use crate::chunk::ConstantPool;
use crate::graphml::{self, GraphState, GraphmlError};
use crate::rearrange;
use crate::table::ColumnTable;
use crate::topology::CsrTopology;

/// Errors surfaced by [`convert_graphml`]. Individually rejected rows
/// (duplicate nodes, dangling edges, stray elements) are warnings, not
/// errors; see [`GraphmlError`] for what is fatal.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("chunk size must be positive")]
    InvalidChunkSize,

    #[error("failed to open input: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Graphml(#[from] GraphmlError),
}

/// Everything the converter hands to its collaborators: four chunked tables
/// and the CSR topology.
///
/// Row `i` of the node tables is the node with dense index `i`; row `j` of
/// the edge tables is the edge living at `topology.out_dests[j]`.
pub struct GraphComponents {
    pub node_properties: ColumnTable,
    pub node_labels: ColumnTable,
    pub edge_properties: ColumnTable,
    pub edge_types: ColumnTable,
    pub topology: CsrTopology,
}

/// Convert a GraphML file into columnar property-graph components.
pub fn convert_graphml(
    path: impl AsRef<Path>,
    chunk_size: usize,
) -> Result<GraphComponents, ConvertError> {
    let path = path.as_ref();
    info!("converting GraphML file: {}", path.display());
    let file = File::open(path)?;
    convert_reader(Reader::from_reader(BufReader::new(file)), chunk_size)
}

/// Convert an in-memory GraphML document.
pub fn convert_graphml_str(xml: &str, chunk_size: usize) -> Result<GraphComponents, ConvertError> {
    convert_reader(Reader::from_reader(xml.as_bytes()), chunk_size)
}

fn convert_reader<R: BufRead>(
    mut reader: Reader<R>,
    chunk_size: usize,
) -> Result<GraphComponents, ConvertError> {
    if chunk_size == 0 {
        return Err(ConvertError::InvalidChunkSize);
    }
    let pool = ConstantPool::new(chunk_size);
    let mut state = GraphState::new();
    graphml::parse(&mut reader, &mut state, &pool)?;

    let GraphState {
        node_properties,
        edge_properties,
        node_labels,
        edge_types,
        topology,
        nodes,
        edges,
    } = state;

    // Flush every column to its table's final row count, one task per column.
    let node_properties = node_properties.finish(&pool, nodes);
    let node_labels = node_labels.finish(&pool, nodes);
    let edge_properties = edge_properties.finish(&pool, edges);
    let edge_types = edge_types.finish(&pool, edges);
    debug!("finished flushing all columns");

    // Prefix-sum the topology, then move every edge row to its CSR slot.
    let (topology, perm) = rearrange::finish_topology(topology);
    let edge_properties = rearrange::rearrange_properties(&edge_properties, &perm, &pool);
    let edge_types = rearrange::rearrange_flags(&edge_types, &perm, &pool);
    debug!("finished topology and ordering edges");

    let components = GraphComponents {
        node_properties,
        node_labels,
        edge_properties,
        edge_types,
        topology,
    };
    log_summary(&components, &pool, nodes, edges);
    Ok(components)
}

fn log_summary(components: &GraphComponents, pool: &ConstantPool, nodes: usize, edges: usize) {
    info!(
        "converted {nodes} nodes ({} property, {} label columns), {edges} edges ({} property, {} type columns)",
        components.node_properties.num_columns(),
        components.node_labels.num_columns(),
        components.edge_properties.num_columns(),
        components.edge_types.num_columns(),
    );
    // Constant-chunk counts only mean anything against this conversion's own
    // pool, so density is reported here rather than by the caller.
    for (name, stats) in [
        ("node properties", components.node_properties.null_stats(pool)),
        ("node labels", components.node_labels.false_stats(pool)),
        ("edge properties", components.edge_properties.null_stats(pool)),
        ("edge types", components.edge_types.false_stats(pool)),
    ] {
        if stats.total_chunks == 0 {
            continue;
        }
        info!(
            "{name}: {}/{} values set, {}/{} chunks are shared constants",
            stats.set_values, stats.total_values, stats.constant_chunks, stats.total_chunks,
        );
    }
}
