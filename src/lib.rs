//! Confluence: a streaming GraphML → columnar property-graph converter.
//!
//! One pass over a GraphML document produces four Arrow chunked tables (node
//! properties, node labels, edge properties, edge types) and a CSR topology
//! (out-edge offsets + destination list) over a dense node id space, with
//! every edge table permuted so that row `j` describes the edge at CSR slot
//! `j`. Sparse columns are cheap: runs of missing values share immutable
//! all-null (or all-false) constant chunks instead of appending row by row.
//!
//! The entry point is [`convert::convert_graphml`].

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod chunk;
pub mod column;
pub mod convert;
pub mod graphml;
mod rearrange;
pub mod table;
pub mod topology;

pub use chunk::{ConstantPool, ScalarType, ValueType, DEFAULT_CHUNK_SIZE};
pub use convert::{convert_graphml, convert_graphml_str, ConvertError, GraphComponents};
pub use graphml::GraphmlError;
pub use table::{ColumnTable, TableStats};
pub use topology::CsrTopology;
