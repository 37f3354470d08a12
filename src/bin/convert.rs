//! Converter binary: GraphML in, columnar property-graph summary out.
//!
//! Runs the conversion and reports what was built. Writing the components to
//! disk is the storage layer's job, not this tool's; this exists to exercise
//! conversions end to end and to inspect real exports.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin convert -- graph.graphml --chunk-size 25000
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use confluence::{convert_graphml, DEFAULT_CHUNK_SIZE};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Convert a GraphML file into columnar property-graph form")]
struct Args {
    /// Path to the source GraphML file.
    input: PathBuf,

    /// Rows per materialized column chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let start = Instant::now();
    let graph = convert_graphml(&args.input, args.chunk_size)?;

    info!("conversion took {:.2?}", start.elapsed());
    info!(
        "nodes: {} ({} property columns, {} label columns)",
        graph.topology.num_nodes(),
        graph.node_properties.num_columns(),
        graph.node_labels.num_columns(),
    );
    info!(
        "edges: {} ({} property columns, {} type columns)",
        graph.topology.num_edges(),
        graph.edge_properties.num_columns(),
        graph.edge_types.num_columns(),
    );
    Ok(())
}
