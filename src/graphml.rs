//! Streaming GraphML parser.
//!
//! Single forward pass over the XML event stream, recognizing the subset
//! `<graphml>/<key>*/<graph>/{<node>|<edge>}*/<data>*`. `<key>` headers
//! declare typed property columns; `<node>` and `<edge>` elements become
//! rows, committed when the element closes; `<data>` children carry property
//! values and the reserved `label`/`labels` keys. Only the first `<graph>`
//! element is read, matching the conventions of Neo4j-style exports (all
//! nodes precede all edges; forward references are not resolved).
//!
//! Structural XML failures are fatal. Everything else — unknown elements or
//! attributes, duplicate node ids, dangling edges — warns and skips the
//! offending piece without advancing any row cursor. A property value that
//! does not parse as its column's declared type is fatal: mixed-type columns
//! are data-model corruption, not something to recover from.

use std::io::BufRead;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunk::{ConstantPool, ScalarType, ValueType};
use crate::column::TypeParseError;
use crate::table::{LabelTableBuilder, PropertyTableBuilder};
use crate::topology::TopologyBuilder;

/// Fatal parsing failures. Skippable problems are logged, not returned.
#[derive(Debug, Error)]
pub enum GraphmlError {
    #[error("XML parse failure: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document ended inside the graph element")]
    Truncated,

    #[error("property {key:?}: {source}")]
    TypeParse {
        key: String,
        #[source]
        source: TypeParseError,
    },
}

/// Everything the parser accumulates: the four table builders, the topology,
/// and the committed row counts that drive every column's row cursor.
pub(crate) struct GraphState {
    pub node_properties: PropertyTableBuilder,
    pub edge_properties: PropertyTableBuilder,
    pub node_labels: LabelTableBuilder,
    pub edge_types: LabelTableBuilder,
    pub topology: TopologyBuilder,
    pub nodes: usize,
    pub edges: usize,
}

impl GraphState {
    pub fn new() -> Self {
        Self {
            node_properties: PropertyTableBuilder::new(),
            edge_properties: PropertyTableBuilder::new(),
            node_labels: LabelTableBuilder::new(),
            edge_types: LabelTableBuilder::new(),
            topology: TopologyBuilder::new(),
            nodes: 0,
            edges: 0,
        }
    }
}

/// Where the cursor of the state machine currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Before the first `<graph>`: `<key>` headers are read here.
    Preamble,
    /// Inside `<graph>`, between elements.
    Graph,
    /// Inside a `<node>` element.
    Node,
    /// Inside an `<edge>` element.
    Edge,
}

/// A `<node>` or `<edge>` element currently being read.
struct PendingRow {
    /// False when the element was rejected (empty/duplicate id, dangling
    /// endpoint); its `<data>` children are then dropped too.
    valid: bool,
    /// Node labels, or the single edge type.
    labels: Vec<String>,
    /// Labels from the element attribute win over `label`/`labels` data
    /// children (Neo4j emits both).
    labels_extracted: bool,
}

impl PendingRow {
    fn empty() -> Self {
        Self {
            valid: false,
            labels: Vec::new(),
            labels_extracted: false,
        }
    }
}

/// A `<data>` element currently being read.
struct PendingData {
    key: String,
    text: String,
}

/// Drive the state machine over the whole document.
pub(crate) fn parse<R: BufRead>(
    reader: &mut Reader<R>,
    state: &mut GraphState,
    pool: &ConstantPool,
) -> Result<(), GraphmlError> {
    let mut buf = Vec::new();
    let mut scope = Scope::Preamble;
    let mut row = PendingRow::empty();
    let mut data: Option<PendingData> = None;
    let mut finished_nodes = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match (scope, e.name().as_ref()) {
                (_, b"graphml") => {}
                (Scope::Preamble, b"key") => process_key(e, state, pool)?,
                (Scope::Preamble, b"graph") => {
                    debug!(
                        "finished processing property headers: {} node, {} edge properties declared",
                        state.node_properties.num_columns(),
                        state.edge_properties.num_columns(),
                    );
                    scope = Scope::Graph;
                }
                (Scope::Graph, b"node") => {
                    row = begin_node(e, state)?;
                    scope = Scope::Node;
                }
                (Scope::Graph, b"edge") => {
                    if !finished_nodes {
                        finished_nodes = true;
                        info!("finished processing nodes: {}", state.nodes);
                    }
                    row = begin_edge(e, state)?;
                    scope = Scope::Edge;
                }
                (Scope::Node | Scope::Edge, b"data") => {
                    data = Some(begin_data(e)?);
                }
                (Scope::Preamble, _) => {}
                (_, name) => {
                    warn!(
                        "found element {:?}, which was ignored",
                        String::from_utf8_lossy(name)
                    );
                }
            },
            Event::Empty(ref e) => match (scope, e.name().as_ref()) {
                (Scope::Preamble, b"key") => process_key(e, state, pool)?,
                (Scope::Graph, b"node") => {
                    let row = begin_node(e, state)?;
                    commit_node(state, row, pool);
                }
                (Scope::Graph, b"edge") => {
                    if !finished_nodes {
                        finished_nodes = true;
                        info!("finished processing nodes: {}", state.nodes);
                    }
                    let row = begin_edge(e, state)?;
                    commit_edge(state, row, pool);
                }
                (Scope::Node | Scope::Edge, b"data") => {
                    let data = begin_data(e)?;
                    dispatch_data(state, scope, &mut row, data, pool)?;
                }
                (Scope::Preamble, _) => {}
                (_, name) => {
                    warn!(
                        "found element {:?}, which was ignored",
                        String::from_utf8_lossy(name)
                    );
                }
            },
            Event::Text(ref e) => {
                if let Some(d) = data.as_mut() {
                    let text = e.unescape()?;
                    // Whitespace-only text nodes are formatting, not values.
                    if !text.trim().is_empty() {
                        d.text.push_str(&text);
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(d) = data.as_mut() {
                    d.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"data" => {
                    if let Some(data) = data.take() {
                        dispatch_data(state, scope, &mut row, data, pool)?;
                    }
                }
                b"node" if scope == Scope::Node => {
                    let row = std::mem::replace(&mut row, PendingRow::empty());
                    commit_node(state, row, pool);
                    scope = Scope::Graph;
                }
                b"edge" if scope == Scope::Edge => {
                    let row = std::mem::replace(&mut row, PendingRow::empty());
                    commit_edge(state, row, pool);
                    scope = Scope::Graph;
                }
                b"graph" if scope == Scope::Graph => {
                    // Only the first graph element is converted.
                    info!("finished processing edges: {}", state.edges);
                    return Ok(());
                }
                _ => {}
            },
            Event::Eof => {
                // A well-formed document ends after </graph>; still being
                // inside the graph means the input was cut off.
                if scope == Scope::Preamble {
                    return Ok(());
                }
                return Err(GraphmlError::Truncated);
            }
            _ => {}
        }
        buf.clear();
    }
}

// ============================================================================
// <key> headers
// ============================================================================

/// Map a GraphML `attr.type` value onto a scalar type. Unknown types warn
/// and fall back to string, preserving the value as text.
fn parse_attr_type(value: &str) -> ScalarType {
    match value {
        "string" => ScalarType::Utf8,
        "long" => ScalarType::Int64,
        "int" => ScalarType::Int32,
        "double" => ScalarType::Float64,
        "float" => ScalarType::Float32,
        "boolean" => ScalarType::Boolean,
        other => {
            warn!("attr.type {other:?} is not supported, treating as string");
            ScalarType::Utf8
        }
    }
}

fn process_key(
    e: &BytesStart<'_>,
    state: &mut GraphState,
    pool: &ConstantPool,
) -> Result<(), GraphmlError> {
    let mut id = String::new();
    let mut for_node = false;
    let mut for_edge = false;
    let mut name = String::new();
    let mut scalar = ScalarType::Utf8;
    let mut is_list = false;

    for attr in e.attributes().flatten() {
        let value = attr_value(&attr)?;
        match attr.key.as_ref() {
            b"id" => id = value,
            b"for" => {
                for_node = value == "node";
                for_edge = value == "edge";
                if !for_node && !for_edge {
                    warn!("key is for {value:?}, which is neither node nor edge");
                }
            }
            b"attr.name" => name = value,
            // attr.list overrides attr.type and marks the column as a list,
            // whichever order the two appear in.
            b"attr.type" => {
                if !is_list {
                    scalar = parse_attr_type(&value);
                }
            }
            b"attr.list" => {
                is_list = true;
                scalar = parse_attr_type(&value);
            }
            other => {
                warn!(
                    "attribute {:?} on key was not recognized",
                    String::from_utf8_lossy(other)
                );
            }
        }
    }

    // "label" and "IGNORE" are reserved data keys, never property columns.
    if id.is_empty() || id == "label" || id == "IGNORE" {
        return Ok(());
    }
    let name = if name.is_empty() { id.clone() } else { name };
    let ty = ValueType { scalar, is_list };
    if for_node {
        state.node_properties.declare(&id, &name, ty, pool);
    } else if for_edge {
        state.edge_properties.declare(&id, &name, ty, pool);
    }
    Ok(())
}

// ============================================================================
// <node> and <edge> elements
// ============================================================================

fn begin_node(e: &BytesStart<'_>, state: &mut GraphState) -> Result<PendingRow, GraphmlError> {
    let mut id = String::new();
    let mut labels = Vec::new();
    let mut labels_extracted = false;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"id" => id = attr_value(&attr)?,
            b"labels" | b"label" => {
                labels = split_labels(&attr_value(&attr)?);
                labels_extracted = true;
            }
            other => {
                warn!(
                    "attribute {:?} on node was not recognized",
                    String::from_utf8_lossy(other)
                );
            }
        }
    }

    let mut valid = !id.is_empty();
    if !valid {
        warn!("node without an id, skipping");
    } else if state.topology.add_node(&id).is_none() {
        warn!("duplicate node id {id:?}, skipping node");
        valid = false;
    }
    Ok(PendingRow {
        valid,
        labels,
        labels_extracted,
    })
}

fn begin_edge(e: &BytesStart<'_>, state: &mut GraphState) -> Result<PendingRow, GraphmlError> {
    let mut source = String::new();
    let mut target = String::new();
    let mut edge_type = String::new();
    let mut labels_extracted = false;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            // Edge ids carry no information the converter keeps.
            b"id" => {}
            b"source" => source = attr_value(&attr)?,
            b"target" => target = attr_value(&attr)?,
            b"labels" | b"label" => {
                edge_type = attr_value(&attr)?;
                labels_extracted = true;
            }
            other => {
                warn!(
                    "attribute {:?} on edge was not recognized",
                    String::from_utf8_lossy(other)
                );
            }
        }
    }

    let mut valid = !source.is_empty() && !target.is_empty();
    if !valid {
        warn!("edge without both endpoints, skipping");
    } else if !state.topology.add_edge(&source, &target) {
        warn!("edge {source:?} -> {target:?} references an unknown node, skipping edge");
        valid = false;
    }
    let labels = if edge_type.is_empty() {
        Vec::new()
    } else {
        vec![edge_type]
    };
    Ok(PendingRow {
        valid,
        labels,
        labels_extracted,
    })
}

fn commit_node(state: &mut GraphState, row: PendingRow, pool: &ConstantPool) {
    if !row.valid {
        return;
    }
    for label in &row.labels {
        state.node_labels.mark(label, pool, state.nodes);
    }
    state.nodes += 1;
    if state.nodes % (pool.chunk_size() * 100) == 0 {
        debug!("nodes processed: {}", state.nodes);
    }
}

fn commit_edge(state: &mut GraphState, row: PendingRow, pool: &ConstantPool) {
    if !row.valid {
        return;
    }
    for label in &row.labels {
        state.edge_types.mark(label, pool, state.edges);
    }
    state.edges += 1;
    if state.edges % (pool.chunk_size() * 100) == 0 {
        debug!("edges processed: {}", state.edges);
    }
}

// ============================================================================
// <data> elements
// ============================================================================

fn begin_data(e: &BytesStart<'_>) -> Result<PendingData, GraphmlError> {
    let mut key = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"key" => key = attr_value(&attr)?,
            other => {
                warn!(
                    "attribute {:?} on data was not recognized",
                    String::from_utf8_lossy(other)
                );
            }
        }
    }
    Ok(PendingData {
        key,
        text: String::new(),
    })
}

fn dispatch_data(
    state: &mut GraphState,
    scope: Scope,
    row: &mut PendingRow,
    data: PendingData,
    pool: &ConstantPool,
) -> Result<(), GraphmlError> {
    let PendingData { key, text } = data;
    if key.is_empty() {
        return Ok(());
    }

    // The data keys "label"/"labels" are the labels themselves (when the
    // element attribute didn't already supply them), and "IGNORE" is dropped.
    if key == "label" || key == "labels" {
        if !row.labels_extracted {
            row.labels = match scope {
                Scope::Node => split_labels(&text),
                // An edge type is a single string, never split.
                _ => vec![text],
            };
            row.labels_extracted = true;
        }
        return Ok(());
    }
    if key == "IGNORE" {
        return Ok(());
    }
    if !row.valid {
        return Ok(());
    }

    let (table, cursor) = match scope {
        Scope::Node => (&mut state.node_properties, state.nodes),
        Scope::Edge => (&mut state.edge_properties, state.edges),
        _ => return Ok(()),
    };
    let index = table.ensure(&key, pool, cursor);
    table
        .append(index, &text, pool, cursor)
        .map_err(|source| GraphmlError::TypeParse { key, source })
}

// ============================================================================
// Small helpers
// ============================================================================

fn attr_value(attr: &Attribute<'_>) -> Result<String, GraphmlError> {
    Ok(attr.unescape_value()?.into_owned())
}

/// Split a label attribute value: strip one leading `:`, split on `:`, drop
/// empty fragments.
fn split_labels(raw: &str) -> Vec<String> {
    let raw = raw.strip_prefix(':').unwrap_or(raw);
    raw.split(':')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn parse_str(xml: &str, chunk_size: usize) -> (GraphState, ConstantPool) {
        let pool = ConstantPool::new(chunk_size);
        let mut state = GraphState::new();
        let mut reader = Reader::from_reader(xml.as_bytes());
        parse(&mut reader, &mut state, &pool).expect("parse failed");
        (state, pool)
    }

    #[test]
    fn test_split_labels() {
        assert_eq!(split_labels(":Person:Admin"), vec!["Person", "Admin"]);
        assert_eq!(split_labels("Person"), vec!["Person"]);
        assert_eq!(split_labels(":A::B"), vec!["A", "B"]);
        assert!(split_labels("").is_empty());
    }

    #[test]
    fn test_nodes_and_edges_counted_on_commit() {
        let (state, _) = parse_str(
            r#"<graphml><graph>
                <node id="a"/>
                <node id="b"><data key="p">x</data></node>
                <edge source="a" target="b"/>
            </graph></graphml>"#,
            4,
        );
        assert_eq!(state.nodes, 2);
        assert_eq!(state.edges, 1);
        assert_eq!(state.topology.num_nodes(), 2);
        assert_eq!(state.node_properties.num_columns(), 1);
    }

    #[test]
    fn test_duplicate_node_skipped_with_its_data() {
        let (state, _) = parse_str(
            r#"<graphml><graph>
                <node id="a"><data key="p">first</data></node>
                <node id="a"><data key="p">second</data></node>
            </graph></graphml>"#,
            4,
        );
        assert_eq!(state.nodes, 1);
        assert_eq!(state.topology.num_nodes(), 1);
        // The duplicate's data must not have advanced the property column.
        let pool = ConstantPool::new(4);
        let table = state.node_properties.finish(&pool, state.nodes);
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_node_without_id_skipped() {
        let (state, _) = parse_str(
            r#"<graphml><graph>
                <node/>
                <node id=""/>
                <node id="a"/>
            </graph></graphml>"#,
            4,
        );
        assert_eq!(state.nodes, 1);
    }

    #[test]
    fn test_dangling_edge_skipped() {
        let (state, _) = parse_str(
            r#"<graphml><graph>
                <node id="a"/>
                <edge source="a" target="ghost"><data key="w">1</data></edge>
            </graph></graphml>"#,
            4,
        );
        assert_eq!(state.edges, 0);
        assert_eq!(state.topology.num_edges(), 0);
        // The rejected edge's data is dropped before column discovery.
        assert_eq!(state.edge_properties.num_columns(), 0);
    }

    #[test]
    fn test_label_attribute_beats_label_data() {
        let (state, pool) = parse_str(
            r#"<graphml><graph>
                <node id="a" labels=":FromAttr"><data key="labels">:FromData</data></node>
            </graph></graphml>"#,
            4,
        );
        let labels = state.node_labels.finish(&pool, state.nodes);
        assert_eq!(labels.num_columns(), 1);
        assert_eq!(labels.schema().field(0).name(), "FromAttr");
    }

    #[test]
    fn test_label_data_used_when_attribute_missing() {
        let (state, pool) = parse_str(
            r#"<graphml><graph>
                <node id="a"><data key="labels">:Person:Admin</data></node>
            </graph></graphml>"#,
            4,
        );
        let labels = state.node_labels.finish(&pool, state.nodes);
        assert_eq!(labels.num_columns(), 2);
        assert_eq!(labels.schema().field(0).name(), "Person");
        assert_eq!(labels.schema().field(1).name(), "Admin");
    }

    #[test]
    fn test_edge_type_is_not_split() {
        let (state, pool) = parse_str(
            r#"<graphml><graph>
                <node id="a"/>
                <edge source="a" target="a" label="KNOWS:WELL"/>
            </graph></graphml>"#,
            4,
        );
        let types = state.edge_types.finish(&pool, state.edges);
        assert_eq!(types.num_columns(), 1);
        assert_eq!(types.schema().field(0).name(), "KNOWS:WELL");
    }

    #[test]
    fn test_ignore_key_dropped() {
        let (state, _) = parse_str(
            r#"<graphml>
                <key id="IGNORE" for="node" attr.name="IGNORE" attr.type="string"/>
                <graph>
                    <node id="a"><data key="IGNORE">junk</data></node>
                </graph>
            </graphml>"#,
            4,
        );
        assert_eq!(state.node_properties.num_columns(), 0);
    }

    #[test]
    fn test_declared_key_types_respected() {
        let (state, pool) = parse_str(
            r#"<graphml>
                <key id="w" for="edge" attr.name="weight" attr.type="double"/>
                <key id="s" for="edge" attr.name="scores" attr.type="string" attr.list="long"/>
                <graph>
                    <node id="a"/>
                    <edge source="a" target="a">
                        <data key="w">2.5</data>
                        <data key="s">[1,2,3]</data>
                    </edge>
                </graph>
            </graphml>"#,
            4,
        );
        let table = state.edge_properties.finish(&pool, state.edges);
        use arrow::datatypes::DataType;
        assert_eq!(table.schema().field(0).name(), "weight");
        assert_eq!(table.schema().field(0).data_type(), &DataType::Float64);
        assert_eq!(
            table.schema().field(1).data_type(),
            &DataType::new_list(DataType::Int64, true)
        );
    }

    #[test]
    fn test_unknown_attr_type_falls_back_to_string() {
        let (state, pool) = parse_str(
            r#"<graphml>
                <key id="p" for="node" attr.name="p" attr.type="decimal"/>
                <graph>
                    <node id="a"><data key="p">3.999</data></node>
                </graph>
            </graphml>"#,
            4,
        );
        let table = state.node_properties.finish(&pool, state.nodes);
        assert_eq!(
            table.schema().field(0).data_type(),
            &arrow::datatypes::DataType::Utf8
        );
    }

    #[test]
    fn test_type_parse_failure_is_fatal() {
        let pool = ConstantPool::new(4);
        let mut state = GraphState::new();
        let xml = r#"<graphml>
            <key id="n" for="node" attr.name="n" attr.type="long"/>
            <graph><node id="a"><data key="n">not-a-number</data></node></graph>
        </graphml>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let err = parse(&mut reader, &mut state, &pool).unwrap_err();
        assert!(matches!(err, GraphmlError::TypeParse { .. }));
    }

    #[test]
    fn test_whitespace_only_text_ignored() {
        let (state, pool) = parse_str(
            "<graphml><graph>\n  <node id=\"a\">\n    <data key=\"p\">\n</data>\n  </node>\n</graph></graphml>",
            4,
        );
        // The data element carried only formatting whitespace: the value is
        // the empty string, appended as such to the discovered utf8 column.
        let table = state.node_properties.finish(&pool, state.nodes);
        assert_eq!(table.num_rows(), 1);
        let chunk = table.column(0)[0]
            .as_any()
            .downcast_ref::<arrow::array::StringArray>()
            .unwrap();
        assert!(!chunk.is_null(0));
        assert_eq!(chunk.value(0), "");
    }

    #[test]
    fn test_unknown_elements_skipped() {
        let (state, _) = parse_str(
            r#"<graphml>
                <desc>not graphml we care about</desc>
                <graph>
                    <node id="a"/>
                    <shape kind="round"/>
                    <node id="b"/>
                </graph>
            </graphml>"#,
            4,
        );
        assert_eq!(state.nodes, 2);
    }

    #[test]
    fn test_truncated_document_is_fatal() {
        let pool = ConstantPool::new(4);
        let mut state = GraphState::new();
        let xml = r#"<graphml><graph><node id="a"/>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let err = parse(&mut reader, &mut state, &pool).unwrap_err();
        assert!(matches!(err, GraphmlError::Truncated | GraphmlError::Xml(_)));
    }

    #[test]
    fn test_second_graph_ignored() {
        let (state, _) = parse_str(
            r#"<graphml>
                <graph><node id="a"/></graph>
                <graph><node id="b"/><node id="c"/></graph>
            </graphml>"#,
            4,
        );
        assert_eq!(state.nodes, 1);
    }
}
