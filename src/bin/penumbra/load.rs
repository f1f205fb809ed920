//! CSV vertex and edge files into a [`MemoryGraph`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use penumbra::query::FieldData;
use penumbra::storage::MemoryGraph;
use penumbra::types::VertexId;
use tracing::debug;

use crate::CliError;

/// Where the graph comes from.
pub struct GraphSource {
    pub vertices: PathBuf,
    pub edges: Option<PathBuf>,
    /// `Label.field` pairs to index.
    pub indexes: Vec<String>,
}

/// Loaded graph with counts for reporting.
pub struct LoadedGraph {
    pub graph: MemoryGraph,
    pub vertices: usize,
    pub edges: usize,
}

struct ColumnSpec {
    name: String,
    index: usize,
}

pub fn load_graph(source: &GraphSource) -> Result<LoadedGraph, CliError> {
    let mut graph = MemoryGraph::new();
    for spec in &source.indexes {
        let Some((label, field)) = spec.split_once('.') else {
            return Err(CliError::Message(format!("index '{spec}' must be Label.field")));
        };
        graph = graph.with_index(label.trim(), field.trim());
    }
    let mut ids: HashMap<String, VertexId> = HashMap::new();
    let vertices = load_vertices(&mut graph, &source.vertices, &mut ids)?;
    let edges = match &source.edges {
        Some(path) => load_edges(&mut graph, path, &ids)?,
        None => 0,
    };
    debug!(vertices, edges, "graph loaded");
    Ok(LoadedGraph { graph, vertices, edges })
}

/// Columns `id,label,<props...>`.
fn load_vertices(graph: &mut MemoryGraph, path: &Path, ids: &mut HashMap<String, VertexId>) -> Result<usize, CliError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_index = find_column(&headers, "id")?;
    let label_index = find_column(&headers, "label")?;
    let props = prop_columns(&headers, &[id_index, label_index]);
    let mut loaded = 0;
    for result in reader.records() {
        let record = result?;
        let ext_id = required(&record, id_index, "id")?;
        if ids.contains_key(ext_id) {
            return Err(CliError::Message(format!("duplicate vertex id '{ext_id}'")));
        }
        let label = required(&record, label_index, "label")?;
        let values = build_props(&record, &props);
        let vid = graph.insert_vertex(label, values.iter().map(|(k, v)| (k.as_str(), v.clone())));
        ids.insert(ext_id.to_string(), vid);
        loaded += 1;
    }
    Ok(loaded)
}

/// Columns `src,dst,type,<props...>`; endpoints name vertex ids.
fn load_edges(graph: &mut MemoryGraph, path: &Path, ids: &HashMap<String, VertexId>) -> Result<usize, CliError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let src_index = find_column(&headers, "src")?;
    let dst_index = find_column(&headers, "dst")?;
    let type_index = find_column(&headers, "type")?;
    let props = prop_columns(&headers, &[src_index, dst_index, type_index]);
    let mut loaded = 0;
    for result in reader.records() {
        let record = result?;
        let endpoint = |index: usize, name: &str| -> Result<VertexId, CliError> {
            let ext = required(&record, index, name)?;
            ids.get(ext)
                .copied()
                .ok_or_else(|| CliError::Message(format!("edge references unknown vertex '{ext}'")))
        };
        let src = endpoint(src_index, "src")?;
        let dst = endpoint(dst_index, "dst")?;
        let etype = required(&record, type_index, "type")?;
        let values = build_props(&record, &props);
        graph.insert_edge(src, dst, etype, values.iter().map(|(k, v)| (k.as_str(), v.clone())));
        loaded += 1;
    }
    Ok(loaded)
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize, CliError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| CliError::Message(format!("missing column '{name}'")))
}

fn prop_columns(headers: &StringRecord, skip: &[usize]) -> Vec<ColumnSpec> {
    headers
        .iter()
        .enumerate()
        .filter(|(index, _)| !skip.contains(index))
        .map(|(index, name)| ColumnSpec {
            name: name.trim().to_string(),
            index,
        })
        .collect()
}

fn required<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str, CliError> {
    record
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CliError::Message(format!("missing value for column '{name}'")))
}

fn build_props(record: &StringRecord, columns: &[ColumnSpec]) -> Vec<(String, FieldData)> {
    let mut props = Vec::new();
    for col in columns {
        if let Some(raw) = record.get(col.index) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let value = parse_value(raw);
            if value != FieldData::Null {
                props.push((col.name.clone(), value));
            }
        }
    }
    props
}

/// Literal text: null, booleans, integers, floats, quoted or bare strings.
pub fn parse_value(raw: &str) -> FieldData {
    let raw = raw.trim();
    if raw.len() >= 2 && ((raw.starts_with('\'') && raw.ends_with('\'')) || (raw.starts_with('"') && raw.ends_with('"')))
    {
        return FieldData::from(&raw[1..raw.len() - 1]);
    }
    let lower = raw.to_ascii_lowercase();
    if lower == "null" {
        return FieldData::Null;
    }
    if lower == "true" {
        return FieldData::Bool(true);
    }
    if lower == "false" {
        return FieldData::Bool(false);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return FieldData::Int(int_val);
    }
    if let Ok(float_val) = raw.parse::<f64>() {
        return FieldData::Float(float_val);
    }
    FieldData::from(raw)
}
