//! Row model shared by every operator.
//!
//! A [`Record`] is a fixed-width sequence of [`Entry`] values whose width and
//! column meaning come from the [`SymbolTable`] of the query part.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{ExecError, Result};
use crate::query::pattern_graph::{PatternNodeId, PatternRelId};
use crate::query::symbol_table::{SymbolTable, SymbolType};
use crate::query::value::FieldData;
use crate::types::{EdgeUid, VertexId};

/// Query parameters keyed by name without the leading `$`.
pub type ParamTable = HashMap<String, FieldData>;

/// Default text emitted for null entries.
pub const NULL_MARKER: &str = "__null__";

/// Ordered alternating vertex/edge sequence of a variable-length match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    start: VertexId,
    edges: SmallVec<[EdgeUid; 4]>,
}

impl Path {
    /// Empty path starting nowhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start vertex and drops all edges.
    pub fn set_start(&mut self, start: VertexId) {
        self.start = start;
        self.edges.clear();
    }

    /// Appends one hop.
    pub fn append(&mut self, edge: EdgeUid) {
        self.edges.push(edge);
    }

    /// Removes the last hop.
    pub fn pop_back(&mut self) -> Option<EdgeUid> {
        self.edges.pop()
    }

    /// Forgets start and edges.
    pub fn clear(&mut self) {
        self.start = VertexId::INVALID;
        self.edges.clear();
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True when the path has no hops.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Start vertex.
    pub fn start(&self) -> VertexId {
        self.start
    }

    /// Edges in traversal order.
    pub fn edges(&self) -> &[EdgeUid] {
        &self.edges
    }

    /// Vertices in traversal order, starting with [`Path::start`].
    pub fn vertices(&self) -> Vec<VertexId> {
        let mut out = Vec::with_capacity(self.edges.len() + 1);
        let mut current = self.start;
        out.push(current);
        for edge in &self.edges {
            current = edge.other_end(current);
            out.push(current);
        }
        out
    }

    /// Last vertex reached.
    pub fn end(&self) -> VertexId {
        self.vertices().last().copied().unwrap_or(VertexId::INVALID)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vertices = self.vertices();
        write!(f, "[V[{}]", vertices[0])?;
        for (edge, vertex) in self.edges.iter().zip(vertices.iter().skip(1)) {
            write!(f, ",E[{edge}],V[{vertex}]")?;
        }
        write!(f, "]")
    }
}

/// Vertex bound in a record column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEntry {
    /// Pattern node this column belongs to, if any.
    pub node: Option<PatternNodeId>,
    /// Bound vertex; [`VertexId::INVALID`] while unbound.
    pub vid: VertexId,
}

/// Relationship bound in a record column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelEntry {
    /// Pattern relationship this column belongs to, if any.
    pub rel: Option<PatternRelId>,
    /// Bound edge; `None` while unbound.
    pub edge: Option<EdgeUid>,
}

/// Variable-length relationship bound in a record column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarLenEntry {
    /// Pattern relationship this column belongs to, if any.
    pub rel: Option<PatternRelId>,
    /// Materialized path.
    pub path: Path,
}

/// A tagged value in one record column.
#[derive(Clone, Debug, Default)]
pub enum Entry {
    /// Column not yet written.
    #[default]
    Unknown,
    /// Scalar or list value.
    Constant(FieldData),
    /// Vertex.
    Node(NodeEntry),
    /// Single relationship.
    Relationship(RelEntry),
    /// Variable-length relationship.
    VarLenRelationship(VarLenEntry),
    /// Vertex frozen as text when crossing a plan boundary.
    NodeSnapshot(String),
    /// Relationship frozen as text when crossing a plan boundary.
    RelSnapshot(String),
}

impl Entry {
    /// Constant entry.
    pub fn constant(value: impl Into<FieldData>) -> Self {
        Entry::Constant(value.into())
    }

    /// Null constant.
    pub fn null() -> Self {
        Entry::Constant(FieldData::Null)
    }

    /// Vertex entry bound to `vid`.
    pub fn node(node: Option<PatternNodeId>, vid: VertexId) -> Self {
        Entry::Node(NodeEntry { node, vid })
    }

    /// Relationship entry bound to `edge`.
    pub fn relationship(rel: Option<PatternRelId>, edge: Option<EdgeUid>) -> Self {
        Entry::Relationship(RelEntry { rel, edge })
    }

    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entry::Unknown => "UNKNOWN",
            Entry::Constant(_) => "CONSTANT",
            Entry::Node(_) => "NODE",
            Entry::Relationship(_) => "RELATIONSHIP",
            Entry::VarLenRelationship(_) => "VAR_LEN_RELP",
            Entry::NodeSnapshot(_) => "NODE_SNAPSHOT",
            Entry::RelSnapshot(_) => "RELP_SNAPSHOT",
        }
    }

    /// True only for the null constant.
    pub fn is_null(&self) -> bool {
        matches!(self, Entry::Constant(FieldData::Null))
    }

    /// True for anything that behaves as null: null constants, unwritten
    /// columns, and unbound vertices/relationships.
    pub fn equal_null(&self) -> bool {
        match self {
            Entry::Unknown => true,
            Entry::Constant(value) => value.is_null(),
            Entry::Node(node) => !node.vid.is_valid(),
            Entry::Relationship(rel) => rel.edge.is_none(),
            Entry::VarLenRelationship(rel) => rel.path.is_empty() && !rel.path.start().is_valid(),
            Entry::NodeSnapshot(_) | Entry::RelSnapshot(_) => false,
        }
    }

    /// Constant payload, if any.
    pub fn as_constant(&self) -> Option<&FieldData> {
        match self {
            Entry::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Bound vertex id for node entries.
    pub fn vid(&self) -> Option<VertexId> {
        match self {
            Entry::Node(node) if node.vid.is_valid() => Some(node.vid),
            _ => None,
        }
    }

    /// Bound edge for relationship entries.
    pub fn edge(&self) -> Option<EdgeUid> {
        match self {
            Entry::Relationship(rel) => rel.edge,
            _ => None,
        }
    }

    /// Renders the entry, writing `null_marker` for null-like values.
    pub fn render(&self, null_marker: &str) -> String {
        match self {
            Entry::Unknown => null_marker.to_string(),
            Entry::Constant(value) => value.render(null_marker),
            Entry::NodeSnapshot(text) | Entry::RelSnapshot(text) => text.clone(),
            Entry::Node(node) => {
                if node.vid.is_valid() {
                    format!("V[{}]", node.vid)
                } else {
                    null_marker.to_string()
                }
            }
            Entry::Relationship(rel) => match rel.edge {
                Some(edge) => format!("E[{edge}]"),
                None => null_marker.to_string(),
            },
            Entry::VarLenRelationship(rel) => rel.path.to_string(),
        }
    }

    /// Freezes vertices and relationships as text so the value survives
    /// cursor invalidation.
    pub fn snapshot(&mut self) -> &mut Self {
        match self {
            Entry::Node(_) => *self = Entry::NodeSnapshot(self.render(NULL_MARKER)),
            Entry::Relationship(_) => *self = Entry::RelSnapshot(self.render(NULL_MARKER)),
            Entry::VarLenRelationship(_) => {
                *self = Entry::Constant(FieldData::String(self.render(NULL_MARKER)))
            }
            _ => {}
        }
        self
    }

    /// Ordering between constants; other kinds are incomparable.
    pub fn compare(&self, other: &Entry) -> Option<Ordering> {
        match (self, other) {
            (Entry::Constant(a), Entry::Constant(b)) => a.compare(b),
            _ => None,
        }
    }

    /// Sort order: constants by their total order, everything else by text.
    pub fn sort_cmp(&self, other: &Entry) -> Ordering {
        match (self, other) {
            (Entry::Constant(a), Entry::Constant(b)) => a.total_cmp(b),
            _ => self.render(NULL_MARKER).cmp(&other.render(NULL_MARKER)),
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        if self.equal_null() && other.equal_null() {
            return true;
        }
        match (self, other) {
            (Entry::Constant(a), Entry::Constant(b)) => a.loose_eq(b),
            (Entry::Node(a), Entry::Node(b)) => a.vid == b.vid,
            (Entry::Relationship(a), Entry::Relationship(b)) => a.edge == b.edge,
            (Entry::VarLenRelationship(a), Entry::VarLenRelationship(b)) => a.path == b.path,
            (Entry::NodeSnapshot(a), Entry::NodeSnapshot(b))
            | (Entry::RelSnapshot(a), Entry::RelSnapshot(b)) => a == b,
            _ => false,
        }
    }
}

impl From<FieldData> for Entry {
    fn from(value: FieldData) -> Self {
        Entry::Constant(value)
    }
}

/// One row of intermediate or final results.
#[derive(Clone, Debug, Default)]
pub struct Record {
    /// Column values.
    pub values: Vec<Entry>,
    symbols: Option<Arc<SymbolTable>>,
}

impl Record {
    /// Record of `len` unwritten columns.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![Entry::Unknown; len],
            symbols: None,
        }
    }

    /// Record sized by `symbols`, with parameter columns pre-filled from
    /// `params` when given.
    pub fn with_symbols(symbols: Arc<SymbolTable>, params: Option<&ParamTable>) -> Self {
        let mut record = Self {
            values: vec![Entry::Unknown; symbols.len()],
            symbols: Some(symbols),
        };
        if let Some(params) = params {
            record.set_parameters(params);
        }
        record
    }

    /// Writes parameter values into columns typed as parameters.
    pub fn set_parameters(&mut self, params: &ParamTable) {
        let Some(symbols) = self.symbols.clone() else {
            return;
        };
        for (alias, node) in symbols.iter() {
            if node.ty != SymbolType::Parameter {
                continue;
            }
            let name = alias.trim_start_matches('$');
            if let Some(value) = params.get(name) {
                if let Some(slot) = self.values.get_mut(node.id) {
                    *slot = Entry::Constant(value.clone());
                }
            }
        }
    }

    /// Symbol table describing the columns, if attached.
    pub fn symbols(&self) -> Option<&Arc<SymbolTable>> {
        self.symbols.as_ref()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a zero-width record.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column value.
    pub fn get(&self, column: usize) -> Result<&Entry> {
        self.values
            .get(column)
            .ok_or_else(|| ExecError::internal(format!("record column {column} out of range ({})", self.values.len())))
    }

    /// Overwrites a column.
    pub fn set(&mut self, column: usize, entry: Entry) -> Result<()> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(column)
            .ok_or_else(|| ExecError::internal(format!("record column {column} out of range ({len})")))?;
        *slot = entry;
        Ok(())
    }

    /// Copies every written column of `other` into `self`, growing if needed.
    ///
    /// Columns are expected to be disjoint; an overlapping written column in
    /// `other` silently overwrites the one in `self`.
    pub fn merge(&mut self, other: &Record) {
        if self.values.len() < other.values.len() {
            self.values.resize(other.values.len(), Entry::Unknown);
        }
        for (slot, entry) in self.values.iter_mut().zip(other.values.iter()) {
            if !matches!(entry, Entry::Unknown) {
                *slot = entry.clone();
            }
        }
        if self.symbols.is_none() {
            self.symbols = other.symbols.clone();
        }
    }

    /// Replaces contents with `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Record) {
        self.values.clone_from(&other.values);
        if other.symbols.is_some() {
            self.symbols = other.symbols.clone();
        }
    }

    /// True when every column is null-like.
    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Entry::equal_null)
    }

    /// Comma-joined rendering with a custom null marker.
    pub fn render(&self, null_marker: &str) -> String {
        self.values
            .iter()
            .map(|entry| entry.render(null_marker))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Freezes every vertex/relationship column.
    pub fn snapshot(&mut self) -> &mut Self {
        for entry in &mut self.values {
            entry.snapshot();
        }
        self
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(NULL_MARKER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::symbol_table::SymbolScope;
    use crate::types::EdgeId;

    #[test]
    fn merge_overwrites_written_columns_only() {
        let mut left = Record::new(3);
        left.values[0] = Entry::constant(1i64);
        left.values[2] = Entry::constant("keep");
        let mut right = Record::new(3);
        right.values[1] = Entry::node(None, VertexId(4));
        right.values[2] = Entry::constant("overwritten");
        left.merge(&right);
        assert_eq!(left.to_string(), "1,V[4],overwritten");
    }

    #[test]
    fn unbound_vertex_renders_as_null() {
        let mut record = Record::new(2);
        record.values[0] = Entry::node(None, VertexId::INVALID);
        record.values[1] = Entry::null();
        assert_eq!(record.to_string(), "__null__,__null__");
        assert!(record.is_all_null());
    }

    #[test]
    fn snapshot_freezes_entities() {
        let mut entry = Entry::relationship(
            None,
            Some(EdgeUid::new(VertexId(1), VertexId(2), EdgeId(9))),
        );
        entry.snapshot();
        assert!(matches!(&entry, Entry::RelSnapshot(text) if text == "E[1_2_9]"));
    }

    #[test]
    fn path_tracks_vertices_through_hops() {
        let mut path = Path::new();
        path.set_start(VertexId(0));
        path.append(EdgeUid::new(VertexId(0), VertexId(1), EdgeId(10)));
        path.append(EdgeUid::new(VertexId(2), VertexId(1), EdgeId(11)));
        assert_eq!(path.vertices(), vec![VertexId(0), VertexId(1), VertexId(2)]);
        assert_eq!(path.end(), VertexId(2));
        assert_eq!(path.to_string(), "[V[0],E[0_1_10],V[1],E[2_1_11],V[2]]");
        path.pop_back();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn parameters_fill_parameter_columns() {
        let mut table = SymbolTable::new();
        table.add("n", SymbolType::Node, SymbolScope::Local);
        table.add("$age", SymbolType::Parameter, SymbolScope::Local);
        let mut params = ParamTable::new();
        params.insert("age".into(), FieldData::Int(30));
        let record = Record::with_symbols(Arc::new(table), Some(&params));
        assert_eq!(record.values[1], Entry::constant(30i64));
        assert!(matches!(record.values[0], Entry::Unknown));
    }
}
