//! Storage collaborator seam.
//!
//! The execution core never owns graph data. It reads and mutates through a
//! [`GraphTxn`] supplied by the caller, and walks vertices and edges with the
//! snapshot cursors in [`cursor`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::query::value::FieldData;
use crate::types::{Direction, EdgeId, EdgeUid, VertexId};

/// Snapshot cursors over vertex and edge ids.
///
/// Cursors re-probe existence on every advance, so ids deleted mid-scan are
/// skipped once the transaction's iterators are refreshed.
pub mod cursor;

/// In-memory graph used by tests, benches, and the inspection CLI.
///
/// Implements [`GraphTxn`] over ordered maps with optional secondary indexes.
pub mod memory;

pub use cursor::{EdgeCursor, VertexCursor};
pub use memory::MemoryGraph;

/// Property map passed to vertex and edge creation.
pub type Properties = BTreeMap<String, FieldData>;

/// Edge as seen by the traversal operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    /// Endpoints and id.
    pub uid: EdgeUid,
    /// Relationship type name.
    pub etype: String,
}

/// Schema of one vertex label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSchema {
    /// Primary (unique) field, if declared.
    pub primary: Option<String>,
    /// Fields carrying a secondary index.
    pub indexed: BTreeSet<String>,
}

/// Schema snapshot consulted by the optimizer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Vertex labels and their schema.
    pub labels: BTreeMap<String, LabelSchema>,
    /// Known relationship types.
    pub edge_types: BTreeSet<String>,
}

impl SchemaInfo {
    /// Returns true when `label.field` is indexed (primary fields are).
    pub fn is_indexed(&self, label: &str, field: &str) -> bool {
        self.labels.get(label).is_some_and(|schema| {
            schema.primary.as_deref() == Some(field) || schema.indexed.contains(field)
        })
    }
}

/// Filter shape for the relationship count fast path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeCountSpec {
    /// Label required on the start vertex.
    pub start_label: Option<String>,
    /// Label required on the neighbor vertex.
    pub neighbor_label: Option<String>,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// Direction walked from the start vertex.
    pub direction: Direction,
}

/// Transaction handle the operators execute against.
///
/// Reads take `&self` so the traversal fast path can share the handle across
/// worker threads. Mutations take `&mut self`; after any delete or property
/// update the caller must invoke [`GraphTxn::refresh_iterators`].
pub trait GraphTxn: Send + Sync {
    /// True when the transaction rejects mutations.
    fn is_read_only(&self) -> bool;

    /// Vertex ids in storage order, optionally restricted to one label.
    fn scan_vertices(&self, label: Option<&str>) -> Result<Vec<VertexId>>;
    /// Whether the vertex currently exists.
    fn vertex_exists(&self, vid: VertexId) -> bool;
    /// Label of a vertex.
    fn vertex_label(&self, vid: VertexId) -> Result<String>;
    /// Field value of a vertex, `Null` when the field is absent.
    fn vertex_field(&self, vid: VertexId, field: &str) -> Result<FieldData>;
    /// All fields of a vertex.
    fn vertex_fields(&self, vid: VertexId) -> Result<Properties>;

    /// Edges incident to `vid` in `direction`, restricted to `types` when non-empty.
    fn edges(&self, vid: VertexId, direction: Direction, types: &[String]) -> Result<Vec<EdgeRef>>;
    /// Whether the edge currently exists.
    fn edge_exists(&self, eid: EdgeId) -> bool;
    /// Looks up an edge by id.
    fn edge(&self, eid: EdgeId) -> Result<EdgeRef>;
    /// Field value of an edge, `Null` when the field is absent.
    fn edge_field(&self, eid: EdgeId, field: &str) -> Result<FieldData>;
    /// All fields of an edge.
    fn edge_fields(&self, eid: EdgeId) -> Result<Properties>;

    /// Whether `label.field` has an index.
    fn is_indexed(&self, label: &str, field: &str) -> bool;
    /// Primary field of a label, if declared.
    fn primary_field(&self, label: &str) -> Option<String>;
    /// Indexed lookup of vertices whose `field` equals `value`.
    fn index_seek(&self, label: &str, field: &str, value: &FieldData) -> Result<Vec<VertexId>>;
    /// Schema snapshot.
    fn schema_info(&self) -> SchemaInfo;

    /// Creates a vertex.
    fn add_vertex(&mut self, label: &str, props: Properties) -> Result<VertexId>;
    /// Creates an edge.
    fn add_edge(
        &mut self,
        src: VertexId,
        dst: VertexId,
        etype: &str,
        props: Properties,
    ) -> Result<EdgeUid>;
    /// Sets (or, with `Null`, removes) a vertex field.
    fn set_vertex_property(&mut self, vid: VertexId, field: &str, value: FieldData) -> Result<()>;
    /// Sets (or, with `Null`, removes) an edge field.
    fn set_edge_property(&mut self, eid: EdgeId, field: &str, value: FieldData) -> Result<()>;
    /// Deletes a vertex and its incident edges; returns the number of edges removed.
    fn delete_vertex(&mut self, vid: VertexId) -> Result<usize>;
    /// Deletes an edge.
    fn delete_edge(&mut self, eid: EdgeId) -> Result<()>;
    /// Brings open cursors back in line with the latest mutations.
    fn refresh_iterators(&mut self);

    /// String-in/string-out plugin boundary. `Ok(None)` means no such plugin.
    fn call_plugin(&self, _name: &str, _input: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Counts edges matching `spec` without materializing rows.
    fn count_edges(&self, spec: &EdgeCountSpec) -> Result<u64> {
        let mut count = 0u64;
        for vid in self.scan_vertices(spec.start_label.as_deref())? {
            for edge in self.edges(vid, spec.direction, &spec.types)? {
                if let Some(label) = spec.neighbor_label.as_deref() {
                    let other = edge.uid.other_end(vid);
                    if self.vertex_label(other)? != label {
                        continue;
                    }
                }
                count += 1;
            }
        }
        Ok(count)
    }
}
