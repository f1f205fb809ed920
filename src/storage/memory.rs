use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{ExecError, Result};
use crate::query::value::FieldData;
use crate::storage::{EdgeRef, GraphTxn, LabelSchema, Properties, SchemaInfo};
use crate::types::{Direction, EdgeId, EdgeUid, VertexId};

type PluginFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone, Debug)]
struct VertexRecord {
    label: String,
    props: Properties,
    out: Vec<EdgeId>,
    inc: Vec<EdgeId>,
}

#[derive(Clone, Debug)]
struct EdgeRecord {
    src: VertexId,
    dst: VertexId,
    etype: String,
    props: Properties,
}

/// Index key. Two values share a key exactly when
/// [`FieldData::loose_eq`] holds, so integral floats and ints meet under
/// one numeric key.
fn index_key(value: &FieldData) -> String {
    match value {
        FieldData::Int(v) => format!("number:{v}"),
        FieldData::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            format!("number:{}", *v as i64)
        }
        FieldData::Float(v) => format!("number:{v:?}"),
        FieldData::Array(items) => {
            let keys: Vec<String> = items.iter().map(index_key).collect();
            format!("array:[{}]", keys.join(","))
        }
        other => format!("{}:{other:?}", other.type_name()),
    }
}

/// Ordered in-memory property graph implementing [`GraphTxn`].
#[derive(Clone, Default)]
pub struct MemoryGraph {
    vertices: BTreeMap<VertexId, VertexRecord>,
    edges: BTreeMap<EdgeId, EdgeRecord>,
    labels: BTreeMap<String, LabelSchema>,
    indexes: FxHashMap<(String, String), BTreeMap<String, BTreeSet<VertexId>>>,
    plugins: FxHashMap<String, PluginFn>,
    next_vid: i64,
    next_eid: i64,
    read_only: bool,
    generation: u64,
}

impl fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("vertices", &self.vertices.len())
            .field("edges", &self.edges.len())
            .field("labels", &self.labels.keys().collect::<Vec<_>>())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl MemoryGraph {
    /// Creates an empty writable graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a label, optionally with a primary field (which is indexed).
    pub fn with_label(mut self, label: &str, primary: Option<&str>) -> Self {
        let schema = self.labels.entry(label.to_string()).or_default();
        schema.primary = primary.map(str::to_string);
        if let Some(field) = primary {
            self.build_index(label, field);
        }
        self
    }

    /// Adds a secondary index on `label.field`.
    pub fn with_index(mut self, label: &str, field: &str) -> Self {
        self.labels
            .entry(label.to_string())
            .or_default()
            .indexed
            .insert(field.to_string());
        self.build_index(label, field);
        self
    }

    /// Registers a plugin reachable through [`GraphTxn::call_plugin`].
    pub fn with_plugin<F>(mut self, name: &str, plugin: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.plugins.insert(name.to_string(), Arc::new(plugin));
        self
    }

    /// Toggles read-only mode.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Convenience insert used by fixtures.
    pub fn insert_vertex<'a, I>(&mut self, label: &str, props: I) -> VertexId
    where
        I: IntoIterator<Item = (&'a str, FieldData)>,
    {
        let props = props.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.insert_vertex_record(label, props)
    }

    /// Convenience edge insert used by fixtures.
    pub fn insert_edge<'a, I>(&mut self, src: VertexId, dst: VertexId, etype: &str, props: I) -> EdgeId
    where
        I: IntoIterator<Item = (&'a str, FieldData)>,
    {
        let props = props.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.insert_edge_record(src, dst, etype, props)
    }

    /// Number of live vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of times iterators were refreshed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn insert_vertex_record(&mut self, label: &str, props: Properties) -> VertexId {
        let vid = VertexId(self.next_vid);
        self.next_vid += 1;
        self.labels.entry(label.to_string()).or_default();
        for (field, value) in &props {
            self.index_insert(label, field, value, vid);
        }
        self.vertices.insert(
            vid,
            VertexRecord {
                label: label.to_string(),
                props,
                out: Vec::new(),
                inc: Vec::new(),
            },
        );
        vid
    }

    fn insert_edge_record(
        &mut self,
        src: VertexId,
        dst: VertexId,
        etype: &str,
        props: Properties,
    ) -> EdgeId {
        let eid = EdgeId(self.next_eid);
        self.next_eid += 1;
        if let Some(v) = self.vertices.get_mut(&src) {
            v.out.push(eid);
        }
        if let Some(v) = self.vertices.get_mut(&dst) {
            v.inc.push(eid);
        }
        self.edges.insert(
            eid,
            EdgeRecord {
                src,
                dst,
                etype: etype.to_string(),
                props,
            },
        );
        eid
    }

    fn build_index(&mut self, label: &str, field: &str) {
        let mut entries: BTreeMap<String, BTreeSet<VertexId>> = BTreeMap::new();
        for (vid, record) in &self.vertices {
            if record.label != label {
                continue;
            }
            if let Some(value) = record.props.get(field) {
                entries.entry(index_key(value)).or_default().insert(*vid);
            }
        }
        self.indexes
            .insert((label.to_string(), field.to_string()), entries);
    }

    fn index_insert(&mut self, label: &str, field: &str, value: &FieldData, vid: VertexId) {
        if value.is_null() {
            return;
        }
        if let Some(index) = self.indexes.get_mut(&(label.to_string(), field.to_string())) {
            index.entry(index_key(value)).or_default().insert(vid);
        }
    }

    fn index_remove(&mut self, label: &str, field: &str, value: &FieldData, vid: VertexId) {
        if let Some(index) = self.indexes.get_mut(&(label.to_string(), field.to_string())) {
            let key = index_key(value);
            if let Some(set) = index.get_mut(&key) {
                set.remove(&vid);
                if set.is_empty() {
                    index.remove(&key);
                }
            }
        }
    }

    fn vertex_record(&self, vid: VertexId) -> Result<&VertexRecord> {
        self.vertices
            .get(&vid)
            .ok_or_else(|| ExecError::Storage(format!("vertex {vid} not found")))
    }

    fn edge_record(&self, eid: EdgeId) -> Result<&EdgeRecord> {
        self.edges
            .get(&eid)
            .ok_or_else(|| ExecError::Storage(format!("edge {eid} not found")))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ExecError::Storage(
                "write attempted in a read-only transaction".into(),
            ));
        }
        Ok(())
    }

    fn edge_ref(&self, eid: EdgeId, record: &EdgeRecord) -> EdgeRef {
        EdgeRef {
            uid: EdgeUid::new(record.src, record.dst, eid),
            etype: record.etype.clone(),
        }
    }
}

impl GraphTxn for MemoryGraph {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn scan_vertices(&self, label: Option<&str>) -> Result<Vec<VertexId>> {
        Ok(self
            .vertices
            .iter()
            .filter(|(_, v)| label.map_or(true, |l| v.label == l))
            .map(|(vid, _)| *vid)
            .collect())
    }

    fn vertex_exists(&self, vid: VertexId) -> bool {
        self.vertices.contains_key(&vid)
    }

    fn vertex_label(&self, vid: VertexId) -> Result<String> {
        Ok(self.vertex_record(vid)?.label.clone())
    }

    fn vertex_field(&self, vid: VertexId, field: &str) -> Result<FieldData> {
        Ok(self
            .vertex_record(vid)?
            .props
            .get(field)
            .cloned()
            .unwrap_or(FieldData::Null))
    }

    fn vertex_fields(&self, vid: VertexId) -> Result<Properties> {
        Ok(self.vertex_record(vid)?.props.clone())
    }

    fn edges(&self, vid: VertexId, direction: Direction, types: &[String]) -> Result<Vec<EdgeRef>> {
        let vertex = self.vertex_record(vid)?;
        let wanted = |record: &EdgeRecord| types.is_empty() || types.iter().any(|t| *t == record.etype);
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for eid in &vertex.out {
                let record = self.edge_record(*eid)?;
                if wanted(record) {
                    out.push(self.edge_ref(*eid, record));
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for eid in &vertex.inc {
                let record = self.edge_record(*eid)?;
                // a self-loop was already reported as outgoing
                if direction == Direction::Both && record.src == record.dst {
                    continue;
                }
                if wanted(record) {
                    out.push(self.edge_ref(*eid, record));
                }
            }
        }
        Ok(out)
    }

    fn edge_exists(&self, eid: EdgeId) -> bool {
        self.edges.contains_key(&eid)
    }

    fn edge(&self, eid: EdgeId) -> Result<EdgeRef> {
        let record = self.edge_record(eid)?;
        Ok(self.edge_ref(eid, record))
    }

    fn edge_field(&self, eid: EdgeId, field: &str) -> Result<FieldData> {
        Ok(self
            .edge_record(eid)?
            .props
            .get(field)
            .cloned()
            .unwrap_or(FieldData::Null))
    }

    fn edge_fields(&self, eid: EdgeId) -> Result<Properties> {
        Ok(self.edge_record(eid)?.props.clone())
    }

    fn is_indexed(&self, label: &str, field: &str) -> bool {
        self.indexes
            .contains_key(&(label.to_string(), field.to_string()))
    }

    fn primary_field(&self, label: &str) -> Option<String> {
        self.labels.get(label).and_then(|s| s.primary.clone())
    }

    fn index_seek(&self, label: &str, field: &str, value: &FieldData) -> Result<Vec<VertexId>> {
        let index = self
            .indexes
            .get(&(label.to_string(), field.to_string()))
            .ok_or_else(|| ExecError::Storage(format!("no index on {label}.{field}")))?;
        Ok(index
            .get(&index_key(value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn schema_info(&self) -> SchemaInfo {
        SchemaInfo {
            labels: self.labels.clone(),
            edge_types: self.edges.values().map(|e| e.etype.clone()).collect(),
        }
    }

    fn add_vertex(&mut self, label: &str, props: Properties) -> Result<VertexId> {
        self.ensure_writable()?;
        let props = props.into_iter().filter(|(_, v)| !v.is_null()).collect();
        Ok(self.insert_vertex_record(label, props))
    }

    fn add_edge(
        &mut self,
        src: VertexId,
        dst: VertexId,
        etype: &str,
        props: Properties,
    ) -> Result<EdgeUid> {
        self.ensure_writable()?;
        self.vertex_record(src)?;
        self.vertex_record(dst)?;
        let props = props.into_iter().filter(|(_, v)| !v.is_null()).collect();
        let eid = self.insert_edge_record(src, dst, etype, props);
        Ok(EdgeUid::new(src, dst, eid))
    }

    fn set_vertex_property(&mut self, vid: VertexId, field: &str, value: FieldData) -> Result<()> {
        self.ensure_writable()?;
        let (label, old) = {
            let record = self.vertex_record(vid)?;
            (record.label.clone(), record.props.get(field).cloned())
        };
        if let Some(old) = old {
            self.index_remove(&label, field, &old, vid);
        }
        self.index_insert(&label, field, &value, vid);
        if let Some(record) = self.vertices.get_mut(&vid) {
            if value.is_null() {
                record.props.remove(field);
            } else {
                record.props.insert(field.to_string(), value);
            }
        }
        Ok(())
    }

    fn set_edge_property(&mut self, eid: EdgeId, field: &str, value: FieldData) -> Result<()> {
        self.ensure_writable()?;
        let record = self
            .edges
            .get_mut(&eid)
            .ok_or_else(|| ExecError::Storage(format!("edge {eid} not found")))?;
        if value.is_null() {
            record.props.remove(field);
        } else {
            record.props.insert(field.to_string(), value);
        }
        Ok(())
    }

    fn delete_vertex(&mut self, vid: VertexId) -> Result<usize> {
        self.ensure_writable()?;
        let record = self
            .vertices
            .remove(&vid)
            .ok_or_else(|| ExecError::Storage(format!("vertex {vid} not found")))?;
        for (field, value) in &record.props {
            self.index_remove(&record.label, field, value, vid);
        }
        let incident: BTreeSet<EdgeId> = record.out.iter().chain(record.inc.iter()).copied().collect();
        let mut removed = 0;
        for eid in incident {
            if self.edges.contains_key(&eid) {
                self.delete_edge(eid)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn delete_edge(&mut self, eid: EdgeId) -> Result<()> {
        self.ensure_writable()?;
        let record = self
            .edges
            .remove(&eid)
            .ok_or_else(|| ExecError::Storage(format!("edge {eid} not found")))?;
        if let Some(v) = self.vertices.get_mut(&record.src) {
            v.out.retain(|e| *e != eid);
        }
        if let Some(v) = self.vertices.get_mut(&record.dst) {
            v.inc.retain(|e| *e != eid);
        }
        Ok(())
    }

    fn refresh_iterators(&mut self) {
        self.generation += 1;
        trace!(generation = self.generation, "iterators refreshed");
    }

    fn call_plugin(&self, name: &str, input: &str) -> Result<Option<String>> {
        Ok(self.plugins.get(name).map(|plugin| plugin(input)))
    }
}
