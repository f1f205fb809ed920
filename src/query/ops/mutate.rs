//! Write operators.
//!
//! Every write goes through the statement's transaction and is counted in
//! [`ExecContext::stats`]. Property writes refresh the transaction's
//! iterators after each row; deletions drain the whole input first and are
//! applied as one batch before any row is passed on.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use tracing::debug;

use super::scan::aligned;
use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::pattern_graph::{PatternNodeId, PatternRelId};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;
use crate::storage::{GraphTxn, Properties};
use crate::types::{Direction, EdgeId, VertexId};

fn ensure_writable(ctx: &ExecContext<'_>, op: &str) -> Result<()> {
    if ctx.txn().is_read_only() {
        return Err(ExecError::input(format!("{op} requires a write transaction")));
    }
    Ok(())
}

fn property_value(entry: Entry, field: &str) -> Result<FieldData> {
    match entry {
        Entry::Constant(value) => Ok(value),
        other if other.equal_null() => Ok(FieldData::Null),
        other => Err(ExecError::type_mismatch(format!(
            "property '{field}' cannot hold a {}",
            other.kind_name()
        ))),
    }
}

fn evaluate_properties(
    properties: &[(String, ArithExpr)],
    ctx: &ExecContext<'_>,
    record: &Record,
) -> Result<Properties> {
    let mut out = Properties::new();
    for (field, expr) in properties {
        let value = property_value(expr.evaluate(ctx, record)?, field)?;
        if !value.is_null() {
            out.insert(field.clone(), value);
        }
    }
    Ok(out)
}

fn properties_text(properties: &[(String, ArithExpr)]) -> String {
    if properties.is_empty() {
        return String::new();
    }
    let fields = properties
        .iter()
        .map(|(field, expr)| format!("{field}: {expr}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" {{{fields}}}")
}

/// Vertex created by `CREATE` or `MERGE`.
#[derive(Clone, Debug)]
pub struct CreateNode {
    /// Bound variable.
    pub alias: String,
    /// Label of the new vertex.
    pub label: String,
    /// Initial properties.
    pub properties: Vec<(String, ArithExpr)>,
    /// Pattern node the variable belongs to.
    pub node: Option<PatternNodeId>,
    column: Option<usize>,
}

impl CreateNode {
    /// `(alias:label)`.
    pub fn new(alias: &str, label: &str) -> Self {
        Self {
            alias: alias.to_string(),
            label: label.to_string(),
            properties: Vec::new(),
            node: None,
            column: None,
        }
    }

    /// Adds an initial property.
    pub fn with_property(mut self, field: &str, value: ArithExpr) -> Self {
        self.properties.push((field.to_string(), value));
        self
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "CreateNode")?);
        for (_, expr) in &mut self.properties {
            expr.realign_alias_id(symbols)?;
        }
        Ok(())
    }

    fn create(&self, ctx: &mut ExecContext<'_>, record: &mut Record) -> Result<VertexId> {
        let column = aligned(self.column, &self.alias)?;
        let properties = evaluate_properties(&self.properties, ctx, record)?;
        let written = properties.len() as u64;
        let vid = ctx.txn.add_vertex(&self.label, properties)?;
        ctx.stats.vertices_created += 1;
        ctx.stats.properties_set += written;
        record.set(column, Entry::node(self.node, vid))?;
        Ok(vid)
    }

    fn text(&self) -> String {
        format!("({}:{}{})", self.alias, self.label, properties_text(&self.properties))
    }
}

/// Relationship created by `CREATE` or `MERGE`, directed from `src` to `dst`.
#[derive(Clone, Debug)]
pub struct CreateRel {
    /// Bound variable.
    pub alias: String,
    /// Source vertex variable.
    pub src_alias: String,
    /// Destination vertex variable.
    pub dst_alias: String,
    /// Relationship type.
    pub rel_type: String,
    /// Initial properties.
    pub properties: Vec<(String, ArithExpr)>,
    /// Pattern relationship the variable belongs to.
    pub rel: Option<PatternRelId>,
    columns: Option<(usize, usize, usize)>,
}

impl CreateRel {
    /// `(src)-[alias:rel_type]->(dst)`.
    pub fn new(alias: &str, src: &str, dst: &str, rel_type: &str) -> Self {
        Self {
            alias: alias.to_string(),
            src_alias: src.to_string(),
            dst_alias: dst.to_string(),
            rel_type: rel_type.to_string(),
            properties: Vec::new(),
            rel: None,
            columns: None,
        }
    }

    /// Adds an initial property.
    pub fn with_property(mut self, field: &str, value: ArithExpr) -> Self {
        self.properties.push((field.to_string(), value));
        self
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.columns = Some((
            symbols.column(&self.src_alias, "CreateRel")?,
            symbols.column(&self.dst_alias, "CreateRel")?,
            symbols.column(&self.alias, "CreateRel")?,
        ));
        for (_, expr) in &mut self.properties {
            expr.realign_alias_id(symbols)?;
        }
        Ok(())
    }

    fn columns(&self) -> Result<(usize, usize, usize)> {
        self.columns
            .ok_or_else(|| ExecError::internal(format!("relationship '{}' was never aligned", self.alias)))
    }

    fn endpoints(&self, record: &Record) -> Result<(VertexId, VertexId)> {
        let (src, dst, _) = self.columns()?;
        let bound = |column: usize, alias: &str| {
            record.get(column)?.vid().ok_or_else(|| {
                ExecError::input(format!(
                    "relationship '{}' needs a bound vertex for '{alias}'",
                    self.alias
                ))
            })
        };
        Ok((bound(src, &self.src_alias)?, bound(dst, &self.dst_alias)?))
    }

    fn create(&self, ctx: &mut ExecContext<'_>, record: &mut Record) -> Result<()> {
        let (_, _, column) = self.columns()?;
        let (src, dst) = self.endpoints(record)?;
        let properties = evaluate_properties(&self.properties, ctx, record)?;
        let written = properties.len() as u64;
        let uid = ctx.txn.add_edge(src, dst, &self.rel_type, properties)?;
        ctx.stats.edges_created += 1;
        ctx.stats.properties_set += written;
        record.set(column, Entry::relationship(self.rel, Some(uid)))
    }

    fn text(&self) -> String {
        format!(
            "({})-[{}:{}{}]->({})",
            self.src_alias,
            self.alias,
            self.rel_type,
            properties_text(&self.properties),
            self.dst_alias
        )
    }
}

/// `Create`: creates the listed vertices, then the relationships, once per
/// input row (or once when there is no input).
#[derive(Clone, Debug, Default)]
pub struct Create {
    /// Vertices to create.
    pub nodes: Vec<CreateNode>,
    /// Relationships to create; their endpoints may be vertices created here.
    pub rels: Vec<CreateRel>,
    emitted: bool,
}

impl Create {
    /// Creation of `nodes` and `rels`.
    pub fn new(nodes: Vec<CreateNode>, rels: Vec<CreateRel>) -> Self {
        Self {
            nodes,
            rels,
            emitted: false,
        }
    }
}

impl Operator for Create {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        ensure_writable(ctx, "CREATE")?;
        self.emitted = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if inputs.is_empty() {
            if self.emitted {
                return Ok(OpResult::Depleted);
            }
            self.emitted = true;
        } else if !pull_into(only_input(inputs, "Create")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        for node in &self.nodes {
            node.create(ctx, record)?;
        }
        for rel in &self.rels {
            rel.create(ctx, record)?;
        }
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        for node in &mut self.nodes {
            node.realign(symbols)?;
        }
        for rel in &mut self.rels {
            rel.realign(symbols)?;
        }
        Ok(())
    }

    fn details(&self) -> String {
        self.nodes
            .iter()
            .map(CreateNode::text)
            .chain(self.rels.iter().map(CreateRel::text))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.nodes
            .iter()
            .flat_map(|node| node.properties.iter().map(|(_, expr)| expr))
            .chain(self.rels.iter().flat_map(|rel| rel.properties.iter().map(|(_, expr)| expr)))
            .collect()
    }

    fn mutates(&self) -> bool {
        true
    }
}

/// How a `SET` item writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SetMode {
    /// `=`: a property is overwritten; a map replaces every property.
    Assign,
    /// `+=`: a map is merged into the existing properties.
    Add,
}

/// One `SET` item.
#[derive(Clone, Debug)]
pub struct SetItem {
    /// Vertex or relationship variable.
    pub alias: String,
    /// Written property; `None` when `expr` is a whole property map.
    pub property: Option<String>,
    /// Assignment or merge.
    pub mode: SetMode,
    /// Written value.
    pub expr: ArithExpr,
    column: Option<usize>,
}

impl SetItem {
    /// `alias.property = expr`.
    pub fn property(alias: &str, property: &str, expr: ArithExpr) -> Self {
        Self {
            alias: alias.to_string(),
            property: Some(property.to_string()),
            mode: SetMode::Assign,
            expr,
            column: None,
        }
    }

    /// `alias = expr` or `alias += expr` with a map value.
    pub fn map(alias: &str, mode: SetMode, expr: ArithExpr) -> Self {
        Self {
            alias: alias.to_string(),
            property: None,
            mode,
            expr,
            column: None,
        }
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "SET")?);
        self.expr.realign_alias_id(symbols)
    }

    fn text(&self) -> String {
        let op = match self.mode {
            SetMode::Assign => "=",
            SetMode::Add => "+=",
        };
        match &self.property {
            Some(property) => format!("{}.{property} {op} {}", self.alias, self.expr),
            None => format!("{} {op} {}", self.alias, self.expr),
        }
    }
}

/// Vertex or edge addressed by a write.
#[derive(Copy, Clone, Debug)]
enum Target {
    Vertex(VertexId),
    Edge(EdgeId),
}

impl Target {
    fn of(entry: &Entry, alias: &str, op: &str) -> Result<Option<Target>> {
        if entry.equal_null() {
            return Ok(None);
        }
        match entry {
            Entry::Node(node) => Ok(Some(Target::Vertex(node.vid))),
            Entry::Relationship(rel) => Ok(rel.edge.map(|edge| Target::Edge(edge.id))),
            other => Err(ExecError::type_mismatch(format!(
                "{op} on '{alias}' expects a node or relationship, got {}",
                other.kind_name()
            ))),
        }
    }

    fn fields(self, txn: &dyn GraphTxn) -> Result<Properties> {
        match self {
            Target::Vertex(vid) => txn.vertex_fields(vid),
            Target::Edge(eid) => txn.edge_fields(eid),
        }
    }

    fn write(self, txn: &mut dyn GraphTxn, field: &str, value: FieldData) -> Result<()> {
        match self {
            Target::Vertex(vid) => txn.set_vertex_property(vid, field, value),
            Target::Edge(eid) => txn.set_edge_property(eid, field, value),
        }
    }
}

/// Evaluates every item against `record`, then applies the writes.
fn apply_set_items(items: &[SetItem], ctx: &mut ExecContext<'_>, record: &Record) -> Result<()> {
    let mut writes: Vec<(Target, String, FieldData)> = Vec::new();
    for item in items {
        let column = aligned(item.column, &item.alias)?;
        let Some(target) = Target::of(record.get(column)?, &item.alias, "SET")? else {
            continue;
        };
        let value = item.expr.evaluate(ctx, record)?;
        match &item.property {
            Some(field) => writes.push((target, field.clone(), property_value(value, field)?)),
            None => {
                let map = match value {
                    Entry::Constant(FieldData::Map(map)) => map,
                    Entry::Node(node) if node.vid.is_valid() => ctx.txn().vertex_fields(node.vid)?,
                    Entry::Relationship(rel) => match rel.edge {
                        Some(edge) => ctx.txn().edge_fields(edge.id)?,
                        None => Properties::new(),
                    },
                    other if other.equal_null() => Properties::new(),
                    other => {
                        return Err(ExecError::type_mismatch(format!(
                            "SET {} expects a map, got {}",
                            item.alias,
                            other.kind_name()
                        )))
                    }
                };
                if item.mode == SetMode::Assign {
                    for field in target.fields(ctx.txn())?.into_keys() {
                        if !map.contains_key(&field) {
                            writes.push((target, field, FieldData::Null));
                        }
                    }
                }
                writes.extend(map.into_iter().map(|(field, value)| (target, field, value)));
            }
        }
    }
    if writes.is_empty() {
        return Ok(());
    }
    ctx.stats.properties_set += writes.len() as u64;
    for (target, field, value) in writes {
        target.write(&mut *ctx.txn, &field, value)?;
    }
    ctx.txn.refresh_iterators();
    Ok(())
}

fn set_items_text(items: &[SetItem]) -> String {
    items.iter().map(SetItem::text).collect::<Vec<_>>().join(", ")
}

/// `Set`: applies property writes to every input row.
#[derive(Clone, Debug)]
pub struct SetOp {
    /// Items applied in order.
    pub items: Vec<SetItem>,
}

impl SetOp {
    /// `SET items`.
    pub fn new(items: Vec<SetItem>) -> Self {
        Self { items }
    }
}

impl Operator for SetOp {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        ensure_writable(ctx, "SET")
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !pull_into(only_input(inputs, "Set")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        apply_set_items(&self.items, ctx, record)?;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.items.iter_mut().try_for_each(|item| item.realign(symbols))
    }

    fn details(&self) -> String {
        set_items_text(&self.items)
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.items.iter().map(|item| &item.expr).collect()
    }

    fn mutates(&self) -> bool {
        true
    }
}

/// Pattern `MERGE` looks up before creating.
#[derive(Clone, Debug)]
pub enum MergeTarget {
    /// `MERGE (n:L {..})`: a vertex with the label and every listed property.
    Node(CreateNode),
    /// `MERGE (a)-[r:T {..}]->(b)` between two bound vertices.
    Relationship(CreateRel),
}

/// `Merge`: binds every existing match of the pattern, applying the
/// `ON MATCH` items; when nothing matches, creates the pattern and applies
/// the `ON CREATE` items. Runs once per input row, or once without input.
#[derive(Clone, Debug)]
pub struct Merge {
    /// Pattern to match or create.
    pub target: MergeTarget,
    /// Items applied to a created pattern.
    pub on_create: Vec<SetItem>,
    /// Items applied to each matched pattern.
    pub on_match: Vec<SetItem>,
    matches: Vec<Entry>,
    next: usize,
    emitted: bool,
}

impl Merge {
    /// Merge of `target` without `ON` items.
    pub fn new(target: MergeTarget) -> Self {
        Self {
            target,
            on_create: Vec::new(),
            on_match: Vec::new(),
            matches: Vec::new(),
            next: 0,
            emitted: false,
        }
    }

    /// `ON CREATE SET items`.
    pub fn on_create(mut self, items: Vec<SetItem>) -> Self {
        self.on_create = items;
        self
    }

    /// `ON MATCH SET items`.
    pub fn on_match(mut self, items: Vec<SetItem>) -> Self {
        self.on_match = items;
        self
    }

    fn find(&self, ctx: &ExecContext<'_>, record: &Record) -> Result<Vec<Entry>> {
        let txn = ctx.txn();
        match &self.target {
            MergeTarget::Node(node) => {
                let wanted = evaluate_properties(&node.properties, ctx, record)?;
                let candidates = match wanted.iter().next() {
                    Some((field, value)) if txn.is_indexed(&node.label, field) => {
                        txn.index_seek(&node.label, field, value)?
                    }
                    _ => txn.scan_vertices(Some(&node.label))?,
                };
                let mut out = Vec::new();
                for vid in candidates {
                    if matches_all(&wanted, |field| txn.vertex_field(vid, field))? {
                        out.push(Entry::node(node.node, vid));
                    }
                }
                Ok(out)
            }
            MergeTarget::Relationship(rel) => {
                let wanted = evaluate_properties(&rel.properties, ctx, record)?;
                let (src, dst) = rel.endpoints(record)?;
                let mut out = Vec::new();
                for edge in txn.edges(src, Direction::Out, std::slice::from_ref(&rel.rel_type))? {
                    if edge.uid.dst != dst {
                        continue;
                    }
                    if matches_all(&wanted, |field| txn.edge_field(edge.uid.id, field))? {
                        out.push(Entry::relationship(rel.rel, Some(edge.uid)));
                    }
                }
                Ok(out)
            }
        }
    }

    fn column(&self) -> Result<usize> {
        match &self.target {
            MergeTarget::Node(node) => aligned(node.column, &node.alias),
            MergeTarget::Relationship(rel) => Ok(rel.columns()?.2),
        }
    }
}

fn matches_all(
    wanted: &Properties,
    mut read: impl FnMut(&str) -> Result<FieldData>,
) -> Result<bool> {
    for (field, value) in wanted {
        if !read(field)?.loose_eq(value) {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Operator for Merge {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        ensure_writable(ctx, "MERGE")?;
        self.matches.clear();
        self.next = 0;
        self.emitted = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let column = self.column()?;
        if let Some(entry) = self.matches.get(self.next) {
            record.set(column, entry.clone())?;
            self.next += 1;
            apply_set_items(&self.on_match, ctx, record)?;
            return Ok(OpResult::Ok);
        }
        if inputs.is_empty() {
            if self.emitted {
                return Ok(OpResult::Depleted);
            }
            self.emitted = true;
        } else if !pull_into(only_input(inputs, "Merge")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        self.matches = self.find(ctx, record)?;
        self.next = 0;
        if let Some(entry) = self.matches.first() {
            record.set(column, entry.clone())?;
            self.next = 1;
            apply_set_items(&self.on_match, ctx, record)?;
            return Ok(OpResult::Ok);
        }
        match &self.target {
            MergeTarget::Node(node) => {
                node.create(ctx, record)?;
            }
            MergeTarget::Relationship(rel) => rel.create(ctx, record)?,
        }
        apply_set_items(&self.on_create, ctx, record)?;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.matches.clear();
        self.next = 0;
        self.emitted = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        match &mut self.target {
            MergeTarget::Node(node) => node.realign(symbols)?,
            MergeTarget::Relationship(rel) => rel.realign(symbols)?,
        }
        for item in self.on_create.iter_mut().chain(self.on_match.iter_mut()) {
            item.realign(symbols)?;
        }
        Ok(())
    }

    fn details(&self) -> String {
        let mut out = match &self.target {
            MergeTarget::Node(node) => node.text(),
            MergeTarget::Relationship(rel) => rel.text(),
        };
        if !self.on_create.is_empty() {
            out.push_str(&format!(" ON CREATE SET {}", set_items_text(&self.on_create)));
        }
        if !self.on_match.is_empty() {
            out.push_str(&format!(" ON MATCH SET {}", set_items_text(&self.on_match)));
        }
        out
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        let properties = match &self.target {
            MergeTarget::Node(node) => &node.properties,
            MergeTarget::Relationship(rel) => &rel.properties,
        };
        properties
            .iter()
            .map(|(_, expr)| expr)
            .chain(self.on_create.iter().map(|item| &item.expr))
            .chain(self.on_match.iter().map(|item| &item.expr))
            .collect()
    }

    fn mutates(&self) -> bool {
        true
    }
}

/// `Delete` / `DETACH DELETE`.
///
/// Rows pass through unchanged while the entities they bind are collected.
/// The first pull drains the input, applies the batch (edges first, then
/// vertices) and then replays the buffered rows, so a parent that stops
/// early still sees every matched entity deleted. Without `detach`, a vertex that still has relationships
/// outside the batch fails the statement before anything is deleted.
#[derive(Clone, Debug)]
pub struct Delete {
    /// Deleted variables.
    pub aliases: Vec<String>,
    /// Also delete incident relationships.
    pub detach: bool,
    columns: Vec<usize>,
    vertices: Vec<VertexId>,
    edges: Vec<EdgeId>,
    seen_vertices: FxHashSet<VertexId>,
    seen_edges: FxHashSet<EdgeId>,
    replay: VecDeque<Record>,
    applied: bool,
}

impl Delete {
    /// Deletion of `aliases`.
    pub fn new(aliases: Vec<String>, detach: bool) -> Self {
        Self {
            aliases,
            detach,
            columns: Vec::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            seen_vertices: FxHashSet::default(),
            seen_edges: FxHashSet::default(),
            replay: VecDeque::new(),
            applied: false,
        }
    }

    fn collect(&mut self, record: &Record) -> Result<()> {
        for (alias, &column) in self.aliases.iter().zip(&self.columns) {
            let entry = record.get(column)?;
            if entry.equal_null() {
                continue;
            }
            match entry {
                Entry::Node(node) => {
                    if self.seen_vertices.insert(node.vid) {
                        self.vertices.push(node.vid);
                    }
                }
                Entry::Relationship(rel) => {
                    if let Some(edge) = rel.edge {
                        if self.seen_edges.insert(edge.id) {
                            self.edges.push(edge.id);
                        }
                    }
                }
                Entry::VarLenRelationship(rel) => {
                    for edge in rel.path.edges() {
                        if self.seen_edges.insert(edge.id) {
                            self.edges.push(edge.id);
                        }
                    }
                }
                other => {
                    return Err(ExecError::type_mismatch(format!(
                        "DELETE on '{alias}' expects a node or relationship, got {}",
                        other.kind_name()
                    )))
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        if self.vertices.is_empty() && self.edges.is_empty() {
            return Ok(());
        }
        if !self.detach {
            for &vid in &self.vertices {
                if !ctx.txn().vertex_exists(vid) {
                    continue;
                }
                let attached = ctx
                    .txn()
                    .edges(vid, Direction::Both, &[])?
                    .into_iter()
                    .any(|edge| !self.seen_edges.contains(&edge.uid.id));
                if attached {
                    return Err(ExecError::input(format!(
                        "cannot delete vertex {vid} while it has relationships; use DETACH DELETE"
                    )));
                }
            }
        }
        let (mut vertices, mut edges) = (0u64, 0u64);
        for &eid in &self.edges {
            if ctx.txn().edge_exists(eid) {
                ctx.txn.delete_edge(eid)?;
                edges += 1;
            }
        }
        for &vid in &self.vertices {
            if ctx.txn().vertex_exists(vid) {
                edges += ctx.txn.delete_vertex(vid)? as u64;
                vertices += 1;
            }
        }
        ctx.txn.refresh_iterators();
        ctx.stats.vertices_deleted += vertices;
        ctx.stats.edges_deleted += edges;
        debug!(vertices, edges, "delete batch applied");
        self.clear_batch();
        Ok(())
    }

    fn clear_batch(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.seen_vertices.clear();
        self.seen_edges.clear();
    }

    fn clear(&mut self) {
        self.clear_batch();
        self.replay.clear();
        self.applied = false;
    }
}

impl Operator for Delete {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        ensure_writable(ctx, "DELETE")?;
        self.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !self.applied {
            let input = only_input(inputs, "Delete")?;
            while pull_into(input, record, ctx)? {
                self.collect(record)?;
                self.replay.push_back(record.clone());
            }
            self.flush(ctx)?;
            self.applied = true;
        }
        match self.replay.pop_front() {
            Some(row) => {
                *record = row;
                Ok(OpResult::Ok)
            }
            None => Ok(OpResult::Depleted),
        }
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.columns = self
            .aliases
            .iter()
            .map(|alias| symbols.column(alias, "DELETE"))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn details(&self) -> String {
        let kind = if self.detach { "DETACH " } else { "" };
        format!("{kind}{}", self.aliases.join(", "))
    }

    fn mutates(&self) -> bool {
        true
    }
}

/// One `REMOVE alias.property` item.
#[derive(Clone, Debug)]
pub struct RemoveItem {
    /// Vertex or relationship variable.
    pub alias: String,
    /// Removed property.
    pub property: String,
    column: Option<usize>,
}

impl RemoveItem {
    /// `REMOVE alias.property`.
    pub fn new(alias: &str, property: &str) -> Self {
        Self {
            alias: alias.to_string(),
            property: property.to_string(),
            column: None,
        }
    }
}

/// `Remove`: drops properties from the entities of every input row. Only
/// properties actually present are counted.
#[derive(Clone, Debug)]
pub struct Remove {
    /// Items applied in order.
    pub items: Vec<RemoveItem>,
}

impl Remove {
    /// `REMOVE items`.
    pub fn new(items: Vec<RemoveItem>) -> Self {
        Self { items }
    }
}

impl Operator for Remove {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        ensure_writable(ctx, "REMOVE")
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !pull_into(only_input(inputs, "Remove")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        let mut removed = 0u64;
        for item in &self.items {
            let column = aligned(item.column, &item.alias)?;
            let Some(target) = Target::of(record.get(column)?, &item.alias, "REMOVE")? else {
                continue;
            };
            if !target.fields(ctx.txn())?.contains_key(&item.property) {
                continue;
            }
            target.write(&mut *ctx.txn, &item.property, FieldData::Null)?;
            removed += 1;
        }
        if removed > 0 {
            ctx.stats.properties_set += removed;
            ctx.txn.refresh_iterators();
        }
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        for item in &mut self.items {
            item.column = Some(symbols.column(&item.alias, "REMOVE")?);
        }
        Ok(())
    }

    fn details(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{}.{}", item.alias, item.property))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn mutates(&self) -> bool {
        true
    }
}
