//! Single-hop expansion.

use super::scan::aligned;
use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::filter::Filter;
use crate::query::pattern_graph::{PatternNodeId, PatternRelId};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::storage::EdgeCursor;
use crate::types::{Direction, EdgeId};

/// `ExpandAll` / `ExpandInto`: walks the edges of the bound start vertex.
///
/// For every input row the start vertex's edges are visited in storage
/// order. An edge is emitted when it is not already on the current path
/// (with path uniqueness on), passes the pushed-down edge filter, and leads
/// to a neighbor carrying the required label. In `into` mode the neighbor
/// is already bound and the edge must end there.
#[derive(Clone, Debug)]
pub struct ExpandAll {
    /// Bound start variable.
    pub src_alias: String,
    /// Relationship variable.
    pub rel_alias: String,
    /// Neighbor variable.
    pub dst_alias: String,
    /// Direction walked from the start vertex.
    pub direction: Direction,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// Label required on the neighbor.
    pub neighbor_label: Option<String>,
    /// Predicate checked on the relationship before binding the neighbor.
    pub edge_filter: Option<Filter>,
    /// Pattern relationship the variable belongs to.
    pub rel: Option<PatternRelId>,
    /// Pattern node of the neighbor.
    pub dst_node: Option<PatternNodeId>,
    /// Query part used for path-uniqueness bookkeeping.
    pub part: u32,
    /// Refuse edges already on the current path.
    pub path_unique: bool,
    /// The neighbor is already bound.
    pub into: bool,
    src: Option<usize>,
    rel_column: Option<usize>,
    dst: Option<usize>,
    cursor: Option<EdgeCursor>,
    positioned: bool,
    marked: Option<EdgeId>,
}

impl ExpandAll {
    /// `(src)-[rel]->(dst)` in `direction`.
    pub fn new(src: &str, rel: &str, dst: &str, direction: Direction) -> Self {
        Self {
            src_alias: src.to_string(),
            rel_alias: rel.to_string(),
            dst_alias: dst.to_string(),
            direction,
            types: Vec::new(),
            neighbor_label: None,
            edge_filter: None,
            rel: None,
            dst_node: None,
            part: 0,
            path_unique: true,
            into: false,
            src: None,
            rel_column: None,
            dst: None,
            cursor: None,
            positioned: false,
            marked: None,
        }
    }

    /// Restricts relationship types.
    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    /// Requires a neighbor label.
    pub fn with_neighbor_label(mut self, label: Option<String>) -> Self {
        self.neighbor_label = label;
        self
    }

    /// Conjoins `filter` to the edge filter.
    pub fn push_edge_filter(&mut self, filter: Filter) {
        self.edge_filter = Some(match self.edge_filter.take() {
            Some(existing) => Filter::and(existing, filter),
            None => filter,
        });
    }

    fn release(&mut self, ctx: &mut ExecContext<'_>) {
        if let Some(eid) = self.marked.take() {
            ctx.visited.remove(self.part, eid);
        }
    }
}

impl Operator for ExpandAll {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.cursor = None;
        self.positioned = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let src = aligned(self.src, &self.src_alias)?;
        let rel = aligned(self.rel_column, &self.rel_alias)?;
        let dst = aligned(self.dst, &self.dst_alias)?;
        let input = only_input(inputs, "ExpandAll")?;
        let start = profile_timer();
        let result = loop {
            self.release(ctx);
            if self.positioned {
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.advance(ctx.txn());
                }
            }
            if !self.cursor.as_ref().is_some_and(EdgeCursor::is_valid) {
                if !pull_into(input, record, ctx)? {
                    break OpResult::Depleted;
                }
                let Some(vid) = record.get(src)?.vid() else {
                    self.cursor = None;
                    continue;
                };
                let mut cursor = EdgeCursor::open(ctx.txn(), vid, self.direction, &self.types)?;
                cursor.skip_deleted(ctx.txn());
                self.cursor = Some(cursor);
            }
            self.positioned = true;
            let Some(edge) = self.cursor.as_ref().and_then(EdgeCursor::current).cloned() else {
                continue;
            };
            if self.path_unique && ctx.visited.contains(self.part, edge.uid.id) {
                continue;
            }
            let Some(from) = record.get(src)?.vid() else {
                continue;
            };
            record.set(rel, Entry::relationship(self.rel, Some(edge.uid)))?;
            if let Some(filter) = self.edge_filter.as_mut() {
                if !filter.do_filter(ctx, record)? {
                    continue;
                }
            }
            let neighbor = edge.uid.other_end(from);
            if let Some(label) = &self.neighbor_label {
                if &ctx.txn().vertex_label(neighbor)? != label {
                    continue;
                }
            }
            if self.into {
                if record.get(dst)?.vid() != Some(neighbor) {
                    continue;
                }
            } else {
                record.set(dst, Entry::node(self.dst_node, neighbor))?;
            }
            if self.path_unique {
                ctx.visited.insert(self.part, edge.uid.id);
                self.marked = Some(edge.uid.id);
            }
            break OpResult::Ok;
        };
        record_profile_timer(QueryProfileKind::Expand, start);
        Ok(result)
    }

    fn reset(&mut self, _complete: bool, ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        if let Some(ctx) = ctx {
            self.release(ctx);
        }
        self.cursor = None;
        self.positioned = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.src = Some(symbols.column(&self.src_alias, "ExpandAll")?);
        self.rel_column = Some(symbols.column(&self.rel_alias, "ExpandAll")?);
        self.dst = Some(symbols.column(&self.dst_alias, "ExpandAll")?);
        if let Some(filter) = self.edge_filter.as_mut() {
            filter.realign_alias_id(symbols)?;
        }
        Ok(())
    }

    fn details(&self) -> String {
        let mut out = format!(
            "({}){}({}{})",
            self.src_alias,
            relationship_text(&self.rel_alias, &self.types, self.direction, None),
            self.dst_alias,
            self.neighbor_label
                .as_deref()
                .map(|l| format!(":{l}"))
                .unwrap_or_default(),
        );
        if let Some(filter) = &self.edge_filter {
            out.push_str(&format!(" edge filter {filter}"));
        }
        out
    }

    fn filters(&self) -> Vec<&Filter> {
        self.edge_filter.iter().collect()
    }

    fn filters_mut(&mut self) -> Vec<&mut Filter> {
        self.edge_filter.iter_mut().collect()
    }
}

/// `-[r:T1|T2*1..3]->` style rendering for explain output.
pub(crate) fn relationship_text(
    alias: &str,
    types: &[String],
    direction: Direction,
    hops: Option<(u32, u32)>,
) -> String {
    let mut inner = if alias.starts_with(crate::query::ANONYMOUS_PREFIX) {
        String::new()
    } else {
        alias.to_string()
    };
    if !types.is_empty() {
        inner.push(':');
        inner.push_str(&types.join("|"));
    }
    if let Some((min, max)) = hops {
        inner.push_str(&format!("*{min}..{max}"));
    }
    let (left, right) = match direction {
        Direction::Out => ("-", "->"),
        Direction::In => ("<-", "-"),
        Direction::Both => ("-", "-"),
    };
    format!("{left}[{inner}]{right}")
}
