//! Variable-length expansion as an explicit depth-first search.
//!
//! The search keeps one edge cursor per hop. Pushing an edge appends it to
//! the current path, re-checks the path predicates and, when they still
//! hold, opens a cursor one level deeper. Paths are emitted in pre-order:
//! a path of length `k` comes out before any of its extensions.

use std::fmt;

use super::expand::relationship_text;
use super::scan::aligned;
use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::functions::{
    is_ascending, is_descending, max_in_list, min_in_list, PATH_FIELD,
};
use crate::query::expr::ArithExpr;
use crate::query::filter::{compare_values, CompareOp, Filter};
use crate::query::pattern_graph::{PatternNodeId, PatternRelId};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Path, Record, VarLenEntry};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;
use crate::storage::EdgeCursor;
use crate::types::{Direction, VertexId};

/// Path function a [`PathPredicate`] applies to the edge values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathPredicateKind {
    /// `head(r)`
    Head,
    /// `last(r)`
    Last,
    /// `isAsc(r)`
    IsAsc,
    /// `isDesc(r)`
    IsDesc,
    /// `maxInList(r)`
    MaxInList,
    /// `minInList(r)`
    MinInList,
}

impl PathPredicateKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "head" => PathPredicateKind::Head,
            "last" => PathPredicateKind::Last,
            "isasc" => PathPredicateKind::IsAsc,
            "isdesc" => PathPredicateKind::IsDesc,
            "maxinlist" => PathPredicateKind::MaxInList,
            "mininlist" => PathPredicateKind::MinInList,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            PathPredicateKind::Head => "head",
            PathPredicateKind::Last => "last",
            PathPredicateKind::IsAsc => "isAsc",
            PathPredicateKind::IsDesc => "isDesc",
            PathPredicateKind::MaxInList => "maxInList",
            PathPredicateKind::MinInList => "minInList",
        }
    }
}

/// `fn(path) op constant` over the [`PATH_FIELD`] values of the path's
/// edges, checked every time the search extends the path.
#[derive(Clone, Debug, PartialEq)]
pub struct PathPredicate {
    /// Path function.
    pub kind: PathPredicateKind,
    /// Comparison against `operand`.
    pub op: CompareOp,
    /// Constant right-hand side.
    pub operand: FieldData,
}

impl PathPredicate {
    /// Whether the values of a path satisfy the predicate. An empty path
    /// always does.
    pub fn holds(&self, values: &[FieldData]) -> bool {
        if values.is_empty() {
            return true;
        }
        let subject = match self.kind {
            PathPredicateKind::Head => values.first().cloned(),
            PathPredicateKind::Last => values.last().cloned(),
            PathPredicateKind::IsAsc => Some(FieldData::Bool(is_ascending(values))),
            PathPredicateKind::IsDesc => Some(FieldData::Bool(is_descending(values))),
            PathPredicateKind::MaxInList => max_in_list(values).cloned(),
            PathPredicateKind::MinInList => min_in_list(values).cloned(),
        };
        subject.is_some_and(|subject| compare_values(self.op, &subject, &self.operand))
    }

    /// Recognizes `fn(rel) op constant`, `constant op fn(rel)` and bare
    /// `isAsc(rel)` / `isDesc(rel)`. Anything else is not a path predicate.
    pub fn try_from_filter(filter: &Filter, rel_alias: &str) -> Option<Self> {
        match filter {
            Filter::Range { op, lhs, rhs } => {
                if let (Some(kind), Some(value)) = (path_function(lhs, rel_alias), rhs.as_constant()) {
                    return Some(Self { kind, op: *op, operand: value.clone() });
                }
                let (kind, value) = (path_function(rhs, rel_alias)?, lhs.as_constant()?);
                Some(Self { kind, op: op.flipped(), operand: value.clone() })
            }
            Filter::Expr(expr) => match path_function(expr, rel_alias)? {
                kind @ (PathPredicateKind::IsAsc | PathPredicateKind::IsDesc) => Some(Self {
                    kind,
                    op: CompareOp::Eq,
                    operand: FieldData::Bool(true),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

fn path_function(expr: &ArithExpr, rel_alias: &str) -> Option<PathPredicateKind> {
    let call = expr.as_func()?;
    match call.args.as_slice() {
        [arg] if arg.as_variable() == Some((rel_alias, None)) => PathPredicateKind::from_name(&call.name),
        _ => None,
    }
}

impl fmt::Display for PathPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(path) {} {}", self.kind.name(), self.op, self.operand)
    }
}

#[derive(Clone, Debug)]
struct Frame {
    cursor: EdgeCursor,
    started: bool,
}

/// `VarLenExpand` / `VarLenExpandInto`: every path of `min_hop..=max_hop`
/// edges from the bound start vertex.
#[derive(Clone, Debug)]
pub struct VarLenExpand {
    /// Bound start variable.
    pub src_alias: String,
    /// Path variable.
    pub rel_alias: String,
    /// End-vertex variable.
    pub dst_alias: String,
    /// Direction walked at every hop.
    pub direction: Direction,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// Label required on the end vertex of an emitted path.
    pub neighbor_label: Option<String>,
    /// Shortest emitted path.
    pub min_hop: u32,
    /// Longest explored path.
    pub max_hop: u32,
    /// Pruning predicates, checked on every push.
    pub predicates: Vec<PathPredicate>,
    /// Pattern relationship the variable belongs to.
    pub rel: Option<PatternRelId>,
    /// Pattern node of the end vertex.
    pub dst_node: Option<PatternNodeId>,
    /// Query part used for path-uniqueness bookkeeping.
    pub part: u32,
    /// Refuse edges already on the current path.
    pub path_unique: bool,
    /// The end vertex is already bound.
    pub into: bool,
    src: Option<usize>,
    rel_column: Option<usize>,
    dst: Option<usize>,
    frames: Vec<Frame>,
    path: Path,
    values: Vec<FieldData>,
    active: bool,
    emit_start: bool,
    pending_pop: bool,
}

impl VarLenExpand {
    /// `(src)-[rel*min..max]->(dst)`.
    pub fn new(src: &str, rel: &str, dst: &str, direction: Direction, min_hop: u32, max_hop: u32) -> Self {
        Self {
            src_alias: src.to_string(),
            rel_alias: rel.to_string(),
            dst_alias: dst.to_string(),
            direction,
            types: Vec::new(),
            neighbor_label: None,
            min_hop,
            max_hop,
            predicates: Vec::new(),
            rel: None,
            dst_node: None,
            part: 0,
            path_unique: true,
            into: false,
            src: None,
            rel_column: None,
            dst: None,
            frames: Vec::new(),
            path: Path::new(),
            values: Vec::new(),
            active: false,
            emit_start: false,
            pending_pop: false,
        }
    }

    /// Restricts relationship types.
    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    /// Requires a label on the end vertex.
    pub fn with_neighbor_label(mut self, label: Option<String>) -> Self {
        self.neighbor_label = label;
        self
    }

    /// Adds a pruning predicate.
    pub fn with_predicate(mut self, predicate: PathPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn begin(&mut self, start: VertexId, ctx: &mut ExecContext<'_>) -> Result<()> {
        self.release_path(ctx);
        self.path.set_start(start);
        self.frames.clear();
        if self.max_hop > 0 {
            self.frames.push(Frame {
                cursor: EdgeCursor::open(ctx.txn(), start, self.direction, &self.types)?,
                started: false,
            });
        }
        self.emit_start = self.min_hop == 0;
        self.pending_pop = false;
        Ok(())
    }

    fn pop_edge(&mut self, ctx: &mut ExecContext<'_>) {
        if let Some(edge) = self.path.pop_back() {
            if self.path_unique {
                ctx.visited.remove(self.part, edge.id);
            }
            if !self.predicates.is_empty() {
                self.values.pop();
            }
        }
    }

    fn release_path(&mut self, ctx: &mut ExecContext<'_>) {
        while !self.path.is_empty() {
            self.pop_edge(ctx);
        }
        self.path.clear();
        self.values.clear();
    }

    /// Binds the current path and its end vertex when the end qualifies.
    fn emit(&self, end: VertexId, record: &mut Record, ctx: &ExecContext<'_>) -> Result<bool> {
        let rel = aligned(self.rel_column, &self.rel_alias)?;
        let dst = aligned(self.dst, &self.dst_alias)?;
        if let Some(label) = &self.neighbor_label {
            if &ctx.txn().vertex_label(end)? != label {
                return Ok(false);
            }
        }
        if self.into {
            if record.get(dst)?.vid() != Some(end) {
                return Ok(false);
            }
        } else {
            record.set(dst, Entry::node(self.dst_node, end))?;
        }
        record.set(
            rel,
            Entry::VarLenRelationship(VarLenEntry {
                rel: self.rel,
                path: self.path.clone(),
            }),
        )?;
        Ok(true)
    }

    fn step(
        &mut self,
        input: &mut PhysicalNode,
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let src = aligned(self.src, &self.src_alias)?;
        loop {
            if !self.active {
                if !pull_into(input, record, ctx)? {
                    return Ok(OpResult::Depleted);
                }
                let Some(start) = record.get(src)?.vid() else {
                    continue;
                };
                self.begin(start, ctx)?;
                self.active = true;
            }
            if self.pending_pop {
                self.pending_pop = false;
                self.pop_edge(ctx);
            }
            if self.emit_start {
                self.emit_start = false;
                if self.emit(self.path.start(), record, ctx)? {
                    return Ok(OpResult::Ok);
                }
            }
            let txn = ctx.txn();
            let Some(frame) = self.frames.last_mut() else {
                self.active = false;
                continue;
            };
            if frame.started {
                frame.cursor.advance(txn);
            } else {
                frame.cursor.skip_deleted(txn);
                frame.started = true;
            }
            let Some(edge) = frame.cursor.current().cloned() else {
                self.frames.pop();
                self.pop_edge(ctx);
                continue;
            };
            if self.path_unique && ctx.visited.contains(self.part, edge.uid.id) {
                continue;
            }
            let end = edge.uid.other_end(self.path.end());
            self.path.append(edge.uid);
            if self.path_unique {
                ctx.visited.insert(self.part, edge.uid.id);
            }
            if !self.predicates.is_empty() {
                self.values.push(ctx.txn().edge_field(edge.uid.id, PATH_FIELD)?);
                if !self.predicates.iter().all(|p| p.holds(&self.values)) {
                    self.pop_edge(ctx);
                    continue;
                }
            }
            let depth = self.path.len() as u32;
            let at_max = depth >= self.max_hop;
            if !at_max {
                self.frames.push(Frame {
                    cursor: EdgeCursor::open(ctx.txn(), end, self.direction, &self.types)?,
                    started: false,
                });
            }
            let emitted = depth >= self.min_hop && self.emit(end, record, ctx)?;
            if at_max {
                if emitted {
                    self.pending_pop = true;
                } else {
                    self.pop_edge(ctx);
                }
            }
            if emitted {
                return Ok(OpResult::Ok);
            }
        }
    }
}

impl Operator for VarLenExpand {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        if self.min_hop > self.max_hop {
            return Err(ExecError::argument(
                "VarLenExpand",
                format!("min hop {} exceeds max hop {}", self.min_hop, self.max_hop),
            ));
        }
        if self.max_hop == u32::MAX && !self.path_unique {
            return Err(ExecError::argument(
                "VarLenExpand",
                "an unbounded expansion needs path uniqueness",
            ));
        }
        self.active = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let input = only_input(inputs, "VarLenExpand")?;
        let start = profile_timer();
        let result = self.step(input, record, ctx);
        record_profile_timer(QueryProfileKind::VarLenExpand, start);
        result
    }

    fn reset(&mut self, _complete: bool, ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        if let Some(ctx) = ctx {
            self.release_path(ctx);
        }
        self.frames.clear();
        self.active = false;
        self.emit_start = false;
        self.pending_pop = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.src = Some(symbols.column(&self.src_alias, "VarLenExpand")?);
        self.rel_column = Some(symbols.column(&self.rel_alias, "VarLenExpand")?);
        self.dst = Some(symbols.column(&self.dst_alias, "VarLenExpand")?);
        Ok(())
    }

    fn details(&self) -> String {
        let mut out = format!(
            "({}){}({}{})",
            self.src_alias,
            relationship_text(
                &self.rel_alias,
                &self.types,
                self.direction,
                Some((self.min_hop, self.max_hop))
            ),
            self.dst_alias,
            self.neighbor_label
                .as_deref()
                .map(|l| format!(":{l}"))
                .unwrap_or_default(),
        );
        for predicate in &self.predicates {
            out.push_str(&format!(" prune {predicate}"));
        }
        out
    }
}
