//! Leaf scans and seeks.

use tracing::debug;

use super::{only_input, pull_into, unbind_node, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::pattern_graph::PatternNodeId;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;
use crate::storage::{GraphTxn, VertexCursor};
use crate::types::VertexId;

/// `AllNodeScan` / `NodeByLabelScan`.
///
/// With an input, the scan restarts for every input row and emits the
/// row extended with each vertex.
#[derive(Clone, Debug)]
pub struct NodeScan {
    /// Bound variable.
    pub alias: String,
    /// Required label, `None` for every vertex.
    pub label: Option<String>,
    /// Pattern node the variable belongs to.
    pub node: Option<PatternNodeId>,
    column: Option<usize>,
    cursor: VertexCursor,
    needs_input: bool,
}

impl NodeScan {
    /// Scan over every vertex.
    pub fn all(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            label: None,
            node: None,
            column: None,
            cursor: VertexCursor::default(),
            needs_input: true,
        }
    }

    /// Scan over the vertices of `label`.
    pub fn by_label(alias: &str, label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Self::all(alias)
        }
    }

    /// Associates the scan with a pattern node.
    pub fn with_node(mut self, node: PatternNodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Output column of the bound variable.
    pub fn column(&self) -> Option<usize> {
        self.column
    }
}

impl Operator for NodeScan {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.cursor = VertexCursor::new(ctx.txn().scan_vertices(self.label.as_deref())?);
        self.needs_input = true;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let column = aligned(self.column, &self.alias)?;
        let start = profile_timer();
        let result = loop {
            if self.needs_input && !inputs.is_empty() {
                if !pull_into(only_input(inputs, "NodeScan")?, record, ctx)? {
                    break OpResult::Depleted;
                }
                self.cursor.reset();
            }
            self.needs_input = false;
            unbind_node(record, column)?;
            if let Some(vid) = self.cursor.next(ctx.txn()) {
                record.set(column, Entry::node(self.node, vid))?;
                break OpResult::Ok;
            }
            if inputs.is_empty() {
                break OpResult::Depleted;
            }
            self.needs_input = true;
        };
        record_profile_timer(QueryProfileKind::Scan, start);
        Ok(result)
    }

    fn reset(&mut self, complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        if complete {
            self.cursor = VertexCursor::default();
        } else {
            self.cursor.reset();
        }
        self.needs_input = true;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "NodeScan")?);
        Ok(())
    }

    fn details(&self) -> String {
        match &self.label {
            Some(label) => format!("({}:{label})", self.alias),
            None => format!("({})", self.alias),
        }
    }
}

/// Shared pull loop of the seek operators: (re)fills a vertex cursor from
/// the current row, then binds each id in turn.
#[derive(Clone, Debug, Default)]
struct SeekState {
    cursor: VertexCursor,
    filled: bool,
}

impl SeekState {
    fn consume(
        &mut self,
        column: usize,
        node: Option<PatternNodeId>,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
        mut fill: impl FnMut(&ExecContext<'_>, &Record) -> Result<Vec<VertexId>>,
    ) -> Result<OpResult> {
        loop {
            if !self.filled {
                if !inputs.is_empty() && !pull_into(only_input(inputs, "seek")?, record, ctx)? {
                    return Ok(OpResult::Depleted);
                }
                self.cursor = VertexCursor::new(fill(ctx, record)?);
                self.filled = true;
            }
            unbind_node(record, column)?;
            if let Some(vid) = self.cursor.next(ctx.txn()) {
                record.set(column, Entry::node(node, vid))?;
                return Ok(OpResult::Ok);
            }
            if inputs.is_empty() {
                return Ok(OpResult::Depleted);
            }
            self.filled = false;
        }
    }

    fn reset(&mut self) {
        self.cursor = VertexCursor::default();
        self.filled = false;
    }
}

/// `NodeIndexSeek`: vertices of `label` whose `field` equals `value`.
///
/// A list value seeks every element. When the field has no index the seek
/// degrades to a filtered label scan. A value that reads other variables
/// makes the seek dynamic: it is re-evaluated for every input row.
#[derive(Clone, Debug)]
pub struct IndexSeek {
    /// Bound variable.
    pub alias: String,
    /// Vertex label.
    pub label: String,
    /// Sought field.
    pub field: String,
    /// Sought value (or list of values).
    pub value: ArithExpr,
    /// Pattern node the variable belongs to.
    pub node: Option<PatternNodeId>,
    column: Option<usize>,
    weak: bool,
    state: SeekState,
}

impl IndexSeek {
    /// Seek on `label.field = value`.
    pub fn new(alias: &str, label: &str, field: &str, value: ArithExpr) -> Self {
        Self {
            alias: alias.to_string(),
            label: label.to_string(),
            field: field.to_string(),
            value,
            node: None,
            column: None,
            weak: false,
            state: SeekState::default(),
        }
    }

    /// Associates the seek with a pattern node.
    pub fn with_node(mut self, node: Option<PatternNodeId>) -> Self {
        self.node = node;
        self
    }

    /// True when the sought value depends on other variables of the row.
    pub fn is_dynamic(&self) -> bool {
        !self.value.aliases().is_empty()
    }

    fn lookup(&self, txn: &dyn GraphTxn, value: &FieldData, out: &mut Vec<VertexId>) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if !self.weak {
            out.extend(txn.index_seek(&self.label, &self.field, value)?);
            return Ok(());
        }
        for vid in txn.scan_vertices(Some(&self.label))? {
            if txn.vertex_field(vid, &self.field)?.loose_eq(value) {
                out.push(vid);
            }
        }
        Ok(())
    }
}

impl Operator for IndexSeek {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.weak = !ctx.txn().is_indexed(&self.label, &self.field);
        if self.weak {
            debug!(
                label = %self.label,
                field = %self.field,
                "no index for seek; falling back to label scan"
            );
        }
        self.state.reset();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let column = aligned(self.column, &self.alias)?;
        let start = profile_timer();
        let mut state = std::mem::take(&mut self.state);
        let this = &*self;
        let result = state.consume(column, this.node, inputs, record, ctx, |ctx, record| {
            let mut out = Vec::new();
            match this.value.evaluate(ctx, record)? {
                Entry::Constant(FieldData::Array(values)) => {
                    for value in &values {
                        this.lookup(ctx.txn(), value, &mut out)?;
                    }
                    let mut seen = rustc_hash::FxHashSet::default();
                    out.retain(|vid| seen.insert(*vid));
                }
                Entry::Constant(value) => this.lookup(ctx.txn(), &value, &mut out)?,
                other if other.equal_null() => {}
                other => {
                    return Err(ExecError::type_mismatch(format!(
                        "index seek on {}.{} expects a value, got {}",
                        this.label,
                        this.field,
                        other.kind_name()
                    )))
                }
            }
            Ok(out)
        });
        self.state = state;
        record_profile_timer(QueryProfileKind::Scan, start);
        result
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.state.reset();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "NodeIndexSeek")?);
        self.value.realign_alias_id(symbols)
    }

    fn details(&self) -> String {
        format!("({}:{} {{{}: {}}})", self.alias, self.label, self.field, self.value)
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        vec![&self.value]
    }
}

/// `NodeByIdSeek`: vertices located by id (or a list of ids).
#[derive(Clone, Debug)]
pub struct IdSeek {
    /// Bound variable.
    pub alias: String,
    /// Required label, if any.
    pub label: Option<String>,
    /// Id or list of ids.
    pub target: ArithExpr,
    /// Pattern node the variable belongs to.
    pub node: Option<PatternNodeId>,
    column: Option<usize>,
    state: SeekState,
}

impl IdSeek {
    /// Seek on `id(alias) = target`.
    pub fn new(alias: &str, label: Option<&str>, target: ArithExpr) -> Self {
        Self {
            alias: alias.to_string(),
            label: label.map(str::to_string),
            target,
            node: None,
            column: None,
            state: SeekState::default(),
        }
    }

    /// Associates the seek with a pattern node.
    pub fn with_node(mut self, node: Option<PatternNodeId>) -> Self {
        self.node = node;
        self
    }

    fn accept(&self, txn: &dyn GraphTxn, value: &FieldData, out: &mut Vec<VertexId>) -> Result<()> {
        let id = match value {
            FieldData::Null => return Ok(()),
            FieldData::Int(id) => *id,
            FieldData::Float(f) if f.fract() == 0.0 => *f as i64,
            other => {
                return Err(ExecError::type_mismatch(format!(
                    "vertex id must be an integer, got {}",
                    other.type_name()
                )))
            }
        };
        let vid = VertexId(id);
        if !txn.vertex_exists(vid) {
            return Ok(());
        }
        if let Some(label) = &self.label {
            if &txn.vertex_label(vid)? != label {
                return Ok(());
            }
        }
        out.push(vid);
        Ok(())
    }
}

impl Operator for IdSeek {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.state.reset();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let column = aligned(self.column, &self.alias)?;
        let start = profile_timer();
        let mut state = std::mem::take(&mut self.state);
        let this = &*self;
        let result = state.consume(column, this.node, inputs, record, ctx, |ctx, record| {
            let mut out = Vec::new();
            match this.target.evaluate(ctx, record)? {
                Entry::Constant(FieldData::Array(ids)) => {
                    for id in &ids {
                        this.accept(ctx.txn(), id, &mut out)?;
                    }
                }
                Entry::Constant(id) => this.accept(ctx.txn(), &id, &mut out)?,
                other if other.equal_null() => {}
                other => {
                    return Err(ExecError::type_mismatch(format!(
                        "vertex id must be an integer, got {}",
                        other.kind_name()
                    )))
                }
            }
            Ok(out)
        });
        self.state = state;
        record_profile_timer(QueryProfileKind::Scan, start);
        result
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.state.reset();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "NodeByIdSeek")?);
        self.target.realign_alias_id(symbols)
    }

    fn details(&self) -> String {
        match &self.label {
            Some(label) => format!("({}:{label}) id = {}", self.alias, self.target),
            None => format!("({}) id = {}", self.alias, self.target),
        }
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        vec![&self.target]
    }
}

pub(crate) fn aligned(column: Option<usize>, alias: &str) -> Result<usize> {
    column.ok_or_else(|| ExecError::internal(format!("variable '{alias}' was never aligned")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{drain, people, symbols};
    use super::super::PhysicalOp;
    use super::*;
    use crate::query::symbol_table::SymbolType;

    fn scan_node(op: PhysicalOp) -> Result<PhysicalNode> {
        let mut node = PhysicalNode::leaf(op);
        node.attach_symbols(&symbols(&[("n", SymbolType::Node)]))?;
        Ok(node)
    }

    #[test]
    fn label_scan_binds_each_vertex_then_stays_depleted() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let mut node = scan_node(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")))?;
        let rows = drain(&mut node, &mut ctx)?;
        assert_eq!(rows, vec!["V[0]", "V[1]", "V[2]"]);
        assert_eq!(node.consume(&mut ctx)?, OpResult::Depleted);
        assert_eq!(node.record.get(0)?.vid(), None);
        Ok(())
    }

    #[test]
    fn reset_rewinds_the_scan() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let mut node = scan_node(PhysicalOp::AllNodeScan(NodeScan::all("n")))?;
        assert_eq!(drain(&mut node, &mut ctx)?.len(), 5);
        node.reset(false)?;
        let mut again = 0;
        while node.consume(&mut ctx)? == OpResult::Ok {
            again += 1;
        }
        assert_eq!(again, 5);
        Ok(())
    }

    #[test]
    fn index_seek_uses_the_index_or_falls_back() -> Result<()> {
        let seek = IndexSeek::new("n", "Person", "age", ArithExpr::constant(FieldData::Array(vec![
            FieldData::Int(25),
            FieldData::Int(42),
            FieldData::Int(25),
        ])));
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let mut node = scan_node(PhysicalOp::NodeIndexSeek(seek.clone()))?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["V[1]", "V[2]"]);

        let mut indexed = people().with_index("Person", "age");
        let mut ctx = ExecContext::new(&mut indexed);
        let mut node = scan_node(PhysicalOp::NodeIndexSeek(seek))?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["V[1]", "V[2]"]);
        Ok(())
    }

    #[test]
    fn indexed_and_fallback_seeks_agree_on_numeric_equality() -> Result<()> {
        let build = || {
            let mut graph = crate::storage::MemoryGraph::new();
            graph.insert_vertex("N", [("v", FieldData::Int(42))]);
            graph.insert_vertex("N", [("v", FieldData::Float(42.0))]);
            graph.insert_vertex("N", [("v", FieldData::Float(42.5))]);
            graph.insert_vertex("N", [("v", FieldData::from("42"))]);
            graph
        };
        for sought in [FieldData::Int(42), FieldData::Float(42.0)] {
            let seek = IndexSeek::new("n", "N", "v", ArithExpr::constant(sought));
            let mut plain = build();
            let mut ctx = ExecContext::new(&mut plain);
            let mut node = scan_node(PhysicalOp::NodeIndexSeek(seek.clone()))?;
            let fallback = drain(&mut node, &mut ctx)?;

            let mut indexed = build().with_index("N", "v");
            let mut ctx = ExecContext::new(&mut indexed);
            let mut node = scan_node(PhysicalOp::NodeIndexSeek(seek))?;
            assert_eq!(drain(&mut node, &mut ctx)?, fallback);
            assert_eq!(fallback, vec!["V[0]", "V[1]"]);
        }
        Ok(())
    }

    #[test]
    fn id_seek_checks_existence_and_label() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let ids = ArithExpr::constant(FieldData::Array(vec![
            FieldData::Int(3),
            FieldData::Int(0),
            FieldData::Int(99),
        ]));
        let mut node = scan_node(PhysicalOp::NodeByIdSeek(IdSeek::new("n", Some("Person"), ids)))?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["V[0]"]);
        Ok(())
    }

    #[test]
    fn id_seek_rejects_non_integer_ids() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let mut node = scan_node(PhysicalOp::NodeByIdSeek(IdSeek::new(
            "n",
            None,
            ArithExpr::constant("zero"),
        )))?;
        node.initialize(&mut ctx)?;
        let err = node.consume(&mut ctx).unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");
        Ok(())
    }
}
