//! Physical operators and the pull protocol that drives them.
//!
//! Every [`PhysicalNode`] owns its children and its output [`Record`]. A
//! parent pulls with [`PhysicalNode::consume`] and copies or merges the
//! child's record into its own. The operator kinds form the closed set
//! [`PhysicalOp`]; dispatch over it is an exhaustive `match`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::trace;

use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::filter::{ExistsTest, Filter};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;

mod aggregate;
mod apply;
mod cartesian;
mod distinct;
mod expand;
mod filter_op;
mod limit;
mod mutate;
mod produce;
mod project;
mod relationship_count;
mod scan;
mod sort;
mod traversal;
mod union;
mod var_len_expand;

pub use aggregate::Aggregate;
pub use apply::{Apply, Argument};
pub use cartesian::CartesianProduct;
pub use distinct::Distinct;
pub use expand::ExpandAll;
pub use filter_op::FilterOp;
pub use limit::{Limit, Skip};
pub use mutate::{
    Create, CreateNode, CreateRel, Delete, Merge, MergeTarget, Remove, RemoveItem, SetItem,
    SetMode, SetOp,
};
pub use produce::ProduceResults;
pub use project::{Project, ProjectItem};
pub use relationship_count::RelationshipCount;
pub use scan::{IdSeek, IndexSeek, NodeScan};
pub use sort::{SortKey, TopN, Sort};
pub use traversal::{Traversal, TraversalHop};
pub use union::Union;
pub use var_len_expand::{PathPredicate, PathPredicateKind, VarLenExpand};

/// Outcome of one pull.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpResult {
    /// The output record holds a fresh row.
    Ok,
    /// No more rows until the operator is reset.
    Depleted,
    /// Internal: try the next input. Never returned by
    /// [`PhysicalNode::consume`].
    Refresh,
}

/// Lifecycle of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpState {
    /// Not yet initialized, or fully reset.
    Uninitialized,
    /// Initialized and producing rows.
    Consuming,
    /// Exhausted; stays here until reset.
    Depleted,
}

/// The closed set of operator kinds.
#[derive(Clone, Debug)]
pub enum PhysicalOp {
    /// Every vertex.
    AllNodeScan(NodeScan),
    /// Vertices carrying one label.
    NodeByLabelScan(NodeScan),
    /// Vertices located through a property index (or a filtered label scan
    /// when no index exists).
    NodeIndexSeek(IndexSeek),
    /// Vertices located by id.
    NodeByIdSeek(IdSeek),
    /// One hop from a bound vertex.
    ExpandAll(ExpandAll),
    /// Bounded depth-first expansion.
    VarLenExpand(VarLenExpand),
    /// Nested-loop product of every child.
    CartesianProduct(CartesianProduct),
    /// Correlated nested loop.
    Apply(Apply),
    /// Leaf that replays the record handed in by an enclosing operator.
    Argument(Argument),
    /// Concatenation of several inputs.
    Union(Union),
    /// Row predicate.
    Filter(FilterOp),
    /// Expression projection.
    Project(Project),
    /// Duplicate elimination.
    Distinct(Distinct),
    /// Full or bounded sort.
    Sort(Sort),
    /// Fused projection, bounded sort and late projection.
    TopN(TopN),
    /// Stops after a row count.
    Limit(Limit),
    /// Drops a leading row count.
    Skip(Skip),
    /// Vertex and edge creation.
    Create(Create),
    /// Match-or-create.
    Merge(Merge),
    /// Property assignment.
    Set(SetOp),
    /// Deferred vertex and edge deletion.
    Delete(Delete),
    /// Property removal.
    Remove(Remove),
    /// Grouped aggregation.
    Aggregate(Aggregate),
    /// Direct edge count.
    RelationshipCount(RelationshipCount),
    /// Parallel frontier traversal with grouped counts.
    Traversal(Traversal),
    /// Plan root that emits result rows.
    ProduceResults(ProduceResults),
}

macro_rules! dispatch {
    ($op:expr, $inner:ident => $body:expr) => {
        match $op {
            PhysicalOp::AllNodeScan($inner) => $body,
            PhysicalOp::NodeByLabelScan($inner) => $body,
            PhysicalOp::NodeIndexSeek($inner) => $body,
            PhysicalOp::NodeByIdSeek($inner) => $body,
            PhysicalOp::ExpandAll($inner) => $body,
            PhysicalOp::VarLenExpand($inner) => $body,
            PhysicalOp::CartesianProduct($inner) => $body,
            PhysicalOp::Apply($inner) => $body,
            PhysicalOp::Argument($inner) => $body,
            PhysicalOp::Union($inner) => $body,
            PhysicalOp::Filter($inner) => $body,
            PhysicalOp::Project($inner) => $body,
            PhysicalOp::Distinct($inner) => $body,
            PhysicalOp::Sort($inner) => $body,
            PhysicalOp::TopN($inner) => $body,
            PhysicalOp::Limit($inner) => $body,
            PhysicalOp::Skip($inner) => $body,
            PhysicalOp::Create($inner) => $body,
            PhysicalOp::Merge($inner) => $body,
            PhysicalOp::Set($inner) => $body,
            PhysicalOp::Delete($inner) => $body,
            PhysicalOp::Remove($inner) => $body,
            PhysicalOp::Aggregate($inner) => $body,
            PhysicalOp::RelationshipCount($inner) => $body,
            PhysicalOp::Traversal($inner) => $body,
            PhysicalOp::ProduceResults($inner) => $body,
        }
    };
}

/// Behavior shared by every operator kind.
pub(crate) trait Operator {
    /// Opens cursors and prepares state. Children are already initialized.
    fn initialize(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()>;

    /// Produces the next row into `record`.
    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult>;

    /// Rewinds; `complete` also drops opened state.
    fn reset(&mut self, complete: bool, ctx: Option<&mut ExecContext<'_>>) -> Result<()>;

    /// Re-resolves expression columns.
    fn realign(&mut self, _symbols: &SymbolTable) -> Result<()> {
        Ok(())
    }

    /// One-line description used by explain output.
    fn details(&self) -> String {
        String::new()
    }

    /// Expressions evaluated by the operator.
    fn expressions(&self) -> Vec<&ArithExpr> {
        Vec::new()
    }

    /// Predicates evaluated by the operator.
    fn filters(&self) -> Vec<&Filter> {
        Vec::new()
    }

    /// Mutable access to the predicates, for nested-plan wiring.
    fn filters_mut(&mut self) -> Vec<&mut Filter> {
        Vec::new()
    }

    /// True for operators that write to the transaction.
    fn mutates(&self) -> bool {
        false
    }
}

impl PhysicalOp {
    /// Operator name as shown by explain.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOp::AllNodeScan(_) => "AllNodeScan",
            PhysicalOp::NodeByLabelScan(_) => "NodeByLabelScan",
            PhysicalOp::NodeIndexSeek(seek) if seek.is_dynamic() => "NodeIndexSeekDynamic",
            PhysicalOp::NodeIndexSeek(_) => "NodeIndexSeek",
            PhysicalOp::NodeByIdSeek(_) => "NodeByIdSeek",
            PhysicalOp::ExpandAll(expand) if expand.into => "ExpandInto",
            PhysicalOp::ExpandAll(_) => "ExpandAll",
            PhysicalOp::VarLenExpand(expand) if expand.into => "VarLenExpandInto",
            PhysicalOp::VarLenExpand(_) => "VarLenExpand",
            PhysicalOp::CartesianProduct(_) => "CartesianProduct",
            PhysicalOp::Apply(_) => "Apply",
            PhysicalOp::Argument(_) => "Argument",
            PhysicalOp::Union(_) => "Union",
            PhysicalOp::Filter(_) => "Filter",
            PhysicalOp::Project(_) => "Project",
            PhysicalOp::Distinct(_) => "Distinct",
            PhysicalOp::Sort(_) => "Sort",
            PhysicalOp::TopN(_) => "TopN",
            PhysicalOp::Limit(_) => "Limit",
            PhysicalOp::Skip(_) => "Skip",
            PhysicalOp::Create(_) => "Create",
            PhysicalOp::Merge(_) => "Merge",
            PhysicalOp::Set(_) => "Set",
            PhysicalOp::Delete(_) => "Delete",
            PhysicalOp::Remove(_) => "Remove",
            PhysicalOp::Aggregate(_) => "Aggregate",
            PhysicalOp::RelationshipCount(_) => "RelationshipCount",
            PhysicalOp::Traversal(_) => "Traversal",
            PhysicalOp::ProduceResults(_) => "ProduceResults",
        }
    }

    /// Operator-specific details as shown by explain.
    pub fn details(&self) -> String {
        dispatch!(self, op => op.details())
    }

    /// Expressions the operator evaluates.
    pub fn expressions(&self) -> Vec<&ArithExpr> {
        dispatch!(self, op => op.expressions())
    }

    /// Predicates the operator evaluates.
    pub fn filters(&self) -> Vec<&Filter> {
        dispatch!(self, op => op.filters())
    }

    /// True for operators that write to the transaction.
    pub fn mutates(&self) -> bool {
        dispatch!(self, op => op.mutates())
    }
}

/// A node of the operator tree.
#[derive(Clone, Debug)]
pub struct PhysicalNode {
    /// Operator and its private state.
    pub op: PhysicalOp,
    /// Children; pulled by `op`.
    pub inputs: Vec<PhysicalNode>,
    /// Output row, valid after `consume` returned [`OpResult::Ok`].
    pub record: Record,
    symbols: Option<Arc<SymbolTable>>,
    state: OpState,
}

impl PhysicalNode {
    /// Node without children.
    pub fn leaf(op: PhysicalOp) -> Self {
        Self::new(op, Vec::new())
    }

    /// Node over `inputs`.
    pub fn new(op: PhysicalOp, inputs: Vec<PhysicalNode>) -> Self {
        Self {
            op,
            inputs,
            record: Record::default(),
            symbols: None,
            state: OpState::Uninitialized,
        }
    }

    /// Node over a single input.
    pub fn unary(op: PhysicalOp, input: PhysicalNode) -> Self {
        Self::new(op, vec![input])
    }

    /// Operator name.
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    /// Lifecycle state.
    pub fn state(&self) -> OpState {
        self.state
    }

    /// True once [`PhysicalNode::initialize`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.state != OpState::Uninitialized
    }

    /// Symbol table defining the record layout, if attached.
    pub fn symbols(&self) -> Option<&Arc<SymbolTable>> {
        self.symbols.as_ref()
    }

    /// Attaches `symbols` to every node of this subtree (and of nested plans)
    /// that has none yet, re-resolving expression columns against it.
    pub fn attach_symbols(&mut self, symbols: &Arc<SymbolTable>) -> Result<()> {
        for input in &mut self.inputs {
            input.attach_symbols(symbols)?;
        }
        dispatch!(&mut self.op, op => {
            for filter in op.filters_mut() {
                filter_nested_plans(filter, &mut |plan| plan.attach_symbols(symbols))?;
            }
        });
        if self.symbols.is_none() {
            dispatch!(&mut self.op, op => op.realign(symbols))?;
            self.symbols = Some(Arc::clone(symbols));
        }
        Ok(())
    }

    /// Drops the symbol tables of this subtree so the next
    /// [`PhysicalNode::attach_symbols`] re-resolves every column.
    pub fn detach_symbols(&mut self) -> Result<()> {
        for input in &mut self.inputs {
            input.detach_symbols()?;
        }
        dispatch!(&mut self.op, op => {
            for filter in op.filters_mut() {
                filter_nested_plans(filter, &mut |plan| plan.detach_symbols())?;
            }
        });
        self.symbols = None;
        Ok(())
    }

    /// Initializes children, then this operator.
    pub fn initialize(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        for input in &mut self.inputs {
            input.initialize(ctx)?;
        }
        let symbols = self.symbols.clone().ok_or_else(|| {
            ExecError::internal(format!("{} has no symbol table attached", self.name()))
        })?;
        self.record = Record::with_symbols(symbols, Some(&ctx.params));
        let PhysicalNode { op, inputs, record, .. } = self;
        dispatch!(op, op => op.initialize(inputs, record, ctx))?;
        self.state = OpState::Consuming;
        trace!(op = self.name(), "operator initialized");
        Ok(())
    }

    /// Pulls one row. Once depleted, keeps returning
    /// [`OpResult::Depleted`] until reset.
    pub fn consume(&mut self, ctx: &mut ExecContext<'_>) -> Result<OpResult> {
        match self.state {
            OpState::Uninitialized => {
                return Err(ExecError::internal(format!(
                    "{} consumed before initialize",
                    self.name()
                )))
            }
            OpState::Depleted => return Ok(OpResult::Depleted),
            OpState::Consuming => {}
        }
        let PhysicalNode { op, inputs, record, .. } = self;
        loop {
            match dispatch!(&mut *op, op => op.consume(inputs, record, ctx))? {
                OpResult::Refresh => continue,
                OpResult::Ok => return Ok(OpResult::Ok),
                OpResult::Depleted => {
                    self.state = OpState::Depleted;
                    return Ok(OpResult::Depleted);
                }
            }
        }
    }

    /// Rewinds this subtree. `complete` returns it to the uninitialized
    /// state, releasing cursors and buffered rows.
    pub fn reset(&mut self, complete: bool) -> Result<()> {
        self.reset_with(complete, None)
    }

    /// [`PhysicalNode::reset`] that also releases path-uniqueness marks
    /// held in `ctx`.
    pub fn reset_in(&mut self, complete: bool, ctx: &mut ExecContext<'_>) -> Result<()> {
        self.reset_with(complete, Some(ctx))
    }

    fn reset_with(&mut self, complete: bool, mut ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        for input in &mut self.inputs {
            input.reset_with(complete, ctx.as_deref_mut())?;
        }
        dispatch!(&mut self.op, op => op.reset(complete, ctx))?;
        if complete {
            self.state = OpState::Uninitialized;
            self.record = Record::default();
        } else if self.state == OpState::Depleted {
            self.state = OpState::Consuming;
        }
        Ok(())
    }

    /// Hands `record` to every `Argument` leaf in this subtree.
    pub fn feed_argument(&mut self, record: &Record) {
        if let PhysicalOp::Argument(argument) = &mut self.op {
            argument.feed(record);
        }
        for input in &mut self.inputs {
            input.feed_argument(record);
        }
    }

    /// Pre-order visit of this subtree.
    pub fn walk(&self, f: &mut dyn FnMut(&PhysicalNode, usize)) {
        self.walk_at(0, f);
    }

    fn walk_at(&self, depth: usize, f: &mut dyn FnMut(&PhysicalNode, usize)) {
        f(self, depth);
        for input in &self.inputs {
            input.walk_at(depth + 1, f);
        }
    }

    /// True when any operator of the subtree writes.
    pub fn mutates(&self) -> bool {
        self.op.mutates() || self.inputs.iter().any(PhysicalNode::mutates)
    }

    /// Replaces this node with a placeholder and returns it.
    pub fn take(&mut self) -> PhysicalNode {
        std::mem::replace(self, PhysicalNode::leaf(PhysicalOp::Argument(Argument::default())))
    }

    /// Node over `inputs` sharing this node's symbol table.
    pub fn sibling(&self, op: PhysicalOp, inputs: Vec<PhysicalNode>) -> PhysicalNode {
        let mut node = PhysicalNode::new(op, inputs);
        node.symbols = self.symbols.clone();
        node
    }
}

fn filter_nested_plans(
    filter: &mut Filter,
    f: &mut dyn FnMut(&mut PhysicalNode) -> Result<()>,
) -> Result<()> {
    match filter {
        Filter::Empty(child) | Filter::Not(child) => match child {
            Some(child) => filter_nested_plans(child, f),
            None => Ok(()),
        },
        Filter::And(l, r) | Filter::Or(l, r) | Filter::Xor(l, r) => {
            for child in [l, r].into_iter().flatten() {
                filter_nested_plans(child, f)?;
            }
            Ok(())
        }
        Filter::TestExists(ExistsTest::Pattern { plan, .. }) => f(plan),
        _ => Ok(()),
    }
}

/// Pulls `input` and copies its record into `record`. Returns false when the
/// input is depleted.
pub(crate) fn pull_into(
    input: &mut PhysicalNode,
    record: &mut Record,
    ctx: &mut ExecContext<'_>,
) -> Result<bool> {
    match input.consume(ctx)? {
        OpResult::Ok => {
            record.copy_from(&input.record);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Single input of a unary operator.
pub(crate) fn only_input<'a>(
    inputs: &'a mut [PhysicalNode],
    op: &str,
) -> Result<&'a mut PhysicalNode> {
    match inputs {
        [input] => Ok(input),
        _ => Err(ExecError::internal(format!(
            "{op} expects exactly one input, got {}",
            inputs.len()
        ))),
    }
}

/// Resolves `alias` to a column for operators built outside the builder.
pub(crate) fn column_of(symbols: &SymbolTable, alias: &str, op: &str) -> Result<usize> {
    symbols.column(alias, op)
}

/// Named aliases of a set, skipping generated anonymous ones.
pub(crate) fn named(aliases: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    aliases
        .into_iter()
        .filter(|alias| !alias.starts_with(crate::query::ANONYMOUS_PREFIX))
        .collect()
}

/// Writes an unbound vertex into `column`.
pub(crate) fn unbind_node(record: &mut Record, column: usize) -> Result<()> {
    record.set(column, Entry::node(None, crate::types::VertexId::INVALID))
}
