//! Executable plan: a symbol table plus the operator tree rooted at it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::ExecOptions;
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::ops::{MergeTarget, OpResult, PhysicalNode, PhysicalOp};
use crate::query::optimizer::PassManager;
use crate::query::record::Record;
use crate::query::result::{ResultSet, ResultStatistics};
use crate::query::symbol_table::SymbolTable;
use crate::storage::SchemaInfo;

/// Operator tree ready to run.
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    root: PhysicalNode,
    symbols: Arc<SymbolTable>,
    open: bool,
}

impl ExecutionPlan {
    /// Binds `root` to `symbols`.
    pub fn new(mut root: PhysicalNode, symbols: Arc<SymbolTable>) -> Result<Self> {
        root.detach_symbols()?;
        root.attach_symbols(&symbols)?;
        Ok(Self {
            root,
            symbols,
            open: false,
        })
    }

    /// Root operator.
    pub fn root(&self) -> &PhysicalNode {
        &self.root
    }

    /// Symbol table shared by every operator of the plan.
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// True when no operator writes.
    pub fn is_read_only(&self) -> bool {
        !self.root.mutates()
    }

    /// Runs the standard passes unless the optimizer is disabled. Returns the
    /// names of the passes that rewrote the tree.
    pub fn optimize(&mut self, schema: &SchemaInfo, options: &ExecOptions) -> Result<Vec<&'static str>> {
        if !options.enable_optimizer {
            return Ok(Vec::new());
        }
        self.optimize_with(&PassManager::standard(), schema)
    }

    /// Runs `passes` and re-binds the rewritten tree.
    pub fn optimize_with(&mut self, passes: &PassManager, schema: &SchemaInfo) -> Result<Vec<&'static str>> {
        if self.open {
            return Err(ExecError::internal("cannot optimize a plan that is being consumed"));
        }
        let applied = passes.run(&mut self.root, schema)?;
        self.root.detach_symbols()?;
        self.root.attach_symbols(&self.symbols)?;
        Ok(applied)
    }

    /// Pulls the next root record, initializing the tree on first use.
    /// Returns `None` once the plan is depleted.
    pub fn pull(&mut self, ctx: &mut ExecContext<'_>) -> Result<Option<&Record>> {
        if !self.open {
            self.check_writable(ctx)?;
            self.root.initialize(ctx)?;
            self.open = true;
        }
        match self.root.consume(ctx)? {
            OpResult::Ok => Ok(Some(&self.root.record)),
            _ => Ok(None),
        }
    }

    /// Releases cursors and buffered state; the plan can run again afterwards.
    pub fn close(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        if self.open {
            self.root.reset_in(true, ctx)?;
            self.open = false;
        }
        Ok(())
    }

    /// Runs the plan to completion and returns what the root produced.
    ///
    /// Statistics and result rows of a previous run on the same context are
    /// discarded first. On error the tree is still released.
    pub fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<ResultSet> {
        ctx.result = ResultSet::default();
        ctx.stats = ResultStatistics::default();
        ctx.visited.clear();
        let start = Instant::now();
        let mut pulls = 0usize;
        let outcome = loop {
            match self.pull(ctx) {
                Ok(Some(_)) => pulls += 1,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.close(ctx)?;
        outcome?;
        debug!(
            root = self.root.name(),
            pulls,
            rows = ctx.result.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "plan executed"
        );
        Ok(std::mem::take(&mut ctx.result))
    }

    fn check_writable(&self, ctx: &ExecContext<'_>) -> Result<()> {
        if self.root.mutates() && ctx.txn().is_read_only() {
            return Err(ExecError::input("write statement needs a write transaction"));
        }
        Ok(())
    }

    /// Operator tree with per-operator details.
    pub fn explain(&self) -> PlanExplain {
        PlanExplain {
            root: build_explain_tree(&self.root),
        }
    }

    /// Variables, labels, relationship types and fields the plan touches.
    pub fn access_summary(&self) -> AccessSummary {
        let mut summary = AccessSummary::default();
        self.root.walk(&mut |node, _| summary.visit(node));
        summary
    }
}

/// Explain tree node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExplainNode {
    /// Operator name.
    pub op: String,
    /// Operator details, possibly empty.
    pub details: String,
    /// Input operators.
    pub inputs: Vec<ExplainNode>,
}

/// Human-readable operator tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanExplain {
    /// Root node of the explain tree.
    pub root: ExplainNode,
}

impl PlanExplain {
    /// Operator names in pre-order.
    pub fn operators(&self) -> Vec<String> {
        fn collect(node: &ExplainNode, out: &mut Vec<String>) {
            out.push(node.op.clone());
            node.inputs.iter().for_each(|input| collect(input, out));
        }
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    /// One `(depth, node)` pair per operator in pre-order.
    pub fn lines(&self) -> Vec<(usize, &ExplainNode)> {
        fn collect<'a>(node: &'a ExplainNode, depth: usize, out: &mut Vec<(usize, &'a ExplainNode)>) {
            out.push((depth, node));
            node.inputs.iter().for_each(|input| collect(input, depth + 1, out));
        }
        let mut out = Vec::new();
        collect(&self.root, 0, &mut out);
        out
    }
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, node) in self.lines() {
            write!(f, "{:indent$}{}", "", node.op, indent = depth * 4)?;
            if !node.details.is_empty() {
                write!(f, " [{}]", node.details)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn build_explain_tree(node: &PhysicalNode) -> ExplainNode {
    ExplainNode {
        op: node.name().to_string(),
        details: node.op.details(),
        inputs: node.inputs.iter().map(build_explain_tree).collect(),
    }
}

/// What a plan reads and writes, for an external access checker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessSummary {
    /// Named variables bound or read.
    pub aliases: BTreeSet<String>,
    /// Vertex labels scanned, expanded into, or written.
    pub labels: BTreeSet<String>,
    /// Relationship types walked or written.
    pub relationship_types: BTreeSet<String>,
    /// `(variable, field)` pairs read or written.
    pub fields: BTreeSet<(String, String)>,
    /// True when some operator writes.
    pub writes: bool,
}

impl AccessSummary {
    fn alias(&mut self, alias: &str) {
        if !alias.starts_with(crate::query::ANONYMOUS_PREFIX) {
            self.aliases.insert(alias.to_string());
        }
    }

    fn label(&mut self, label: Option<&String>) {
        self.labels.extend(label.cloned());
    }

    fn field(&mut self, alias: &str, field: &str) {
        self.fields.insert((alias.to_string(), field.to_string()));
    }

    fn visit(&mut self, node: &PhysicalNode) {
        match &node.op {
            PhysicalOp::AllNodeScan(scan) | PhysicalOp::NodeByLabelScan(scan) => {
                self.alias(&scan.alias);
                self.label(scan.label.as_ref());
            }
            PhysicalOp::NodeIndexSeek(seek) => {
                self.alias(&seek.alias);
                self.labels.insert(seek.label.clone());
                self.field(&seek.alias, &seek.field);
            }
            PhysicalOp::NodeByIdSeek(seek) => {
                self.alias(&seek.alias);
                self.label(seek.label.as_ref());
            }
            PhysicalOp::ExpandAll(expand) => {
                for alias in [&expand.src_alias, &expand.rel_alias, &expand.dst_alias] {
                    self.alias(alias);
                }
                self.relationship_types.extend(expand.types.iter().cloned());
                self.label(expand.neighbor_label.as_ref());
            }
            PhysicalOp::VarLenExpand(expand) => {
                for alias in [&expand.src_alias, &expand.rel_alias, &expand.dst_alias] {
                    self.alias(alias);
                }
                self.relationship_types.extend(expand.types.iter().cloned());
                self.label(expand.neighbor_label.as_ref());
                if !expand.predicates.is_empty() {
                    self.field(&expand.rel_alias, crate::query::expr::functions::PATH_FIELD);
                }
            }
            PhysicalOp::Create(create) => {
                for node in &create.nodes {
                    self.alias(&node.alias);
                    self.labels.insert(node.label.clone());
                    for (field, _) in &node.properties {
                        self.field(&node.alias, field);
                    }
                }
                for rel in &create.rels {
                    self.alias(&rel.alias);
                    self.relationship_types.insert(rel.rel_type.clone());
                    for (field, _) in &rel.properties {
                        self.field(&rel.alias, field);
                    }
                }
            }
            PhysicalOp::Merge(merge) => {
                match &merge.target {
                    MergeTarget::Node(node) => {
                        self.alias(&node.alias);
                        self.labels.insert(node.label.clone());
                    }
                    MergeTarget::Relationship(rel) => {
                        self.alias(&rel.alias);
                        self.relationship_types.insert(rel.rel_type.clone());
                    }
                }
                for item in merge.on_create.iter().chain(&merge.on_match) {
                    self.alias(&item.alias);
                    if let Some(property) = &item.property {
                        self.field(&item.alias, property);
                    }
                }
            }
            PhysicalOp::Set(set) => {
                for item in &set.items {
                    self.alias(&item.alias);
                    if let Some(property) = &item.property {
                        self.field(&item.alias, property);
                    }
                }
            }
            PhysicalOp::Delete(delete) => delete.aliases.iter().for_each(|alias| self.alias(alias)),
            PhysicalOp::Remove(remove) => {
                for item in &remove.items {
                    self.alias(&item.alias);
                    self.field(&item.alias, &item.property);
                }
            }
            PhysicalOp::RelationshipCount(count) => {
                self.alias(&count.src_alias);
                self.alias(&count.dst_alias);
                self.label(count.spec.start_label.as_ref());
                self.label(count.spec.neighbor_label.as_ref());
                self.relationship_types.extend(count.spec.types.iter().cloned());
            }
            PhysicalOp::Traversal(traversal) => {
                self.alias(&traversal.start_alias);
                self.alias(&traversal.end_alias);
                self.label(traversal.start_label.as_ref());
                for hop in &traversal.hops {
                    self.relationship_types.extend(hop.types.iter().cloned());
                    self.label(hop.neighbor_label.as_ref());
                }
                if let Some(field) = &traversal.key_field {
                    self.field(&traversal.end_alias, field);
                }
            }
            PhysicalOp::Union(union) => union.aliases.iter().for_each(|alias| self.alias(alias)),
            PhysicalOp::Distinct(distinct) => distinct.aliases.iter().for_each(|alias| self.alias(alias)),
            PhysicalOp::CartesianProduct(_)
            | PhysicalOp::Apply(_)
            | PhysicalOp::Argument(_)
            | PhysicalOp::Filter(_)
            | PhysicalOp::Project(_)
            | PhysicalOp::Sort(_)
            | PhysicalOp::TopN(_)
            | PhysicalOp::Limit(_)
            | PhysicalOp::Skip(_)
            | PhysicalOp::Aggregate(_)
            | PhysicalOp::ProduceResults(_) => {}
        }
        self.writes |= node.op.mutates();
        for expr in node.op.expressions() {
            expr.aliases().iter().for_each(|alias| self.alias(alias));
            self.fields.extend(expr.visited_fields());
        }
        for filter in node.op.filters() {
            filter.aliases().iter().for_each(|alias| self.alias(alias));
            self.fields.extend(filter.visited_fields());
            filter.walk(&mut |leaf| {
                if let crate::query::filter::Filter::Label { label, .. } = leaf {
                    self.labels.insert(label.clone());
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::ArithExpr;
    use crate::query::filter::{CompareOp, Filter};
    use crate::query::ops::{ExpandAll, FilterOp, NodeScan, ProduceResults, Project, ProjectItem};
    use crate::query::ops::{Create, CreateNode};
    use crate::query::symbol_table::{SymbolScope, SymbolType};
    use crate::query::value::FieldData;
    use crate::storage::MemoryGraph;
    use crate::types::Direction;

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new().with_label("Person", Some("name"));
        let ann = graph.insert_vertex("Person", [("name", FieldData::from("ann")), ("age", FieldData::Int(31))]);
        let bob = graph.insert_vertex("Person", [("name", FieldData::from("bob")), ("age", FieldData::Int(25))]);
        graph.insert_edge(ann, bob, "KNOWS", []);
        graph.insert_edge(bob, ann, "KNOWS", []);
        graph
    }

    fn table(columns: &[(&str, SymbolType)]) -> Arc<SymbolTable> {
        let mut table = SymbolTable::new();
        for (alias, ty) in columns {
            table.add(alias, *ty, SymbolScope::Local);
        }
        Arc::new(table)
    }

    fn knows_older_than(age: i64) -> Result<ExecutionPlan> {
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")));
        let expand = PhysicalNode::unary(
            PhysicalOp::ExpandAll(ExpandAll::new("n", "r", "m", Direction::Out).with_types(vec!["KNOWS".into()])),
            scan,
        );
        let filter = PhysicalNode::unary(
            PhysicalOp::Filter(FilterOp::new(Filter::range(
                ArithExpr::prop("n", "age"),
                CompareOp::Gt,
                ArithExpr::constant(age),
            ))),
            expand,
        );
        let project = PhysicalNode::unary(
            PhysicalOp::Project(Project::new(vec![ProjectItem::new(ArithExpr::prop("m", "name"), "friend")])),
            filter,
        );
        let root = PhysicalNode::unary(
            PhysicalOp::ProduceResults(ProduceResults::new(vec![("friend".into(), "friend".into())])),
            project,
        );
        let symbols = table(&[
            ("n", SymbolType::Node),
            ("r", SymbolType::Relationship),
            ("m", SymbolType::Node),
            ("friend", SymbolType::Constant),
        ]);
        ExecutionPlan::new(root, symbols)
    }

    #[test]
    fn execute_collects_rows_and_can_rerun() -> Result<()> {
        let mut graph = graph();
        let mut ctx = ExecContext::new(&mut graph);
        let mut plan = knows_older_than(30)?;
        let first = plan.execute(&mut ctx)?;
        assert_eq!(first.header, vec!["friend"]);
        assert_eq!(first.rows, vec![vec![FieldData::from("bob")]]);
        let second = plan.execute(&mut ctx)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn pull_streams_root_records() -> Result<()> {
        let mut graph = graph();
        let mut ctx = ExecContext::new(&mut graph);
        let mut plan = knows_older_than(0)?;
        let mut seen = 0;
        while let Some(record) = plan.pull(&mut ctx)? {
            assert!(record.get(0)?.vid().is_some());
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert!(plan.pull(&mut ctx)?.is_none());
        plan.close(&mut ctx)?;
        Ok(())
    }

    #[test]
    fn explain_indents_inputs() -> Result<()> {
        let plan = knows_older_than(30)?;
        let text = plan.explain().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ProduceResults [friend]");
        assert_eq!(lines[1], "    Project [m.name AS friend]");
        assert_eq!(lines[2], "        Filter [{n.age > 30}]");
        assert!(lines[3].starts_with("            ExpandAll"));
        assert!(lines[4].starts_with("                NodeByLabelScan"));
        assert_eq!(
            plan.explain().operators(),
            vec!["ProduceResults", "Project", "Filter", "ExpandAll", "NodeByLabelScan"]
        );
        Ok(())
    }

    #[test]
    fn access_summary_collects_reads() -> Result<()> {
        let summary = knows_older_than(30)?.access_summary();
        assert!(!summary.writes);
        assert_eq!(summary.labels.iter().collect::<Vec<_>>(), vec!["Person"]);
        assert_eq!(summary.relationship_types.iter().collect::<Vec<_>>(), vec!["KNOWS"]);
        assert!(summary.fields.contains(&("n".to_string(), "age".to_string())));
        assert!(summary.fields.contains(&("m".to_string(), "name".to_string())));
        assert!(summary.aliases.contains("friend") || summary.aliases.contains("m"));
        Ok(())
    }

    #[test]
    fn writes_are_refused_on_read_only_transactions() -> Result<()> {
        let mut graph = graph();
        graph.set_read_only(true);
        let mut ctx = ExecContext::new(&mut graph);
        let create = PhysicalNode::leaf(PhysicalOp::Create(Create::new(vec![CreateNode::new("x", "Tag")], Vec::new())));
        let root = PhysicalNode::unary(PhysicalOp::ProduceResults(ProduceResults::summary()), create);
        let mut plan = ExecutionPlan::new(root, table(&[("x", SymbolType::Node)]))?;
        assert!(!plan.is_read_only());
        let err = plan.execute(&mut ctx).unwrap_err();
        assert_eq!(err.code(), "INPUT_ERROR");
        Ok(())
    }
}
