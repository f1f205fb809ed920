//! Rule-based rewrites of the operator tree.
//!
//! Each pass looks for one fixed subtree shape and replaces it in place with
//! an equivalent, cheaper one. [`PassManager::standard`] runs every pass once
//! in a fixed order; a pass that re-enables an earlier pattern does not cause
//! a second round.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::Result;
use crate::query::expr::ArithExpr;
use crate::query::filter::{CompareOp, ExistsTest, Filter};
use crate::query::ops::PhysicalNode;
use crate::storage::SchemaInfo;

mod count_pushdown;
mod edge_filter_pushdown;
mod lazy_project_topn;
mod locate_node;
mod parallel_traversal;

pub use count_pushdown::CountPushdown;
pub use edge_filter_pushdown::{EdgeFilterPushdownExpand, EdgeFilterPushdownVarLen};
pub use lazy_project_topn::LazyProjectTopN;
pub use locate_node::{LocateNodeByIndexedProp, LocateNodeByVid};
pub use parallel_traversal::ParallelTraversal;

/// One rewrite rule.
pub trait OptPass: Send + Sync {
    /// Name reported when the pass rewrote something.
    fn name(&self) -> &'static str;

    /// Whether the pass should run at all.
    fn gate(&self) -> bool {
        true
    }

    /// Rewrites every match under `root`. Returns true when the tree changed.
    fn execute(&self, root: &mut PhysicalNode, schema: &SchemaInfo) -> Result<bool>;
}

/// Ordered list of passes, each run once.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn OptPass>>,
}

impl PassManager {
    /// Manager without passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed production order.
    pub fn standard() -> Self {
        Self::new()
            .with(CountPushdown)
            .with(EdgeFilterPushdownExpand)
            .with(LazyProjectTopN)
            .with(EdgeFilterPushdownVarLen)
            .with(LocateNodeByVid)
            .with(LocateNodeByIndexedProp)
            .with(ParallelTraversal)
    }

    /// Appends `pass`.
    pub fn with(mut self, pass: impl OptPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Pass names in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every gated pass once. Returns the names of the passes that
    /// changed the tree, in run order.
    pub fn run(&self, root: &mut PhysicalNode, schema: &SchemaInfo) -> Result<Vec<&'static str>> {
        let mut applied = Vec::new();
        for pass in &self.passes {
            if !pass.gate() {
                continue;
            }
            if pass.execute(root, schema)? {
                debug!(pass = pass.name(), "optimizer pass rewrote plan");
                applied.push(pass.name());
            }
        }
        Ok(applied)
    }
}

/// Pre-order walk offering every node to `rewrite`. A replaced node's own
/// inputs are visited afterwards.
pub(crate) fn rewrite_each(
    node: &mut PhysicalNode,
    rewrite: &mut dyn FnMut(&mut PhysicalNode) -> Result<bool>,
) -> Result<bool> {
    let mut changed = rewrite(node)?;
    for input in &mut node.inputs {
        changed |= rewrite_each(input, rewrite)?;
    }
    Ok(changed)
}

/// True when the predicate embeds a nested plan.
pub(crate) fn has_nested_plan(filter: &Filter) -> bool {
    let mut found = false;
    filter.walk(&mut |leaf| {
        if matches!(leaf, Filter::TestExists(ExistsTest::Pattern { .. })) {
            found = true;
        }
    });
    found
}

/// Splits the conjuncts of `filter` into those `pick` accepts and the rest.
pub(crate) fn split_conjuncts(
    filter: &Filter,
    mut pick: impl FnMut(&Filter) -> bool,
) -> (Vec<Filter>, Vec<Filter>) {
    filter.clone().into_conjuncts().into_iter().partition(|part| pick(part))
}

/// Value side of `subject = value`, `value = subject` or `subject IN value`
/// when `is_subject` recognizes the subject and the value does not read
/// `alias`.
pub(crate) fn equality_operand<'a>(
    filter: &'a Filter,
    alias: &str,
    is_subject: &dyn Fn(&ArithExpr) -> bool,
) -> Option<&'a ArithExpr> {
    let value = match filter {
        Filter::Range {
            op: CompareOp::Eq,
            lhs,
            rhs,
        } => {
            if is_subject(lhs) {
                rhs
            } else if is_subject(rhs) {
                lhs
            } else {
                return None;
            }
        }
        Filter::TestIn { lhs, rhs, .. } if is_subject(lhs) => rhs,
        _ => return None,
    };
    let reads: BTreeSet<String> = value.aliases();
    (!reads.contains(alias)).then_some(value)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Plan fixtures for the pass tests.

    use std::sync::Arc;

    use crate::error::Result;
    use crate::query::context::ExecContext;
    use crate::query::ops::PhysicalNode;
    use crate::query::plan::ExecutionPlan;
    use crate::query::symbol_table::{SymbolScope, SymbolTable, SymbolType};
    use crate::storage::GraphTxn;

    /// Symbol table with the given columns.
    pub fn table(columns: &[(&str, SymbolType)]) -> Arc<SymbolTable> {
        let mut table = SymbolTable::new();
        for (alias, ty) in columns {
            table.add(alias, *ty, SymbolScope::Local);
        }
        Arc::new(table)
    }

    /// Runs `root` once and renders every root record.
    pub fn run(root: PhysicalNode, symbols: &Arc<SymbolTable>, txn: &mut dyn GraphTxn) -> Result<Vec<String>> {
        let mut plan = ExecutionPlan::new(root, Arc::clone(symbols))?;
        let mut ctx = ExecContext::new(txn);
        let mut rows = Vec::new();
        while let Some(record) = plan.pull(&mut ctx)? {
            rows.push(record.render("null"));
        }
        plan.close(&mut ctx)?;
        Ok(rows)
    }

    /// Operator names of `root` in pre-order.
    pub fn shape(root: &PhysicalNode) -> Vec<&'static str> {
        let mut names = Vec::new();
        root.walk(&mut |node, _| names.push(node.name()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::CompareOp;

    #[test]
    fn standard_order_is_fixed() {
        assert_eq!(
            PassManager::standard().names(),
            vec![
                "CountPushdown",
                "EdgeFilterPushdownExpand",
                "LazyProjectTopN",
                "EdgeFilterPushdownVarLen",
                "LocateNodeByVid",
                "LocateNodeByIndexedProp",
                "ParallelTraversal",
            ]
        );
    }

    #[test]
    fn equality_operand_accepts_both_sides_and_membership() {
        let is_name = |expr: &ArithExpr| expr.as_variable() == Some(("n", Some("name")));
        let eq = Filter::range(ArithExpr::constant("ann"), CompareOp::Eq, ArithExpr::prop("n", "name"));
        assert_eq!(
            equality_operand(&eq, "n", &is_name).and_then(|v| v.as_constant()).cloned(),
            Some("ann".into())
        );
        let within = Filter::test_in(ArithExpr::prop("n", "name"), ArithExpr::param("names"));
        assert!(equality_operand(&within, "n", &is_name).is_some());
        let self_ref = Filter::range(ArithExpr::prop("n", "name"), CompareOp::Eq, ArithExpr::prop("n", "nick"));
        assert!(equality_operand(&self_ref, "n", &is_name).is_none());
        let gt = Filter::range(ArithExpr::prop("n", "name"), CompareOp::Gt, ArithExpr::constant("a"));
        assert!(equality_operand(&gt, "n", &is_name).is_none());
    }
}
