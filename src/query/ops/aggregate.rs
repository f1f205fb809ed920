//! Grouped aggregation.

use rustc_hash::FxHashMap;

use super::project::items_text;
use super::{only_input, OpResult, Operator, PhysicalNode, ProjectItem};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;

#[derive(Clone, Debug)]
struct Group {
    keys: Vec<Entry>,
    exprs: Vec<ArithExpr>,
}

/// `Aggregate`: drains its input, grouping rows by the key items and
/// stepping a private copy of every aggregate expression per group.
///
/// Groups are identified by the rendered snapshot of their key values and
/// emitted in first-seen order. Without keys, an empty input still yields
/// one row (`count` is `0`, other aggregates are null).
#[derive(Clone, Debug)]
pub struct Aggregate {
    /// Grouping keys.
    pub keys: Vec<ProjectItem>,
    /// Items whose expressions contain aggregate calls.
    pub aggregates: Vec<ProjectItem>,
    groups: Vec<Group>,
    index: FxHashMap<String, usize>,
    next: usize,
    filled: bool,
}

impl Aggregate {
    /// Aggregation of `aggregates` grouped by `keys`.
    pub fn new(keys: Vec<ProjectItem>, aggregates: Vec<ProjectItem>) -> Self {
        Self {
            keys,
            aggregates,
            groups: Vec::new(),
            index: FxHashMap::default(),
            next: 0,
            filled: false,
        }
    }

    fn template(&self) -> Vec<ArithExpr> {
        self.aggregates
            .iter()
            .map(|item| {
                let mut expr = item.expr.clone();
                expr.reset_aggregation();
                expr
            })
            .collect()
    }

    fn fill(&mut self, input: &mut PhysicalNode, ctx: &mut ExecContext<'_>) -> Result<()> {
        let start = profile_timer();
        while input.consume(ctx)? == OpResult::Ok {
            let row = &input.record;
            let mut keys = Vec::with_capacity(self.keys.len());
            let mut name = String::new();
            for (i, item) in self.keys.iter().enumerate() {
                let value = item.expr.evaluate(ctx, row)?;
                if i > 0 {
                    name.push(',');
                }
                name.push_str(&value.clone().snapshot().render(&ctx.options.null_marker));
                keys.push(value);
            }
            let slot = match self.index.get(&name) {
                Some(slot) => *slot,
                None => {
                    let exprs = self.template();
                    self.groups.push(Group { keys, exprs });
                    self.index.insert(name, self.groups.len() - 1);
                    self.groups.len() - 1
                }
            };
            for expr in &mut self.groups[slot].exprs {
                expr.aggregate(ctx, row)?;
            }
        }
        if self.groups.is_empty() && self.keys.is_empty() {
            let exprs = self.template();
            self.groups.push(Group {
                keys: Vec::new(),
                exprs,
            });
        }
        for group in &mut self.groups {
            for expr in &mut group.exprs {
                expr.reduce()?;
            }
        }
        self.filled = true;
        record_profile_timer(QueryProfileKind::Aggregate, start);
        Ok(())
    }

    fn clear(&mut self) {
        self.groups.clear();
        self.index.clear();
        self.next = 0;
        self.filled = false;
    }
}

fn column(item: &ProjectItem) -> Result<usize> {
    item.column()
        .ok_or_else(|| ExecError::internal(format!("aggregate output '{}' was never aligned", item.alias)))
}

impl Operator for Aggregate {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !self.filled {
            self.fill(only_input(inputs, "Aggregate")?, ctx)?;
        }
        let Some(group) = self.groups.get(self.next) else {
            return Ok(OpResult::Depleted);
        };
        self.next += 1;
        record.values.iter_mut().for_each(|entry| *entry = Entry::Unknown);
        for (item, key) in self.keys.iter().zip(&group.keys) {
            record.set(column(item)?, key.clone())?;
        }
        let mut values = Vec::with_capacity(group.exprs.len());
        for expr in &group.exprs {
            values.push(expr.evaluate(ctx, record)?);
        }
        for (item, value) in self.aggregates.iter().zip(values) {
            record.set(column(item)?, value)?;
        }
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        for item in self.keys.iter_mut().chain(self.aggregates.iter_mut()) {
            item.realign(symbols)?;
        }
        Ok(())
    }

    fn details(&self) -> String {
        if self.keys.is_empty() {
            return items_text(&self.aggregates);
        }
        format!("{} BY {}", items_text(&self.aggregates), items_text(&self.keys))
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.keys
            .iter()
            .chain(self.aggregates.iter())
            .map(|item| &item.expr)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{drain, people, symbols};
    use super::super::{ExpandAll, NodeScan, PhysicalOp};
    use super::*;
    use crate::query::expr::AggFunc;
    use crate::query::symbol_table::SymbolType;
    use crate::types::Direction;

    fn lives_in() -> PhysicalNode {
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")));
        PhysicalNode::unary(
            PhysicalOp::ExpandAll(ExpandAll::new("n", "r", "c", Direction::Out).with_types(vec!["LIVES_IN".into()])),
            scan,
        )
    }

    fn table() -> std::sync::Arc<SymbolTable> {
        symbols(&[
            ("n", SymbolType::Node),
            ("r", SymbolType::Relationship),
            ("c", SymbolType::Node),
            ("city", SymbolType::Constant),
            ("people", SymbolType::Constant),
            ("ages", SymbolType::Constant),
        ])
    }

    #[test]
    fn groups_in_first_seen_order() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let aggregate = Aggregate::new(
            vec![ProjectItem::new(ArithExpr::prop("c", "name"), "city")],
            vec![
                ProjectItem::new(ArithExpr::count_star(), "people"),
                ProjectItem::new(
                    ArithExpr::aggregate_call(AggFunc::Sum, false, vec![ArithExpr::prop("n", "age")]),
                    "ages",
                ),
            ],
        );
        let mut node = PhysicalNode::unary(PhysicalOp::Aggregate(aggregate), lives_in());
        node.attach_symbols(&table())?;
        let rows = drain(&mut node, &mut ctx)?;
        assert_eq!(rows, vec!["null,null,null,oslo,2,73", "null,null,null,rome,1,25"]);
        assert_eq!(node.op.details(), "count(*) AS people, sum(n.age) AS ages BY c.name AS city");
        Ok(())
    }

    #[test]
    fn empty_input_without_keys_yields_one_row() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Robot")));
        let aggregate = Aggregate::new(
            Vec::new(),
            vec![
                ProjectItem::new(ArithExpr::count_star(), "people"),
                ProjectItem::new(
                    ArithExpr::aggregate_call(AggFunc::Max, false, vec![ArithExpr::prop("n", "age")]),
                    "ages",
                ),
            ],
        );
        let mut node = PhysicalNode::unary(PhysicalOp::Aggregate(aggregate), scan);
        node.attach_symbols(&table())?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["null,null,null,null,0,null"]);
        Ok(())
    }

    #[test]
    fn empty_input_with_keys_yields_nothing() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Robot")));
        let aggregate = Aggregate::new(
            vec![ProjectItem::new(ArithExpr::prop("n", "name"), "city")],
            vec![ProjectItem::new(ArithExpr::count_star(), "people")],
        );
        let mut node = PhysicalNode::unary(PhysicalOp::Aggregate(aggregate), scan);
        node.attach_symbols(&table())?;
        assert!(drain(&mut node, &mut ctx)?.is_empty());
        Ok(())
    }

    #[test]
    fn rerun_after_reset_starts_from_fresh_accumulators() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let aggregate = Aggregate::new(Vec::new(), vec![ProjectItem::new(ArithExpr::count_star(), "people")]);
        let mut node = PhysicalNode::unary(PhysicalOp::Aggregate(aggregate), lives_in());
        node.attach_symbols(&table())?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["null,null,null,null,3,null"]);
        node.reset(false)?;
        assert_eq!(node.consume(&mut ctx)?, OpResult::Ok);
        assert_eq!(node.record.get(4)?, &Entry::constant(3i64));
        Ok(())
    }
}
