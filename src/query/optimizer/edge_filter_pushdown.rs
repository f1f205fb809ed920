use std::collections::BTreeSet;

use super::{has_nested_plan, rewrite_each, split_conjuncts, OptPass};
use crate::error::Result;
use crate::query::filter::Filter;
use crate::query::ops::{FilterOp, PathPredicate, PhysicalNode, PhysicalOp};
use crate::storage::SchemaInfo;

/// `Filter -> ExpandAll`: conjuncts that read the relationship and at most
/// the start vertex move into the expansion's edge filter. The `Filter`
/// disappears when nothing else is left.
pub struct EdgeFilterPushdownExpand;

impl OptPass for EdgeFilterPushdownExpand {
    fn name(&self) -> &'static str {
        "EdgeFilterPushdownExpand"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        rewrite_each(root, &mut |node| {
            let (PhysicalOp::Filter(filter_op), [child]) = (&node.op, node.inputs.as_slice()) else {
                return Ok(false);
            };
            let PhysicalOp::ExpandAll(expand) = &child.op else {
                return Ok(false);
            };
            let allowed: BTreeSet<String> = [expand.src_alias.clone(), expand.rel_alias.clone()].into();
            let rel = expand.rel_alias.clone();
            let (pushed, kept) = split_conjuncts(&filter_op.filter, |part| {
                let aliases = part.aliases();
                aliases.contains(&rel) && aliases.is_subset(&allowed) && !has_nested_plan(part)
            });
            if pushed.is_empty() {
                return Ok(false);
            }
            replace_filter(node, kept, |op| {
                if let PhysicalOp::ExpandAll(expand) = op {
                    pushed.into_iter().for_each(|part| expand.push_edge_filter(part));
                }
            });
            Ok(true)
        })
    }
}

/// `Filter -> VarLenExpand`: path predicates over the variable-length
/// relationship (`head`, `last`, `isAsc`, `isDesc`, `maxInList`,
/// `minInList` compared with a constant) become pruning predicates of the
/// search. Other conjuncts stay in the `Filter`.
pub struct EdgeFilterPushdownVarLen;

impl OptPass for EdgeFilterPushdownVarLen {
    fn name(&self) -> &'static str {
        "EdgeFilterPushdownVarLen"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        rewrite_each(root, &mut |node| {
            let (PhysicalOp::Filter(filter_op), [child]) = (&node.op, node.inputs.as_slice()) else {
                return Ok(false);
            };
            let PhysicalOp::VarLenExpand(expand) = &child.op else {
                return Ok(false);
            };
            let rel = expand.rel_alias.clone();
            let mut predicates = Vec::new();
            let (_, kept) = split_conjuncts(&filter_op.filter, |part| {
                match PathPredicate::try_from_filter(part, &rel) {
                    Some(predicate) => {
                        predicates.push(predicate);
                        true
                    }
                    None => false,
                }
            });
            if predicates.is_empty() {
                return Ok(false);
            }
            replace_filter(node, kept, |op| {
                if let PhysicalOp::VarLenExpand(expand) = op {
                    expand.predicates.extend(predicates);
                }
            });
            Ok(true)
        })
    }
}

/// Replaces the `Filter` at `node` by its child after `update` adjusted the
/// child's operator, re-wrapping the child when `kept` is not empty.
pub(crate) fn replace_filter(node: &mut PhysicalNode, kept: Vec<Filter>, update: impl FnOnce(&mut PhysicalOp)) {
    let mut filter_node = node.take();
    let Some(mut child) = filter_node.inputs.pop() else {
        *node = filter_node;
        return;
    };
    update(&mut child.op);
    *node = match Filter::all(kept) {
        Some(rest) => PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(rest)), child),
        None => child,
    };
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{run, shape, table};
    use super::*;
    use crate::query::expr::ArithExpr;
    use crate::query::filter::CompareOp;
    use crate::query::ops::{ExpandAll, NodeScan, VarLenExpand};
    use crate::query::symbol_table::SymbolType;
    use crate::query::value::FieldData;
    use crate::storage::MemoryGraph;
    use crate::types::Direction;

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        let a = graph.insert_vertex("N", [("age", FieldData::Int(40))]);
        let b = graph.insert_vertex("N", [("age", FieldData::Int(20))]);
        let c = graph.insert_vertex("N", [("age", FieldData::Int(30))]);
        graph.insert_edge(a, b, "R", [("w", FieldData::Int(1)), ("timestamp", FieldData::Int(10))]);
        graph.insert_edge(b, c, "R", [("w", FieldData::Int(5)), ("timestamp", FieldData::Int(20))]);
        graph.insert_edge(a, c, "R", [("w", FieldData::Int(7)), ("timestamp", FieldData::Int(5))]);
        graph.insert_edge(c, a, "R", [("w", FieldData::Int(2)), ("timestamp", FieldData::Int(30))]);
        graph
    }

    fn expand_plan(filter: Filter) -> PhysicalNode {
        let scan = PhysicalNode::leaf(PhysicalOp::AllNodeScan(NodeScan::all("n")));
        let expand = PhysicalNode::unary(PhysicalOp::ExpandAll(ExpandAll::new("n", "r", "m", Direction::Out)), scan);
        PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(filter)), expand)
    }

    fn heavy_edges() -> Filter {
        Filter::range(ArithExpr::prop("r", "w"), CompareOp::Gt, ArithExpr::constant(1i64))
    }

    #[test]
    fn edge_only_filter_disappears() -> Result<()> {
        let symbols = table(&[("n", SymbolType::Node), ("r", SymbolType::Relationship), ("m", SymbolType::Node)]);
        let mut graph = graph();
        let before = run(expand_plan(heavy_edges()), &symbols, &mut graph)?;

        let mut root = expand_plan(heavy_edges());
        assert!(EdgeFilterPushdownExpand.execute(&mut root, &SchemaInfo::default())?);
        assert_eq!(shape(&root), vec!["ExpandAll", "AllNodeScan"]);
        match &root.op {
            PhysicalOp::ExpandAll(expand) => assert!(expand.edge_filter.is_some()),
            other => panic!("unexpected root {}", other.name()),
        }
        assert_eq!(run(root, &symbols, &mut graph)?, before);
        assert_eq!(before.len(), 3);
        Ok(())
    }

    #[test]
    fn neighbor_conjuncts_stay_behind() -> Result<()> {
        let filter = Filter::and(
            heavy_edges(),
            Filter::range(ArithExpr::prop("m", "age"), CompareOp::Lt, ArithExpr::constant(35i64)),
        );
        let mut root = expand_plan(filter);
        assert!(EdgeFilterPushdownExpand.execute(&mut root, &SchemaInfo::default())?);
        assert_eq!(shape(&root), vec!["Filter", "ExpandAll", "AllNodeScan"]);
        assert_eq!(root.op.details(), "{m.age < 35}");
        Ok(())
    }

    #[test]
    fn start_only_and_or_across_neighbor_are_not_pushed() -> Result<()> {
        let start_only = Filter::range(ArithExpr::prop("n", "age"), CompareOp::Gt, ArithExpr::constant(1i64));
        let mut root = expand_plan(start_only);
        assert!(!EdgeFilterPushdownExpand.execute(&mut root, &SchemaInfo::default())?);
        let mixed = Filter::or(
            heavy_edges(),
            Filter::range(ArithExpr::prop("m", "age"), CompareOp::Lt, ArithExpr::constant(35i64)),
        );
        let mut root = expand_plan(mixed);
        assert!(!EdgeFilterPushdownExpand.execute(&mut root, &SchemaInfo::default())?);
        Ok(())
    }

    #[test]
    fn path_predicates_move_into_var_len_expand() -> Result<()> {
        let scan = PhysicalNode::leaf(PhysicalOp::AllNodeScan(NodeScan::all("n")));
        let expand = PhysicalNode::unary(
            PhysicalOp::VarLenExpand(VarLenExpand::new("n", "p", "m", Direction::Out, 1, 3)),
            scan,
        );
        let filter = Filter::and(
            Filter::expr(ArithExpr::func("isAsc", vec![ArithExpr::var("p")])),
            Filter::range(ArithExpr::prop("m", "age"), CompareOp::Gt, ArithExpr::constant(0i64)),
        );
        let mut root = PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(filter)), expand);
        assert!(EdgeFilterPushdownVarLen.execute(&mut root, &SchemaInfo::default())?);
        assert_eq!(shape(&root), vec!["Filter", "VarLenExpand", "AllNodeScan"]);
        match &root.inputs[0].op {
            PhysicalOp::VarLenExpand(expand) => assert_eq!(expand.predicates.len(), 1),
            other => panic!("unexpected child {}", other.name()),
        }
        Ok(())
    }

    #[test]
    fn unsupported_path_functions_are_left_alone() -> Result<()> {
        let scan = PhysicalNode::leaf(PhysicalOp::AllNodeScan(NodeScan::all("n")));
        let expand = PhysicalNode::unary(
            PhysicalOp::VarLenExpand(VarLenExpand::new("n", "p", "m", Direction::Out, 1, 3)),
            scan,
        );
        let filter = Filter::range(
            ArithExpr::func("size", vec![ArithExpr::var("p")]),
            CompareOp::Gt,
            ArithExpr::constant(1i64),
        );
        let mut root = PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(filter)), expand);
        assert!(!EdgeFilterPushdownVarLen.execute(&mut root, &SchemaInfo::default())?);
        Ok(())
    }
}
