use super::{has_nested_plan, rewrite_each, OptPass};
use crate::error::Result;
use crate::query::expr::AggFunc;
use crate::query::filter::Filter;
use crate::query::ops::{PhysicalNode, PhysicalOp, Traversal, TraversalHop};
use crate::storage::SchemaInfo;

/// `Aggregate(count) -> ExpandAll* -> [Filter] -> NodeScan` becomes a
/// parallel [`Traversal`].
///
/// The aggregate is a single non-distinct `count(*)` or `count(v)` over a
/// pattern variable, grouped by nothing or by one property of the last
/// neighbor. Every expansion continues from the previous neighbor, keeps
/// path uniqueness, and has neither an edge filter nor a bound neighbor. A
/// filter between the expansions and the scan may read the start variable
/// only.
pub struct ParallelTraversal;

impl OptPass for ParallelTraversal {
    fn name(&self) -> &'static str {
        "ParallelTraversal"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        rewrite_each(root, &mut |node| {
            let Some(traversal) = match_traversal(node) else {
                return Ok(false);
            };
            *node = PhysicalNode::leaf(PhysicalOp::Traversal(traversal));
            Ok(true)
        })
    }
}

fn match_traversal(node: &PhysicalNode) -> Option<Traversal> {
    let PhysicalOp::Aggregate(aggregate) = &node.op else {
        return None;
    };
    let [item] = aggregate.aggregates.as_slice() else {
        return None;
    };
    let call = item.expr.as_aggregate()?;
    if call.distinct || aggregate.keys.len() > 1 {
        return None;
    }

    // Walk down the expansion chain; hops are collected last-to-first.
    let mut hops = Vec::new();
    let mut bound = Vec::new();
    let mut current = node.inputs.first()?;
    if node.inputs.len() != 1 {
        return None;
    }
    let mut end_alias = None;
    let mut expected_src: Option<&str> = None;
    while let PhysicalOp::ExpandAll(expand) = &current.op {
        if expand.into || expand.edge_filter.is_some() || !expand.path_unique {
            return None;
        }
        if let Some(src) = expected_src {
            if src != expand.dst_alias {
                return None;
            }
        }
        end_alias.get_or_insert(expand.dst_alias.as_str());
        expected_src = Some(expand.src_alias.as_str());
        bound.push(expand.rel_alias.as_str());
        bound.push(expand.dst_alias.as_str());
        hops.push(TraversalHop {
            direction: expand.direction,
            types: expand.types.clone(),
            neighbor_label: expand.neighbor_label.clone(),
        });
        let [input] = current.inputs.as_slice() else {
            return None;
        };
        current = input;
    }
    let (end_alias, start_alias) = (end_alias?, expected_src?);
    hops.reverse();

    let mut start_filter: Option<Filter> = None;
    if let PhysicalOp::Filter(filter_op) = &current.op {
        let aliases = filter_op.filter.aliases();
        if has_nested_plan(&filter_op.filter) || aliases.iter().any(|alias| alias != start_alias) {
            return None;
        }
        start_filter = Some(filter_op.filter.clone());
        let [input] = current.inputs.as_slice() else {
            return None;
        };
        current = input;
    }
    if !current.inputs.is_empty() {
        return None;
    }
    let scan = match &current.op {
        PhysicalOp::AllNodeScan(scan) | PhysicalOp::NodeByLabelScan(scan) => scan,
        _ => return None,
    };
    if scan.alias != start_alias {
        return None;
    }
    bound.push(start_alias);

    match call.func {
        AggFunc::CountStar => {}
        AggFunc::Count => {
            let [arg] = call.args.as_slice() else {
                return None;
            };
            let (alias, None) = arg.as_variable()? else {
                return None;
            };
            if !bound.contains(&alias) {
                return None;
            }
        }
        _ => return None,
    }

    let traversal = Traversal::new(start_alias, scan.label.clone(), hops, end_alias, &item.alias)
        .with_start_filter(start_filter);
    match aggregate.keys.as_slice() {
        [] => Some(traversal),
        [key] => match key.expr.as_variable()? {
            (alias, Some(field)) if alias == end_alias => Some(traversal.with_key(field, &key.alias)),
            _ => None,
        },
        _ => None,
    }
}
