use super::{rewrite_each, OptPass};
use crate::error::Result;
use crate::query::expr::AggFunc;
use crate::query::ops::{PhysicalNode, PhysicalOp, RelationshipCount};
use crate::storage::{EdgeCountSpec, SchemaInfo};

/// `Aggregate(count) -> ExpandAll -> NodeScan` becomes `RelationshipCount`.
///
/// Applies to an ungrouped single `count(*)` or `count(v)` where `v` is one
/// of the pattern's variables (never null), over a plain expansion with no
/// edge filter starting from an input-less scan.
pub struct CountPushdown;

impl OptPass for CountPushdown {
    fn name(&self) -> &'static str {
        "CountPushdown"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        rewrite_each(root, &mut |node| {
            let Some(count) = match_count(node) else {
                return Ok(false);
            };
            *node = PhysicalNode::leaf(PhysicalOp::RelationshipCount(count));
            Ok(true)
        })
    }
}

fn match_count(node: &PhysicalNode) -> Option<RelationshipCount> {
    let PhysicalOp::Aggregate(aggregate) = &node.op else {
        return None;
    };
    let [item] = aggregate.aggregates.as_slice() else {
        return None;
    };
    if !aggregate.keys.is_empty() {
        return None;
    }
    let call = item.expr.as_aggregate()?;
    if call.distinct {
        return None;
    }
    let [expand_node] = node.inputs.as_slice() else {
        return None;
    };
    let PhysicalOp::ExpandAll(expand) = &expand_node.op else {
        return None;
    };
    if expand.into || expand.edge_filter.is_some() {
        return None;
    }
    match call.func {
        AggFunc::CountStar => {}
        AggFunc::Count => {
            let [arg] = call.args.as_slice() else {
                return None;
            };
            let (alias, None) = arg.as_variable()? else {
                return None;
            };
            if ![&expand.src_alias, &expand.rel_alias, &expand.dst_alias]
                .iter()
                .any(|bound| bound.as_str() == alias)
            {
                return None;
            }
        }
        _ => return None,
    }
    let [scan_node] = expand_node.inputs.as_slice() else {
        return None;
    };
    if !scan_node.inputs.is_empty() {
        return None;
    }
    let scan = match &scan_node.op {
        PhysicalOp::AllNodeScan(scan) | PhysicalOp::NodeByLabelScan(scan) => scan,
        _ => return None,
    };
    if scan.alias != expand.src_alias {
        return None;
    }
    let spec = EdgeCountSpec {
        start_label: scan.label.clone(),
        neighbor_label: expand.neighbor_label.clone(),
        types: expand.types.clone(),
        direction: expand.direction,
    };
    Some(RelationshipCount::new(
        &item.alias,
        &expand.src_alias,
        &expand.dst_alias,
        spec,
    ))
}
