use std::collections::BTreeSet;

use super::{rewrite_each, OptPass};
use crate::error::{ExecError, Result};
use crate::query::ops::{PhysicalNode, PhysicalOp, ProjectItem, Skip, TopN};
use crate::storage::SchemaInfo;

/// `Limit -> [Skip] -> Sort -> Project` becomes `[Limit -> Skip ->] TopN`.
///
/// Only the projections the sort keys read are evaluated before ranking; the
/// others run on the surviving rows. With a `Skip`, the `TopN` keeps
/// `limit + skip` rows and the paging operators stay on top.
pub struct LazyProjectTopN;

impl OptPass for LazyProjectTopN {
    fn name(&self) -> &'static str {
        "LazyProjectTopN"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        rewrite_each(root, &mut |node| {
            let Some((limit, skip)) = match_shape(node) else {
                return Ok(false);
            };
            let mut limit_node = node.take();
            let Some(below_limit) = limit_node.inputs.pop() else {
                return Err(shape_changed());
            };
            let sort_node = match skip {
                Some(_) => below_limit.inputs.into_iter().next(),
                None => Some(below_limit),
            };
            let Some(mut sort_node) = sort_node else {
                return Err(shape_changed());
            };
            let Some(project_node) = sort_node.inputs.pop() else {
                return Err(shape_changed());
            };
            let (PhysicalOp::Sort(sort), PhysicalOp::Project(project)) = (sort_node.op, project_node.op) else {
                return Err(shape_changed());
            };
            let needed: BTreeSet<String> = sort.keys.iter().flat_map(|key| key.expr.aliases()).collect();
            let (pre, post): (Vec<ProjectItem>, Vec<ProjectItem>) =
                project.items.into_iter().partition(|item| needed.contains(&item.alias));
            let keep = limit + skip.unwrap_or(0);
            let top = PhysicalNode::new(PhysicalOp::TopN(TopN::new(pre, sort.keys, keep, post)), project_node.inputs);
            *node = match skip {
                Some(skip) => PhysicalNode::unary(
                    limit_node.op,
                    PhysicalNode::unary(PhysicalOp::Skip(Skip::new(skip)), top),
                ),
                None => top,
            };
            Ok(true)
        })
    }
}

fn shape_changed() -> ExecError {
    ExecError::internal("LazyProjectTopN matched a subtree it could not take apart")
}

fn match_shape(node: &PhysicalNode) -> Option<(usize, Option<usize>)> {
    let PhysicalOp::Limit(limit) = &node.op else {
        return None;
    };
    let [below] = node.inputs.as_slice() else {
        return None;
    };
    let (skip, sort_node) = match &below.op {
        PhysicalOp::Skip(skip) => (Some(skip.skip), below.inputs.first()?),
        _ => (None, below),
    };
    if !matches!(sort_node.op, PhysicalOp::Sort(_)) || sort_node.inputs.len() != 1 {
        return None;
    }
    let project_node = &sort_node.inputs[0];
    if !matches!(project_node.op, PhysicalOp::Project(_)) || project_node.inputs.len() != 1 {
        return None;
    }
    Some((limit.limit, skip))
}
