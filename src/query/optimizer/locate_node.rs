use super::edge_filter_pushdown::replace_filter;
use super::{equality_operand, has_nested_plan, rewrite_each, OptPass};
use crate::error::Result;
use crate::query::expr::ArithExpr;
use crate::query::filter::Filter;
use crate::query::ops::{IdSeek, IndexSeek, NodeScan, PhysicalNode, PhysicalOp};
use crate::storage::SchemaInfo;

/// Scan under a `Filter`, with the conjunct picked by `locate` and the
/// operator that replaces the scan.
struct Located {
    conjunct: usize,
    seek: PhysicalOp,
}

/// Shared driver: `Filter -> scan` where one conjunct pins the scanned
/// vertex. The scan becomes the seek returned by `locate`, keeping its
/// inputs; the other conjuncts stay in the `Filter`.
fn locate_under_filter(
    root: &mut PhysicalNode,
    locate: &dyn Fn(&NodeScan, bool, &Filter) -> Option<PhysicalOp>,
) -> Result<bool> {
    rewrite_each(root, &mut |node| {
        let (PhysicalOp::Filter(filter_op), [child]) = (&node.op, node.inputs.as_slice()) else {
            return Ok(false);
        };
        let scan = match &child.op {
            PhysicalOp::AllNodeScan(scan) | PhysicalOp::NodeByLabelScan(scan) => scan,
            _ => return Ok(false),
        };
        let has_input = !child.inputs.is_empty();
        let conjuncts = filter_op.filter.clone().into_conjuncts();
        let found = conjuncts.iter().enumerate().find_map(|(conjunct, part)| {
            if has_nested_plan(part) {
                return None;
            }
            locate(scan, has_input, part).map(|seek| Located { conjunct, seek })
        });
        let Some(Located { conjunct, seek }) = found else {
            return Ok(false);
        };
        let kept = conjuncts
            .into_iter()
            .enumerate()
            .filter_map(|(i, part)| (i != conjunct).then_some(part))
            .collect();
        replace_filter(node, kept, |op| *op = seek);
        Ok(true)
    })
}

/// A seek value must not read the sought variable, and without an input it
/// may not read any variable at all.
fn usable(value: &ArithExpr, has_input: bool) -> bool {
    has_input || value.aliases().is_empty()
}

/// `Filter(id(n) = v) -> NodeScan(n)` becomes `NodeByIdSeek`. `id(n) IN list`
/// seeks every listed id.
pub struct LocateNodeByVid;

impl OptPass for LocateNodeByVid {
    fn name(&self) -> &'static str {
        "LocateNodeByVid"
    }

    fn execute(&self, root: &mut PhysicalNode, _schema: &SchemaInfo) -> Result<bool> {
        locate_under_filter(root, &|scan, has_input, part| {
            let is_id = |expr: &ArithExpr| {
                expr.as_func().is_some_and(|call| {
                    call.name.eq_ignore_ascii_case("id")
                        && matches!(call.args.as_slice(), [arg] if arg.as_variable() == Some((scan.alias.as_str(), None)))
                })
            };
            let value = equality_operand(part, &scan.alias, &is_id)?;
            if !usable(value, has_input) {
                return None;
            }
            let seek = IdSeek::new(&scan.alias, scan.label.as_deref(), value.clone()).with_node(scan.node);
            Some(PhysicalOp::NodeByIdSeek(seek))
        })
    }
}

/// `Filter(n.f = v) -> NodeByLabelScan(n:L)` becomes `NodeIndexSeek` when
/// `L.f` is indexed. `n.f IN list` seeks every listed value.
pub struct LocateNodeByIndexedProp;

impl OptPass for LocateNodeByIndexedProp {
    fn name(&self) -> &'static str {
        "LocateNodeByIndexedProp"
    }

    fn execute(&self, root: &mut PhysicalNode, schema: &SchemaInfo) -> Result<bool> {
        locate_under_filter(root, &|scan, has_input, part| {
            let label = scan.label.as_deref()?;
            let mut field = None;
            let is_indexed_prop = |expr: &ArithExpr| match expr.as_variable() {
                Some((alias, Some(property))) => alias == scan.alias && schema.is_indexed(label, property),
                _ => false,
            };
            let value = equality_operand(part, &scan.alias, &is_indexed_prop)?;
            if !usable(value, has_input) {
                return None;
            }
            if let Filter::Range { lhs, rhs, .. } | Filter::TestIn { lhs, rhs, .. } = part {
                field = [lhs, rhs]
                    .into_iter()
                    .find(|side| is_indexed_prop(*side))
                    .and_then(|side| side.as_variable())
                    .and_then(|(_, property)| property.map(str::to_string));
            }
            let seek = IndexSeek::new(&scan.alias, label, &field?, value.clone()).with_node(scan.node);
            Some(PhysicalOp::NodeIndexSeek(seek))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{run, shape, table};
    use super::*;
    use crate::query::filter::CompareOp;
    use crate::query::ops::FilterOp;
    use crate::query::symbol_table::SymbolType;
    use crate::query::value::FieldData;
    use crate::storage::MemoryGraph;

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new()
            .with_label("Person", Some("name"))
            .with_index("Person", "age");
        for (name, age) in [("ann", 31), ("bob", 25), ("cid", 31)] {
            graph.insert_vertex("Person", [("name", FieldData::from(name)), ("age", FieldData::Int(age))]);
        }
        graph.insert_vertex("City", [("name", FieldData::from("oslo"))]);
        graph
    }

    fn filtered_scan(scan: PhysicalOp, filter: Filter) -> PhysicalNode {
        PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(filter)), PhysicalNode::leaf(scan))
    }

    fn symbols() -> std::sync::Arc<crate::query::symbol_table::SymbolTable> {
        table(&[("n", SymbolType::Node)])
    }

    #[test]
    fn id_equality_becomes_id_seek() -> Result<()> {
        let mut graph = graph();
        let filter = || {
            Filter::range(
                ArithExpr::func("id", vec![ArithExpr::var("n")]),
                CompareOp::Eq,
                ArithExpr::constant(1i64),
            )
        };
        let before = run(filtered_scan(PhysicalOp::AllNodeScan(NodeScan::all("n")), filter()), &symbols(), &mut graph)?;
        let mut root = filtered_scan(PhysicalOp::AllNodeScan(NodeScan::all("n")), filter());
        assert!(LocateNodeByVid.execute(&mut root, &SchemaInfo::default())?);
        assert_eq!(shape(&root), vec!["NodeByIdSeek"]);
        assert_eq!(run(root, &symbols(), &mut graph)?, before);
        assert_eq!(before, vec!["V[1]"]);
        Ok(())
    }

    #[test]
    fn id_membership_keeps_remaining_conjuncts() -> Result<()> {
        let mut graph = graph();
        let filter = Filter::and(
            Filter::test_in(
                ArithExpr::func("id", vec![ArithExpr::var("n")]),
                ArithExpr::constant(FieldData::Array(vec![FieldData::Int(0), FieldData::Int(2), FieldData::Int(3)])),
            ),
            Filter::range(ArithExpr::prop("n", "age"), CompareOp::Eq, ArithExpr::constant(31i64)),
        );
        let mut root = filtered_scan(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")), filter);
        assert!(LocateNodeByVid.execute(&mut root, &SchemaInfo::default())?);
        assert_eq!(shape(&root), vec!["Filter", "NodeByIdSeek"]);
        assert_eq!(run(root, &symbols(), &mut graph)?, vec!["V[0]", "V[2]"]);
        Ok(())
    }

    #[test]
    fn indexed_property_becomes_index_seek() -> Result<()> {
        let mut graph = graph();
        let schema = crate::storage::GraphTxn::schema_info(&graph);
        let filter = || Filter::range(ArithExpr::constant(31i64), CompareOp::Eq, ArithExpr::prop("n", "age"));
        let scan = || PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person"));
        let before = run(filtered_scan(scan(), filter()), &symbols(), &mut graph)?;
        let mut root = filtered_scan(scan(), filter());
        assert!(LocateNodeByIndexedProp.execute(&mut root, &schema)?);
        assert_eq!(shape(&root), vec!["NodeIndexSeek"]);
        match &root.op {
            PhysicalOp::NodeIndexSeek(seek) => assert_eq!((seek.label.as_str(), seek.field.as_str()), ("Person", "age")),
            other => panic!("unexpected root {}", other.name()),
        }
        assert_eq!(run(root, &symbols(), &mut graph)?, before);
        assert_eq!(before, vec!["V[0]", "V[2]"]);
        Ok(())
    }

    #[test]
    fn unindexed_or_unlabeled_scans_stay() -> Result<()> {
        let graph = graph();
        let schema = crate::storage::GraphTxn::schema_info(&graph);
        let nick = Filter::range(ArithExpr::prop("n", "nick"), CompareOp::Eq, ArithExpr::constant("x"));
        let mut root = filtered_scan(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")), nick);
        assert!(!LocateNodeByIndexedProp.execute(&mut root, &schema)?);
        let name = Filter::range(ArithExpr::prop("n", "name"), CompareOp::Eq, ArithExpr::constant("ann"));
        let mut root = filtered_scan(PhysicalOp::AllNodeScan(NodeScan::all("n")), name);
        assert!(!LocateNodeByIndexedProp.execute(&mut root, &schema)?);
        Ok(())
    }

    #[test]
    fn values_reading_other_variables_need_an_input() -> Result<()> {
        let graph = graph();
        let schema = crate::storage::GraphTxn::schema_info(&graph);
        let dynamic = Filter::range(ArithExpr::prop("n", "name"), CompareOp::Eq, ArithExpr::prop("m", "name"));
        let mut root = filtered_scan(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")), dynamic);
        assert!(!LocateNodeByIndexedProp.execute(&mut root, &schema)?);
        Ok(())
    }
}
