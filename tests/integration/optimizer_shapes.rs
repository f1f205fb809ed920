#![allow(missing_docs)]

mod support;

use penumbra::query::builder::{EdgeSpec, PlanBuilder, ProjectionSpec};
use penumbra::query::expr::ArithExpr;
use penumbra::query::filter::{CompareOp, Filter};
use penumbra::query::optimizer::PassManager;
use penumbra::query::ExecutionPlan;
use penumbra::storage::GraphTxn;
use penumbra::{ExecOptions, Result};

use support::{execute, rows, social};

fn operators(plan: &ExecutionPlan) -> Vec<String> {
    plan.explain().operators()
}

/// Shape before and after the standard passes, the passes that fired, and
/// the rows of both runs (which must agree).
fn optimize(mut plan: ExecutionPlan) -> Result<(Vec<String>, Vec<String>, Vec<&'static str>, Vec<String>)> {
    let mut graph = social();
    let before_shape = operators(&plan);
    let before = rows(&execute(&mut plan, &mut graph)?);
    let passes = plan.optimize(&graph.schema_info(), &ExecOptions::default())?;
    let after = rows(&execute(&mut plan, &mut graph)?);
    assert_eq!(before, after, "rewrite changed the result");
    Ok((before_shape, operators(&plan), passes, after))
}

#[test]
fn ungrouped_count_becomes_relationship_count() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .where_edge("KNOWS", ("q", None))
        .select([(ArithExpr::count_star(), "n")])
        .build()?;
    let (before, after, passes, rows) = optimize(plan)?;
    assert_eq!(before, vec!["ProduceResults", "Aggregate", "ExpandAll", "NodeByLabelScan"]);
    assert_eq!(after, vec!["ProduceResults", "RelationshipCount"]);
    assert_eq!(passes, vec!["CountPushdown"]);
    assert_eq!(rows, vec!["3"]);
    Ok(())
}

#[test]
fn limited_sort_becomes_top_n() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .select(["p.name"])
        .order_by("p.age", true)
        .limit(2)
        .build()?;
    let (before, after, passes, rows) = optimize(plan)?;
    assert_eq!(before, vec!["ProduceResults", "Limit", "Sort", "Project", "NodeByLabelScan"]);
    assert_eq!(after, vec!["ProduceResults", "TopN", "NodeByLabelScan"]);
    assert_eq!(passes, vec!["LazyProjectTopN"]);
    assert_eq!(rows, vec!["cid", "ann"]);
    Ok(())
}

#[test]
fn skip_stays_above_top_n() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .select(["p.name"])
        .order_by("p.age", false)
        .skip(1)
        .limit(2)
        .build()?;
    let (_, after, _, rows) = optimize(plan)?;
    assert_eq!(after, vec!["ProduceResults", "Limit", "Skip", "TopN", "NodeByLabelScan"]);
    assert_eq!(rows, vec!["bob", "ann"]);
    Ok(())
}

#[test]
fn relationship_predicate_moves_into_expand() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("a", "Person"))
        .where_edge(EdgeSpec::new(&["KNOWS"]).named("r"), ("b", None))
        .filter(Filter::range(ArithExpr::prop("r", "since"), CompareOp::Gt, ArithExpr::constant(2005i64)))
        .select(["b.name"])
        .order_by("b.name", false)
        .build()?;
    let (before, after, passes, rows) = optimize(plan)?;
    assert_eq!(before, vec!["ProduceResults", "Sort", "Project", "Filter", "ExpandAll", "NodeByLabelScan"]);
    assert_eq!(after, vec!["ProduceResults", "Sort", "Project", "ExpandAll", "NodeByLabelScan"]);
    assert_eq!(passes, vec!["EdgeFilterPushdownExpand"]);
    assert_eq!(rows, vec!["cid", "dee"]);
    Ok(())
}

#[test]
fn mixed_predicate_keeps_the_remainder() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("a", "Person"))
        .where_edge(EdgeSpec::new(&["KNOWS"]).named("r"), ("b", None))
        .filter(Filter::and(
            Filter::range(ArithExpr::prop("r", "since"), CompareOp::Gt, ArithExpr::constant(2005i64)),
            Filter::range(ArithExpr::prop("b", "age"), CompareOp::Lt, ArithExpr::constant(30i64)),
        ))
        .select(["b.name"])
        .build()?;
    let (_, after, passes, rows) = optimize(plan)?;
    assert_eq!(after, vec!["ProduceResults", "Project", "Filter", "ExpandAll", "NodeByLabelScan"]);
    assert_eq!(passes, vec!["EdgeFilterPushdownExpand"]);
    assert_eq!(rows, vec!["dee"]);
    Ok(())
}

#[test]
fn primary_field_equality_becomes_index_seek() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .with_property("p", "name", "cid")
        .select(["p.age"])
        .build()?;
    let (before, after, passes, rows) = optimize(plan)?;
    assert_eq!(before, vec!["ProduceResults", "Project", "Filter", "NodeByLabelScan"]);
    assert_eq!(after, vec!["ProduceResults", "Project", "NodeIndexSeek"]);
    assert_eq!(passes, vec!["LocateNodeByIndexedProp"]);
    assert_eq!(rows, vec!["42"]);
    Ok(())
}

#[test]
fn unindexed_field_keeps_the_scan() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .with_property("p", "age", 42i64)
        .select(["p.name"])
        .build()?;
    let (_, after, passes, rows) = optimize(plan)?;
    assert_eq!(after, vec!["ProduceResults", "Project", "Filter", "NodeByLabelScan"]);
    assert!(passes.is_empty());
    assert_eq!(rows, vec!["cid"]);
    Ok(())
}

#[test]
fn id_equality_becomes_id_seek() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("p", None))
        .filter(Filter::range(
            ArithExpr::func("id", vec![ArithExpr::var("p")]),
            CompareOp::Eq,
            ArithExpr::constant(2i64),
        ))
        .select(["p.name"])
        .build()?;
    let (_, after, passes, rows) = optimize(plan)?;
    assert_eq!(after, vec!["ProduceResults", "Project", "NodeByIdSeek"]);
    assert_eq!(passes, vec!["LocateNodeByVid"]);
    assert_eq!(rows, vec!["cid"]);
    Ok(())
}

#[test]
fn grouped_path_count_becomes_traversal() -> Result<()> {
    let plan = PlanBuilder::new()
        .r#match(("a", "Person"))
        .where_edge("KNOWS", ("b", None))
        .where_edge("LIVES_IN", ("c", "City"))
        .select([
            ProjectionSpec::from(("c.name", "city")),
            ProjectionSpec::from((ArithExpr::count_star(), "paths")),
        ])
        .order_by("city", false)
        .build()?;
    let (before, after, passes, rows) = optimize(plan)?;
    assert_eq!(
        before,
        vec!["ProduceResults", "Sort", "Aggregate", "ExpandAll", "ExpandAll", "NodeByLabelScan"]
    );
    assert_eq!(after, vec!["ProduceResults", "Sort", "Traversal"]);
    assert_eq!(passes, vec!["ParallelTraversal"]);
    assert_eq!(rows, vec!["oslo,1", "rome,2"]);
    Ok(())
}

#[test]
fn disabled_optimizer_leaves_the_tree() -> Result<()> {
    let mut plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .where_edge("KNOWS", ("q", None))
        .select([(ArithExpr::count_star(), "n")])
        .build()?;
    let before = operators(&plan);
    let options = ExecOptions {
        enable_optimizer: false,
        ..ExecOptions::default()
    };
    assert!(plan.optimize(&social().schema_info(), &options)?.is_empty());
    assert_eq!(operators(&plan), before);
    Ok(())
}

#[test]
fn custom_pass_lists_run_in_order() -> Result<()> {
    let mut plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .select(["p.name"])
        .order_by("p.age", true)
        .limit(1)
        .build()?;
    let passes = PassManager::new().with(penumbra::query::optimizer::CountPushdown);
    assert_eq!(passes.names(), vec!["CountPushdown"]);
    assert!(plan.optimize_with(&passes, &social().schema_info())?.is_empty());
    assert!(operators(&plan).contains(&"Sort".to_string()));
    assert_eq!(PassManager::standard().names().len(), 7);
    Ok(())
}
