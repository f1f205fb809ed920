#![allow(missing_docs)]

mod support;

use penumbra::query::builder::{EdgeSpec, PlanBuilder, ProjectionSpec};
use penumbra::query::expr::ArithExpr;
use penumbra::query::record::ParamTable;
use penumbra::query::{ExecContext, FieldData};
use penumbra::storage::{GraphTxn, MemoryGraph};
use penumbra::types::Direction;
use penumbra::{ExecOptions, Result};
use serde_json::json;

use support::{execute, execute_both, rows, social};

fn friends_within_two_hops() -> Result<penumbra::query::ExecutionPlan> {
    PlanBuilder::new()
        .r#match(("a", "Person"))
        .with_property("a", "name", "ann")
        .where_edge(EdgeSpec::new(&["KNOWS"]).hops(1, 2), ("b", None))
        .select(["b.name"])
        .order_by("b.name", false)
        .build()
}

#[test]
fn variable_length_friends() -> Result<()> {
    let mut graph = social();
    let (rows, _) = execute_both(friends_within_two_hops()?, &mut graph)?;
    assert_eq!(rows, vec!["bob", "cid"]);
    Ok(())
}

#[test]
fn exact_hop_count() -> Result<()> {
    let mut graph = social();
    let plan = PlanBuilder::new()
        .r#match(("a", "Person"))
        .with_property("a", "name", "ann")
        .where_edge(EdgeSpec::new(&["KNOWS"]).hops(3, 3), ("b", None))
        .select(["b.name"])
        .build()?;
    let (rows, _) = execute_both(plan, &mut graph)?;
    assert_eq!(rows, vec!["dee"]);
    Ok(())
}

#[test]
fn parameter_seeks_the_primary_index() -> Result<()> {
    let mut graph = social();
    let mut plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .with_property_param("p", "name", "who")
        .select([("p.age", "age")])
        .build()?;
    let passes = plan.optimize(&graph.schema_info(), &ExecOptions::default())?;
    assert_eq!(passes, vec!["LocateNodeByIndexedProp"]);
    assert!(plan.explain().operators().contains(&"NodeIndexSeek".to_string()));

    let mut params = ParamTable::new();
    params.insert("who".into(), FieldData::from("cid"));
    let mut ctx = ExecContext::new(&mut graph).with_params(params);
    let result = plan.execute(&mut ctx)?;
    assert_eq!(result.header, vec!["age"]);
    assert_eq!(result.column("age"), Some(vec![FieldData::Int(42)]));

    let mut ctx = ExecContext::new(&mut graph);
    let err = plan.execute(&mut ctx).err();
    assert_eq!(err.map(|e| e.code()), Some("INPUT_ERROR"));
    Ok(())
}

#[test]
fn incoming_edges_grouped_by_city() -> Result<()> {
    let mut graph = social();
    let plan = PlanBuilder::new()
        .r#match(("c", "City"))
        .direction(Direction::In)
        .where_edge("LIVES_IN", "Person")
        .select([
            ProjectionSpec::from(("c.name", "city")),
            ProjectionSpec::from((ArithExpr::count_star(), "residents")),
        ])
        .order_by("city", false)
        .build()?;
    let (rows, _) = execute_both(plan, &mut graph)?;
    assert_eq!(rows, vec!["oslo,2", "rome,2"]);
    Ok(())
}

#[test]
fn both_directions_reach_either_neighbor() -> Result<()> {
    let mut graph = social();
    let plan = PlanBuilder::new()
        .r#match(("a", "Person"))
        .with_property("a", "name", "bob")
        .bidirectional()
        .where_edge("KNOWS", ("b", "Person"))
        .select(["b.name"])
        .order_by("b.name", false)
        .build()?;
    let (rows, _) = execute_both(plan, &mut graph)?;
    assert_eq!(rows, vec!["ann", "cid"]);
    Ok(())
}

#[test]
fn null_tests_on_missing_fields() -> Result<()> {
    let mut graph = social();
    let plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .where_var("p", |p| {
            p.is_null("email");
        })
        .select(["p.name"])
        .order_by("p.name", false)
        .build()?;
    let (rows, _) = execute_both(plan, &mut graph)?;
    assert_eq!(rows, vec!["bob", "dee"]);
    Ok(())
}

#[test]
fn distinct_then_paging() -> Result<()> {
    let mut graph = social();
    let cities = || {
        PlanBuilder::new()
            .r#match(("p", "Person"))
            .where_edge("LIVES_IN", ("c", "City"))
            .select(["c.name"])
            .distinct()
            .order_by("c.name", false)
    };
    let (all, _) = execute_both(cities().build()?, &mut graph)?;
    assert_eq!(all, vec!["oslo", "rome"]);
    let (paged, _) = execute_both(cities().skip(1).limit(5).build()?, &mut graph)?;
    assert_eq!(paged, vec!["rome"]);
    Ok(())
}

#[test]
fn results_render_as_json() -> Result<()> {
    let mut graph = social();
    let mut plan = friends_within_two_hops()?;
    let result = execute(&mut plan, &mut graph)?;
    assert_eq!(result.to_json(), json!([{ "b.name": "bob" }, { "b.name": "cid" }]));
    Ok(())
}

#[test]
fn plans_rerun_without_rebuilding() -> Result<()> {
    let mut graph = social();
    let mut plan = friends_within_two_hops()?;
    let first = rows(&execute(&mut plan, &mut graph)?);
    let second = rows(&execute(&mut plan, &mut graph)?);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn access_summary_lists_what_the_plan_touches() -> Result<()> {
    let plan = friends_within_two_hops()?;
    let access = plan.access_summary();
    assert!(access.labels.contains("Person"));
    assert!(access.relationship_types.contains("KNOWS"));
    assert!(access.fields.contains(&("a".to_string(), "name".to_string())));
    assert!(access.fields.contains(&("b".to_string(), "name".to_string())));
    assert!(access.aliases.contains("a") && access.aliases.contains("b"));
    assert!(!access.writes);
    assert!(plan.is_read_only());
    Ok(())
}

#[test]
fn distinct_keys_follow_the_configured_null_marker() -> Result<()> {
    let mut graph = MemoryGraph::new();
    graph.insert_vertex("N", []);
    graph.insert_vertex("N", [("v", FieldData::from("NULL"))]);
    graph.insert_vertex("N", [("v", FieldData::from("__null__"))]);
    let mut plan = PlanBuilder::new()
        .r#match(("n", "N"))
        .select([("n.v", "v")])
        .distinct()
        .build()?;
    let options = ExecOptions {
        null_marker: "NULL".to_string(),
        ..ExecOptions::default()
    };
    let mut ctx = ExecContext::with_options(&mut graph, options);
    let result = plan.execute(&mut ctx)?;
    assert_eq!(rows(&result), vec!["null", "__null__"]);
    Ok(())
}
