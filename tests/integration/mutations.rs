#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use penumbra::query::builder::PlanBuilder;
use penumbra::query::expr::ArithExpr;
use penumbra::query::filter::{CompareOp, Filter};
use penumbra::query::ops::{
    Create, CreateNode, CreateRel, Delete, FilterOp, Limit, Merge, MergeTarget, NodeScan, PhysicalNode, PhysicalOp,
    ProduceResults, Remove, RemoveItem, SetItem, SetOp,
};
use penumbra::query::symbol_table::{SymbolScope, SymbolTable, SymbolType};
use penumbra::query::{ExecutionPlan, FieldData, ResultStatistics};
use penumbra::storage::{GraphTxn, MemoryGraph};
use penumbra::types::VertexId;
use penumbra::Result;

use support::{execute, rows, social};

/// Write statement rooted at a summary-producing root.
fn statement(body: PhysicalNode, columns: &[(&str, SymbolType)]) -> Result<ExecutionPlan> {
    let mut table = SymbolTable::new();
    for (alias, ty) in columns {
        table.add(alias, *ty, SymbolScope::Local);
    }
    let root = PhysicalNode::unary(PhysicalOp::ProduceResults(ProduceResults::summary()), body);
    ExecutionPlan::new(root, Arc::new(table))
}

/// `MATCH (p:Person) WHERE <filter>`.
fn people_where(filter: Filter) -> PhysicalNode {
    PhysicalNode::unary(
        PhysicalOp::Filter(FilterOp::new(filter)),
        PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("p", "Person"))),
    )
}

fn named(name: &str) -> Filter {
    Filter::range(ArithExpr::prop("p", "name"), CompareOp::Eq, ArithExpr::constant(name))
}

fn names_where(graph: &mut MemoryGraph, field: &str) -> Result<Vec<String>> {
    let mut plan = PlanBuilder::new()
        .r#match(("p", "Person"))
        .where_var("p", |p| {
            p.is_not_null(field);
        })
        .select(["p.name"])
        .order_by("p.name", false)
        .build()?;
    Ok(rows(&execute(&mut plan, graph)?))
}

#[test]
fn create_reports_a_summary_row() -> Result<()> {
    let mut graph = social();
    let create = Create::new(
        vec![
            CreateNode::new("a", "Person").with_property("name", ArithExpr::constant("eve")),
            CreateNode::new("b", "City").with_property("name", ArithExpr::constant("paris")),
        ],
        vec![CreateRel::new("r", "a", "b", "LIVES_IN")],
    );
    let mut plan = statement(
        PhysicalNode::leaf(PhysicalOp::Create(create)),
        &[("a", SymbolType::Node), ("b", SymbolType::Node), ("r", SymbolType::Relationship)],
    )?;
    assert!(!plan.is_read_only());
    assert!(plan.access_summary().writes);

    let result = execute(&mut plan, &mut graph)?;
    assert_eq!(result.header, ResultStatistics::HEADER.map(str::to_string).to_vec());
    assert_eq!(rows(&result), vec!["2,0,1,0,2"]);
    assert_eq!(graph.vertex_count(), 8);
    assert_eq!(graph.edge_count(), 8);
    assert_eq!(graph.vertex_field(VertexId(6), "name")?, FieldData::from("eve"));
    Ok(())
}

#[test]
fn set_updates_every_matched_vertex() -> Result<()> {
    let mut graph = social();
    let young = Filter::range(ArithExpr::prop("p", "age"), CompareOp::Lt, ArithExpr::constant(30i64));
    let set = SetOp::new(vec![SetItem::property("p", "junior", ArithExpr::constant(true))]);
    let mut plan = statement(
        PhysicalNode::unary(PhysicalOp::Set(set), people_where(young)),
        &[("p", SymbolType::Node)],
    )?;
    assert_eq!(rows(&execute(&mut plan, &mut graph)?), vec!["0,0,0,0,2"]);
    assert_eq!(names_where(&mut graph, "junior")?, vec!["bob", "dee"]);
    Ok(())
}

#[test]
fn remove_counts_only_present_properties() -> Result<()> {
    let mut graph = social();
    let remove = Remove::new(vec![RemoveItem::new("p", "email")]);
    let every = Filter::range(ArithExpr::prop("p", "age"), CompareOp::Gt, ArithExpr::constant(0i64));
    let mut plan = statement(
        PhysicalNode::unary(PhysicalOp::Remove(remove), people_where(every)),
        &[("p", SymbolType::Node)],
    )?;
    assert_eq!(rows(&execute(&mut plan, &mut graph)?), vec!["0,0,0,0,2"]);
    assert!(names_where(&mut graph, "email")?.is_empty());
    Ok(())
}

#[test]
fn detach_delete_removes_incident_edges() -> Result<()> {
    let mut graph = social();
    let delete = Delete::new(vec!["p".to_string()], true);
    let mut plan = statement(
        PhysicalNode::unary(PhysicalOp::Delete(delete), people_where(named("cid"))),
        &[("p", SymbolType::Node)],
    )?;
    assert_eq!(rows(&execute(&mut plan, &mut graph)?), vec!["0,1,0,3,0"]);
    assert_eq!(graph.vertex_count(), 5);
    assert_eq!(graph.edge_count(), 4);
    assert!(!graph.vertex_exists(VertexId(2)));
    Ok(())
}

#[test]
fn plain_delete_refuses_attached_vertices() -> Result<()> {
    let mut graph = social();
    let delete = Delete::new(vec!["p".to_string()], false);
    let mut plan = statement(
        PhysicalNode::unary(PhysicalOp::Delete(delete), people_where(named("cid"))),
        &[("p", SymbolType::Node)],
    )?;
    let err = execute(&mut plan, &mut graph).err();
    assert_eq!(err.map(|e| e.code()), Some("INPUT_ERROR"));
    assert_eq!(graph.vertex_count(), 6);
    assert_eq!(graph.edge_count(), 7);
    Ok(())
}

#[test]
fn limited_delete_still_applies_the_whole_batch() -> Result<()> {
    let mut graph = social();
    let cities = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("c", "City")));
    let delete = PhysicalNode::unary(PhysicalOp::Delete(Delete::new(vec!["c".to_string()], true)), cities);
    let limited = PhysicalNode::unary(PhysicalOp::Limit(Limit::new(1)), delete);
    let mut plan = statement(limited, &[("c", SymbolType::Node)])?;
    assert_eq!(rows(&execute(&mut plan, &mut graph)?), vec!["0,2,0,4,0"]);
    assert_eq!(graph.vertex_count(), 4);
    assert_eq!(graph.edge_count(), 3);
    assert!(!graph.vertex_exists(VertexId(4)));
    assert!(!graph.vertex_exists(VertexId(5)));
    Ok(())
}

#[test]
fn merge_matches_before_creating() -> Result<()> {
    let mut graph = social();
    let merge = |name: &str| -> Result<ExecutionPlan> {
        let target = CreateNode::new("p", "Person").with_property("name", ArithExpr::constant(name));
        let merge = Merge::new(MergeTarget::Node(target))
            .on_match(vec![SetItem::property("p", "seen", ArithExpr::constant(true))])
            .on_create(vec![SetItem::property("p", "age", ArithExpr::constant(30i64))]);
        statement(PhysicalNode::leaf(PhysicalOp::Merge(merge)), &[("p", SymbolType::Node)])
    };
    execute(&mut merge("ann")?, &mut graph)?;
    assert_eq!(graph.vertex_count(), 6);
    assert_eq!(names_where(&mut graph, "seen")?, vec!["ann"]);

    let result = execute(&mut merge("fay")?, &mut graph)?;
    assert_eq!(result.column("<SUMMARY>.vertices_created"), Some(vec![FieldData::Int(1)]));
    assert_eq!(graph.vertex_count(), 7);
    assert_eq!(graph.vertex_field(VertexId(6), "age")?, FieldData::Int(30));
    Ok(())
}

#[test]
fn read_only_transactions_reject_writes() -> Result<()> {
    let mut graph = social();
    graph.set_read_only(true);
    let create = Create::new(vec![CreateNode::new("a", "Person")], Vec::new());
    let mut plan = statement(PhysicalNode::leaf(PhysicalOp::Create(create)), &[("a", SymbolType::Node)])?;
    let err = execute(&mut plan, &mut graph).err();
    assert_eq!(err.map(|e| e.code()), Some("INPUT_ERROR"));
    assert_eq!(graph.vertex_count(), 6);
    Ok(())
}
