//! Graph fixture shared by the integration tests.
#![allow(dead_code)]

use penumbra::query::{ExecContext, ExecutionPlan, FieldData, ResultSet};
use penumbra::storage::{GraphTxn, MemoryGraph};
use penumbra::{ExecOptions, Result};

/// Four people in a chain and two cities.
///
/// ```text
/// ann(31) -KNOWS-> bob(25) -KNOWS-> cid(42) -KNOWS-> dee(19)
/// ann, cid -LIVES_IN-> oslo      bob, dee -LIVES_IN-> rome
/// ```
///
/// Only ann and cid carry an `email`. `Person.name` is the primary field.
pub fn social() -> MemoryGraph {
    let mut graph = MemoryGraph::new().with_label("Person", Some("name"));
    let person = |graph: &mut MemoryGraph, name: &str, age: i64, email: Option<&str>| {
        let mut props = vec![("name", FieldData::from(name)), ("age", FieldData::Int(age))];
        if let Some(email) = email {
            props.push(("email", FieldData::from(email)));
        }
        graph.insert_vertex("Person", props)
    };
    let ann = person(&mut graph, "ann", 31, Some("ann@example.org"));
    let bob = person(&mut graph, "bob", 25, None);
    let cid = person(&mut graph, "cid", 42, Some("cid@example.org"));
    let dee = person(&mut graph, "dee", 19, None);
    let oslo = graph.insert_vertex("City", [("name", FieldData::from("oslo"))]);
    let rome = graph.insert_vertex("City", [("name", FieldData::from("rome"))]);
    graph.insert_edge(ann, bob, "KNOWS", [("since", FieldData::Int(2001))]);
    graph.insert_edge(bob, cid, "KNOWS", [("since", FieldData::Int(2010))]);
    graph.insert_edge(cid, dee, "KNOWS", [("since", FieldData::Int(2015))]);
    graph.insert_edge(ann, oslo, "LIVES_IN", []);
    graph.insert_edge(bob, rome, "LIVES_IN", []);
    graph.insert_edge(cid, oslo, "LIVES_IN", []);
    graph.insert_edge(dee, rome, "LIVES_IN", []);
    graph
}

/// Rows joined by commas, nulls shown as `null`.
pub fn rows(result: &ResultSet) -> Vec<String> {
    result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.render("null")).collect::<Vec<_>>().join(","))
        .collect()
}

/// Executes `plan` against `graph` with default options.
pub fn execute(plan: &mut ExecutionPlan, graph: &mut MemoryGraph) -> Result<ResultSet> {
    let mut ctx = ExecContext::new(graph);
    plan.execute(&mut ctx)
}

/// Runs `plan` as built and again after the standard passes; both runs must
/// agree. Returns the rows and the names of the passes that fired.
pub fn execute_both(mut plan: ExecutionPlan, graph: &mut MemoryGraph) -> Result<(Vec<String>, Vec<&'static str>)> {
    let before = rows(&execute(&mut plan, graph)?);
    let passes = plan.optimize(&graph.schema_info(), &ExecOptions::default())?;
    let after = rows(&execute(&mut plan, graph)?);
    assert_eq!(before, after, "optimized plan changed the result");
    Ok((after, passes))
}
