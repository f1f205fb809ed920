#![allow(missing_docs)]

mod support;

use std::collections::BTreeSet;

use penumbra::query::builder::{PlanBuilder, ProjectionSpec};
use penumbra::query::expr::{AggFunc, ArithExpr};
use penumbra::query::{ExecutionPlan, FieldData};
use penumbra::storage::{GraphTxn, MemoryGraph};
use penumbra::ExecOptions;
use proptest::prelude::*;

use support::{execute, rows};

fn numbers(values: &[i64]) -> MemoryGraph {
    let mut graph = MemoryGraph::new();
    for value in values {
        graph.insert_vertex("N", [("v", FieldData::Int(*value))]);
    }
    graph
}

fn values_of(plan: PlanBuilder) -> PlanBuilder {
    plan.r#match(("n", "N")).select([("n.v", "v")])
}

fn run(mut plan: ExecutionPlan, graph: &mut MemoryGraph) -> Vec<i64> {
    let result = execute(&mut plan, graph).expect("plan runs");
    result
        .column("v")
        .expect("v column")
        .into_iter()
        .map(|value| match value {
            FieldData::Int(v) => v,
            other => panic!("unexpected value {other:?}"),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sort_orders_every_row(values in prop::collection::vec(-50i64..50, 0..40), descending in any::<bool>()) {
        let mut graph = numbers(&values);
        let plan = values_of(PlanBuilder::new()).order_by("v", descending).build().expect("plan builds");
        let sorted = run(plan, &mut graph);
        let mut expected = values.clone();
        expected.sort_unstable();
        if descending {
            expected.reverse();
        }
        prop_assert_eq!(sorted, expected);
    }

    #[test]
    fn skip_and_limit_bound_the_row_count(
        values in prop::collection::vec(0i64..10, 0..30),
        skip in 0usize..35,
        limit in 0usize..35,
    ) {
        let mut graph = numbers(&values);
        let plan = values_of(PlanBuilder::new()).skip(skip).limit(limit).build().expect("plan builds");
        let paged = run(plan, &mut graph);
        prop_assert_eq!(paged.len(), values.len().saturating_sub(skip).min(limit));
        prop_assert_eq!(&paged[..], &values[skip.min(values.len())..][..paged.len()]);
    }

    #[test]
    fn distinct_emits_each_value_once(values in prop::collection::vec(0i64..8, 0..40)) {
        let mut graph = numbers(&values);
        let plan = values_of(PlanBuilder::new()).distinct().build().expect("plan builds");
        let unique = run(plan, &mut graph);
        let as_set: BTreeSet<i64> = unique.iter().copied().collect();
        prop_assert_eq!(as_set.len(), unique.len());
        prop_assert_eq!(as_set, values.iter().copied().collect::<BTreeSet<_>>());
    }

    #[test]
    fn top_n_matches_full_sort(values in prop::collection::vec(-20i64..20, 0..40), limit in 1usize..10) {
        let mut graph = numbers(&values);
        let build = || values_of(PlanBuilder::new()).order_by("n.v", true).limit(limit).build().expect("plan builds");
        let full = run(build(), &mut graph);
        let mut optimized = build();
        let passes = optimized.optimize(&graph.schema_info(), &ExecOptions::default()).expect("passes run");
        prop_assert_eq!(passes, vec!["LazyProjectTopN"]);
        prop_assert_eq!(run(optimized, &mut graph), full);
    }

    #[test]
    fn aggregates_match_a_fold(values in prop::collection::vec(-1000i64..1000, 1..40)) {
        let mut graph = numbers(&values);
        let mut plan = PlanBuilder::new()
            .r#match(("n", "N"))
            .select([
                ProjectionSpec::from((ArithExpr::count_star(), "rows")),
                ProjectionSpec::from((ArithExpr::aggregate_call(AggFunc::Sum, false, vec![ArithExpr::prop("n", "v")]), "total")),
                ProjectionSpec::from((ArithExpr::aggregate_call(AggFunc::Min, false, vec![ArithExpr::prop("n", "v")]), "low")),
                ProjectionSpec::from((ArithExpr::aggregate_call(AggFunc::Max, false, vec![ArithExpr::prop("n", "v")]), "high")),
            ])
            .build()
            .expect("plan builds");
        let result = execute(&mut plan, &mut graph).expect("plan runs");
        let expected = format!(
            "{},{},{},{}",
            values.len(),
            values.iter().sum::<i64>(),
            values.iter().min().copied().unwrap_or_default(),
            values.iter().max().copied().unwrap_or_default(),
        );
        prop_assert_eq!(rows(&result), vec![expected]);
    }
}
