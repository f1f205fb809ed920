#![forbid(unsafe_code)]

//! Pattern-query execution core.
//!
//! A bound query arrives as a [`symbol_table::SymbolTable`], a
//! [`pattern_graph::PatternGraph`] and expression trees. The
//! [`builder::PlanBuilder`] assembles them into an operator tree, the
//! [`optimizer::PassManager`] rewrites that tree, and
//! [`plan::ExecutionPlan`] pulls it record by record against a
//! [`crate::storage::GraphTxn`].

/// Variables generated for unnamed pattern elements start with this prefix.
pub const ANONYMOUS_PREFIX: &str = "__anon_";

/// Plan assembly from a bound pattern.
pub mod builder;

/// Runtime context threaded through every operator.
pub mod context;

/// Arithmetic expression trees and their evaluator.
pub mod expr;

/// Boolean predicate trees.
pub mod filter;

/// Physical operators and the pull protocol.
pub mod ops;

/// Rule-based rewrites of the operator tree.
pub mod optimizer;

/// Declared match patterns with stable node and relationship ids.
pub mod pattern_graph;

/// Executable plan: execute, explain, access summary.
pub mod plan;

/// Thread-safe LRU cache of prepared plan shapes.
pub mod plan_cache;

/// Performance profiling for query operations.
///
/// Collects timing and count statistics to identify performance bottlenecks.
pub mod profile;

/// Records, entries and paths.
pub mod record;

/// Result rows and write statistics.
pub mod result;

/// Variable to column mapping.
pub mod symbol_table;

/// Scalar values shared with storage.
pub mod value;

pub use context::ExecContext;
pub use plan::{AccessSummary, ExecutionPlan, PlanExplain};
pub use record::{Entry, Record};
pub use result::{ResultSet, ResultStatistics};
pub use value::FieldData;
