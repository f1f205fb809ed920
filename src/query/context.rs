//! Per-statement runtime state threaded through every operator call.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::ExecOptions;
use crate::query::profile::enable_profiling;
use crate::query::record::ParamTable;
use crate::query::result::{ResultSet, ResultStatistics};
use crate::storage::GraphTxn;
use crate::types::EdgeId;

/// Edges already used by the path currently being matched, per query part.
#[derive(Debug, Default)]
pub struct VisitedEdges {
    parts: FxHashMap<u32, FxHashSet<EdgeId>>,
}

impl VisitedEdges {
    /// True when `edge` is on the current path of `part`.
    pub fn contains(&self, part: u32, edge: EdgeId) -> bool {
        self.parts.get(&part).is_some_and(|set| set.contains(&edge))
    }

    /// Marks `edge` as used; returns false if it already was.
    pub fn insert(&mut self, part: u32, edge: EdgeId) -> bool {
        self.parts.entry(part).or_default().insert(edge)
    }

    /// Releases `edge`; returns false if it was not marked.
    pub fn remove(&mut self, part: u32, edge: EdgeId) -> bool {
        self.parts
            .get_mut(&part)
            .is_some_and(|set| set.remove(&edge))
    }

    /// Number of edges currently marked for `part`.
    pub fn len(&self, part: u32) -> usize {
        self.parts.get(&part).map_or(0, |set| set.len())
    }

    /// Drops every mark.
    pub fn clear(&mut self) {
        self.parts.clear();
    }
}

/// Runtime context for one statement.
pub struct ExecContext<'a> {
    /// Transaction the plan reads from and writes to.
    pub txn: &'a mut dyn GraphTxn,
    /// Bound query parameters.
    pub params: ParamTable,
    /// Execution options.
    pub options: ExecOptions,
    /// Mutation counters for the summary row.
    pub stats: ResultStatistics,
    /// Rows produced by the plan root.
    pub result: ResultSet,
    /// Path-uniqueness bookkeeping.
    pub visited: VisitedEdges,
}

impl<'a> ExecContext<'a> {
    /// Context with default options and no parameters.
    pub fn new(txn: &'a mut dyn GraphTxn) -> Self {
        Self::with_options(txn, ExecOptions::default())
    }

    /// Context with explicit options. `options.profile` switches operator
    /// profiling on for the process.
    pub fn with_options(txn: &'a mut dyn GraphTxn, options: ExecOptions) -> Self {
        if options.profile {
            enable_profiling();
        }
        Self {
            txn,
            params: ParamTable::new(),
            options,
            stats: ResultStatistics::default(),
            result: ResultSet::default(),
            visited: VisitedEdges::default(),
        }
    }

    /// Adds parameters.
    pub fn with_params(mut self, params: ParamTable) -> Self {
        self.params = params;
        self
    }

    /// Read access to the transaction.
    pub fn txn(&self) -> &dyn GraphTxn {
        &*self.txn
    }
}
