//! Process-wide operator timing.
//!
//! Profiling is off unless `PENUMBRA_PROFILE` is set or [`enable_profiling`]
//! runs first (an [`ExecContext`](crate::query::ExecContext) built with
//! `profile = true` does this). Each operator family accumulates the time
//! spent inside its `consume` across every plan the process executes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

const PROFILE_ENV_VAR: &str = "PENUMBRA_PROFILE";

/// Operator families with their own counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QueryProfileKind {
    Scan,
    Expand,
    VarLenExpand,
    Filter,
    Sort,
    Aggregate,
    Traversal,
}

impl QueryProfileKind {
    const COUNT: usize = 7;

    fn slot(self) -> usize {
        self as usize
    }
}

/// Accumulated time and call count of one operator family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperatorTiming {
    /// Nanoseconds spent inside `consume`.
    pub nanos: u64,
    /// Number of timed `consume` calls.
    pub calls: u64,
}

/// Timings per operator family, as returned by [`profile_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryProfileSnapshot {
    /// Label scans, full scans and seeks.
    pub scan: OperatorTiming,
    /// Fixed-length expansion.
    pub expand: OperatorTiming,
    /// Variable-length expansion.
    pub var_len_expand: OperatorTiming,
    /// Filter evaluation.
    pub filter: OperatorTiming,
    /// Sort and top-N materialization.
    pub sort: OperatorTiming,
    /// Group materialization.
    pub aggregate: OperatorTiming,
    /// Parallel traversal runs.
    pub traversal: OperatorTiming,
}

impl QueryProfileSnapshot {
    /// `(family, timing)` pairs in a fixed order, for display.
    pub fn entries(&self) -> [(&'static str, OperatorTiming); 7] {
        [
            ("scan", self.scan),
            ("expand", self.expand),
            ("var_len_expand", self.var_len_expand),
            ("filter", self.filter),
            ("sort", self.sort),
            ("aggregate", self.aggregate),
            ("traversal", self.traversal),
        ]
    }
}

#[derive(Default)]
struct Slot {
    nanos: AtomicU64,
    calls: AtomicU64,
}

impl Slot {
    fn read(&self, reset: bool) -> OperatorTiming {
        let take = |cell: &AtomicU64| {
            if reset {
                cell.swap(0, Ordering::Relaxed)
            } else {
                cell.load(Ordering::Relaxed)
            }
        };
        OperatorTiming {
            nanos: take(&self.nanos),
            calls: take(&self.calls),
        }
    }
}

static ENABLED: OnceLock<bool> = OnceLock::new();
static SLOTS: OnceLock<[Slot; QueryProfileKind::COUNT]> = OnceLock::new();

fn enabled() -> bool {
    *ENABLED.get_or_init(|| std::env::var_os(PROFILE_ENV_VAR).is_some())
}

fn slots() -> Option<&'static [Slot; QueryProfileKind::COUNT]> {
    enabled().then(|| SLOTS.get_or_init(Default::default))
}

/// Turns profiling on for the rest of the process unless the environment
/// already decided. Returns whether profiling is now on.
pub fn enable_profiling() -> bool {
    *ENABLED.get_or_init(|| true)
}

pub(crate) fn profile_timer() -> Option<Instant> {
    enabled().then(Instant::now)
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let (Some(start), Some(slots)) = (start, slots()) else {
        return;
    };
    let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
    let slot = &slots[kind.slot()];
    slot.nanos.fetch_add(nanos, Ordering::Relaxed);
    slot.calls.fetch_add(1, Ordering::Relaxed);
}

/// Current timings, or `None` when profiling is off. `reset` zeroes the
/// counters after reading them.
///
/// ```no_run
/// use penumbra::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("expand calls: {}", snapshot.expand.calls);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let slots = slots()?;
    let read = |kind: QueryProfileKind| slots[kind.slot()].read(reset);
    Some(QueryProfileSnapshot {
        scan: read(QueryProfileKind::Scan),
        expand: read(QueryProfileKind::Expand),
        var_len_expand: read(QueryProfileKind::VarLenExpand),
        filter: read(QueryProfileKind::Filter),
        sort: read(QueryProfileKind::Sort),
        aggregate: read(QueryProfileKind::Aggregate),
        traversal: read(QueryProfileKind::Traversal),
    })
}
