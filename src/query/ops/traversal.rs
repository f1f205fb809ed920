//! Parallel frontier traversal with grouped counts.

use dashmap::DashMap;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use super::expand::relationship_text;
use super::scan::aligned;
use super::{OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::filter::Filter;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;
use crate::storage::GraphTxn;
use crate::types::{Direction, EdgeId, VertexId};

/// One hop of a [`Traversal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalHop {
    /// Direction walked.
    pub direction: Direction,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// Label required on the reached vertex.
    pub neighbor_label: Option<String>,
}

#[derive(Clone, Debug)]
struct Group {
    key: FieldData,
    count: u64,
    first: (usize, usize),
}

/// `Traversal`: counts the paths of a fixed chain of hops from every start
/// vertex, grouped by a property of the last vertex.
///
/// Start vertices are selected (label and optional filter) on the calling
/// thread. Their frontiers are then expanded hop by hop on the rayon pool,
/// never reusing an edge within one path, and the per-key counts are merged
/// into a concurrent map. Groups are replayed in the order a serial
/// start-by-start walk would first reach them.
#[derive(Clone, Debug)]
pub struct Traversal {
    /// Start variable.
    pub start_alias: String,
    /// Label of the start vertices.
    pub start_label: Option<String>,
    /// Predicate on the start vertex.
    pub start_filter: Option<Filter>,
    /// Hops in order.
    pub hops: Vec<TraversalHop>,
    /// Variable of the last vertex, for explain output.
    pub end_alias: String,
    /// Grouping property of the last vertex.
    pub key_field: Option<String>,
    /// Output variable holding the grouping value.
    pub key_alias: Option<String>,
    /// Output variable holding the count.
    pub count_alias: String,
    start_column: Option<usize>,
    count_column: Option<usize>,
    key_column: Option<usize>,
    rows: Vec<(u64, FieldData)>,
    next: usize,
    filled: bool,
}

impl Traversal {
    /// Count of the `hops` paths from `start_alias`, written to `count_alias`.
    pub fn new(
        start_alias: &str,
        start_label: Option<String>,
        hops: Vec<TraversalHop>,
        end_alias: &str,
        count_alias: &str,
    ) -> Self {
        Self {
            start_alias: start_alias.to_string(),
            start_label,
            start_filter: None,
            hops,
            end_alias: end_alias.to_string(),
            key_field: None,
            key_alias: None,
            count_alias: count_alias.to_string(),
            start_column: None,
            count_column: None,
            key_column: None,
            rows: Vec::new(),
            next: 0,
            filled: false,
        }
    }

    /// Groups by `end.field`, written to `alias`.
    pub fn with_key(mut self, field: &str, alias: &str) -> Self {
        self.key_field = Some(field.to_string());
        self.key_alias = Some(alias.to_string());
        self
    }

    /// Restricts the start vertices.
    pub fn with_start_filter(mut self, filter: Option<Filter>) -> Self {
        self.start_filter = filter;
        self
    }

    fn starts(&mut self, record: &mut Record, ctx: &mut ExecContext<'_>) -> Result<Vec<VertexId>> {
        let column = aligned(self.start_column, &self.start_alias)?;
        let candidates = ctx.txn().scan_vertices(self.start_label.as_deref())?;
        let Some(filter) = self.start_filter.as_mut() else {
            return Ok(candidates);
        };
        let mut out = Vec::with_capacity(candidates.len());
        for vid in candidates {
            record.set(column, Entry::node(None, vid))?;
            if filter.do_filter(ctx, record)? {
                out.push(vid);
            }
        }
        record.set(column, Entry::Unknown)?;
        Ok(out)
    }

    fn fill(&mut self, record: &mut Record, ctx: &mut ExecContext<'_>) -> Result<()> {
        let start = profile_timer();
        let starts = self.starts(record, ctx)?;
        let groups: DashMap<String, Group> = DashMap::new();
        let null_marker = ctx.options.null_marker.as_str();
        let txn = ctx.txn();
        let (hops, key_field) = (self.hops.as_slice(), self.key_field.as_deref());
        let run = || {
            starts.par_iter().enumerate().try_for_each(|(index, vid)| -> Result<()> {
                for (position, key) in walk(txn, hops, key_field, *vid)?.into_iter().enumerate() {
                    let order = (index, position);
                    groups
                        .entry(key.render(null_marker))
                        .and_modify(|group| {
                            group.count += 1;
                            group.first = group.first.min(order);
                        })
                        .or_insert(Group {
                            key,
                            count: 1,
                            first: order,
                        });
                }
                Ok(())
            })
        };
        let threads = ctx.options.parallel_traversal_threads;
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|err| ExecError::internal(format!("traversal pool: {err}")))?
                .install(run)?;
        } else {
            run()?;
        }
        let mut groups: Vec<Group> = groups.into_iter().map(|(_, group)| group).collect();
        groups.sort_by_key(|group| group.first);
        self.rows = groups.into_iter().map(|group| (group.count, group.key)).collect();
        if self.key_field.is_none() && self.rows.is_empty() {
            self.rows.push((0, FieldData::Null));
        }
        debug!(starts = starts.len(), groups = self.rows.len(), "traversal finished");
        self.filled = true;
        record_profile_timer(QueryProfileKind::Traversal, start);
        Ok(())
    }
}

/// Ends of every path from `start`, as grouping values in walk order.
fn walk(
    txn: &dyn GraphTxn,
    hops: &[TraversalHop],
    key_field: Option<&str>,
    start: VertexId,
) -> Result<Vec<FieldData>> {
    let mut frontier: Vec<(VertexId, SmallVec<[EdgeId; 4]>)> = vec![(start, SmallVec::new())];
    for hop in hops {
        let mut next = Vec::new();
        for (vid, used) in &frontier {
            for edge in txn.edges(*vid, hop.direction, &hop.types)? {
                if used.contains(&edge.uid.id) {
                    continue;
                }
                let neighbor = edge.uid.other_end(*vid);
                if let Some(label) = &hop.neighbor_label {
                    if &txn.vertex_label(neighbor)? != label {
                        continue;
                    }
                }
                let mut path = used.clone();
                path.push(edge.uid.id);
                next.push((neighbor, path));
            }
        }
        frontier = next;
    }
    frontier
        .into_iter()
        .map(|(vid, _)| match key_field {
            Some(field) => txn.vertex_field(vid, field),
            None => Ok(FieldData::Null),
        })
        .collect()
}

impl Operator for Traversal {
    fn initialize(
        &mut self,
        inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        if !inputs.is_empty() {
            return Err(ExecError::internal("Traversal is a leaf operator"));
        }
        self.rows.clear();
        self.next = 0;
        self.filled = false;
        Ok(())
    }

    fn consume(
        &mut self,
        _inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !self.filled {
            self.fill(record, ctx)?;
        }
        let Some((count, key)) = self.rows.get(self.next) else {
            return Ok(OpResult::Depleted);
        };
        record.set(aligned(self.count_column, &self.count_alias)?, Entry::constant(*count as i64))?;
        if let (Some(column), Some(_)) = (self.key_column, &self.key_field) {
            record.set(column, Entry::Constant(key.clone()))?;
        }
        self.next += 1;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.rows.clear();
        self.next = 0;
        self.filled = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.start_column = Some(symbols.column(&self.start_alias, "Traversal")?);
        self.count_column = Some(symbols.column(&self.count_alias, "Traversal")?);
        self.key_column = match &self.key_alias {
            Some(alias) => Some(symbols.column(alias, "Traversal")?),
            None => None,
        };
        if let Some(filter) = self.start_filter.as_mut() {
            filter.realign_alias_id(symbols)?;
        }
        Ok(())
    }

    fn details(&self) -> String {
        let mut out = format!(
            "({}{})",
            self.start_alias,
            self.start_label.as_deref().map(|l| format!(":{l}")).unwrap_or_default()
        );
        for (i, hop) in self.hops.iter().enumerate() {
            out.push_str(&relationship_text("", &hop.types, hop.direction, None));
            let alias = if i + 1 == self.hops.len() { self.end_alias.as_str() } else { "" };
            let label = hop.neighbor_label.as_deref().map(|l| format!(":{l}")).unwrap_or_default();
            out.push_str(&format!("({alias}{label})"));
        }
        out.push_str(&format!(" count AS {}", self.count_alias));
        if let (Some(field), Some(alias)) = (&self.key_field, &self.key_alias) {
            out.push_str(&format!(" BY {}.{field} AS {alias}", self.end_alias));
        }
        if let Some(filter) = &self.start_filter {
            out.push_str(&format!(" WHERE {filter}"));
        }
        out
    }

    fn filters(&self) -> Vec<&Filter> {
        self.start_filter.iter().collect()
    }

    fn filters_mut(&mut self) -> Vec<&mut Filter> {
        self.start_filter.iter_mut().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{drain, people, symbols};
    use super::super::PhysicalOp;
    use super::*;
    use crate::config::ExecOptions;
    use crate::query::expr::ArithExpr;
    use crate::query::filter::CompareOp;
    use crate::query::symbol_table::SymbolType;

    fn hop(types: &[&str]) -> TraversalHop {
        TraversalHop {
            direction: Direction::Out,
            types: types.iter().map(|t| t.to_string()).collect(),
            neighbor_label: None,
        }
    }

    fn run(traversal: Traversal, options: ExecOptions) -> Result<Vec<String>> {
        let mut graph = people();
        let mut ctx = ExecContext::with_options(&mut graph, options);
        let mut node = PhysicalNode::leaf(PhysicalOp::Traversal(traversal));
        node.attach_symbols(&symbols(&[
            ("a", SymbolType::Node),
            ("cnt", SymbolType::Constant),
            ("key", SymbolType::Constant),
        ]))?;
        drain(&mut node, &mut ctx)
    }

    #[test]
    fn groups_follow_serial_first_seen_order() -> Result<()> {
        let traversal = Traversal::new(
            "a",
            Some("Person".into()),
            vec![hop(&["KNOWS"]), hop(&["LIVES_IN"])],
            "c",
            "cnt",
        )
        .with_key("name", "key");
        assert_eq!(run(traversal, ExecOptions::default())?, vec!["null,1,rome", "null,1,oslo"]);
        Ok(())
    }

    #[test]
    fn dedicated_pool_gives_the_same_counts() -> Result<()> {
        let traversal = Traversal::new("a", Some("Person".into()), vec![hop(&["LIVES_IN"])], "c", "cnt")
            .with_key("name", "key");
        let options = ExecOptions {
            parallel_traversal_threads: 2,
            ..ExecOptions::default()
        };
        assert_eq!(run(traversal, options)?, vec!["null,2,oslo", "null,1,rome"]);
        Ok(())
    }

    #[test]
    fn ungrouped_count_and_start_filter() -> Result<()> {
        let traversal = Traversal::new("a", Some("Person".into()), vec![hop(&[])], "c", "cnt")
            .with_start_filter(Some(Filter::range(
                ArithExpr::prop("a", "age"),
                CompareOp::Gt,
                ArithExpr::constant(30i64),
            )));
        assert_eq!(run(traversal, ExecOptions::default())?, vec!["null,3,null"]);

        let none = Traversal::new("a", Some("Robot".into()), vec![hop(&[])], "c", "cnt");
        assert_eq!(run(none, ExecOptions::default())?, vec!["null,0,null"]);
        Ok(())
    }

    #[test]
    fn explain_lists_the_hops() {
        let traversal = Traversal::new(
            "a",
            Some("Person".into()),
            vec![hop(&["KNOWS"]), hop(&["LIVES_IN"])],
            "c",
            "cnt",
        )
        .with_key("name", "key");
        assert_eq!(
            traversal.details(),
            "(a:Person)-[:KNOWS]->()-[:LIVES_IN]->(c) count AS cnt BY c.name AS key"
        );
    }
}
