//! Sorting: full sort, bounded sort, and the fused top-N.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::project::{items_text, project_into};
use super::{only_input, OpResult, Operator, PhysicalNode, ProjectItem};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;

/// One `ORDER BY` key.
#[derive(Clone, Debug)]
pub struct SortKey {
    /// Key expression, usually a projected variable.
    pub expr: ArithExpr,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending key.
    pub fn asc(expr: ArithExpr) -> Self {
        Self { expr, ascending: true }
    }

    /// Descending key.
    pub fn desc(expr: ArithExpr) -> Self {
        Self { expr, ascending: false }
    }
}

fn keys_text(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|key| format!("{} {}", key.expr, if key.ascending { "ASC" } else { "DESC" }))
        .collect::<Vec<_>>()
        .join(", ")
}

fn compare_keys(a: &[Entry], b: &[Entry], ascending: &[bool]) -> Ordering {
    for ((a, b), asc) in a.iter().zip(b).zip(ascending) {
        let ord = a.sort_cmp(b);
        let ord = if *asc { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Buffered row with its evaluated keys; ordered by keys, then arrival.
#[derive(Debug)]
struct Ranked {
    keys: Vec<Entry>,
    seq: usize,
    record: Record,
    ascending: Arc<[bool]>,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.keys, &other.keys, &self.ascending).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Sort buffer shared by `Sort` and `TopN`: a max-heap of the best `limit`
/// rows when bounded, a plain vector otherwise.
#[derive(Clone, Debug, Default)]
struct SortBuffer {
    rows: Vec<Record>,
    next: usize,
    filled: bool,
}

impl SortBuffer {
    fn fill(
        &mut self,
        keys: &[SortKey],
        limit: Option<usize>,
        input: &mut PhysicalNode,
        ctx: &mut ExecContext<'_>,
        mut prepare: impl FnMut(&ExecContext<'_>, &mut Record) -> Result<()>,
    ) -> Result<()> {
        let start = profile_timer();
        let ascending: Arc<[bool]> = keys.iter().map(|k| k.ascending).collect();
        let mut heap = BinaryHeap::new();
        let mut all = Vec::new();
        let mut seq = 0;
        while input.consume(ctx)? == OpResult::Ok {
            if limit == Some(0) {
                continue;
            }
            let mut record = input.record.clone();
            prepare(ctx, &mut record)?;
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                values.push(key.expr.evaluate(ctx, &record)?);
            }
            let ranked = Ranked {
                keys: values,
                seq,
                record,
                ascending: Arc::clone(&ascending),
            };
            seq += 1;
            match limit {
                Some(limit) => {
                    heap.push(ranked);
                    if heap.len() > limit {
                        heap.pop();
                    }
                }
                None => all.push(ranked),
            }
        }
        let sorted = match limit {
            Some(_) => heap.into_sorted_vec(),
            None => {
                all.sort();
                all
            }
        };
        self.rows = sorted.into_iter().map(|ranked| ranked.record).collect();
        self.next = 0;
        self.filled = true;
        record_profile_timer(QueryProfileKind::Sort, start);
        Ok(())
    }

    fn emit(&mut self, record: &mut Record) -> bool {
        let Some(row) = self.rows.get(self.next) else {
            return false;
        };
        record.copy_from(row);
        self.next += 1;
        true
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// `Sort`: buffers its input and replays it ordered by the keys, ties in
/// arrival order. With a known limit only the best `limit` rows are kept.
#[derive(Clone, Debug)]
pub struct Sort {
    /// Sort keys, most significant first.
    pub keys: Vec<SortKey>,
    /// Rows needed downstream, when known.
    pub limit: Option<usize>,
    buffer: SortBuffer,
}

impl Sort {
    /// Sort on `keys`.
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            limit: None,
            buffer: SortBuffer::default(),
        }
    }

    /// Bounds the buffer to `limit` rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

impl Operator for Sort {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !self.buffer.filled {
            let input = only_input(inputs, "Sort")?;
            self.buffer.fill(&self.keys, self.limit, input, ctx, |_, _| Ok(()))?;
        }
        Ok(if self.buffer.emit(record) {
            OpResult::Ok
        } else {
            OpResult::Depleted
        })
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.keys
            .iter_mut()
            .try_for_each(|key| key.expr.realign_alias_id(symbols))
    }

    fn details(&self) -> String {
        match self.limit {
            Some(limit) => format!("{} limit {limit}", keys_text(&self.keys)),
            None => keys_text(&self.keys),
        }
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.keys.iter().map(|key| &key.expr).collect()
    }
}

/// `TopN`: projects what the keys need, keeps the best `limit` rows, and
/// only then evaluates the remaining projections on the survivors.
#[derive(Clone, Debug)]
pub struct TopN {
    /// Projections evaluated before ranking.
    pub pre: Vec<ProjectItem>,
    /// Sort keys.
    pub keys: Vec<SortKey>,
    /// Rows kept.
    pub limit: usize,
    /// Projections evaluated on emitted rows only.
    pub post: Vec<ProjectItem>,
    buffer: SortBuffer,
}

impl TopN {
    /// Top `limit` rows by `keys`.
    pub fn new(pre: Vec<ProjectItem>, keys: Vec<SortKey>, limit: usize, post: Vec<ProjectItem>) -> Self {
        Self {
            pre,
            keys,
            limit,
            post,
            buffer: SortBuffer::default(),
        }
    }
}

impl Operator for TopN {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if !self.buffer.filled {
            let input = only_input(inputs, "TopN")?;
            let pre = &self.pre;
            self.buffer.fill(&self.keys, Some(self.limit), input, ctx, |ctx, record| {
                project_into(pre, ctx, record)
            })?;
        }
        if !self.buffer.emit(record) {
            return Ok(OpResult::Depleted);
        }
        project_into(&self.post, ctx, record)?;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        for item in self.pre.iter_mut().chain(self.post.iter_mut()) {
            item.realign(symbols)?;
        }
        self.keys
            .iter_mut()
            .try_for_each(|key| key.expr.realign_alias_id(symbols))
    }

    fn details(&self) -> String {
        let mut out = format!("{} limit {}", keys_text(&self.keys), self.limit);
        if !self.pre.is_empty() {
            out.push_str(&format!(" pre [{}]", items_text(&self.pre)));
        }
        if !self.post.is_empty() {
            out.push_str(&format!(" post [{}]", items_text(&self.post)));
        }
        out
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.pre
            .iter()
            .map(|item| &item.expr)
            .chain(self.keys.iter().map(|key| &key.expr))
            .chain(self.post.iter().map(|item| &item.expr))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{drain, people, symbols};
    use super::super::{NodeScan, PhysicalOp, Project};
    use super::*;
    use crate::query::symbol_table::SymbolType;

    fn table() -> Arc<SymbolTable> {
        symbols(&[
            ("n", SymbolType::Node),
            ("age", SymbolType::Constant),
            ("name", SymbolType::Constant),
        ])
    }

    fn projected() -> PhysicalNode {
        let scan = PhysicalNode::leaf(PhysicalOp::AllNodeScan(NodeScan::all("n")));
        PhysicalNode::unary(
            PhysicalOp::Project(Project::new(vec![
                ProjectItem::new(ArithExpr::prop("n", "age"), "age"),
                ProjectItem::new(ArithExpr::prop("n", "name"), "name"),
            ])),
            scan,
        )
    }

    #[test]
    fn full_sort_is_stable() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let sort = Sort::new(vec![SortKey::desc(ArithExpr::var("age"))]);
        let mut node = PhysicalNode::unary(PhysicalOp::Sort(sort), projected());
        node.attach_symbols(&table())?;
        let rows = drain(&mut node, &mut ctx)?;
        let names: Vec<_> = rows.iter().map(|r| r.rsplit(',').next().unwrap_or_default().to_string()).collect();
        // cities have no age and tie; they keep scan order
        assert_eq!(names.len(), 5);
        let persons: Vec<_> = names.iter().filter(|n| ["ann", "bob", "cid"].contains(&n.as_str())).collect();
        assert_eq!(persons, vec!["cid", "ann", "bob"]);
        let cities: Vec<_> = names.iter().filter(|n| ["oslo", "rome"].contains(&n.as_str())).collect();
        assert_eq!(cities, vec!["oslo", "rome"]);
        Ok(())
    }

    #[test]
    fn bounded_sort_matches_the_head_of_a_full_sort() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let keys = vec![SortKey::asc(ArithExpr::var("name"))];
        let mut full = PhysicalNode::unary(PhysicalOp::Sort(Sort::new(keys.clone())), projected());
        full.attach_symbols(&table())?;
        let all = drain(&mut full, &mut ctx)?;
        let mut bounded = PhysicalNode::unary(
            PhysicalOp::Sort(Sort::new(keys).with_limit(Some(2))),
            projected(),
        );
        bounded.attach_symbols(&table())?;
        assert_eq!(drain(&mut bounded, &mut ctx)?, all[..2].to_vec());
        Ok(())
    }

    #[test]
    fn top_n_defers_post_projection() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")));
        let top = TopN::new(
            vec![ProjectItem::new(ArithExpr::prop("n", "age"), "age")],
            vec![SortKey::asc(ArithExpr::var("age"))],
            2,
            vec![ProjectItem::new(ArithExpr::prop("n", "name"), "name")],
        );
        let mut node = PhysicalNode::unary(PhysicalOp::TopN(top), scan);
        node.attach_symbols(&table())?;
        assert_eq!(drain(&mut node, &mut ctx)?, vec!["V[1],25,bob", "V[0],31,ann"]);
        Ok(())
    }
}
