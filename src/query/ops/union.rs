//! Concatenation of several inputs.

use rustc_hash::FxHashSet;

use super::{pull_into, OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::record::Record;
use crate::query::symbol_table::SymbolTable;

/// `Union` / `UnionAll`: drains the inputs in order. Without `all`, rows
/// whose output columns render identically are emitted once.
#[derive(Clone, Debug)]
pub struct Union {
    /// Keep duplicates.
    pub all: bool,
    /// Output variables shared by every branch.
    pub aliases: Vec<String>,
    columns: Vec<usize>,
    current: usize,
    seen: FxHashSet<String>,
}

impl Union {
    /// Union over `aliases`.
    pub fn new(aliases: Vec<String>, all: bool) -> Self {
        Self {
            all,
            aliases,
            columns: Vec::new(),
            current: 0,
            seen: FxHashSet::default(),
        }
    }

    fn key(&self, record: &Record, null_marker: &str) -> Result<String> {
        let mut parts = Vec::with_capacity(self.columns.len());
        for &column in &self.columns {
            parts.push(record.get(column)?.render(null_marker));
        }
        Ok(parts.join(","))
    }
}

impl Operator for Union {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.current = 0;
        self.seen.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        while let Some(input) = inputs.get_mut(self.current) {
            if !pull_into(input, record, ctx)? {
                self.current += 1;
                continue;
            }
            if self.all {
                return Ok(OpResult::Ok);
            }
            let key = self.key(record, &ctx.options.null_marker)?;
            if self.seen.insert(key) {
                return Ok(OpResult::Ok);
            }
        }
        Ok(OpResult::Depleted)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.current = 0;
        self.seen.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.columns = self
            .aliases
            .iter()
            .map(|alias| symbols.column(alias, "Union"))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn details(&self) -> String {
        let kind = if self.all { "ALL " } else { "" };
        format!("{kind}{}", self.aliases.join(", "))
    }
}
