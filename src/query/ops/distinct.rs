use rustc_hash::FxHashSet;

use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::record::Record;
use crate::query::symbol_table::SymbolTable;

/// `Distinct`: drops rows already seen.
///
/// Rows are compared by the rendered text of the chosen columns, so values
/// of different kinds that print the same (`1` and `'1'`) collapse into one
/// row.
#[derive(Clone, Debug)]
pub struct Distinct {
    /// Variables forming the key.
    pub aliases: Vec<String>,
    columns: Vec<usize>,
    seen: FxHashSet<String>,
}

impl Distinct {
    /// Distinct over `aliases`.
    pub fn new(aliases: Vec<String>) -> Self {
        Self {
            aliases,
            columns: Vec::new(),
            seen: FxHashSet::default(),
        }
    }

    fn key(&self, record: &Record, null_marker: &str) -> Result<String> {
        let mut key = String::new();
        for (i, &column) in self.columns.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(&record.get(column)?.render(null_marker));
        }
        Ok(key)
    }
}

impl Operator for Distinct {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.seen.clear();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let input = only_input(inputs, "Distinct")?;
        while pull_into(input, record, ctx)? {
            let key = self.key(record, &ctx.options.null_marker)?;
            if self.seen.insert(key) {
                return Ok(OpResult::Ok);
            }
        }
        Ok(OpResult::Depleted)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.seen.clear();
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.columns = self
            .aliases
            .iter()
            .map(|alias| symbols.column(alias, "Distinct"))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn details(&self) -> String {
        self.aliases.join(", ")
    }
}
