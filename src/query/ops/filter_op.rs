use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::filter::Filter;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::record::Record;
use crate::query::symbol_table::SymbolTable;

/// `Filter`: passes input rows satisfying the predicate.
#[derive(Clone, Debug)]
pub struct FilterOp {
    /// Predicate tree.
    pub filter: Filter,
}

impl FilterOp {
    /// Filter on `filter`.
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }
}

impl Operator for FilterOp {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let input = only_input(inputs, "Filter")?;
        while pull_into(input, record, ctx)? {
            let start = profile_timer();
            let passed = self.filter.do_filter(ctx, record);
            record_profile_timer(QueryProfileKind::Filter, start);
            if passed? {
                return Ok(OpResult::Ok);
            }
        }
        Ok(OpResult::Depleted)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.filter.realign_alias_id(symbols)
    }

    fn details(&self) -> String {
        self.filter.to_string()
    }

    fn filters(&self) -> Vec<&Filter> {
        vec![&self.filter]
    }

    fn filters_mut(&mut self) -> Vec<&mut Filter> {
        vec![&mut self.filter]
    }
}
