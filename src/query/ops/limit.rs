use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::record::Record;

/// `Limit`: passes at most `limit` rows, then stops pulling its input.
#[derive(Clone, Debug)]
pub struct Limit {
    /// Maximum number of rows.
    pub limit: usize,
    consumed: usize,
}

impl Limit {
    /// Limit to `limit` rows.
    pub fn new(limit: usize) -> Self {
        Self { limit, consumed: 0 }
    }
}

impl Operator for Limit {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.consumed = 0;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if self.consumed >= self.limit {
            return Ok(OpResult::Depleted);
        }
        if !pull_into(only_input(inputs, "Limit")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        self.consumed += 1;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.consumed = 0;
        Ok(())
    }

    fn details(&self) -> String {
        self.limit.to_string()
    }
}

/// `Skip`: drops the first `skip` rows.
#[derive(Clone, Debug)]
pub struct Skip {
    /// Rows to drop.
    pub skip: usize,
    skipped: usize,
}

impl Skip {
    /// Skip `skip` rows.
    pub fn new(skip: usize) -> Self {
        Self { skip, skipped: 0 }
    }
}

impl Operator for Skip {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.skipped = 0;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let input = only_input(inputs, "Skip")?;
        while self.skipped < self.skip {
            if !pull_into(input, record, ctx)? {
                return Ok(OpResult::Depleted);
            }
            self.skipped += 1;
        }
        Ok(if pull_into(input, record, ctx)? {
            OpResult::Ok
        } else {
            OpResult::Depleted
        })
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.skipped = 0;
        Ok(())
    }

    fn details(&self) -> String {
        self.skip.to_string()
    }
}
