//! Correlated nested loop and its argument hand-off.

use super::{pull_into, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::record::Record;

/// `Apply`: for every row of the left input, rewinds the right input, hands
/// it the row through its `Argument` leaves, and emits each joined row.
#[derive(Clone, Debug, Default)]
pub struct Apply {
    left_live: bool,
}

impl Apply {
    /// Apply over `[left, right]` inputs.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operator for Apply {
    fn initialize(
        &mut self,
        inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        if inputs.len() != 2 {
            return Err(ExecError::internal(format!(
                "Apply expects two inputs, got {}",
                inputs.len()
            )));
        }
        self.left_live = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        let [left, right] = inputs else {
            return Err(ExecError::internal("Apply expects two inputs"));
        };
        loop {
            if !self.left_live {
                if left.consume(ctx)? != OpResult::Ok {
                    return Ok(OpResult::Depleted);
                }
                right.reset_in(false, ctx)?;
                right.feed_argument(&left.record);
                self.left_live = true;
            }
            if right.consume(ctx)? == OpResult::Ok {
                record.copy_from(&left.record);
                record.merge(&right.record);
                return Ok(OpResult::Ok);
            }
            self.left_live = false;
        }
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.left_live = false;
        Ok(())
    }
}

/// `Argument`: leaf that emits the record handed in by an enclosing
/// operator, once per hand-off.
#[derive(Clone, Debug, Default)]
pub struct Argument {
    input: Option<Record>,
    emitted: bool,
}

impl Argument {
    /// Argument with no record yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record to replay.
    pub fn feed(&mut self, record: &Record) {
        match &mut self.input {
            Some(input) => input.copy_from(record),
            None => self.input = Some(record.clone()),
        }
        self.emitted = false;
    }
}

impl Operator for Argument {
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
        if let Some(input) = inputs.first_mut() {
            return Ok(if pull_into(input, record, ctx)? {
                OpResult::Ok
            } else {
                OpResult::Depleted
            });
        }
        if self.emitted {
            return Ok(OpResult::Depleted);
        }
        let Some(input) = &self.input else {
            return Ok(OpResult::Depleted);
        };
        record.copy_from(input);
        self.emitted = true;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        if complete {
            self.input = None;
        }
        self.emitted = false;
        Ok(())
    }
}
