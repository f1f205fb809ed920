//! Nested-loop product of independent inputs.

use super::{OpResult, Operator, PhysicalNode};
use crate::error::Result;
use crate::query::context::ExecContext;
use crate::query::record::Record;

/// `CartesianProduct`: every combination of one row from each input.
///
/// Enumeration is an odometer with the first input varying fastest: it is
/// pulled until depleted, then the next input advances by one row and every
/// earlier input is rewound and pulled from its start again.
#[derive(Clone, Debug, Default)]
pub struct CartesianProduct {
    primed: bool,
}

impl CartesianProduct {
    /// Product over the node's inputs.
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(inputs: &mut [PhysicalNode], ctx: &mut ExecContext<'_>) -> Result<bool> {
        for i in 0..inputs.len() {
            if inputs[i].consume(ctx)? != OpResult::Ok {
                continue;
            }
            for earlier in &mut inputs[..i] {
                earlier.reset_in(false, ctx)?;
                if earlier.consume(ctx)? != OpResult::Ok {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }
}

impl Operator for CartesianProduct {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.primed = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if inputs.is_empty() {
            return Ok(OpResult::Depleted);
        }
        let produced = if self.primed {
            Self::advance(inputs, ctx)?
        } else {
            self.primed = true;
            let mut all = true;
            for input in inputs.iter_mut() {
                if input.consume(ctx)? != OpResult::Ok {
                    all = false;
                    break;
                }
            }
            all
        };
        if !produced {
            return Ok(OpResult::Depleted);
        }
        record.copy_from(&inputs[0].record);
        for input in &inputs[1..] {
            record.merge(&input.record);
        }
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.primed = false;
        Ok(())
    }
}
