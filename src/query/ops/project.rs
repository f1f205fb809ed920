//! Expression projection.

use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::record::Record;
use crate::query::symbol_table::SymbolTable;

/// `expr AS alias`.
#[derive(Clone, Debug)]
pub struct ProjectItem {
    /// Projected expression.
    pub expr: ArithExpr,
    /// Output variable.
    pub alias: String,
    column: Option<usize>,
}

impl ProjectItem {
    /// `expr AS alias`.
    pub fn new(expr: ArithExpr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.to_string(),
            column: None,
        }
    }

    /// Output column, once aligned.
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub(crate) fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "projection")?);
        self.expr.realign_alias_id(symbols)
    }
}

/// Evaluates every item against `record`, then writes the results, so an
/// item may read a column another item overwrites.
pub(crate) fn project_into(
    items: &[ProjectItem],
    ctx: &ExecContext<'_>,
    record: &mut Record,
) -> Result<()> {
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let column = item.column.ok_or_else(|| {
            ExecError::internal(format!("projection '{}' was never aligned", item.alias))
        })?;
        values.push((column, item.expr.evaluate(ctx, record)?));
    }
    for (column, value) in values {
        record.set(column, value)?;
    }
    Ok(())
}

pub(crate) fn items_text(items: &[ProjectItem]) -> String {
    items
        .iter()
        .map(|item| {
            let expr = item.expr.to_string();
            if expr == item.alias {
                expr
            } else {
                format!("{expr} AS {}", item.alias)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `Project`: evaluates a fixed list of expressions per input row. Without
/// an input it emits a single row.
#[derive(Clone, Debug)]
pub struct Project {
    /// Projected items.
    pub items: Vec<ProjectItem>,
    emitted: bool,
}

impl Project {
    /// Projection of `items`.
    pub fn new(items: Vec<ProjectItem>) -> Self {
        Self {
            items,
            emitted: false,
        }
    }
}

impl Operator for Project {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if inputs.is_empty() {
            if self.emitted {
                return Ok(OpResult::Depleted);
            }
            self.emitted = true;
        } else if !pull_into(only_input(inputs, "Project")?, record, ctx)? {
            return Ok(OpResult::Depleted);
        }
        project_into(&self.items, ctx, record)?;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.items.iter_mut().try_for_each(|item| item.realign(symbols))
    }

    fn details(&self) -> String {
        items_text(&self.items)
    }

    fn expressions(&self) -> Vec<&ArithExpr> {
        self.items.iter().map(|item| &item.expr).collect()
    }
}
