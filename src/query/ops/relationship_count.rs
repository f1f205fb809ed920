use super::expand::relationship_text;
use super::{OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::storage::EdgeCountSpec;

/// `RelationshipCount`: answers `count(r)` over a single-hop pattern with
/// one storage call and emits the total as a single row.
#[derive(Clone, Debug)]
pub struct RelationshipCount {
    /// Output variable holding the count.
    pub alias: String,
    /// Start variable, for explain output.
    pub src_alias: String,
    /// Neighbor variable, for explain output.
    pub dst_alias: String,
    /// Labels, types and direction of the counted edges.
    pub spec: EdgeCountSpec,
    column: Option<usize>,
    emitted: bool,
}

impl RelationshipCount {
    /// Count of the edges described by `spec`, written to `alias`.
    pub fn new(alias: &str, src: &str, dst: &str, spec: EdgeCountSpec) -> Self {
        Self {
            alias: alias.to_string(),
            src_alias: src.to_string(),
            dst_alias: dst.to_string(),
            spec,
            column: None,
            emitted: false,
        }
    }
}

impl Operator for RelationshipCount {
    fn initialize(
        &mut self,
        inputs: &mut [PhysicalNode],
        _record: &mut Record,
        _ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        if !inputs.is_empty() {
            return Err(ExecError::internal("RelationshipCount is a leaf operator"));
        }
        self.emitted = false;
        Ok(())
    }

    fn consume(
        &mut self,
        _inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if self.emitted {
            return Ok(OpResult::Depleted);
        }
        let column = super::scan::aligned(self.column, &self.alias)?;
        let count = ctx.txn().count_edges(&self.spec)?;
        record.set(column, Entry::constant(count as i64))?;
        self.emitted = true;
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.column = Some(symbols.column(&self.alias, "RelationshipCount")?);
        Ok(())
    }

    fn details(&self) -> String {
        let label = |l: &Option<String>| l.as_deref().map(|l| format!(":{l}")).unwrap_or_default();
        format!(
            "({}{}){}({}{}) AS {}",
            self.src_alias,
            label(&self.spec.start_label),
            relationship_text("", &self.spec.types, self.spec.direction, None),
            self.dst_alias,
            label(&self.spec.neighbor_label),
            self.alias
        )
    }
}
