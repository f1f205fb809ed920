use tracing::debug;

use super::{only_input, pull_into, OpResult, Operator, PhysicalNode};
use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::record::{Entry, Record};
use crate::query::result::ResultStatistics;
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;

/// Result value of one record column. Graph entities become their
/// `V[..]`/`E[..]` text.
fn result_value(entry: &Entry) -> FieldData {
    match entry {
        Entry::Constant(value) => value.clone(),
        Entry::NodeSnapshot(text) | Entry::RelSnapshot(text) => FieldData::String(text.clone()),
        other if other.equal_null() => FieldData::Null,
        other => FieldData::String(other.render("")),
    }
}

/// `ProduceResults`: plan root. Appends one result row per input record to
/// `ctx.result`, or, for write statements, drains the input and appends a
/// single statistics row.
#[derive(Clone, Debug)]
pub struct ProduceResults {
    /// `(header, alias)` per output column.
    pub columns: Vec<(String, String)>,
    /// Emit the statistics row instead of the input rows.
    pub summary: bool,
    indices: Vec<usize>,
    done: bool,
}

impl ProduceResults {
    /// Root producing `columns` in order.
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self {
            columns,
            summary: false,
            indices: Vec::new(),
            done: false,
        }
    }

    /// Root of a write statement.
    pub fn summary() -> Self {
        Self {
            summary: true,
            ..Self::new(Vec::new())
        }
    }

    fn header(&self) -> Vec<String> {
        if self.summary {
            ResultStatistics::HEADER.iter().map(|h| h.to_string()).collect()
        } else {
            self.columns.iter().map(|(header, _)| header.clone()).collect()
        }
    }
}

impl Operator for ProduceResults {
    fn initialize(
        &mut self,
        _inputs: &mut [PhysicalNode],
        _record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<()> {
        self.done = false;
        ctx.result.header = self.header();
        Ok(())
    }

    fn consume(
        &mut self,
        inputs: &mut [PhysicalNode],
        record: &mut Record,
        ctx: &mut ExecContext<'_>,
    ) -> Result<OpResult> {
        if self.done {
            return Ok(OpResult::Depleted);
        }
        let input = only_input(inputs, "ProduceResults")?;
        if self.summary {
            let mut rows = 0usize;
            while pull_into(input, record, ctx)? {
                rows += 1;
            }
            ctx.result.rows.push(ctx.stats.to_row());
            debug!(rows, stats = ?ctx.stats, "write statement finished");
            self.done = true;
            return Ok(OpResult::Ok);
        }
        if !pull_into(input, record, ctx)? {
            self.done = true;
            return Ok(OpResult::Depleted);
        }
        let mut row = Vec::with_capacity(self.indices.len());
        for column in &self.indices {
            row.push(result_value(record.get(*column)?));
        }
        ctx.result.rows.push(row);
        Ok(OpResult::Ok)
    }

    fn reset(&mut self, _complete: bool, _ctx: Option<&mut ExecContext<'_>>) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn realign(&mut self, symbols: &SymbolTable) -> Result<()> {
        if self.summary {
            return Ok(());
        }
        self.indices = self
            .columns
            .iter()
            .map(|(_, alias)| symbols.column(alias, "ProduceResults"))
            .collect::<Result<_>>()?;
        if self.indices.is_empty() {
            return Err(ExecError::input("RETURN needs at least one column"));
        }
        Ok(())
    }

    fn details(&self) -> String {
        if self.summary {
            return "summary".to_string();
        }
        self.columns
            .iter()
            .map(|(header, _)| header.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{people, rows, symbols};
    use super::super::{CreateNode, Create, ExpandAll, NodeScan, PhysicalOp, Project, ProjectItem};
    use super::*;
    use crate::query::expr::ArithExpr;
    use crate::query::symbol_table::SymbolType;
    use crate::types::Direction;

    fn run(root: &mut PhysicalNode, ctx: &mut ExecContext<'_>) -> Result<usize> {
        root.initialize(ctx)?;
        let mut pulls = 0;
        while root.consume(ctx)? == OpResult::Ok {
            pulls += 1;
        }
        Ok(pulls)
    }

    #[test]
    fn rows_follow_the_header() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "Person")));
        let expand = PhysicalNode::unary(
            PhysicalOp::ExpandAll(ExpandAll::new("n", "r", "m", Direction::Out).with_types(vec!["KNOWS".into()])),
            scan,
        );
        let project = PhysicalNode::unary(
            PhysicalOp::Project(Project::new(vec![ProjectItem::new(ArithExpr::prop("n", "name"), "name")])),
            expand,
        );
        let produce = ProduceResults::new(vec![("n.name".into(), "name".into()), ("m".into(), "m".into())]);
        let mut root = PhysicalNode::unary(PhysicalOp::ProduceResults(produce), project);
        root.attach_symbols(&symbols(&[
            ("n", SymbolType::Node),
            ("r", SymbolType::Relationship),
            ("m", SymbolType::Node),
            ("name", SymbolType::Constant),
        ]))?;
        assert_eq!(run(&mut root, &mut ctx)?, 2);
        assert_eq!(ctx.result.header, vec!["n.name", "m"]);
        assert_eq!(rows(&ctx.result), vec!["ann,V[1]", "bob,V[2]"]);
        Ok(())
    }

    #[test]
    fn write_statement_yields_one_summary_row() -> Result<()> {
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let scan = PhysicalNode::leaf(PhysicalOp::NodeByLabelScan(NodeScan::by_label("n", "City")));
        let create = Create::new(
            vec![CreateNode::new("c", "Tag").with_property("v", ArithExpr::prop("n", "name"))],
            Vec::new(),
        );
        let create = PhysicalNode::unary(PhysicalOp::Create(create), scan);
        let mut root = PhysicalNode::unary(PhysicalOp::ProduceResults(ProduceResults::summary()), create);
        root.attach_symbols(&symbols(&[("n", SymbolType::Node), ("c", SymbolType::Node)]))?;
        assert_eq!(run(&mut root, &mut ctx)?, 1);
        assert_eq!(ctx.result.header[0], "<SUMMARY>.vertices_created");
        assert_eq!(rows(&ctx.result), vec!["2,0,0,0,2"]);
        Ok(())
    }

    #[test]
    fn unbound_entities_become_null() {
        assert_eq!(result_value(&Entry::Unknown), FieldData::Null);
        assert_eq!(
            result_value(&Entry::node(None, crate::types::VertexId::INVALID)),
            FieldData::Null
        );
        assert_eq!(
            result_value(&Entry::node(None, crate::types::VertexId(4))),
            FieldData::from("V[4]")
        );
    }
}
