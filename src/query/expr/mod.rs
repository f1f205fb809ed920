//! Tree-walked scalar expressions.
//!
//! An [`ArithExpr`] is evaluated against one [`Record`] and yields an
//! [`Entry`]. Evaluation never mutates the tree; the only mutable state is the
//! accumulator held by aggregate nodes, which [`ArithExpr::aggregate`] steps
//! and [`ArithExpr::reduce`] finalizes.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::filter::Filter;
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;

/// Aggregate functions and their accumulators.
pub mod aggregate;
/// Builtin scalar function table.
pub mod functions;
mod math;

pub use aggregate::{Accumulator, AggFunc};
pub use math::{MathOp, MathToken};

/// Leaf of an expression tree.
#[derive(Clone, Debug)]
pub enum Operand {
    /// A bound variable, optionally dereferenced by property (`n.name`).
    Variable {
        /// Variable name.
        alias: String,
        /// Property to read from the bound entity or map.
        property: Option<String>,
        /// Record column, filled by [`ArithExpr::realign_alias_id`].
        column: Option<usize>,
    },
    /// A query parameter (`$name`).
    Parameter {
        /// Parameter name without `$`.
        name: String,
        /// Record column when the parameter is materialized in the record.
        column: Option<usize>,
    },
    /// A literal.
    Constant(FieldData),
}

/// Scalar function call.
#[derive(Clone, Debug)]
pub struct FuncCall {
    /// Function name as written.
    pub name: String,
    /// Arguments in order.
    pub args: Vec<ArithExpr>,
}

/// Aggregate function call and its running state.
#[derive(Clone, Debug)]
pub struct AggCall {
    /// Aggregate function.
    pub func: AggFunc,
    /// Whether inputs are deduplicated before stepping.
    pub distinct: bool,
    /// Value arguments (empty for `count(*)`).
    pub args: Vec<ArithExpr>,
    acc: Accumulator,
}

/// `CASE` expression.
///
/// With a `subject`, branch conditions are compared to the subject value;
/// without one, each condition must evaluate to `true`.
#[derive(Clone, Debug)]
pub struct CaseExpr {
    /// Value compared against every branch condition.
    pub subject: Option<ArithExpr>,
    /// `WHEN cond THEN value` pairs in order.
    pub branches: Vec<(ArithExpr, ArithExpr)>,
    /// `ELSE` value.
    pub otherwise: Option<ArithExpr>,
}

/// The four shapes a `CASE` can take.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaseKind {
    /// `CASE WHEN c THEN v END`
    Searched,
    /// `CASE WHEN c THEN v ELSE e END`
    SearchedElse,
    /// `CASE x WHEN c THEN v END`
    Simple,
    /// `CASE x WHEN c THEN v ELSE e END`
    SimpleElse,
}

impl CaseExpr {
    /// Shape of this expression.
    pub fn kind(&self) -> CaseKind {
        match (self.subject.is_some(), self.otherwise.is_some()) {
            (false, false) => CaseKind::Searched,
            (false, true) => CaseKind::SearchedElse,
            (true, false) => CaseKind::Simple,
            (true, true) => CaseKind::SimpleElse,
        }
    }

    fn evaluate(&self, ctx: &ExecContext<'_>, record: &Record) -> Result<Entry> {
        let subject = match &self.subject {
            Some(expr) => Some(expr.evaluate(ctx, record)?),
            None => None,
        };
        for (when, then) in &self.branches {
            let cond = when.evaluate(ctx, record)?;
            let matched = match &subject {
                Some(value) => !value.equal_null() && *value == cond,
                None => matches!(cond, Entry::Constant(FieldData::Bool(true))),
            };
            if matched {
                return then.evaluate(ctx, record);
            }
        }
        match &self.otherwise {
            Some(expr) => expr.evaluate(ctx, record),
            None => Ok(Entry::null()),
        }
    }
}

/// Expression tree node.
#[derive(Clone, Debug)]
pub enum ArithExpr {
    /// Variable, parameter, or literal.
    Operand(Operand),
    /// Scalar function call.
    Func(FuncCall),
    /// Aggregate function call.
    Aggregate(Box<AggCall>),
    /// `CASE` expression.
    Case(Box<CaseExpr>),
    /// A predicate used as a boolean value.
    Filter(Box<Filter>),
    /// Arithmetic over a reverse-Polish token sequence.
    Math(Vec<MathToken>),
}

impl ArithExpr {
    /// Variable reference.
    pub fn var(alias: &str) -> Self {
        ArithExpr::Operand(Operand::Variable {
            alias: alias.to_string(),
            property: None,
            column: None,
        })
    }

    /// Property access `alias.property`.
    pub fn prop(alias: &str, property: &str) -> Self {
        ArithExpr::Operand(Operand::Variable {
            alias: alias.to_string(),
            property: Some(property.to_string()),
            column: None,
        })
    }

    /// Literal.
    pub fn constant(value: impl Into<FieldData>) -> Self {
        ArithExpr::Operand(Operand::Constant(value.into()))
    }

    /// Query parameter.
    pub fn param(name: &str) -> Self {
        ArithExpr::Operand(Operand::Parameter {
            name: name.trim_start_matches('$').to_string(),
            column: None,
        })
    }

    /// Scalar function call.
    pub fn func(name: &str, args: Vec<ArithExpr>) -> Self {
        ArithExpr::Func(FuncCall {
            name: name.to_string(),
            args,
        })
    }

    /// Aggregate call.
    pub fn aggregate_call(func: AggFunc, distinct: bool, args: Vec<ArithExpr>) -> Self {
        ArithExpr::Aggregate(Box::new(AggCall {
            func,
            distinct,
            args,
            acc: Accumulator::new(func, distinct),
        }))
    }

    /// `count(*)`.
    pub fn count_star() -> Self {
        Self::aggregate_call(AggFunc::CountStar, false, Vec::new())
    }

    /// `lhs op rhs`, flattened into reverse-Polish order.
    pub fn binary(lhs: ArithExpr, op: MathOp, rhs: ArithExpr) -> Self {
        let mut tokens = Vec::new();
        for side in [lhs, rhs] {
            match side {
                ArithExpr::Math(inner) => tokens.extend(inner),
                other => tokens.push(MathToken::Operand(other)),
            }
        }
        tokens.push(MathToken::Operator(op));
        ArithExpr::Math(tokens)
    }

    /// `CASE` expression.
    pub fn case(
        subject: Option<ArithExpr>,
        branches: Vec<(ArithExpr, ArithExpr)>,
        otherwise: Option<ArithExpr>,
    ) -> Self {
        ArithExpr::Case(Box::new(CaseExpr {
            subject,
            branches,
            otherwise,
        }))
    }

    /// Predicate as a value.
    pub fn filter(filter: Filter) -> Self {
        ArithExpr::Filter(Box::new(filter))
    }

    /// Literal payload, if this is a constant.
    pub fn as_constant(&self) -> Option<&FieldData> {
        match self {
            ArithExpr::Operand(Operand::Constant(value)) => Some(value),
            _ => None,
        }
    }

    /// `(alias, property)` if this is a plain variable or property access.
    pub fn as_variable(&self) -> Option<(&str, Option<&str>)> {
        match self {
            ArithExpr::Operand(Operand::Variable { alias, property, .. }) => {
                Some((alias.as_str(), property.as_deref()))
            }
            _ => None,
        }
    }

    /// Function call payload, if this is a scalar function call.
    pub fn as_func(&self) -> Option<&FuncCall> {
        match self {
            ArithExpr::Func(call) => Some(call),
            _ => None,
        }
    }

    /// Aggregate call payload, if this is an aggregate.
    pub fn as_aggregate(&self) -> Option<&AggCall> {
        match self {
            ArithExpr::Aggregate(call) => Some(call),
            _ => None,
        }
    }

    /// Evaluates the expression against `record`.
    pub fn evaluate(&self, ctx: &ExecContext<'_>, record: &Record) -> Result<Entry> {
        match self {
            ArithExpr::Operand(operand) => evaluate_operand(operand, ctx, record),
            ArithExpr::Func(call) => functions::call(call, ctx, record),
            ArithExpr::Aggregate(call) => Ok(Entry::Constant(call.acc.result().clone())),
            ArithExpr::Case(case) => case.evaluate(ctx, record),
            ArithExpr::Filter(filter) => {
                Ok(Entry::Constant(FieldData::Bool(filter.evaluate_pure(ctx, record)?)))
            }
            ArithExpr::Math(tokens) => math::evaluate_rpn(tokens, ctx, record),
        }
    }

    /// Resolves variable and parameter columns against `symbols`.
    pub fn realign_alias_id(&mut self, symbols: &SymbolTable) -> Result<()> {
        self.for_each_child_mut(&mut |child| child.realign_alias_id(symbols))?;
        match self {
            ArithExpr::Operand(Operand::Variable { alias, column, .. }) => {
                *column = Some(symbols.column(alias, "expression")?);
            }
            ArithExpr::Operand(Operand::Parameter { name, column }) => {
                *column = symbols.get(&format!("${name}")).map(|node| node.id);
            }
            ArithExpr::Filter(filter) => filter.realign_alias_id(symbols)?,
            _ => {}
        }
        Ok(())
    }

    /// Variables referenced anywhere in the tree.
    pub fn aliases(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_aliases(&mut out);
        out
    }

    pub(crate) fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        match self {
            ArithExpr::Operand(Operand::Variable { alias, .. }) => {
                out.insert(alias.clone());
            }
            ArithExpr::Filter(filter) => out.extend(filter.aliases()),
            _ => {}
        }
        self.for_each_child(&mut |child| child.collect_aliases(out));
    }

    /// `(alias, property)` pairs read anywhere in the tree.
    pub fn visited_fields(&self) -> BTreeSet<(String, String)> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    pub(crate) fn collect_fields(&self, out: &mut BTreeSet<(String, String)>) {
        match self {
            ArithExpr::Operand(Operand::Variable {
                alias,
                property: Some(property),
                ..
            }) => {
                out.insert((alias.clone(), property.clone()));
            }
            ArithExpr::Filter(filter) => out.extend(filter.visited_fields()),
            _ => {}
        }
        self.for_each_child(&mut |child| child.collect_fields(out));
    }

    /// True when an aggregate appears anywhere in the tree.
    pub fn contains_aggregation(&self) -> bool {
        if matches!(self, ArithExpr::Aggregate(_)) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| found |= child.contains_aggregation());
        found
    }

    /// Steps every aggregate in the tree with the values of `record`.
    pub fn aggregate(&mut self, ctx: &ExecContext<'_>, record: &Record) -> Result<()> {
        if let ArithExpr::Aggregate(call) = self {
            let args = call
                .args
                .iter()
                .map(|arg| arg.evaluate(ctx, record))
                .collect::<Result<Vec<_>>>()?;
            return call.acc.step(&args);
        }
        self.for_each_child_mut(&mut |child| child.aggregate(ctx, record))
    }

    /// Finalizes every aggregate so that [`ArithExpr::evaluate`] returns it.
    pub fn reduce(&mut self) -> Result<()> {
        if let ArithExpr::Aggregate(call) = self {
            return call.acc.reduce();
        }
        self.for_each_child_mut(&mut |child| child.reduce())
    }

    /// Clears every aggregate's accumulated state.
    pub fn reset_aggregation(&mut self) {
        if let ArithExpr::Aggregate(call) = self {
            call.acc.reset();
            return;
        }
        let _ = self.for_each_child_mut(&mut |child| {
            child.reset_aggregation();
            Ok(())
        });
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&ArithExpr)) {
        match self {
            ArithExpr::Operand(_) | ArithExpr::Filter(_) => {}
            ArithExpr::Func(call) => call.args.iter().for_each(f),
            ArithExpr::Aggregate(call) => call.args.iter().for_each(f),
            ArithExpr::Case(case) => {
                if let Some(subject) = &case.subject {
                    f(subject);
                }
                for (when, then) in &case.branches {
                    f(when);
                    f(then);
                }
                if let Some(otherwise) = &case.otherwise {
                    f(otherwise);
                }
            }
            ArithExpr::Math(tokens) => {
                for token in tokens {
                    if let MathToken::Operand(expr) = token {
                        f(expr);
                    }
                }
            }
        }
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut ArithExpr) -> Result<()>) -> Result<()> {
        match self {
            ArithExpr::Operand(_) | ArithExpr::Filter(_) => Ok(()),
            ArithExpr::Func(call) => call.args.iter_mut().try_for_each(f),
            ArithExpr::Aggregate(call) => call.args.iter_mut().try_for_each(f),
            ArithExpr::Case(case) => {
                if let Some(subject) = &mut case.subject {
                    f(subject)?;
                }
                for (when, then) in &mut case.branches {
                    f(when)?;
                    f(then)?;
                }
                if let Some(otherwise) = &mut case.otherwise {
                    f(otherwise)?;
                }
                Ok(())
            }
            ArithExpr::Math(tokens) => tokens.iter_mut().try_for_each(|token| match token {
                MathToken::Operand(expr) => f(expr),
                MathToken::Operator(_) => Ok(()),
            }),
        }
    }
}

fn evaluate_operand(operand: &Operand, ctx: &ExecContext<'_>, record: &Record) -> Result<Entry> {
    match operand {
        Operand::Constant(value) => Ok(Entry::Constant(value.clone())),
        Operand::Parameter { name, column } => {
            if let Some(col) = column {
                let entry = record.get(*col)?;
                if !matches!(entry, Entry::Unknown) {
                    return Ok(entry.clone());
                }
            }
            ctx.params
                .get(name)
                .cloned()
                .map(Entry::Constant)
                .ok_or_else(|| ExecError::input(format!("parameter ${name} is not bound")))
        }
        Operand::Variable {
            alias,
            property,
            column,
        } => {
            let col = column.ok_or_else(|| {
                ExecError::internal(format!("variable '{alias}' has no record column"))
            })?;
            let entry = record.get(col)?;
            match property {
                None => Ok(entry.clone()),
                Some(field) => read_property(ctx, alias, entry, field),
            }
        }
    }
}

fn read_property(ctx: &ExecContext<'_>, alias: &str, entry: &Entry, field: &str) -> Result<Entry> {
    if entry.equal_null() {
        return Ok(Entry::null());
    }
    let value = match entry {
        Entry::Node(node) => ctx.txn().vertex_field(node.vid, field)?,
        Entry::Relationship(rel) => match rel.edge {
            Some(edge) => ctx.txn().edge_field(edge.id, field)?,
            None => FieldData::Null,
        },
        Entry::Constant(FieldData::Map(map)) => map.get(field).cloned().unwrap_or(FieldData::Null),
        other => {
            return Err(ExecError::type_mismatch(format!(
                "cannot read property '{field}' of {alias} ({})",
                other.kind_name()
            )))
        }
    };
    Ok(Entry::Constant(value))
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable {
                alias,
                property: Some(property),
                ..
            } => write!(f, "{alias}.{property}"),
            Operand::Variable { alias, .. } => f.write_str(alias),
            Operand::Parameter { name, .. } => write!(f, "${name}"),
            Operand::Constant(FieldData::String(s)) => write!(f, "'{s}'"),
            Operand::Constant(value) => write!(f, "{value}"),
        }
    }
}

fn join_args(f: &mut fmt::Formatter<'_>, args: &[ArithExpr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for ArithExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithExpr::Operand(operand) => write!(f, "{operand}"),
            ArithExpr::Func(call) => {
                write!(f, "{}(", call.name)?;
                join_args(f, &call.args)?;
                f.write_str(")")
            }
            ArithExpr::Aggregate(call) => {
                write!(f, "{}(", call.func)?;
                if call.func == AggFunc::CountStar {
                    f.write_str("*")?;
                } else {
                    if call.distinct {
                        f.write_str("DISTINCT ")?;
                    }
                    join_args(f, &call.args)?;
                }
                f.write_str(")")
            }
            ArithExpr::Case(case) => {
                f.write_str("CASE")?;
                if let Some(subject) = &case.subject {
                    write!(f, " {subject}")?;
                }
                for (when, then) in &case.branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(otherwise) = &case.otherwise {
                    write!(f, " ELSE {otherwise}")?;
                }
                f.write_str(" END")
            }
            ArithExpr::Filter(filter) => write!(f, "{filter}"),
            ArithExpr::Math(tokens) => {
                let mut stack: Vec<String> = Vec::new();
                for token in tokens {
                    match token {
                        MathToken::Operand(expr) => stack.push(expr.to_string()),
                        MathToken::Operator(op) => {
                            let rhs = stack.pop().unwrap_or_default();
                            let lhs = stack.pop().unwrap_or_default();
                            stack.push(format!("({lhs}{op}{rhs})"));
                        }
                    }
                }
                f.write_str(&stack.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::symbol_table::{SymbolScope, SymbolType};
    use crate::storage::MemoryGraph;
    use crate::types::VertexId;

    fn symbols() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.add("n", SymbolType::Node, SymbolScope::Local);
        table.add("x", SymbolType::Constant, SymbolScope::Local);
        table
    }

    #[test]
    fn property_access_reads_through_the_transaction() -> Result<()> {
        let mut graph = MemoryGraph::new();
        let vid = graph.insert_vertex("Person", [("age", FieldData::Int(41))]);
        let ctx = ExecContext::new(&mut graph);
        let table = Arc::new(symbols());
        let mut record = Record::with_symbols(table.clone(), None);
        record.set(0, Entry::node(None, vid))?;

        let mut expr = ArithExpr::binary(ArithExpr::prop("n", "age"), MathOp::Add, ArithExpr::constant(1i64));
        expr.realign_alias_id(&table)?;
        assert_eq!(expr.evaluate(&ctx, &record)?, Entry::constant(42i64));
        assert_eq!(expr.to_string(), "(n.age+1)");

        record.set(0, Entry::node(None, VertexId::INVALID))?;
        assert!(expr.evaluate(&ctx, &record)?.is_null());
        Ok(())
    }

    #[test]
    fn nested_math_flattens_into_one_sequence() -> Result<()> {
        let mut graph = MemoryGraph::new();
        let ctx = ExecContext::new(&mut graph);
        let inner = ArithExpr::binary(ArithExpr::constant(2i64), MathOp::Mul, ArithExpr::constant(3i64));
        let expr = ArithExpr::binary(inner, MathOp::Sub, ArithExpr::constant(1i64));
        assert!(matches!(&expr, ArithExpr::Math(tokens) if tokens.len() == 5));
        assert_eq!(expr.evaluate(&ctx, &Record::new(0))?, Entry::constant(5i64));
        Ok(())
    }

    #[test]
    fn case_shapes() -> Result<()> {
        let mut graph = MemoryGraph::new();
        let ctx = ExecContext::new(&mut graph);
        let table = symbols();
        let mut record = Record::new(2);
        record.set(1, Entry::constant(2i64))?;

        let mut simple = ArithExpr::case(
            Some(ArithExpr::var("x")),
            vec![
                (ArithExpr::constant(1i64), ArithExpr::constant("one")),
                (ArithExpr::constant(2i64), ArithExpr::constant("two")),
            ],
            None,
        );
        simple.realign_alias_id(&table)?;
        assert_eq!(simple.evaluate(&ctx, &record)?, Entry::constant("two"));

        record.set(1, Entry::constant(9i64))?;
        assert!(simple.evaluate(&ctx, &record)?.is_null());

        let searched = ArithExpr::case(
            None,
            vec![(ArithExpr::constant(false), ArithExpr::constant(1i64))],
            Some(ArithExpr::constant(0i64)),
        );
        if let ArithExpr::Case(case) = &searched {
            assert_eq!(case.kind(), CaseKind::SearchedElse);
        }
        assert_eq!(searched.evaluate(&ctx, &record)?, Entry::constant(0i64));
        Ok(())
    }

    #[test]
    fn aggregates_step_and_reduce_inside_math() -> Result<()> {
        let mut graph = MemoryGraph::new();
        let ctx = ExecContext::new(&mut graph);
        let table = symbols();
        let mut expr = ArithExpr::binary(
            ArithExpr::aggregate_call(AggFunc::Sum, false, vec![ArithExpr::var("x")]),
            MathOp::Mul,
            ArithExpr::constant(10i64),
        );
        expr.realign_alias_id(&table)?;
        assert!(expr.contains_aggregation());
        for v in [1i64, 2, 3] {
            let mut record = Record::new(2);
            record.set(1, Entry::constant(v))?;
            expr.aggregate(&ctx, &record)?;
        }
        expr.reduce()?;
        assert_eq!(expr.evaluate(&ctx, &Record::new(2))?, Entry::constant(60i64));
        expr.reset_aggregation();
        expr.reduce()?;
        assert_eq!(expr.evaluate(&ctx, &Record::new(2))?, Entry::constant(0i64));
        Ok(())
    }

    #[test]
    fn unbound_parameter_is_an_input_error() -> Result<()> {
        let mut graph = MemoryGraph::new();
        let mut ctx = ExecContext::new(&mut graph);
        let expr = ArithExpr::param("$limit");
        let err = expr.evaluate(&ctx, &Record::new(0)).unwrap_err();
        assert_eq!(err.code(), "INPUT_ERROR");
        ctx.params.insert("limit".into(), FieldData::Int(3));
        assert_eq!(expr.evaluate(&ctx, &Record::new(0))?, Entry::constant(3i64));
        Ok(())
    }

    #[test]
    fn alias_and_field_collection() {
        let expr = ArithExpr::func(
            "abs",
            vec![ArithExpr::binary(ArithExpr::prop("r", "weight"), MathOp::Sub, ArithExpr::var("m"))],
        );
        let aliases: Vec<_> = expr.aliases().into_iter().collect();
        assert_eq!(aliases, vec!["m".to_string(), "r".to_string()]);
        assert!(expr.visited_fields().contains(&("r".to_string(), "weight".to_string())));
        assert!(!expr.contains_aggregation());
    }
}
