//! Boolean predicate trees evaluated per record.
//!
//! Logical nodes own optional children. A logical node whose required child is
//! missing fails the match rather than raising an error, which lets the
//! optimizer carve pieces out of a conjunction with
//! [`Filter::remove_filter_when`] and leave a well-formed remainder behind.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::ArithExpr;
use crate::query::ops::{OpResult, PhysicalNode};
use crate::query::record::{Entry, Record};
use crate::query::symbol_table::SymbolTable;
use crate::query::value::FieldData;

/// Comparison operator of a range predicate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=`
    Eq,
    /// `<>`
    Ne,
}

impl CompareOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
        }
    }

    /// Whether an ordering satisfies the operator. Incomparable values fail
    /// every operator.
    pub fn holds(self, ord: Option<Ordering>) -> bool {
        let Some(ord) = ord else {
            return false;
        };
        match self {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
        }
    }

    /// Operator with its operands swapped: `a < b` is `b > a`.
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// String predicate operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StringOp {
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `CONTAINS`
    Contains,
    /// `=~`, a full-string regular expression match.
    Regexp,
}

impl StringOp {
    fn keyword(self) -> &'static str {
        match self {
            StringOp::StartsWith => "STARTS WITH",
            StringOp::EndsWith => "ENDS WITH",
            StringOp::Contains => "CONTAINS",
            StringOp::Regexp => "=~",
        }
    }
}

/// Existence test.
#[derive(Clone, Debug)]
pub enum ExistsTest {
    /// `exists(n.prop)`: the property reads as non-null.
    Property(ArithExpr),
    /// `exists((n)-[:R]->())`: a nested plan produces at least one row for
    /// the outer record.
    Pattern {
        /// Nested plan whose `Argument` leaf receives the outer record.
        plan: Box<PhysicalNode>,
        /// Named variables of the nested pattern.
        aliases: BTreeSet<String>,
    },
}

type Child = Option<Box<Filter>>;

/// Predicate tree node.
#[derive(Clone, Debug)]
pub enum Filter {
    /// Pass-through wrapper around a single child.
    Empty(Child),
    /// Negation.
    Not(Child),
    /// Conjunction.
    And(Child, Child),
    /// Disjunction.
    Or(Child, Child),
    /// Exclusive or.
    Xor(Child, Child),
    /// `lhs op rhs`.
    Range {
        /// Comparison.
        op: CompareOp,
        /// Left side.
        lhs: ArithExpr,
        /// Right side.
        rhs: ArithExpr,
    },
    /// String predicate; non-string operands fail the match.
    Str {
        /// Operator.
        op: StringOp,
        /// Subject string.
        lhs: ArithExpr,
        /// Pattern string.
        rhs: ArithExpr,
        /// Compiled pattern when `rhs` is a literal.
        regex: OnceLock<Option<Regex>>,
    },
    /// `expr IS [NOT] NULL`.
    TestNull {
        /// Tested expression.
        expr: ArithExpr,
        /// `IS NOT NULL` when true.
        negated: bool,
    },
    /// `lhs IN rhs`.
    TestIn {
        /// Probed value.
        lhs: ArithExpr,
        /// List expression.
        rhs: ArithExpr,
        /// Membership keys when `rhs` is a literal list.
        keys: OnceLock<FxHashSet<String>>,
    },
    /// `exists(...)`.
    TestExists(ExistsTest),
    /// `n:Label`.
    Label {
        /// Node variable.
        alias: String,
        /// Record column, filled by [`Filter::realign_alias_id`].
        column: Option<usize>,
        /// Required label.
        label: String,
    },
    /// Arbitrary boolean expression.
    Expr(ArithExpr),
}

impl Filter {
    /// `lhs op rhs`.
    pub fn range(lhs: ArithExpr, op: CompareOp, rhs: ArithExpr) -> Self {
        Filter::Range { op, lhs, rhs }
    }

    /// String predicate.
    pub fn string(lhs: ArithExpr, op: StringOp, rhs: ArithExpr) -> Self {
        Filter::Str {
            op,
            lhs,
            rhs,
            regex: OnceLock::new(),
        }
    }

    /// `expr IS NULL` (or `IS NOT NULL` when `negated`).
    pub fn is_null(expr: ArithExpr, negated: bool) -> Self {
        Filter::TestNull { expr, negated }
    }

    /// `lhs IN rhs`.
    pub fn test_in(lhs: ArithExpr, rhs: ArithExpr) -> Self {
        Filter::TestIn {
            lhs,
            rhs,
            keys: OnceLock::new(),
        }
    }

    /// `n:Label`.
    pub fn label(alias: &str, label: &str) -> Self {
        Filter::Label {
            alias: alias.to_string(),
            column: None,
            label: label.to_string(),
        }
    }

    /// `exists(alias.property)`.
    pub fn exists_property(alias: &str, property: &str) -> Self {
        Filter::TestExists(ExistsTest::Property(ArithExpr::prop(alias, property)))
    }

    /// `exists(<pattern>)` over a prepared nested plan.
    pub fn exists_pattern(plan: PhysicalNode, aliases: BTreeSet<String>) -> Self {
        Filter::TestExists(ExistsTest::Pattern {
            plan: Box::new(plan),
            aliases,
        })
    }

    /// Wraps a boolean expression.
    pub fn expr(expr: ArithExpr) -> Self {
        Filter::Expr(expr)
    }

    /// `a AND b`.
    pub fn and(lhs: Filter, rhs: Filter) -> Self {
        Filter::And(Some(Box::new(lhs)), Some(Box::new(rhs)))
    }

    /// `a OR b`.
    pub fn or(lhs: Filter, rhs: Filter) -> Self {
        Filter::Or(Some(Box::new(lhs)), Some(Box::new(rhs)))
    }

    /// `a XOR b`.
    pub fn xor(lhs: Filter, rhs: Filter) -> Self {
        Filter::Xor(Some(Box::new(lhs)), Some(Box::new(rhs)))
    }

    /// `NOT a`.
    pub fn negate(inner: Filter) -> Self {
        Filter::Not(Some(Box::new(inner)))
    }

    /// Conjunction of every filter in `parts`; `None` when empty.
    pub fn all(parts: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        parts.into_iter().reduce(Filter::and)
    }

    /// True for leaf predicates.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            Filter::Empty(_) | Filter::Not(_) | Filter::And(..) | Filter::Or(..) | Filter::Xor(..)
        )
    }

    /// Evaluates the predicate, running nested plans when present.
    pub fn do_filter(&mut self, ctx: &mut ExecContext<'_>, record: &Record) -> Result<bool> {
        match self {
            Filter::Empty(child) => match child {
                Some(child) => child.do_filter(ctx, record),
                None => Ok(false),
            },
            Filter::Not(child) => match child {
                Some(child) => Ok(!child.do_filter(ctx, record)?),
                None => Ok(false),
            },
            Filter::And(Some(l), Some(r)) => Ok(l.do_filter(ctx, record)? && r.do_filter(ctx, record)?),
            Filter::Or(Some(l), Some(r)) => Ok(l.do_filter(ctx, record)? || r.do_filter(ctx, record)?),
            Filter::Xor(Some(l), Some(r)) => Ok(l.do_filter(ctx, record)? != r.do_filter(ctx, record)?),
            Filter::And(..) | Filter::Or(..) | Filter::Xor(..) => Ok(false),
            Filter::TestExists(ExistsTest::Pattern { plan, .. }) => run_nested(plan, ctx, record),
            leaf => leaf.evaluate_leaf(ctx, record),
        }
    }

    /// Evaluates the predicate without running nested plans, as needed when
    /// a filter is used inside an expression.
    pub fn evaluate_pure(&self, ctx: &ExecContext<'_>, record: &Record) -> Result<bool> {
        match self {
            Filter::Empty(child) => match child {
                Some(child) => child.evaluate_pure(ctx, record),
                None => Ok(false),
            },
            Filter::Not(child) => match child {
                Some(child) => Ok(!child.evaluate_pure(ctx, record)?),
                None => Ok(false),
            },
            Filter::And(Some(l), Some(r)) => {
                Ok(l.evaluate_pure(ctx, record)? && r.evaluate_pure(ctx, record)?)
            }
            Filter::Or(Some(l), Some(r)) => {
                Ok(l.evaluate_pure(ctx, record)? || r.evaluate_pure(ctx, record)?)
            }
            Filter::Xor(Some(l), Some(r)) => {
                Ok(l.evaluate_pure(ctx, record)? != r.evaluate_pure(ctx, record)?)
            }
            Filter::And(..) | Filter::Or(..) | Filter::Xor(..) => Ok(false),
            Filter::TestExists(ExistsTest::Pattern { .. }) => Err(ExecError::not_implemented(
                "pattern existence test inside an expression",
            )),
            leaf => leaf.evaluate_leaf(ctx, record),
        }
    }

    fn evaluate_leaf(&self, ctx: &ExecContext<'_>, record: &Record) -> Result<bool> {
        match self {
            Filter::Range { op, lhs, rhs } => {
                let l = lhs.evaluate(ctx, record)?;
                let r = rhs.evaluate(ctx, record)?;
                Ok(compare_entries(*op, &l, &r))
            }
            Filter::Str { op, lhs, rhs, regex } => {
                let l = lhs.evaluate(ctx, record)?;
                let r = rhs.evaluate(ctx, record)?;
                let (Some(subject), Some(pattern)) = (as_str(&l), as_str(&r)) else {
                    return Ok(false);
                };
                Ok(match op {
                    StringOp::StartsWith => subject.starts_with(pattern),
                    StringOp::EndsWith => subject.ends_with(pattern),
                    StringOp::Contains => subject.contains(pattern),
                    StringOp::Regexp => {
                        if rhs.as_constant().is_some() {
                            regex
                                .get_or_init(|| compile_full_match(pattern))
                                .as_ref()
                                .is_some_and(|re| re.is_match(subject))
                        } else {
                            compile_full_match(pattern).is_some_and(|re| re.is_match(subject))
                        }
                    }
                })
            }
            Filter::TestNull { expr, negated } => {
                let value = expr.evaluate(ctx, record)?;
                Ok(value.equal_null() != *negated)
            }
            Filter::TestIn { lhs, rhs, keys } => {
                let probe = lhs.evaluate(ctx, record)?;
                if probe.equal_null() {
                    return Ok(false);
                }
                if let Some(list) = rhs.as_constant() {
                    let keys = keys.get_or_init(|| membership_keys(list));
                    return Ok(keys.contains(&membership_key(&probe)));
                }
                match rhs.evaluate(ctx, record)? {
                    Entry::Constant(FieldData::Array(items)) => Ok(items
                        .iter()
                        .any(|item| Entry::Constant(item.clone()) == probe)),
                    other if other.equal_null() => Ok(false),
                    other => Err(ExecError::type_mismatch(format!(
                        "IN expects a list, got {}",
                        other.kind_name()
                    ))),
                }
            }
            Filter::TestExists(ExistsTest::Property(expr)) => {
                Ok(!expr.evaluate(ctx, record)?.equal_null())
            }
            Filter::Label { alias, column, label } => {
                let column = column.ok_or_else(|| {
                    ExecError::internal(format!("label filter on '{alias}' was never aligned"))
                })?;
                match record.get(column)?.vid() {
                    Some(vid) => Ok(ctx.txn().vertex_label(vid)? == *label),
                    None => Ok(false),
                }
            }
            Filter::Expr(expr) => match expr.evaluate(ctx, record)? {
                Entry::Constant(FieldData::Bool(b)) => Ok(b),
                other if other.equal_null() => Ok(false),
                other => Err(ExecError::type_mismatch(format!(
                    "predicate evaluated to {}",
                    other.render(&ctx.options.null_marker)
                ))),
            },
            _ => Err(ExecError::internal("logical filter evaluated as a leaf")),
        }
    }

    /// Resolves every column reference against `symbols`.
    pub fn realign_alias_id(&mut self, symbols: &SymbolTable) -> Result<()> {
        match self {
            Filter::Empty(child) | Filter::Not(child) => {
                if let Some(child) = child {
                    child.realign_alias_id(symbols)?;
                }
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::Xor(l, r) => {
                for child in [l, r].into_iter().flatten() {
                    child.realign_alias_id(symbols)?;
                }
            }
            Filter::Range { lhs, rhs, .. }
            | Filter::Str { lhs, rhs, .. }
            | Filter::TestIn { lhs, rhs, .. } => {
                lhs.realign_alias_id(symbols)?;
                rhs.realign_alias_id(symbols)?;
            }
            Filter::TestNull { expr, .. }
            | Filter::Expr(expr)
            | Filter::TestExists(ExistsTest::Property(expr)) => expr.realign_alias_id(symbols)?,
            Filter::TestExists(ExistsTest::Pattern { .. }) => {}
            Filter::Label { alias, column, .. } => {
                *column = Some(symbols.column(alias, "label predicate")?);
            }
        }
        Ok(())
    }

    /// Variables the predicate depends on. `IN` only reports its probe side.
    pub fn aliases(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases(&self, out: &mut BTreeSet<String>) {
        match self {
            Filter::Empty(child) | Filter::Not(child) => {
                if let Some(child) = child {
                    child.collect_aliases(out);
                }
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::Xor(l, r) => {
                for child in [l, r].into_iter().flatten() {
                    child.collect_aliases(out);
                }
            }
            Filter::Range { lhs, rhs, .. } | Filter::Str { lhs, rhs, .. } => {
                lhs.collect_aliases(out);
                rhs.collect_aliases(out);
            }
            Filter::TestIn { lhs, .. } => lhs.collect_aliases(out),
            Filter::TestNull { expr, .. }
            | Filter::Expr(expr)
            | Filter::TestExists(ExistsTest::Property(expr)) => expr.collect_aliases(out),
            Filter::TestExists(ExistsTest::Pattern { aliases, .. }) => {
                out.extend(aliases.iter().cloned())
            }
            Filter::Label { alias, .. } => {
                out.insert(alias.clone());
            }
        }
    }

    /// `(alias, property)` pairs read by the predicate.
    pub fn visited_fields(&self) -> BTreeSet<(String, String)> {
        let mut out = BTreeSet::new();
        self.walk(&mut |leaf| match leaf {
            Filter::Range { lhs, rhs, .. }
            | Filter::Str { lhs, rhs, .. }
            | Filter::TestIn { lhs, rhs, .. } => {
                lhs.collect_fields(&mut out);
                rhs.collect_fields(&mut out);
            }
            Filter::TestNull { expr, .. }
            | Filter::Expr(expr)
            | Filter::TestExists(ExistsTest::Property(expr)) => expr.collect_fields(&mut out),
            _ => {}
        });
        out
    }

    /// Visits every leaf.
    pub fn walk(&self, f: &mut dyn FnMut(&Filter)) {
        match self {
            Filter::Empty(child) | Filter::Not(child) => {
                if let Some(child) = child {
                    child.walk(f);
                }
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::Xor(l, r) => {
                for child in [l, r].into_iter().flatten() {
                    child.walk(f);
                }
            }
            leaf => f(leaf),
        }
    }

    /// True when some leaf depends only on variables in `aliases`. Leaves
    /// without variables (constant predicates) never match.
    pub fn contain_alias(&self, aliases: &BTreeSet<String>) -> bool {
        match self {
            Filter::Empty(child) | Filter::Not(child) => {
                child.as_ref().is_some_and(|c| c.contain_alias(aliases))
            }
            Filter::And(Some(l), Some(r)) | Filter::Or(Some(l), Some(r)) | Filter::Xor(Some(l), Some(r)) => {
                l.contain_alias(aliases) || r.contain_alias(aliases)
            }
            Filter::And(..) | Filter::Or(..) | Filter::Xor(..) => false,
            leaf => {
                let own = leaf.aliases();
                !own.is_empty() && own.is_subset(aliases)
            }
        }
    }

    /// True when every binary node of the tree is an `AND`.
    pub fn binary_only_contains_and(&self) -> bool {
        match self {
            Filter::Or(..) | Filter::Xor(..) => false,
            Filter::And(l, r) => [l, r]
                .into_iter()
                .flatten()
                .all(|c| c.binary_only_contains_and()),
            Filter::Empty(child) | Filter::Not(child) => {
                child.as_ref().map_or(true, |c| c.binary_only_contains_and())
            }
            _ => true,
        }
    }

    /// Drops every leaf whose alias set satisfies `remove`, squashing logical
    /// nodes left without children. `Empty` wrappers are kept as they are.
    /// Returns `None` when nothing remains.
    pub fn remove_filter_when(self, remove: &dyn Fn(&BTreeSet<String>) -> bool) -> Option<Filter> {
        match self {
            Filter::Empty(child) => Some(Filter::Empty(child)),
            Filter::Not(child) => {
                let child = child.and_then(|c| (*c).remove_filter_when(remove))?;
                Some(Filter::Not(Some(Box::new(child))))
            }
            Filter::And(l, r) => squash(l, r, remove, Filter::And),
            Filter::Or(l, r) => squash(l, r, remove, Filter::Or),
            Filter::Xor(l, r) => squash(l, r, remove, Filter::Xor),
            leaf => {
                if remove(&leaf.aliases()) {
                    None
                } else {
                    Some(leaf)
                }
            }
        }
    }

    /// Drops every leaf fully covered by `aliases`.
    pub fn remove_alias(self, aliases: &BTreeSet<String>) -> Option<Filter> {
        self.remove_filter_when(&|own| own.is_subset(aliases))
    }

    /// Splits a conjunction into its top-level conjuncts. Non-`AND` nodes are
    /// returned whole.
    pub fn into_conjuncts(self) -> Vec<Filter> {
        match self {
            Filter::And(l, r) => [l, r]
                .into_iter()
                .flatten()
                .flat_map(|c| (*c).into_conjuncts())
                .collect(),
            Filter::Empty(Some(child)) => (*child).into_conjuncts(),
            other => vec![other],
        }
    }
}

fn squash(
    l: Child,
    r: Child,
    remove: &dyn Fn(&BTreeSet<String>) -> bool,
    rebuild: fn(Child, Child) -> Filter,
) -> Option<Filter> {
    let l = l.and_then(|c| (*c).remove_filter_when(remove));
    let r = r.and_then(|c| (*c).remove_filter_when(remove));
    match (l, r) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only),
        (Some(l), Some(r)) => Some(rebuild(Some(Box::new(l)), Some(Box::new(r)))),
    }
}

fn run_nested(plan: &mut PhysicalNode, ctx: &mut ExecContext<'_>, record: &Record) -> Result<bool> {
    if plan.is_initialized() {
        plan.reset_in(false, ctx)?;
    } else {
        plan.initialize(ctx)?;
    }
    plan.feed_argument(record);
    Ok(plan.consume(ctx)? == OpResult::Ok)
}

fn as_str(entry: &Entry) -> Option<&str> {
    entry.as_constant().and_then(FieldData::as_str)
}

fn compile_full_match(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).ok()
}

/// Range semantics: null-like operands and entries of different kinds fail
/// every operator; ordering operators additionally require comparable
/// constant families.
fn compare_entries(op: CompareOp, l: &Entry, r: &Entry) -> bool {
    if l.equal_null() || r.equal_null() {
        return false;
    }
    if std::mem::discriminant(l) != std::mem::discriminant(r) {
        return false;
    }
    match (l, r) {
        (Entry::Constant(a), Entry::Constant(b)) => compare_values(op, a, b),
        _ => match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            _ => false,
        },
    }
}

/// Scalar comparison: equality is loose across numeric kinds, ordering
/// requires operands of the same kind.
pub(crate) fn compare_values(op: CompareOp, a: &FieldData, b: &FieldData) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match op {
        CompareOp::Eq => a.loose_eq(b),
        CompareOp::Ne => !a.loose_eq(b),
        _ => a.same_kind(b) && op.holds(a.compare(b)),
    }
}

fn membership_key(entry: &Entry) -> String {
    match entry {
        Entry::Constant(value) => value_key(value),
        other => other.render(""),
    }
}

fn value_key(value: &FieldData) -> String {
    match value {
        FieldData::Int(v) => format!("n:{v}"),
        FieldData::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => format!("n:{}", *v as i64),
        other => format!("{}:{other}", other.type_name()),
    }
}

fn membership_keys(list: &FieldData) -> FxHashSet<String> {
    match list {
        FieldData::Array(items) => items.iter().map(value_key).collect(),
        _ => FxHashSet::default(),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn child(f: &mut fmt::Formatter<'_>, c: &Child) -> fmt::Result {
            match c {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "{{}}"),
            }
        }
        match self {
            Filter::Empty(c) => child(f, c),
            Filter::Not(c) => {
                write!(f, "NOT ")?;
                child(f, c)
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::Xor(l, r) => {
                let op = match self {
                    Filter::And(..) => "AND",
                    Filter::Or(..) => "OR",
                    _ => "XOR",
                };
                write!(f, "(")?;
                child(f, l)?;
                write!(f, " {op} ")?;
                child(f, r)?;
                write!(f, ")")
            }
            Filter::Range { op, lhs, rhs } => write!(f, "{{{lhs} {op} {rhs}}}"),
            Filter::Str { op, lhs, rhs, .. } => write!(f, "{{{lhs} {} {rhs}}}", op.keyword()),
            Filter::TestNull { expr, negated } => {
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                write!(f, "{{{expr} {test}}}")
            }
            Filter::TestIn { lhs, rhs, .. } => write!(f, "{{{lhs} IN {rhs}}}"),
            Filter::TestExists(ExistsTest::Property(expr)) => write!(f, "{{EXISTS({expr})}}"),
            Filter::TestExists(ExistsTest::Pattern { aliases, .. }) => {
                let names = aliases.iter().cloned().collect::<Vec<_>>().join(",");
                write!(f, "{{EXISTS(pattern:{names})}}")
            }
            Filter::Label { alias, label, .. } => write!(f, "{{{alias}:{label}}}"),
            Filter::Expr(expr) => write!(f, "{{{expr}}}"),
        }
    }
}
