//! Command-line pattern, predicate and projection syntax.
//!
//! ```text
//! --match  "(a:Person)-[r:KNOWS|LIKES*1..3]->(b)<-[:LIVES_IN]-(:City)"
//! --where  "a.age >= 30"        --where "b.email IS NOT NULL"
//! --return "b.name AS friend"   --return "count(*) AS n"
//! ```

use penumbra::query::builder::{EdgeSpec, MatchTarget, PlanBuilder, ProjectionSpec};
use penumbra::query::expr::{AggFunc, ArithExpr};
use penumbra::query::filter::{CompareOp, Filter};
use penumbra::types::Direction;
use regex::Regex;

use crate::load::parse_value;
use crate::CliError;

const RELATIONSHIP: &str = r"(<)?-\[([^\]]*)\]-(>)?";
const COMPARISON: &str = r"^\s*([A-Za-z_]\w*)(?:\.(\w+))?\s*(<>|<=|>=|=|<|>)\s*(.+?)\s*$";
const NULL_TEST: &str = r"(?i)^\s*([A-Za-z_]\w*)\.(\w+)\s+IS\s+(NOT\s+)?NULL\s*$";
const ALIASED: &str = r"(?i)^\s*(.+?)\s+AS\s+(\w+)\s*$";
const CALL: &str = r"(?i)^\s*(\w+)\(\s*(DISTINCT\s+)?(.*?)\s*\)\s*$";

/// Appends one path pattern to `builder` as a new component.
pub fn apply_path(mut builder: PlanBuilder, text: &str) -> Result<PlanBuilder, CliError> {
    let relationship = Regex::new(RELATIONSHIP)?;
    let mut rest = 0;
    let mut pending: Option<(EdgeSpec, Direction)> = None;
    for found in relationship.captures_iter(text) {
        let Some(whole) = found.get(0) else {
            continue;
        };
        let node = node_target(&text[rest..whole.start()])?;
        builder = attach(builder, pending.take(), node);
        let direction = match (found.get(1).is_some(), found.get(3).is_some()) {
            (false, true) => Direction::Out,
            (true, false) => Direction::In,
            (false, false) => Direction::Both,
            (true, true) => return Err(CliError::Message(format!("relationship '{}' points both ways", whole.as_str()))),
        };
        let body = found.get(2).map_or("", |m| m.as_str());
        pending = Some((edge_spec(body)?, direction));
        rest = whole.end();
    }
    let node = node_target(&text[rest..])?;
    Ok(attach(builder, pending, node))
}

fn attach(builder: PlanBuilder, edge: Option<(EdgeSpec, Direction)>, node: MatchTarget) -> PlanBuilder {
    match edge {
        Some((spec, direction)) => builder.direction(direction).where_edge(spec, node),
        None => builder.r#match(node),
    }
}

/// `(alias:Label)`, `(alias)`, `(:Label)` or `()`; parentheses optional.
fn node_target(text: &str) -> Result<MatchTarget, CliError> {
    let text = text.trim();
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text)
        .trim();
    let (alias, label) = match inner.split_once(':') {
        Some((alias, label)) => (alias.trim(), Some(label.trim())),
        None => (inner, None),
    };
    if !alias.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(CliError::Message(format!("invalid node pattern '{text}'")));
    }
    Ok(match (alias.is_empty(), label) {
        (true, None) => MatchTarget::Any,
        (true, Some(label)) => MatchTarget::Label(label.to_string()),
        (false, label) => MatchTarget::from((alias, label)),
    })
}

/// `name:TYPE|TYPE*min..max`, every part optional.
fn edge_spec(body: &str) -> Result<EdgeSpec, CliError> {
    let (head, hops) = match body.split_once('*') {
        Some((head, hops)) => (head, Some(hop_range(hops.trim())?)),
        None => (body, None),
    };
    let (name, types) = match head.split_once(':') {
        Some((name, types)) => (name.trim(), types),
        None => (head.trim(), ""),
    };
    let types: Vec<&str> = types.split('|').map(str::trim).filter(|t| !t.is_empty()).collect();
    let mut spec = EdgeSpec::new(&types);
    if !name.is_empty() {
        spec = spec.named(name);
    }
    if let Some((min, max)) = hops {
        spec = spec.hops(min, max);
    }
    Ok(spec)
}

fn hop_range(text: &str) -> Result<(u32, u32), CliError> {
    let parse = |part: &str, default: u32| -> Result<u32, CliError> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(default);
        }
        part.parse()
            .map_err(|_| CliError::Message(format!("invalid hop bound '{part}'")))
    };
    match text.split_once("..") {
        Some((min, max)) => Ok((parse(min, 1)?, parse(max, u32::MAX)?)),
        None if text.is_empty() => Ok((1, u32::MAX)),
        None => {
            let exact = parse(text, 1)?;
            Ok((exact, exact))
        }
    }
}

/// `alias.prop OP value` or `alias.prop IS [NOT] NULL`.
pub fn parse_predicate(text: &str) -> Result<Filter, CliError> {
    if let Some(found) = Regex::new(NULL_TEST)?.captures(text) {
        let expr = ArithExpr::prop(&found[1], &found[2]);
        return Ok(Filter::is_null(expr, found.get(3).is_some()));
    }
    let Some(found) = Regex::new(COMPARISON)?.captures(text) else {
        return Err(CliError::Message(format!("cannot parse predicate '{text}'")));
    };
    let lhs = match found.get(2) {
        Some(prop) => ArithExpr::prop(&found[1], prop.as_str()),
        None => ArithExpr::var(&found[1]),
    };
    let op = match &found[3] {
        "=" => CompareOp::Eq,
        "<>" => CompareOp::Ne,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        ">" => CompareOp::Gt,
        _ => CompareOp::Ge,
    };
    Ok(Filter::range(lhs, op, operand(&found[4])))
}

/// `expr [AS alias]` where `expr` is a column, a literal or a call.
pub fn parse_projection(text: &str) -> Result<ProjectionSpec, CliError> {
    let (expr_text, alias) = match Regex::new(ALIASED)?.captures(text) {
        Some(found) => (found[1].to_string(), found[2].to_string()),
        None => (text.trim().to_string(), text.trim().to_string()),
    };
    let expr = match Regex::new(CALL)?.captures(&expr_text) {
        Some(found) => {
            let name = &found[1];
            let distinct = found.get(2).is_some();
            let arg = &found[3];
            match AggFunc::from_name(name) {
                Some(AggFunc::Count) if arg == "*" => ArithExpr::count_star(),
                Some(func) => ArithExpr::aggregate_call(func, distinct, arguments(arg)),
                None if distinct => {
                    return Err(CliError::Message(format!("DISTINCT is only valid in aggregates: '{text}'")));
                }
                None => ArithExpr::func(name, arguments(arg)),
            }
        }
        None => operand(&expr_text),
    };
    Ok(ProjectionSpec::new(expr, &alias))
}

fn arguments(text: &str) -> Vec<ArithExpr> {
    text.split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(operand)
        .collect()
}

/// `$param`, `alias.prop`, `alias` or a literal.
fn operand(text: &str) -> ArithExpr {
    let text = text.trim();
    if let Some(name) = text.strip_prefix('$') {
        return ArithExpr::param(name);
    }
    let is_ident = |s: &str| {
        s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && s.chars().all(|c| c.is_alphanumeric() || c == '_')
    };
    if let Some((alias, prop)) = text.split_once('.') {
        if is_ident(alias) && is_ident(prop) {
            return ArithExpr::prop(alias, prop);
        }
    }
    let value = parse_value(text);
    if is_ident(text) && !matches!(value, penumbra::query::FieldData::Bool(_) | penumbra::query::FieldData::Null) {
        return ArithExpr::var(text);
    }
    ArithExpr::constant(value)
}
