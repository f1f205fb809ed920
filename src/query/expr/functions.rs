//! Builtin scalar functions and the plugin call boundary.
//!
//! Names are matched case-insensitively. A name that starts with the
//! configured custom prefix is forwarded to [`GraphTxn::call_plugin`] with its
//! arguments rendered as one comma-joined string.

use std::cmp::Ordering;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine;
use rand::Rng;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::trace;

use crate::error::{ExecError, Result};
use crate::query::context::ExecContext;
use crate::query::expr::FuncCall;
use crate::query::record::{Entry, Record};
use crate::query::value::FieldData;
use crate::storage::GraphTxn;
use crate::types::EdgeUid;

/// Edge field read by the path helpers (`head`, `last`, `isAsc`, ...) when
/// applied to a variable-length relationship.
pub const PATH_FIELD: &str = "timestamp";

/// Names resolved by the builtin table.
pub const BUILTINS: &[&str] = &[
    "id",
    "euid",
    "label",
    "labels",
    "type",
    "startnode",
    "endnode",
    "properties",
    "keys",
    "head",
    "last",
    "size",
    "length",
    "range",
    "subscript",
    "abs",
    "ceil",
    "floor",
    "rand",
    "round",
    "sign",
    "toboolean",
    "tofloat",
    "tointeger",
    "tostring",
    "datetime",
    "datetimecomponent",
    "bin",
    "coalesce",
    "isasc",
    "isdesc",
    "maxinlist",
    "mininlist",
];

/// Returns true when `name` resolves to a builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name.to_ascii_lowercase().as_str())
}

/// `PATH_FIELD` values of `edges` in path order.
pub fn path_values(txn: &dyn GraphTxn, edges: &[EdgeUid]) -> Result<Vec<FieldData>> {
    edges
        .iter()
        .map(|edge| txn.edge_field(edge.id, PATH_FIELD))
        .collect()
}

/// Strictly increasing; an empty list passes.
pub fn is_ascending(list: &[FieldData]) -> bool {
    list.windows(2)
        .all(|pair| pair[0].compare(&pair[1]) == Some(Ordering::Less))
}

/// Strictly decreasing; an empty list passes.
pub fn is_descending(list: &[FieldData]) -> bool {
    list.windows(2)
        .all(|pair| pair[0].compare(&pair[1]) == Some(Ordering::Greater))
}

/// Largest element; the first one wins ties.
pub fn max_in_list(list: &[FieldData]) -> Option<&FieldData> {
    extreme(list, Ordering::Greater)
}

/// Smallest element; the first one wins ties.
pub fn min_in_list(list: &[FieldData]) -> Option<&FieldData> {
    extreme(list, Ordering::Less)
}

fn extreme(list: &[FieldData], wanted: Ordering) -> Option<&FieldData> {
    let mut best = list.first()?;
    for item in &list[1..] {
        if item.compare(best) == Some(wanted) {
            best = item;
        }
    }
    Some(best)
}

pub(super) fn call(call: &FuncCall, ctx: &ExecContext<'_>, record: &Record) -> Result<Entry> {
    let args = call
        .args
        .iter()
        .map(|arg| arg.evaluate(ctx, record))
        .collect::<Result<Vec<_>>>()?;
    let prefix = ctx.options.custom_function_prefix.as_str();
    if !prefix.is_empty() && call.name.starts_with(prefix) {
        return plugin(ctx, &call.name[prefix.len()..], &args);
    }
    let name = call.name.to_ascii_lowercase();
    let func = name.as_str();
    match func {
        "id" => id(func, &args),
        "euid" => match one(func, &args)? {
            Entry::Relationship(rel) => Ok(rel
                .edge
                .map_or_else(Entry::null, |edge| Entry::constant(edge.to_string()))),
            other => null_or_invalid(func, other),
        },
        "label" | "labels" => {
            let entry = one(func, &args)?;
            let Some(vid) = entry.vid() else {
                return null_or_invalid(func, entry);
            };
            let label = ctx.txn().vertex_label(vid)?;
            if func == "label" {
                Ok(Entry::constant(label))
            } else {
                Ok(Entry::constant(vec![FieldData::String(label)]))
            }
        }
        "type" => match one(func, &args)?.edge() {
            Some(edge) => Ok(Entry::constant(ctx.txn().edge(edge.id)?.etype)),
            None => null_or_invalid(func, &args[0]),
        },
        "startnode" | "endnode" => match one(func, &args)?.edge() {
            Some(edge) => {
                let vid = if func == "startnode" { edge.src } else { edge.dst };
                Ok(Entry::constant(vid.0))
            }
            None => null_or_invalid(func, &args[0]),
        },
        "properties" => properties(func, ctx, &args),
        "keys" => keys(func, ctx, &args),
        "head" | "last" => {
            let Some(list) = list_arg(func, ctx, one(func, &args)?)? else {
                return Ok(Entry::null());
            };
            let item = if func == "head" { list.first() } else { list.last() };
            Ok(item.cloned().map_or_else(Entry::null, Entry::Constant))
        }
        "isasc" | "isdesc" => {
            let Some(list) = list_arg(func, ctx, one(func, &args)?)? else {
                return Ok(Entry::null());
            };
            let ordered = if func == "isasc" {
                is_ascending(&list)
            } else {
                is_descending(&list)
            };
            Ok(Entry::constant(ordered))
        }
        "maxinlist" | "mininlist" => {
            let Some(list) = list_arg(func, ctx, one(func, &args)?)? else {
                return Ok(Entry::null());
            };
            let item = if func == "maxinlist" {
                max_in_list(&list)
            } else {
                min_in_list(&list)
            };
            Ok(item.cloned().map_or_else(Entry::null, Entry::Constant))
        }
        "size" | "length" => size(func, &args),
        "range" => range(func, &args),
        "subscript" => subscript(func, &args),
        "abs" | "ceil" | "floor" | "round" | "sign" => numeric_unary(func, &args),
        "rand" => {
            arity(func, &args, 0)?;
            Ok(Entry::constant(rand::thread_rng().gen::<f64>()))
        }
        "toboolean" | "tofloat" | "tointeger" | "tostring" => convert(func, &args),
        "datetime" => datetime(func, &args),
        "datetimecomponent" => datetime_component(func, &args),
        "bin" => match constant(func, one(func, &args)?)? {
            FieldData::Null => Ok(Entry::null()),
            FieldData::String(text) => BASE64_ENGINE
                .decode(text.as_bytes())
                .map(|bytes| Entry::Constant(FieldData::Bytes(bytes)))
                .map_err(|err| ExecError::argument(func, format!("invalid base64: {err}"))),
            FieldData::Bytes(bytes) => Ok(Entry::Constant(FieldData::Bytes(bytes.clone()))),
            other => Err(ExecError::argument(func, format!("expected string, got {}", other.type_name()))),
        },
        "coalesce" => {
            if args.is_empty() {
                return Err(ExecError::argument(func, "expected at least 1 argument"));
            }
            Ok(args
                .into_iter()
                .find(|arg| !arg.equal_null())
                .unwrap_or_else(Entry::null))
        }
        _ => Err(ExecError::input(format!("unknown function '{}'", call.name))),
    }
}

fn plugin(ctx: &ExecContext<'_>, name: &str, args: &[Entry]) -> Result<Entry> {
    let marker = ctx.options.null_marker.as_str();
    let input = args
        .iter()
        .map(|arg| arg.render(marker))
        .collect::<Vec<_>>()
        .join(",");
    trace!(plugin = name, input = %input, "calling plugin function");
    match ctx.txn().call_plugin(name, &input)? {
        Some(output) => Ok(Entry::constant(output)),
        None => Err(ExecError::input(format!("plugin function '{name}' does not exist"))),
    }
}

fn arity(func: &str, args: &[Entry], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(ExecError::argument(
            func,
            format!("expected {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn one<'a>(func: &str, args: &'a [Entry]) -> Result<&'a Entry> {
    arity(func, args, 1)?;
    Ok(&args[0])
}

fn constant<'a>(func: &str, entry: &'a Entry) -> Result<&'a FieldData> {
    match entry {
        Entry::Constant(value) => Ok(value),
        Entry::Unknown => Ok(&FieldData::Null),
        other => Err(ExecError::argument(func, format!("expected a value, got {}", other.kind_name()))),
    }
}

fn null_or_invalid(func: &str, entry: &Entry) -> Result<Entry> {
    if entry.equal_null() {
        Ok(Entry::null())
    } else {
        Err(ExecError::argument(func, format!("unexpected {}", entry.kind_name())))
    }
}

fn id(func: &str, args: &[Entry]) -> Result<Entry> {
    let entry = one(func, args)?;
    if let Some(vid) = entry.vid() {
        return Ok(Entry::constant(vid.0));
    }
    if let Some(edge) = entry.edge() {
        return Ok(Entry::constant(edge.id.0));
    }
    null_or_invalid(func, entry)
}

fn properties(func: &str, ctx: &ExecContext<'_>, args: &[Entry]) -> Result<Entry> {
    let txn = ctx.txn();
    let entry = one(func, args)?;
    if entry.equal_null() {
        return Ok(Entry::null());
    }
    let value = match entry {
        Entry::Node(node) => FieldData::Map(txn.vertex_fields(node.vid)?),
        Entry::Relationship(rel) => match rel.edge {
            Some(edge) => FieldData::Map(txn.edge_fields(edge.id)?),
            None => FieldData::Null,
        },
        Entry::Constant(FieldData::Map(map)) => FieldData::Map(map.clone()),
        Entry::VarLenRelationship(rel) => {
            let vertices = rel.path.vertices();
            let mut items = Vec::with_capacity(vertices.len() + rel.path.len());
            for (i, vid) in vertices.iter().enumerate() {
                items.push(FieldData::Map(txn.vertex_fields(*vid)?));
                if let Some(edge) = rel.path.edges().get(i) {
                    items.push(FieldData::Map(txn.edge_fields(edge.id)?));
                }
            }
            FieldData::Array(items)
        }
        other => return Err(ExecError::argument(func, format!("unexpected {}", other.kind_name()))),
    };
    Ok(Entry::Constant(value))
}

fn keys(func: &str, ctx: &ExecContext<'_>, args: &[Entry]) -> Result<Entry> {
    let entry = one(func, args)?;
    if entry.equal_null() {
        return Ok(Entry::null());
    }
    let fields = match entry {
        Entry::Node(node) => ctx.txn().vertex_fields(node.vid)?,
        Entry::Relationship(rel) => match rel.edge {
            Some(edge) => ctx.txn().edge_fields(edge.id)?,
            None => return Ok(Entry::null()),
        },
        Entry::Constant(FieldData::Map(map)) => map.clone(),
        other => return Err(ExecError::argument(func, format!("unexpected {}", other.kind_name()))),
    };
    Ok(Entry::constant(
        fields.into_keys().map(FieldData::String).collect::<Vec<_>>(),
    ))
}

/// Lists accepted by the list helpers: a constant list, or the path values of
/// a variable-length relationship. `None` for null input.
fn list_arg(func: &str, ctx: &ExecContext<'_>, entry: &Entry) -> Result<Option<Vec<FieldData>>> {
    match entry {
        Entry::Constant(FieldData::Array(items)) => Ok(Some(items.clone())),
        Entry::VarLenRelationship(rel) => Ok(Some(path_values(ctx.txn(), rel.path.edges())?)),
        other if other.equal_null() => Ok(None),
        other => Err(ExecError::argument(
            func,
            format!("list expected, got {}", other.render(&ctx.options.null_marker)),
        )),
    }
}

fn size(func: &str, args: &[Entry]) -> Result<Entry> {
    let entry = one(func, args)?;
    let len = match entry {
        Entry::VarLenRelationship(rel) => rel.path.len(),
        Entry::Constant(FieldData::Array(items)) => items.len(),
        Entry::Constant(FieldData::String(text)) => text.chars().count(),
        other if other.equal_null() => return Ok(Entry::null()),
        other => {
            return Err(ExecError::type_mismatch(format!(
                "{func}() expected string or list, got {}",
                other.kind_name()
            )))
        }
    };
    Ok(Entry::constant(len as i64))
}

fn int_arg(func: &str, entry: &Entry) -> Result<i64> {
    constant(func, entry)?
        .as_int()
        .ok_or_else(|| ExecError::argument(func, "integer expected"))
}

fn range(func: &str, args: &[Entry]) -> Result<Entry> {
    if !(2..=3).contains(&args.len()) {
        return Err(ExecError::argument(func, "expected 2 or 3 arguments"));
    }
    let start = int_arg(func, &args[0])?;
    let end = int_arg(func, &args[1])?;
    let step = match args.get(2) {
        Some(entry) => int_arg(func, entry)?,
        None => 1,
    };
    if step == 0 {
        return Err(ExecError::argument(func, "step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i <= end) || (step < 0 && i >= end) {
        out.push(FieldData::Int(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Entry::constant(out))
}

fn subscript(func: &str, args: &[Entry]) -> Result<Entry> {
    if !(2..=3).contains(&args.len()) {
        return Err(ExecError::argument(func, "expected 2 or 3 arguments"));
    }
    let items = match constant(func, &args[0])? {
        FieldData::Array(items) => items,
        FieldData::Null => return Ok(Entry::null()),
        other => return Err(ExecError::argument(func, format!("list expected, got {}", other.type_name()))),
    };
    let len = items.len() as i64;
    let resolve = |idx: i64| if idx < 0 { len + idx } else { idx };
    let start = resolve(int_arg(func, &args[1])?);
    match args.get(2) {
        None => {
            if (0..len).contains(&start) {
                Ok(Entry::Constant(items[start as usize].clone()))
            } else {
                Ok(Entry::null())
            }
        }
        Some(end) => {
            let end = resolve(int_arg(func, end)?).clamp(0, len);
            let start = start.clamp(0, len);
            let slice = if start < end {
                items[start as usize..end as usize].to_vec()
            } else {
                Vec::new()
            };
            Ok(Entry::constant(slice))
        }
    }
}

fn numeric_unary(func: &str, args: &[Entry]) -> Result<Entry> {
    let value = constant(func, one(func, args)?)?;
    let out = match (func, value) {
        (_, FieldData::Null) => FieldData::Null,
        ("abs", FieldData::Int(v)) => FieldData::Int(
            v.checked_abs()
                .ok_or_else(|| ExecError::evaluation("integer overflow in abs()"))?,
        ),
        ("abs", FieldData::Float(v)) => FieldData::Float(v.abs()),
        ("ceil" | "floor" | "round", FieldData::Int(v)) => FieldData::Int(*v),
        ("ceil", FieldData::Float(v)) => FieldData::Float(v.ceil()),
        ("floor", FieldData::Float(v)) => FieldData::Float(v.floor()),
        ("round", FieldData::Float(v)) => FieldData::Float(v.round()),
        ("sign", FieldData::Int(v)) => FieldData::Int(v.signum()),
        ("sign", FieldData::Float(v)) => FieldData::Int(if *v > 0.0 {
            1
        } else if *v < 0.0 {
            -1
        } else {
            0
        }),
        (_, other) => {
            return Err(ExecError::argument(func, format!("number expected, got {}", other.type_name())))
        }
    };
    Ok(Entry::Constant(out))
}

fn convert(func: &str, args: &[Entry]) -> Result<Entry> {
    let value = constant(func, one(func, args)?)?;
    let invalid = || ExecError::argument(func, format!("cannot convert {value}"));
    let out = match (func, value) {
        (_, FieldData::Null) => FieldData::Null,
        ("toboolean", FieldData::Bool(b)) => FieldData::Bool(*b),
        ("toboolean", FieldData::String(s)) => match s.as_str() {
            "true" | "True" => FieldData::Bool(true),
            "false" | "False" => FieldData::Bool(false),
            _ => return Err(invalid()),
        },
        ("tofloat", FieldData::Int(v)) => FieldData::Float(*v as f64),
        ("tofloat", FieldData::Float(v)) => FieldData::Float(*v),
        ("tofloat", FieldData::String(s)) => {
            FieldData::Float(s.trim().parse::<f64>().map_err(|_| invalid())?)
        }
        ("tointeger", FieldData::Int(v)) => FieldData::Int(*v),
        ("tointeger", FieldData::Float(v)) => FieldData::Int(v.trunc() as i64),
        ("tointeger", FieldData::String(s)) => {
            FieldData::Int(s.trim().parse::<i64>().map_err(|_| invalid())?)
        }
        ("tostring", FieldData::String(s)) => FieldData::String(s.clone()),
        ("tostring", v @ (FieldData::Int(_) | FieldData::Float(_) | FieldData::Bool(_) | FieldData::DateTime(_))) => {
            FieldData::String(v.to_string())
        }
        _ => return Err(invalid()),
    };
    Ok(Entry::Constant(out))
}

fn datetime(func: &str, args: &[Entry]) -> Result<Entry> {
    if args.is_empty() {
        let now = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let nanos = i64::try_from(now).map_err(|_| ExecError::evaluation("current time out of range"))?;
        return Ok(Entry::Constant(FieldData::DateTime(nanos)));
    }
    let out = match constant(func, one(func, args)?)? {
        FieldData::Null => FieldData::Null,
        FieldData::DateTime(nanos) | FieldData::Int(nanos) => FieldData::DateTime(*nanos),
        FieldData::String(text) => FieldData::DateTime(parse_datetime(func, text)?),
        other => return Err(ExecError::argument(func, format!("cannot build a datetime from {}", other.type_name()))),
    };
    Ok(Entry::Constant(out))
}

fn parse_datetime(func: &str, text: &str) -> Result<i64> {
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let date_only = format_description!("[year]-[month]-[day]");
    let text = text.trim();
    let parsed = PrimitiveDateTime::parse(text, &spaced)
        .or_else(|_| PrimitiveDateTime::parse(text, &iso))
        .or_else(|_| Date::parse(text, &date_only).map(|date| date.midnight()))
        .map_err(|err| ExecError::evaluation(format!("{func}(): cannot parse '{text}': {err}")))?;
    i64::try_from(parsed.assume_utc().unix_timestamp_nanos())
        .map_err(|_| ExecError::evaluation(format!("{func}(): '{text}' is out of range")))
}

fn datetime_component(func: &str, args: &[Entry]) -> Result<Entry> {
    arity(func, args, 2)?;
    let nanos = match constant(func, &args[0])? {
        FieldData::Null => return Ok(Entry::null()),
        FieldData::DateTime(nanos) | FieldData::Int(nanos) => *nanos,
        other => return Err(ExecError::argument(func, format!("datetime expected, got {}", other.type_name()))),
    };
    let unit = constant(func, &args[1])?
        .as_str()
        .ok_or_else(|| ExecError::argument(func, "component name must be a string"))?
        .to_ascii_lowercase();
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|err| ExecError::evaluation(format!("{func}(): {err}")))?;
    let value = match unit.as_str() {
        "year" => i64::from(dt.year()),
        "month" => i64::from(u8::from(dt.month())),
        "day" => i64::from(dt.day()),
        "hour" => i64::from(dt.hour()),
        "minute" => i64::from(dt.minute()),
        "second" => i64::from(dt.second()),
        "microsecond" => i64::from(dt.microsecond()),
        "nanosecond" => i64::from(dt.nanosecond()),
        _ => return Err(ExecError::argument(func, format!("unknown component '{unit}'"))),
    };
    Ok(Entry::constant(value))
}
