//! Fluent construction of read plans.
//!
//! [`PlanBuilder`] records a match pattern, a predicate and a projection and
//! lowers them into an operator tree: one scan per disconnected pattern
//! component (joined by `CartesianProduct`), one expansion per relationship
//! in declaration order, then `Filter`, `Project` or `Aggregate`, `Distinct`,
//! `Sort`, `Skip`, `Limit` and `ProduceResults`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{ExecError, Result};
use crate::query::expr::ArithExpr;
use crate::query::filter::{CompareOp, Filter};
use crate::query::ops::{
    Aggregate, CartesianProduct, Distinct, ExpandAll, FilterOp, Limit, NodeScan, PhysicalNode, PhysicalOp,
    ProduceResults, Project, ProjectItem, Skip, Sort, SortKey, VarLenExpand,
};
use crate::query::pattern_graph::{Derivation, PatternGraph, PatternNodeId, PropertyFilter, PropertyValue};
use crate::query::plan::ExecutionPlan;
use crate::query::symbol_table::{SymbolScope, SymbolTable, SymbolType};
use crate::query::value::FieldData;
use crate::query::ANONYMOUS_PREFIX;
use crate::types::Direction;

#[derive(Clone, Copy, Debug)]
enum Step {
    Scan(PatternNodeId),
    Expand(usize),
}

/// Fluent builder for `MATCH ... WHERE ... RETURN ...` shaped plans.
#[derive(Default)]
pub struct PlanBuilder {
    pattern: PatternGraph,
    steps: Vec<Step>,
    last: Option<PatternNodeId>,
    pending_direction: Option<Direction>,
    predicate: Option<Filter>,
    projections: Vec<ProjectItem>,
    order: Vec<(String, bool)>,
    skip: Option<usize>,
    limit: Option<usize>,
    distinct: bool,
    path_unique: Option<bool>,
    next_anon: usize,
    error: Option<ExecError>,
}

impl PlanBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new pattern component at `target`.
    pub fn r#match<T>(mut self, target: T) -> Self
    where
        T: Into<MatchTarget>,
    {
        if self.error.is_some() {
            return self;
        }
        let (alias, label) = target.into().into_parts(|| self.next_anon());
        let known = self.pattern.node_by_alias(&alias).map(|node| node.id);
        let id = self.pattern.add_node(label.as_deref(), &alias, Derivation::Matched);
        if known.is_none() {
            self.steps.push(Step::Scan(id));
        }
        self.last = Some(id);
        self
    }

    /// Adds `(last)-[edge]->(target)` continuing from the last node.
    pub fn where_edge<E, T>(mut self, edge: E, target: T) -> Self
    where
        E: Into<EdgeSpec>,
        T: Into<MatchTarget>,
    {
        if self.error.is_some() {
            return self;
        }
        let Some(from) = self.last else {
            self.error = Some(ExecError::input("where_edge requires a preceding match"));
            return self;
        };
        let edge = edge.into();
        let (alias, label) = target.into().into_parts(|| self.next_anon());
        let to = self.pattern.add_node(label.as_deref(), &alias, Derivation::Matched);
        let rel_alias = match edge.alias {
            Some(alias) => alias,
            None => self.next_anon(),
        };
        if self.pattern.relationship_by_alias(&rel_alias).is_some()
            || self.pattern.node_by_alias(&rel_alias).is_some()
        {
            self.error = Some(ExecError::input(format!("variable `{rel_alias}` is already bound")));
            return self;
        }
        let types: Vec<&str> = edge.types.iter().map(String::as_str).collect();
        let direction = self.pending_direction.take().unwrap_or(Direction::Out);
        let rel = self
            .pattern
            .add_relationship(&types, from, to, direction, edge.hops, &rel_alias, Derivation::Matched);
        self.steps.push(Step::Expand(rel.0));
        self.last = Some(to);
        self
    }

    /// Sets the direction of the next edge.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.pending_direction = Some(direction);
        self
    }

    /// Next edge is matched in both directions.
    pub fn bidirectional(self) -> Self {
        self.direction(Direction::Both)
    }

    /// Inline property constraint on an already matched node.
    pub fn with_property(mut self, alias: &str, field: &str, value: impl Into<FieldData>) -> Self {
        self.set_property(alias, field, PropertyValue::Constant(value.into()));
        self
    }

    /// Inline property constraint bound to a query parameter.
    pub fn with_property_param(mut self, alias: &str, field: &str, param: &str) -> Self {
        self.set_property(alias, field, PropertyValue::Parameter(param.trim_start_matches('$').to_string()));
        self
    }

    /// Conjoins `filter` to the predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Filter::and(existing, filter),
            None => filter,
        });
        self
    }

    /// Adds predicates on the properties of `var` using a nested builder.
    pub fn where_var<F>(mut self, var: &str, build: F) -> Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        if self.error.is_some() {
            return self;
        }
        let mut builder = PredicateBuilder::new(var);
        build(&mut builder);
        match Filter::all(builder.parts) {
            Some(filter) => self.filter(filter),
            None => {
                self.error = Some(ExecError::input("where_var requires at least one predicate"));
                self
            }
        }
    }

    /// Sets the projection list.
    pub fn select<I, P>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectionSpec>,
    {
        self.projections = items.into_iter().map(|item| item.into().into_item()).collect();
        self
    }

    /// Drops duplicate result rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Orders by a projected column or `alias.property`.
    pub fn order_by(mut self, key: &str, descending: bool) -> Self {
        self.order.push((key.to_string(), descending));
        self
    }

    /// Edge uniqueness for variable-length expansions (on by default).
    pub fn path_unique(mut self, path_unique: bool) -> Self {
        self.path_unique = Some(path_unique);
        self
    }

    /// Skips the first `skip` rows.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Keeps at most `limit` rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The pattern declared so far.
    pub fn pattern(&self) -> &PatternGraph {
        &self.pattern
    }

    /// Lowers the builder into an executable plan.
    pub fn build(mut self) -> Result<ExecutionPlan> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.steps.is_empty() {
            return Err(ExecError::input("plan requires at least one match"));
        }
        let mut symbols = SymbolTable::new();
        for node in self.pattern.nodes() {
            symbols.add(&node.alias, SymbolType::Node, SymbolScope::Local);
        }
        for rel in self.pattern.relationships() {
            symbols.add(&rel.alias, SymbolType::Relationship, SymbolScope::Local);
        }

        let mut inline = Vec::new();
        let mut components: Vec<PhysicalNode> = Vec::new();
        let mut bound: BTreeSet<PatternNodeId> = BTreeSet::new();
        for step in &self.steps {
            match *step {
                Step::Scan(id) => {
                    let node = self
                        .pattern
                        .node(id)
                        .ok_or_else(|| ExecError::internal("scan step names an unknown pattern node"))?;
                    let scan = match &node.label {
                        Some(label) => PhysicalOp::NodeByLabelScan(NodeScan::by_label(&node.alias, label).with_node(id)),
                        None => PhysicalOp::AllNodeScan(NodeScan::all(&node.alias).with_node(id)),
                    };
                    components.push(PhysicalNode::leaf(scan));
                    bound.insert(id);
                }
                Step::Expand(index) => {
                    let rel = self
                        .pattern
                        .relationships()
                        .get(index)
                        .ok_or_else(|| ExecError::internal("expand step names an unknown relationship"))?;
                    let (src, dst) = (rel.src, rel.dst);
                    let src_alias = self.alias_of(src)?;
                    let dst_node = self
                        .pattern
                        .node(dst)
                        .ok_or_else(|| ExecError::internal("relationship ends at an unknown pattern node"))?;
                    let into = !bound.insert(dst);
                    let op = match rel.hops {
                        Some((min_hop, max_hop)) => {
                            let mut expand =
                                VarLenExpand::new(src_alias, &rel.alias, &dst_node.alias, rel.direction, min_hop, max_hop)
                                    .with_types(rel.types.clone())
                                    .with_neighbor_label(dst_node.label.clone());
                            expand.rel = Some(rel.id);
                            expand.dst_node = Some(dst);
                            expand.part = self.pattern.part();
                            expand.into = into;
                            if let Some(path_unique) = self.path_unique {
                                expand.path_unique = path_unique;
                            }
                            PhysicalOp::VarLenExpand(expand)
                        }
                        None => {
                            let mut expand = ExpandAll::new(src_alias, &rel.alias, &dst_node.alias, rel.direction)
                                .with_types(rel.types.clone())
                                .with_neighbor_label(dst_node.label.clone());
                            expand.rel = Some(rel.id);
                            expand.dst_node = Some(dst);
                            expand.part = self.pattern.part();
                            expand.into = into;
                            PhysicalOp::ExpandAll(expand)
                        }
                    };
                    let input = components
                        .pop()
                        .ok_or_else(|| ExecError::internal("expansion without a bound start"))?;
                    components.push(PhysicalNode::unary(op, input));
                }
            }
        }
        for node in self.pattern.nodes() {
            if let Some(PropertyFilter { field, value }) = &node.property {
                let rhs = match value {
                    PropertyValue::Constant(value) => ArithExpr::constant(value.clone()),
                    PropertyValue::Parameter(name) => ArithExpr::param(name),
                };
                inline.push(Filter::range(ArithExpr::prop(&node.alias, field), CompareOp::Eq, rhs));
            }
        }

        let mut root = match components.len() {
            1 => components.pop().ok_or_else(|| ExecError::internal("pattern has no component"))?,
            _ => PhysicalNode::new(PhysicalOp::CartesianProduct(CartesianProduct::new()), components),
        };
        if let Some(filter) = Filter::all(inline.into_iter().chain(self.predicate)) {
            root = PhysicalNode::unary(PhysicalOp::Filter(FilterOp::new(filter)), root);
        }

        let projections = if self.projections.is_empty() {
            self.pattern
                .nodes()
                .iter()
                .filter(|node| !node.alias.starts_with(ANONYMOUS_PREFIX))
                .map(|node| ProjectItem::new(ArithExpr::var(&node.alias), &node.alias))
                .collect()
        } else {
            self.projections
        };
        let mut output = Vec::with_capacity(projections.len());
        for item in &projections {
            if symbols.get(&item.alias).is_none() {
                symbols.add(&item.alias, SymbolType::Constant, SymbolScope::Local);
            }
            output.push(item.alias.clone());
        }
        if projections.iter().any(|item| item.expr.contains_aggregation()) {
            let (aggregates, keys): (Vec<ProjectItem>, Vec<ProjectItem>) =
                projections.into_iter().partition(|item| item.expr.contains_aggregation());
            root = PhysicalNode::unary(PhysicalOp::Aggregate(Aggregate::new(keys, aggregates)), root);
        } else if !projections
            .iter()
            .all(|item| item.expr.as_variable() == Some((item.alias.as_str(), None)))
        {
            root = PhysicalNode::unary(PhysicalOp::Project(Project::new(projections)), root);
        }
        if self.distinct {
            root = PhysicalNode::unary(PhysicalOp::Distinct(Distinct::new(output.clone())), root);
        }
        if !self.order.is_empty() {
            let keys = self
                .order
                .iter()
                .map(|(key, descending)| {
                    let expr = sort_expr(key, &output);
                    if *descending {
                        SortKey::desc(expr)
                    } else {
                        SortKey::asc(expr)
                    }
                })
                .collect();
            root = PhysicalNode::unary(PhysicalOp::Sort(Sort::new(keys)), root);
        }
        if let Some(skip) = self.skip {
            root = PhysicalNode::unary(PhysicalOp::Skip(Skip::new(skip)), root);
        }
        if let Some(limit) = self.limit {
            root = PhysicalNode::unary(PhysicalOp::Limit(Limit::new(limit)), root);
        }
        let columns = output.iter().map(|alias| (alias.clone(), alias.clone())).collect();
        root = PhysicalNode::unary(PhysicalOp::ProduceResults(ProduceResults::new(columns)), root);
        ExecutionPlan::new(root, Arc::new(symbols))
    }

    fn alias_of(&self, id: PatternNodeId) -> Result<&str> {
        self.pattern
            .node(id)
            .map(|node| node.alias.as_str())
            .ok_or_else(|| ExecError::internal("relationship starts at an unknown pattern node"))
    }

    fn set_property(&mut self, alias: &str, field: &str, value: PropertyValue) {
        if self.error.is_some() {
            return;
        }
        match self.pattern.node_by_alias(alias).map(|node| node.id) {
            Some(id) => self.pattern.set_node_property(
                id,
                PropertyFilter {
                    field: field.to_string(),
                    value,
                },
            ),
            None => self.error = Some(ExecError::input(format!("variable `{alias}` is not matched"))),
        }
    }

    fn next_anon(&mut self) -> String {
        let idx = self.next_anon;
        self.next_anon += 1;
        format!("{ANONYMOUS_PREFIX}{idx}")
    }
}

fn sort_expr(key: &str, output: &[String]) -> ArithExpr {
    if output.iter().any(|alias| alias == key) {
        return ArithExpr::var(key);
    }
    parse_column(key)
}

/// `alias.property` or a bare variable.
fn parse_column(text: &str) -> ArithExpr {
    match text.split_once('.') {
        Some((alias, property)) => ArithExpr::prop(alias, property),
        None => ArithExpr::var(text),
    }
}

/// Target node of a match or edge clause.
pub enum MatchTarget {
    /// Anonymous node without a label.
    Any,
    /// Anonymous node with a label.
    Label(String),
    /// Named node with an optional label.
    Var {
        /// Variable name.
        name: String,
        /// Label constraint.
        label: Option<String>,
    },
}

impl MatchTarget {
    fn into_parts(self, fallback: impl FnOnce() -> String) -> (String, Option<String>) {
        match self {
            MatchTarget::Any => (fallback(), None),
            MatchTarget::Label(label) => (fallback(), Some(label)),
            MatchTarget::Var { name, label } => (name, label),
        }
    }
}

impl From<&str> for MatchTarget {
    fn from(label: &str) -> Self {
        MatchTarget::Label(label.to_owned())
    }
}

impl From<(&str, &str)> for MatchTarget {
    fn from((var, label): (&str, &str)) -> Self {
        MatchTarget::Var {
            name: var.to_owned(),
            label: Some(label.to_owned()),
        }
    }
}

impl From<(&str, Option<&str>)> for MatchTarget {
    fn from((var, label): (&str, Option<&str>)) -> Self {
        MatchTarget::Var {
            name: var.to_owned(),
            label: label.map(str::to_owned),
        }
    }
}

/// Relationship of an edge clause.
#[derive(Clone, Debug, Default)]
pub struct EdgeSpec {
    alias: Option<String>,
    types: Vec<String>,
    hops: Option<(u32, u32)>,
}

impl EdgeSpec {
    /// Relationship restricted to `types` (empty = any).
    pub fn new(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Names the relationship variable.
    pub fn named(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// Makes the relationship variable-length.
    pub fn hops(mut self, min: u32, max: u32) -> Self {
        self.hops = Some((min, max));
        self
    }
}

impl From<&str> for EdgeSpec {
    fn from(edge_type: &str) -> Self {
        Self::new(&[edge_type])
    }
}

impl From<Option<&str>> for EdgeSpec {
    fn from(edge_type: Option<&str>) -> Self {
        match edge_type {
            Some(edge_type) => Self::new(&[edge_type]),
            None => Self::default(),
        }
    }
}

/// Predicates over the properties of one variable, conjoined.
pub struct PredicateBuilder {
    var: String,
    parts: Vec<Filter>,
}

impl PredicateBuilder {
    fn new(var: &str) -> Self {
        Self {
            var: var.to_string(),
            parts: Vec::new(),
        }
    }

    fn push_cmp(&mut self, prop: &str, op: CompareOp, value: impl Into<FieldData>) -> &mut Self {
        let part = Filter::range(ArithExpr::prop(&self.var, prop), op, ArithExpr::constant(value));
        self.parts.push(part);
        self
    }

    /// `var.prop = value`.
    pub fn eq(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Eq, value)
    }

    /// `var.prop <> value`.
    pub fn ne(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Ne, value)
    }

    /// `var.prop < value`.
    pub fn lt(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Lt, value)
    }

    /// `var.prop <= value`.
    pub fn le(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Le, value)
    }

    /// `var.prop > value`.
    pub fn gt(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Gt, value)
    }

    /// `var.prop >= value`.
    pub fn ge(&mut self, prop: &str, value: impl Into<FieldData>) -> &mut Self {
        self.push_cmp(prop, CompareOp::Ge, value)
    }

    /// `var.prop IN [values]`.
    pub fn in_list<I, V>(&mut self, prop: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldData>,
    {
        let list = FieldData::Array(values.into_iter().map(Into::into).collect());
        self.parts
            .push(Filter::test_in(ArithExpr::prop(&self.var, prop), ArithExpr::constant(list)));
        self
    }

    /// `var.prop IS NULL`.
    pub fn is_null(&mut self, prop: &str) -> &mut Self {
        self.parts.push(Filter::is_null(ArithExpr::prop(&self.var, prop), false));
        self
    }

    /// `var.prop IS NOT NULL`.
    pub fn is_not_null(&mut self, prop: &str) -> &mut Self {
        self.parts.push(Filter::is_null(ArithExpr::prop(&self.var, prop), true));
        self
    }
}

/// One projected column.
pub struct ProjectionSpec {
    expr: ArithExpr,
    alias: String,
}

impl ProjectionSpec {
    /// `expr AS alias`.
    pub fn new(expr: ArithExpr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.to_string(),
        }
    }

    fn into_item(self) -> ProjectItem {
        ProjectItem::new(self.expr, &self.alias)
    }
}

impl From<&str> for ProjectionSpec {
    fn from(column: &str) -> Self {
        Self::new(parse_column(column), column)
    }
}

impl From<(&str, &str)> for ProjectionSpec {
    fn from((column, alias): (&str, &str)) -> Self {
        Self::new(parse_column(column), alias)
    }
}

impl From<(ArithExpr, &str)> for ProjectionSpec {
    fn from((expr, alias): (ArithExpr, &str)) -> Self {
        Self::new(expr, alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::ExecContext;
    use crate::query::ops::test_support::{people, rows};

    fn shape(plan: &ExecutionPlan) -> Vec<String> {
        plan.explain().operators()
    }

    #[test]
    fn builder_lowers_match_expand_filter_project() -> Result<()> {
        let mut plan = PlanBuilder::new()
            .r#match(("a", "Person"))
            .where_edge(EdgeSpec::new(&["KNOWS"]).named("r"), ("b", None))
            .where_var("a", |p| {
                p.gt("age", 30i64);
            })
            .select([("b.name", "friend")])
            .build()?;
        assert_eq!(shape(&plan), vec!["ProduceResults", "Project", "Filter", "ExpandAll", "NodeByLabelScan"]);
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        assert_eq!(rows(&plan.execute(&mut ctx)?), vec!["bob"]);
        Ok(())
    }

    #[test]
    fn aggregate_items_split_into_keys_and_aggregates() -> Result<()> {
        let mut plan = PlanBuilder::new()
            .r#match(("p", "Person"))
            .where_edge("LIVES_IN", ("c", "City"))
            .select([
                ProjectionSpec::from(("c.name", "city")),
                ProjectionSpec::from((ArithExpr::count_star(), "residents")),
            ])
            .order_by("residents", true)
            .build()?;
        assert_eq!(shape(&plan), vec!["ProduceResults", "Sort", "Aggregate", "ExpandAll", "NodeByLabelScan"]);
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        let result = plan.execute(&mut ctx)?;
        assert_eq!(result.header, vec!["city", "residents"]);
        assert_eq!(rows(&result), vec!["oslo,2", "rome,1"]);
        Ok(())
    }

    #[test]
    fn inline_properties_and_paging() -> Result<()> {
        let mut plan = PlanBuilder::new()
            .r#match(("c", "City"))
            .with_property("c", "name", "oslo")
            .r#match(("p", "Person"))
            .select(["p.name"])
            .order_by("p.name", false)
            .skip(1)
            .limit(1)
            .build()?;
        assert_eq!(
            shape(&plan),
            vec!["ProduceResults", "Limit", "Skip", "Sort", "Project", "Filter", "CartesianProduct", "NodeByLabelScan", "NodeByLabelScan"]
        );
        let mut graph = people();
        let mut ctx = ExecContext::new(&mut graph);
        assert_eq!(rows(&plan.execute(&mut ctx)?), vec!["bob"]);
        Ok(())
    }

    #[test]
    fn returning_bare_variables_skips_project() -> Result<()> {
        let plan = PlanBuilder::new()
            .r#match(("n", "Person"))
            .where_edge("KNOWS", "Person")
            .build()?;
        assert_eq!(shape(&plan), vec!["ProduceResults", "ExpandAll", "NodeByLabelScan"]);
        Ok(())
    }

    #[test]
    fn errors_surface_at_build() {
        let err = PlanBuilder::new().where_edge("KNOWS", ("b", None)).build().err();
        assert_eq!(err.map(|e| e.code()), Some("INPUT_ERROR"));
        let err = PlanBuilder::new()
            .r#match(("n", None))
            .with_property("m", "name", "x")
            .build()
            .err();
        assert_eq!(err.map(|e| e.code()), Some("INPUT_ERROR"));
        assert!(PlanBuilder::new().build().is_err());
    }
}
