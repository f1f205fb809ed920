//! Declared match pattern held in an id-addressed arena.
//!
//! Nodes and relationships are referenced by [`PatternNodeId`] and
//! [`PatternRelId`]; ids stay valid for the lifetime of the graph no matter
//! how many entities are appended afterwards.

use std::collections::HashMap;

use crate::query::value::FieldData;
use crate::types::Direction;

/// Stable id of a pattern node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternNodeId(pub usize);

/// Stable id of a pattern relationship.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternRelId(pub usize);

/// How an entity entered the pattern.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Derivation {
    /// Bound by MATCH.
    Matched,
    /// Introduced by CREATE.
    Created,
    /// Introduced by MERGE.
    Merged,
    /// Carried in from an enclosing query part.
    Argument,
}

/// Inline property constraint on a pattern node (`(n:L {field: value})`).
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Literal value.
    Constant(FieldData),
    /// Query parameter name (without `$`).
    Parameter(String),
}

/// Inline property constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyFilter {
    /// Field name.
    pub field: String,
    /// Required value.
    pub value: PropertyValue,
}

/// A vertex in the declared pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternNode {
    /// Stable id.
    pub id: PatternNodeId,
    /// Required label.
    pub label: Option<String>,
    /// Variable name (generated for anonymous nodes).
    pub alias: String,
    /// Inline property constraint.
    pub property: Option<PropertyFilter>,
    /// Origin.
    pub derivation: Derivation,
    /// Relationships ending at this node.
    pub lhs: Vec<PatternRelId>,
    /// Relationships starting at this node.
    pub rhs: Vec<PatternRelId>,
}

/// A relationship in the declared pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternRelationship {
    /// Stable id.
    pub id: PatternRelId,
    /// Allowed types (empty = any).
    pub types: Vec<String>,
    /// Source node.
    pub src: PatternNodeId,
    /// Destination node.
    pub dst: PatternNodeId,
    /// Declared direction from `src` to `dst`.
    pub direction: Direction,
    /// Hop bounds for variable-length relationships.
    pub hops: Option<(u32, u32)>,
    /// Variable name.
    pub alias: String,
    /// Origin.
    pub derivation: Derivation,
}

impl PatternRelationship {
    /// True for `*min..max` relationships.
    pub fn is_var_len(&self) -> bool {
        self.hops.is_some()
    }

    /// Direction when expanding from `start`.
    pub fn direction_from(&self, start: PatternNodeId) -> Direction {
        if self.direction == Direction::Both || self.src == start {
            self.direction
        } else {
            self.direction.reversed()
        }
    }

    /// Endpoint opposite to `node`.
    pub fn other_end(&self, node: PatternNodeId) -> PatternNodeId {
        if self.src == node {
            self.dst
        } else {
            self.src
        }
    }
}

/// Pattern of one query part.
#[derive(Clone, Debug, Default)]
pub struct PatternGraph {
    part: u32,
    nodes: Vec<PatternNode>,
    relationships: Vec<PatternRelationship>,
    node_aliases: HashMap<String, PatternNodeId>,
    rel_aliases: HashMap<String, PatternRelId>,
}

impl PatternGraph {
    /// Creates an empty pattern for query part `part`.
    pub fn new(part: u32) -> Self {
        Self {
            part,
            ..Self::default()
        }
    }

    /// Query part this pattern belongs to; scopes path uniqueness.
    pub fn part(&self) -> u32 {
        self.part
    }

    /// Appends a node and returns its id. An existing alias returns the
    /// already registered node.
    pub fn add_node(
        &mut self,
        label: Option<&str>,
        alias: &str,
        derivation: Derivation,
    ) -> PatternNodeId {
        if let Some(id) = self.node_aliases.get(alias) {
            return *id;
        }
        let id = PatternNodeId(self.nodes.len());
        self.nodes.push(PatternNode {
            id,
            label: label.map(str::to_string),
            alias: alias.to_string(),
            property: None,
            derivation,
            lhs: Vec::new(),
            rhs: Vec::new(),
        });
        self.node_aliases.insert(alias.to_string(), id);
        id
    }

    /// Attaches an inline property constraint to a node.
    pub fn set_node_property(&mut self, id: PatternNodeId, filter: PropertyFilter) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.property = Some(filter);
        }
    }

    /// Appends a relationship and registers it on both endpoints.
    /// Duplicate and self-loop detection is the caller's responsibility.
    #[allow(clippy::too_many_arguments)]
    pub fn add_relationship(
        &mut self,
        types: &[&str],
        src: PatternNodeId,
        dst: PatternNodeId,
        direction: Direction,
        hops: Option<(u32, u32)>,
        alias: &str,
        derivation: Derivation,
    ) -> PatternRelId {
        let id = PatternRelId(self.relationships.len());
        self.relationships.push(PatternRelationship {
            id,
            types: types.iter().map(|t| t.to_string()).collect(),
            src,
            dst,
            direction,
            hops,
            alias: alias.to_string(),
            derivation,
        });
        if let Some(node) = self.nodes.get_mut(src.0) {
            node.rhs.push(id);
        }
        if let Some(node) = self.nodes.get_mut(dst.0) {
            node.lhs.push(id);
        }
        self.rel_aliases.insert(alias.to_string(), id);
        id
    }

    /// Node by id.
    pub fn node(&self, id: PatternNodeId) -> Option<&PatternNode> {
        self.nodes.get(id.0)
    }

    /// Node by alias.
    pub fn node_by_alias(&self, alias: &str) -> Option<&PatternNode> {
        self.node_aliases.get(alias).and_then(|id| self.node(*id))
    }

    /// Relationship by id.
    pub fn relationship(&self, id: PatternRelId) -> Option<&PatternRelationship> {
        self.relationships.get(id.0)
    }

    /// Relationship by alias.
    pub fn relationship_by_alias(&self, alias: &str) -> Option<&PatternRelationship> {
        self.rel_aliases
            .get(alias)
            .and_then(|id| self.relationship(*id))
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    /// All relationships in id order.
    pub fn relationships(&self) -> &[PatternRelationship] {
        &self.relationships
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_registers_on_both_endpoints() {
        let mut graph = PatternGraph::new(0);
        let a = graph.add_node(Some("Person"), "a", Derivation::Matched);
        let b = graph.add_node(None, "b", Derivation::Matched);
        let r = graph.add_relationship(&["KNOWS"], a, b, Direction::Out, None, "r", Derivation::Matched);
        assert_eq!(graph.node(a).map(|n| n.rhs.clone()), Some(vec![r]));
        assert_eq!(graph.node(b).map(|n| n.lhs.clone()), Some(vec![r]));
        let rel = graph.relationship_by_alias("r").expect("relationship");
        assert_eq!(rel.direction_from(b), Direction::In);
        assert_eq!(rel.other_end(a), b);
    }

    #[test]
    fn ids_survive_growth() {
        let mut graph = PatternGraph::new(0);
        let first = graph.add_node(None, "n0", Derivation::Matched);
        for i in 1..100 {
            graph.add_node(None, &format!("n{i}"), Derivation::Matched);
        }
        assert_eq!(graph.node(first).map(|n| n.alias.as_str()), Some("n0"));
        assert!(graph.node_by_alias("missing").is_none());
    }
}
