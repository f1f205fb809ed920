//! Identifier newtypes shared by the storage seam and the execution core.
#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Storage vertex identifier. Negative values mark an unbound vertex.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct VertexId(pub i64);

/// Storage edge identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeId(pub i64);

impl VertexId {
    /// Sentinel for "no vertex bound".
    pub const INVALID: VertexId = VertexId(-1);

    /// Returns true when the id refers to a real vertex.
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for VertexId {
    fn default() -> Self {
        VertexId::INVALID
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VertexId {
    fn from(value: i64) -> Self {
        VertexId(value)
    }
}

impl From<i64> for EdgeId {
    fn from(value: i64) -> Self {
        EdgeId(value)
    }
}

/// Fully qualified edge handle: endpoints plus the edge's own id.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EdgeUid {
    /// Source vertex (edge tail).
    pub src: VertexId,
    /// Destination vertex (edge head).
    pub dst: VertexId,
    /// Storage edge id.
    pub id: EdgeId,
}

impl EdgeUid {
    /// Builds an edge handle.
    pub fn new(src: VertexId, dst: VertexId, id: EdgeId) -> Self {
        Self { src, dst, id }
    }

    /// Returns the endpoint opposite to `from`. Self-loops return `from`.
    pub fn other_end(&self, from: VertexId) -> VertexId {
        if self.src == from {
            self.dst
        } else {
            self.src
        }
    }
}

impl fmt::Display for EdgeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.src, self.dst, self.id)
    }
}

/// Edge traversal direction relative to the start vertex.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Follow outgoing edges (`(a)-->(b)`).
    #[default]
    Out,
    /// Follow incoming edges (`(a)<--(b)`).
    In,
    /// Follow edges in either direction (`(a)--(b)`).
    Both,
}

impl Direction {
    /// Arrow notation used by plan explain output.
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Out => "-->",
            Direction::In => "<--",
            Direction::Both => "--",
        }
    }

    /// Direction seen from the opposite endpoint.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_vertex_is_the_negative_sentinel() {
        assert!(!VertexId::INVALID.is_valid());
        assert!(!VertexId::default().is_valid());
        assert!(VertexId(0).is_valid());
    }

    #[test]
    fn other_end_handles_both_endpoints_and_self_loops() {
        let edge = EdgeUid::new(VertexId(1), VertexId(2), EdgeId(7));
        assert_eq!(edge.other_end(VertexId(1)), VertexId(2));
        assert_eq!(edge.other_end(VertexId(2)), VertexId(1));
        let looped = EdgeUid::new(VertexId(3), VertexId(3), EdgeId(8));
        assert_eq!(looped.other_end(VertexId(3)), VertexId(3));
    }
}
