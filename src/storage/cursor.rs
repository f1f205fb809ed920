use crate::error::Result;
use crate::storage::{EdgeRef, GraphTxn};
use crate::types::VertexId;

/// Forward cursor over a snapshot of vertex ids.
#[derive(Clone, Debug, Default)]
pub struct VertexCursor {
    ids: Vec<VertexId>,
    pos: usize,
    started: bool,
}

impl VertexCursor {
    /// Wraps a snapshot; the cursor starts before the first id.
    pub fn new(ids: Vec<VertexId>) -> Self {
        Self {
            ids,
            pos: 0,
            started: false,
        }
    }

    /// Advances to the next id that still exists in `txn`.
    pub fn next(&mut self, txn: &dyn GraphTxn) -> Option<VertexId> {
        if self.started {
            self.pos += 1;
        }
        self.started = true;
        while let Some(vid) = self.ids.get(self.pos).copied() {
            if txn.vertex_exists(vid) {
                return Some(vid);
            }
            self.pos += 1;
        }
        None
    }

    /// Current id, or the invalid sentinel when exhausted or not started.
    pub fn id(&self) -> VertexId {
        if !self.started {
            return VertexId::INVALID;
        }
        self.ids.get(self.pos).copied().unwrap_or(VertexId::INVALID)
    }

    /// True while positioned on an id.
    pub fn is_valid(&self) -> bool {
        self.started && self.pos < self.ids.len()
    }

    /// Rewinds to before the first id.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.started = false;
    }

    /// Snapshot length.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True for an empty snapshot.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Forward cursor over the edges incident to one vertex.
#[derive(Clone, Debug, Default)]
pub struct EdgeCursor {
    edges: Vec<EdgeRef>,
    pos: usize,
}

impl EdgeCursor {
    /// Wraps a snapshot positioned on the first edge.
    pub fn new(edges: Vec<EdgeRef>) -> Self {
        Self { edges, pos: 0 }
    }

    /// Opens a cursor over `vid`'s edges.
    pub fn open(
        txn: &dyn GraphTxn,
        vid: VertexId,
        direction: crate::types::Direction,
        types: &[String],
    ) -> Result<Self> {
        Ok(Self::new(txn.edges(vid, direction, types)?))
    }

    /// Current edge, if positioned on one.
    pub fn current(&self) -> Option<&EdgeRef> {
        self.edges.get(self.pos)
    }

    /// True while positioned on an edge.
    pub fn is_valid(&self) -> bool {
        self.pos < self.edges.len()
    }

    /// Moves to the next edge still present in `txn`.
    pub fn advance(&mut self, txn: &dyn GraphTxn) {
        self.pos += 1;
        self.skip_deleted(txn);
    }

    /// Skips edges deleted since the snapshot was taken.
    pub fn skip_deleted(&mut self, txn: &dyn GraphTxn) {
        while let Some(edge) = self.edges.get(self.pos) {
            if txn.edge_exists(edge.uid.id) {
                break;
            }
            self.pos += 1;
        }
    }
}
