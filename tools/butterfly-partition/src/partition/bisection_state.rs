//! Bookkeeping for the recursive bisection
//!
//! Bisection ids are stored per original node id. Bit `31 - depth` holds the
//! side a node fell on at that depth (1 = sink side), so ids sort like their
//! recursion paths and a common prefix means a common ancestor range.

use crate::partition::graph::{NodeId, NodeRange};

pub type BisectionId = u32;

/// Number of bits in a [`BisectionId`]
pub const MAX_BISECTION_DEPTH: u32 = BisectionId::BITS;

/// Bit set for the sink side at `depth`
pub fn depth_bit(depth: u32) -> BisectionId {
    debug_assert!(depth < MAX_BISECTION_DEPTH);
    1 << (MAX_BISECTION_DEPTH - 1 - depth)
}

/// One subproblem waiting on the work stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRange {
    pub range: NodeRange,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct RecursiveBisectionState {
    bisection_ids: Vec<BisectionId>,
    undividable: Vec<bool>,
    pending: Vec<PendingRange>,
    max_depth: u32,
    num_leaves: usize,
}

impl RecursiveBisectionState {
    /// Fresh state with the whole node array pending at depth 0
    pub fn new(num_nodes: usize) -> Self {
        let mut pending = Vec::new();
        if num_nodes > 0 {
            pending.push(PendingRange {
                range: NodeRange::new(0, num_nodes as u32),
                depth: 0,
            });
        }
        Self {
            bisection_ids: vec![0; num_nodes],
            undividable: vec![false; num_nodes],
            pending,
            max_depth: 0,
            num_leaves: 0,
        }
    }

    pub fn pop(&mut self) -> Option<PendingRange> {
        self.pending.pop()
    }

    /// Push both halves of a split range. The left half is processed first.
    pub fn push_children(&mut self, left: NodeRange, right: NodeRange, depth: u32) {
        for range in [right, left] {
            if !range.is_empty() {
                self.pending.push(PendingRange { range, depth });
            }
        }
    }

    pub fn set_sink_side(&mut self, original_id: NodeId, depth: u32) {
        self.bisection_ids[original_id as usize] |= depth_bit(depth);
    }

    /// Close a range as a cell of the recursion
    pub fn finish_leaf(&mut self, depth: u32) {
        self.max_depth = self.max_depth.max(depth);
        self.num_leaves += 1;
    }

    pub fn mark_undividable(&mut self, original_id: NodeId) {
        self.undividable[original_id as usize] = true;
    }

    pub fn is_undividable(&self, original_id: NodeId) -> bool {
        self.undividable[original_id as usize]
    }

    pub fn bisection_ids(&self) -> &[BisectionId] {
        &self.bisection_ids
    }

    pub fn into_bisection_ids(self) -> Vec<BisectionId> {
        self.bisection_ids
    }

    /// Deepest leaf depth, i.e. the number of significant id bits
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    pub fn num_undividable(&self) -> usize {
        self.undividable.iter().filter(|&&flag| flag).count()
    }
}
