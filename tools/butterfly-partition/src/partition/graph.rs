//! Bisection graph: compressed adjacency with per-node coordinates
//!
//! The node array is the arena every recursion step works on. It is built
//! once and afterwards only permuted inside sub-ranges, never reallocated.
//! Edge targets always store *positions* in the node array; when a range is
//! reordered, the targets of edges inside that range are remapped. Targets
//! pointing outside a range are stale but can never fall inside any
//! descendant range, so views simply ignore them.

use crate::error::{PartitionError, Result};

pub type NodeId = u32;
pub type EdgeId = u32;

/// Planar coordinate (degrees, lon/lat)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BisectionNode {
    pub coordinate: Coordinate,
    /// Id of the node in the upstream graph
    pub original_id: NodeId,
    edges_begin: EdgeId,
    edges_end: EdgeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BisectionEdge {
    /// Current position of the target in the node array
    pub target: NodeId,
    pub weight: u32,
}

/// Edge of a view, target expressed as a view-local id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewEdge {
    pub target: NodeId,
    pub weight: u32,
}

/// Owned `[begin, end)` descriptor of one recursion subproblem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRange {
    pub begin: u32,
    pub end: u32,
}

impl NodeRange {
    pub fn new(begin: u32, end: u32) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Split at an absolute position inside the range
    pub fn split_at(&self, mid: u32) -> (NodeRange, NodeRange) {
        debug_assert!(self.begin <= mid && mid <= self.end);
        (NodeRange::new(self.begin, mid), NodeRange::new(mid, self.end))
    }
}

#[derive(Debug, Clone)]
pub struct BisectionGraph {
    nodes: Vec<BisectionNode>,
    edges: Vec<BisectionEdge>,
}

impl BisectionGraph {
    /// Build from CSR adjacency (`offsets` has `n + 1` entries)
    pub fn from_csr(
        offsets: &[u64],
        heads: &[u32],
        weights: &[u32],
        coordinates: &[Coordinate],
    ) -> Result<Self> {
        let n = offsets.len().saturating_sub(1);
        if coordinates.len() != n {
            return Err(PartitionError::CoordinateCountMismatch {
                nodes: n,
                coordinates: coordinates.len(),
            });
        }
        debug_assert_eq!(heads.len(), weights.len());

        let mut nodes = Vec::with_capacity(n);
        let mut edges = Vec::with_capacity(heads.len());

        for u in 0..n {
            let start = offsets[u] as usize;
            let end = offsets[u + 1] as usize;
            let edges_begin = edges.len() as EdgeId;
            for i in start..end {
                let target = heads[i];
                if target as usize >= n {
                    return Err(PartitionError::EdgeTargetOutOfRange {
                        node: u,
                        edge: i,
                        target,
                        nodes: n,
                    });
                }
                edges.push(BisectionEdge {
                    target,
                    weight: weights[i],
                });
            }
            nodes.push(BisectionNode {
                coordinate: coordinates[u],
                original_id: u as NodeId,
                edges_begin,
                edges_end: edges.len() as EdgeId,
            });
        }

        Ok(Self { nodes, edges })
    }

    /// Build from an unordered `(source, target, weight)` edge list
    pub fn from_edges(coordinates: &[Coordinate], edge_list: &[(NodeId, NodeId, u32)]) -> Result<Self> {
        let n = coordinates.len();
        let mut sorted = edge_list.to_vec();
        sorted.sort_by_key(|&(u, v, _)| (u, v));

        let mut offsets = vec![0u64; n + 1];
        for &(u, _, _) in &sorted {
            if u as usize >= n {
                return Err(PartitionError::EdgeTargetOutOfRange {
                    node: u as usize,
                    edge: 0,
                    target: u,
                    nodes: n,
                });
            }
            offsets[u as usize + 1] += 1;
        }
        for i in 0..n {
            offsets[i + 1] += offsets[i];
        }

        let heads: Vec<u32> = sorted.iter().map(|&(_, v, _)| v).collect();
        let weights: Vec<u32> = sorted.iter().map(|&(_, _, w)| w).collect();
        Self::from_csr(&offsets, &heads, &weights, coordinates)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, position: NodeId) -> &BisectionNode {
        &self.nodes[position as usize]
    }

    pub fn nodes(&self) -> &[BisectionNode] {
        &self.nodes
    }

    /// All outgoing edges of the node at `position`, including stale ones
    pub fn edges(&self, position: NodeId) -> &[BisectionEdge] {
        let node = &self.nodes[position as usize];
        &self.edges[node.edges_begin as usize..node.edges_end as usize]
    }

    pub fn full_range(&self) -> NodeRange {
        NodeRange::new(0, self.nodes.len() as u32)
    }

    pub fn view(&self, range: NodeRange) -> GraphView<'_> {
        debug_assert!(range.end as usize <= self.nodes.len());
        GraphView { graph: self, range }
    }

    /// Stable rearrangement of `range` so that nodes with `!on_right[i]`
    /// come first. `on_right` is indexed by view-local id. Returns the
    /// absolute position of the first right-side node.
    pub fn partition_range(&mut self, range: NodeRange, on_right: &[bool]) -> u32 {
        debug_assert_eq!(on_right.len(), range.len());

        let n_left = on_right.iter().filter(|&&right| !right).count() as u32;
        let mut new_local = Vec::with_capacity(range.len());
        let (mut next_left, mut next_right) = (0u32, n_left);
        for &right in on_right {
            if right {
                new_local.push(next_right);
                next_right += 1;
            } else {
                new_local.push(next_left);
                next_left += 1;
            }
        }

        let begin = range.begin as usize;
        let old: Vec<BisectionNode> = self.nodes[begin..range.end as usize].to_vec();
        for (local, node) in old.into_iter().enumerate() {
            self.nodes[begin + new_local[local] as usize] = node;
        }

        for position in range.begin..range.end {
            let node = self.nodes[position as usize];
            for edge in &mut self.edges[node.edges_begin as usize..node.edges_end as usize] {
                if edge.target >= range.begin && edge.target < range.end {
                    edge.target = range.begin + new_local[(edge.target - range.begin) as usize];
                }
            }
        }

        range.begin + n_left
    }
}

/// Contiguous window over the node array; node ids are view-local
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    graph: &'a BisectionGraph,
    range: NodeRange,
}

impl<'a> GraphView<'a> {
    pub fn range(&self) -> NodeRange {
        self.range
    }

    pub fn num_nodes(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn node(&self, local: NodeId) -> &'a BisectionNode {
        self.graph.node(self.range.begin + local)
    }

    pub fn coordinate(&self, local: NodeId) -> Coordinate {
        self.node(local).coordinate
    }

    pub fn original_id(&self, local: NodeId) -> NodeId {
        self.node(local).original_id
    }

    /// Edges staying inside the view, targets as view-local ids
    pub fn edges(&self, local: NodeId) -> impl Iterator<Item = ViewEdge> + 'a {
        let NodeRange { begin, end } = self.range;
        self.graph
            .edges(begin + local)
            .iter()
            .filter(move |edge| edge.target >= begin && edge.target < end)
            .map(move |edge| ViewEdge {
                target: edge.target - begin,
                weight: edge.weight,
            })
    }

    /// Number of edges of `local` pointing outside the view
    pub fn leaving_edges(&self, local: NodeId) -> usize {
        let NodeRange { begin, end } = self.range;
        self.graph
            .edges(begin + local)
            .iter()
            .filter(|edge| edge.target < begin || edge.target >= end)
            .count()
    }

    pub fn num_inner_edges(&self) -> usize {
        (0..self.num_nodes() as NodeId)
            .map(|local| self.edges(local).count())
            .sum()
    }

    /// Edges from the view to nodes outside of it
    pub fn num_leaving_edges(&self) -> usize {
        (0..self.num_nodes() as NodeId)
            .map(|local| self.leaving_edges(local))
            .sum()
    }
}

/// Number of in-view arcs going from the left side (`false`) to the right side (`true`)
pub fn count_cut_edges(view: &GraphView<'_>, on_right: &[bool]) -> usize {
    let mut cut = 0;
    for u in 0..view.num_nodes() as NodeId {
        if on_right[u as usize] {
            continue;
        }
        cut += view.edges(u).filter(|e| on_right[e.target as usize]).count();
    }
    cut
}
