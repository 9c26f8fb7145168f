//! Dinic max-flow / min-cut between a source set and a sink set of a view
//!
//! The flow network is rebuilt for every call from the view plus a super
//! source and super sink, but all of its buffers live in `DinicMaxFlow` and
//! keep their capacity between calls. One instance must not be shared by
//! concurrent callers; give every worker its own.

use std::collections::VecDeque;

use crate::config::CapacityModel;
use crate::partition::graph::{GraphView, NodeId};

const INVALID_LEVEL: u32 = u32::MAX;
const INFINITE_CAPACITY: u32 = u32::MAX;

/// Rejected residual closures before the balancing pass gives up
const MAX_BALANCE_PROBES: usize = 64;

/// Result of a min-cut computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinCut {
    /// Nodes on the source side (`flags[v] == false`)
    pub num_nodes_source: usize,
    /// Cut capacity, equal to the max-flow value. Under the unit edge model
    /// this is the number of boundary arcs. Under the unit vertex model a
    /// value above the view size means a source touches a sink directly.
    pub num_edges: u64,
    /// `true` if the view-local node ended up on the sink side
    pub flags: Vec<bool>,
}

impl MinCut {
    fn one_sided(n: usize, sink_side: bool) -> Self {
        Self {
            num_nodes_source: if sink_side { 0 } else { n },
            num_edges: 0,
            flags: vec![sink_side; n],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Arc {
    head: u32,
    capacity: u32,
    rev: u32,
}

/// Dinic blocking-flow solver with reusable working buffers
#[derive(Debug, Default)]
pub struct DinicMaxFlow {
    model: CapacityModel,
    n_view: usize,
    first_arc: Vec<u32>,
    arcs: Vec<Arc>,
    pending: Vec<(u32, u32, u32)>,
    level: Vec<u32>,
    next_arc: Vec<u32>,
    queue: VecDeque<u32>,
    path: Vec<u32>,
    reaches_sink: Vec<bool>,
    stamp: Vec<u32>,
    current_stamp: u32,
    closure: Vec<u32>,
    role: Vec<u8>,
}

const ROLE_NONE: u8 = 0;
const ROLE_SOURCE: u8 = 1;
const ROLE_SINK: u8 = 2;

impl DinicMaxFlow {
    pub fn new(model: CapacityModel) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub(crate) fn reserved_arcs(&self) -> usize {
        self.arcs.capacity()
    }

    /// Compute the minimum cut separating `sources` from `sinks`.
    ///
    /// Both sets hold view-local ids and must be disjoint. Among minimum
    /// cuts the most balanced one reachable by residual closures is chosen.
    pub fn min_cut(&mut self, view: &GraphView<'_>, sources: &[NodeId], sinks: &[NodeId]) -> MinCut {
        let n = view.num_nodes();
        if sources.is_empty() {
            return MinCut::one_sided(n, true);
        }
        if sinks.is_empty() {
            return MinCut::one_sided(n, false);
        }

        self.n_view = n;
        self.role.clear();
        self.role.resize(n, ROLE_NONE);
        for &s in sources {
            self.role[s as usize] = ROLE_SOURCE;
        }
        for &t in sinks {
            debug_assert_ne!(
                self.role[t as usize],
                ROLE_SOURCE,
                "source and sink sets must be disjoint"
            );
            self.role[t as usize] = ROLE_SINK;
        }

        self.build_network(view);

        let (source, sink) = self.terminals();
        let mut flow_value = 0u64;
        while self.compute_levels(source, sink) {
            flow_value += self.blocking_flow(source, sink);
        }

        self.make_cut(flow_value)
    }

    fn num_network_nodes(&self) -> usize {
        match self.model {
            CapacityModel::UnitVertex => 2 * self.n_view + 2,
            _ => self.n_view + 2,
        }
    }

    fn terminals(&self) -> (u32, u32) {
        let n = self.num_network_nodes() as u32;
        (n - 2, n - 1)
    }

    /// Network node that decides the side of view node `v`
    fn side_node(&self, v: u32) -> u32 {
        match self.model {
            CapacityModel::UnitVertex => 2 * v + 1,
            _ => v,
        }
    }

    fn view_node_of(&self, x: u32) -> Option<u32> {
        match self.model {
            CapacityModel::UnitVertex => {
                if (x as usize) < 2 * self.n_view && x % 2 == 1 {
                    Some(x / 2)
                } else {
                    None
                }
            }
            _ => ((x as usize) < self.n_view).then_some(x),
        }
    }

    fn build_network(&mut self, view: &GraphView<'_>) {
        let n = self.n_view as u32;
        let (source, sink) = self.terminals();
        self.pending.clear();

        match self.model {
            CapacityModel::UnitEdge | CapacityModel::WeightedEdge => {
                let weighted = self.model == CapacityModel::WeightedEdge;
                for u in 0..n {
                    for edge in view.edges(u) {
                        if edge.target == u {
                            continue;
                        }
                        let capacity = if weighted { edge.weight.max(1) } else { 1 };
                        self.pending.push((u, edge.target, capacity));
                    }
                    match self.role[u as usize] {
                        ROLE_SOURCE => self.pending.push((source, u, INFINITE_CAPACITY)),
                        ROLE_SINK => self.pending.push((u, sink, INFINITE_CAPACITY)),
                        _ => {}
                    }
                }
            }
            CapacityModel::UnitVertex => {
                // Dearer than removing every node, so only adjacent
                // terminals ever saturate an arc between nodes
                let link = n.saturating_add(1);
                for u in 0..n {
                    let (u_in, u_out) = (2 * u, 2 * u + 1);
                    let through = match self.role[u as usize] {
                        ROLE_NONE => 1,
                        _ => INFINITE_CAPACITY,
                    };
                    self.pending.push((u_in, u_out, through));
                    for edge in view.edges(u) {
                        if edge.target == u {
                            continue;
                        }
                        self.pending.push((u_out, 2 * edge.target, link));
                    }
                    match self.role[u as usize] {
                        ROLE_SOURCE => self.pending.push((source, u_in, INFINITE_CAPACITY)),
                        ROLE_SINK => self.pending.push((u_out, sink, INFINITE_CAPACITY)),
                        _ => {}
                    }
                }
            }
        }

        // CSR with paired residual arcs
        let n_net = self.num_network_nodes();
        self.first_arc.clear();
        self.first_arc.resize(n_net + 1, 0);
        for &(tail, head, _) in &self.pending {
            self.first_arc[tail as usize + 1] += 1;
            self.first_arc[head as usize + 1] += 1;
        }
        for x in 0..n_net {
            self.first_arc[x + 1] += self.first_arc[x];
        }

        self.next_arc.clear();
        self.next_arc.extend_from_slice(&self.first_arc[..n_net]);
        self.arcs.clear();
        self.arcs.resize(
            self.first_arc[n_net] as usize,
            Arc {
                head: 0,
                capacity: 0,
                rev: 0,
            },
        );
        for &(tail, head, capacity) in &self.pending {
            let forward = self.next_arc[tail as usize];
            self.next_arc[tail as usize] += 1;
            let backward = self.next_arc[head as usize];
            self.next_arc[head as usize] += 1;
            self.arcs[forward as usize] = Arc {
                head,
                capacity,
                rev: backward,
            };
            self.arcs[backward as usize] = Arc {
                head: tail,
                capacity: 0,
                rev: forward,
            };
        }
    }

    /// BFS layering over residual arcs. Returns whether the sink is reachable.
    fn compute_levels(&mut self, source: u32, sink: u32) -> bool {
        let n_net = self.num_network_nodes();
        self.level.clear();
        self.level.resize(n_net, INVALID_LEVEL);
        self.queue.clear();

        self.level[source as usize] = 0;
        self.queue.push_back(source);
        while let Some(x) = self.queue.pop_front() {
            let next_level = self.level[x as usize] + 1;
            for a in self.first_arc[x as usize]..self.first_arc[x as usize + 1] {
                let arc = self.arcs[a as usize];
                if arc.capacity > 0 && self.level[arc.head as usize] == INVALID_LEVEL {
                    self.level[arc.head as usize] = next_level;
                    self.queue.push_back(arc.head);
                }
            }
        }

        self.level[sink as usize] != INVALID_LEVEL
    }

    /// Saturate augmenting paths along the level graph (iterative DFS)
    fn blocking_flow(&mut self, source: u32, sink: u32) -> u64 {
        let n_net = self.num_network_nodes();
        self.next_arc.clear();
        self.next_arc.extend_from_slice(&self.first_arc[..n_net]);

        let mut total = 0u64;
        self.path.clear();
        let mut x = source;

        loop {
            if x == sink {
                let bottleneck = self
                    .path
                    .iter()
                    .map(|&a| self.arcs[a as usize].capacity)
                    .min()
                    .unwrap_or(0);
                for &a in &self.path {
                    let rev = self.arcs[a as usize].rev;
                    self.arcs[a as usize].capacity -= bottleneck;
                    self.arcs[rev as usize].capacity =
                        self.arcs[rev as usize].capacity.saturating_add(bottleneck);
                }
                total += bottleneck as u64;
                self.path.clear();
                x = source;
                continue;
            }

            let end = self.first_arc[x as usize + 1];
            let mut advanced = false;
            while self.next_arc[x as usize] < end {
                let a = self.next_arc[x as usize];
                let arc = self.arcs[a as usize];
                if arc.capacity > 0 && self.level[arc.head as usize] == self.level[x as usize] + 1 {
                    self.path.push(a);
                    x = arc.head;
                    advanced = true;
                    break;
                }
                self.next_arc[x as usize] += 1;
            }
            if advanced {
                continue;
            }

            // dead end: retreat
            if x == source {
                return total;
            }
            self.level[x as usize] = INVALID_LEVEL;
            let a = self.path.pop().unwrap_or_default();
            x = self.arcs[self.arcs[a as usize].rev as usize].head;
            self.next_arc[x as usize] += 1;
        }
    }

    /// After the final layering, `level != INVALID` marks the source-reachable set.
    fn make_cut(&mut self, flow_value: u64) -> MinCut {
        let n = self.n_view;
        let half = n / 2;

        let min_source = (0..n as u32).filter(|&v| self.is_source_side(v)).count();

        if min_source < half {
            self.mark_sink_reaching();
            let max_source = (0..n as u32)
                .filter(|&v| !self.reaches_sink[self.side_node(v) as usize])
                .count();
            if max_source <= half {
                let flags: Vec<bool> = (0..n as u32)
                    .map(|v| self.reaches_sink[self.side_node(v) as usize])
                    .collect();
                return MinCut {
                    num_nodes_source: max_source,
                    num_edges: flow_value,
                    flags,
                };
            }
            self.grow_source_side(min_source, half);
        }

        let flags: Vec<bool> = (0..n as u32).map(|v| !self.is_source_side(v)).collect();
        let num_nodes_source = flags.iter().filter(|&&f| !f).count();
        MinCut {
            num_nodes_source,
            num_edges: flow_value,
            flags,
        }
    }

    fn is_source_side(&self, v: u32) -> bool {
        self.level[self.side_node(v) as usize] != INVALID_LEVEL
    }

    /// Reverse BFS from the sink over residual arcs
    fn mark_sink_reaching(&mut self) {
        let n_net = self.num_network_nodes();
        let (_, sink) = self.terminals();
        self.reaches_sink.clear();
        self.reaches_sink.resize(n_net, false);
        self.queue.clear();

        self.reaches_sink[sink as usize] = true;
        self.queue.push_back(sink);
        while let Some(x) = self.queue.pop_front() {
            for a in self.first_arc[x as usize]..self.first_arc[x as usize + 1] {
                let arc = self.arcs[a as usize];
                let into_x = self.arcs[arc.rev as usize];
                if into_x.capacity > 0 && !self.reaches_sink[arc.head as usize] {
                    self.reaches_sink[arc.head as usize] = true;
                    self.queue.push_back(arc.head);
                }
            }
        }
    }

    /// Add residual closures of slack nodes to the source side while it stays
    /// at or below `half` view nodes. Every closure keeps the cut minimal.
    fn grow_source_side(&mut self, mut source_count: usize, half: usize) {
        let n_net = self.num_network_nodes();
        self.stamp.clear();
        self.stamp.resize(n_net, 0);
        self.current_stamp = 0;
        let mut rejected = 0;

        for v in 0..self.n_view as u32 {
            if source_count >= half || rejected >= MAX_BALANCE_PROBES {
                break;
            }
            let start = self.side_node(v);
            if self.level[start as usize] != INVALID_LEVEL || self.reaches_sink[start as usize] {
                continue;
            }

            self.current_stamp += 1;
            let budget = half - source_count;
            self.closure.clear();
            self.queue.clear();
            self.stamp[start as usize] = self.current_stamp;
            self.queue.push_back(start);
            let mut added = 0;
            let mut fits = true;

            while let Some(x) = self.queue.pop_front() {
                self.closure.push(x);
                if self.view_node_of(x).is_some() {
                    added += 1;
                    if added > budget {
                        fits = false;
                        break;
                    }
                }
                for a in self.first_arc[x as usize]..self.first_arc[x as usize + 1] {
                    let arc = self.arcs[a as usize];
                    let head = arc.head as usize;
                    if arc.capacity > 0
                        && self.level[head] == INVALID_LEVEL
                        && self.stamp[head] != self.current_stamp
                    {
                        self.stamp[head] = self.current_stamp;
                        self.queue.push_back(arc.head);
                    }
                }
            }

            if fits {
                for &x in &self.closure {
                    self.level[x as usize] = 0;
                }
                source_count += added;
            } else {
                rejected += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::graph::tests::{grid_graph, path_graph};
    use crate::partition::graph::{count_cut_edges, BisectionGraph, Coordinate};

    fn cycle4() -> BisectionGraph {
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(0.0, 1.0),
        ];
        let mut edges = Vec::new();
        for (u, v) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            edges.push((u, v, 1));
            edges.push((v, u, 1));
        }
        BisectionGraph::from_edges(&coords, &edges).unwrap()
    }

    #[test]
    fn test_cycle_cut_is_balanced_with_two_boundary_edges() {
        let graph = cycle4();
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitEdge);

        let cut = flow.min_cut(&view, &[0], &[2]);
        assert_eq!(cut.num_edges, 2);
        assert_eq!(cut.num_nodes_source, 2);
        assert!(!cut.flags[0]);
        assert!(cut.flags[2]);
        assert_eq!(count_cut_edges(&view, &cut.flags), 2);
    }

    #[test]
    fn test_flow_value_equals_boundary_edges() {
        let graph = grid_graph(6, 4);
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitEdge);

        // left column vs right column
        let sources: Vec<NodeId> = (0..4).map(|y| y * 6).collect();
        let sinks: Vec<NodeId> = (0..4).map(|y| y * 6 + 5).collect();
        let cut = flow.min_cut(&view, &sources, &sinks);

        assert_eq!(cut.num_edges, 4);
        assert_eq!(count_cut_edges(&view, &cut.flags) as u64, cut.num_edges);
        for &s in &sources {
            assert!(!cut.flags[s as usize]);
        }
        for &t in &sinks {
            assert!(cut.flags[t as usize]);
        }
    }

    #[test]
    fn test_path_cut_picks_the_middle() {
        let graph = path_graph(8);
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitEdge);

        let cut = flow.min_cut(&view, &[0, 1], &[6, 7]);
        assert_eq!(cut.num_edges, 1);
        assert_eq!(cut.num_nodes_source, 4);
        assert_eq!(
            cut.flags,
            vec![false, false, false, false, true, true, true, true]
        );
    }

    #[test]
    fn test_workspace_reuse_gives_identical_results() {
        let graph = grid_graph(5, 5);
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitEdge);

        let first = flow.min_cut(&view, &[0, 1, 2], &[22, 23, 24]);
        let _other = flow.min_cut(&view, &[0, 5, 10], &[14, 19, 24]);
        let again = flow.min_cut(&view, &[0, 1, 2], &[22, 23, 24]);
        assert_eq!(first, again);
    }

    #[test]
    fn test_empty_terminal_sets_give_one_sided_cuts() {
        let graph = path_graph(4);
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitEdge);

        let cut = flow.min_cut(&view, &[], &[3]);
        assert_eq!(cut.flags, vec![true; 4]);
        assert_eq!(cut.num_nodes_source, 0);
        assert_eq!(cut.num_edges, 0);

        let cut = flow.min_cut(&view, &[0], &[]);
        assert_eq!(cut.flags, vec![false; 4]);
        assert_eq!(cut.num_nodes_source, 4);
    }

    #[test]
    fn test_weighted_model_avoids_heavy_edges() {
        // 0 -5- 1 -1- 2 -5- 3
        let coords: Vec<Coordinate> = (0..4).map(|i| Coordinate::new(i as f64, 0.0)).collect();
        let mut edges = Vec::new();
        for (u, v, w) in [(0, 1, 5), (1, 2, 1), (2, 3, 5)] {
            edges.push((u, v, w));
            edges.push((v, u, w));
        }
        let graph = BisectionGraph::from_edges(&coords, &edges).unwrap();
        let view = graph.view(graph.full_range());

        let mut flow = DinicMaxFlow::new(CapacityModel::WeightedEdge);
        let cut = flow.min_cut(&view, &[0], &[3]);
        assert_eq!(cut.num_edges, 1);
        assert_eq!(cut.flags, vec![false, false, true, true]);
    }

    #[test]
    fn test_unit_vertex_model_counts_separator_nodes() {
        // Two triangles joined through the single node 2
        let coords: Vec<Coordinate> = (0..5).map(|i| Coordinate::new(i as f64, 0.0)).collect();
        let mut edges = Vec::new();
        for (u, v) in [(0, 1), (0, 2), (1, 2), (2, 3), (2, 4), (3, 4)] {
            edges.push((u, v, 1));
            edges.push((v, u, 1));
        }
        let graph = BisectionGraph::from_edges(&coords, &edges).unwrap();
        let view = graph.view(graph.full_range());

        let mut flow = DinicMaxFlow::new(CapacityModel::UnitVertex);
        let cut = flow.min_cut(&view, &[0], &[4]);
        assert_eq!(cut.num_edges, 1);
        assert!(!cut.flags[0]);
        assert!(cut.flags[4]);

        let mut edge_flow = DinicMaxFlow::new(CapacityModel::UnitEdge);
        assert_eq!(edge_flow.min_cut(&view, &[0], &[4]).num_edges, 2);
    }

    #[test]
    fn test_unit_vertex_adjacent_terminals_cost_more_than_any_separator() {
        let graph = path_graph(4);
        let view = graph.view(graph.full_range());
        let mut flow = DinicMaxFlow::new(CapacityModel::UnitVertex);

        // one arc 1 -> 2 joins the terminals, bounded at n + 1
        let cut = flow.min_cut(&view, &[1], &[2]);
        assert_eq!(cut.num_edges, 5);
        assert_eq!(cut.num_nodes_source, 2);
        assert_eq!(cut.flags, vec![false, false, true, true]);

        // a real separator still costs one node
        let cut = flow.min_cut(&view, &[0], &[3]);
        assert_eq!(cut.num_edges, 1);
    }
}
