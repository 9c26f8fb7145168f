//! Recursive bisection driver
//!
//! Works through an explicit stack of node ranges. Each range is either
//! closed as a leaf or split by inertial flow into two contiguous halves of
//! the node array. Small strongly connected components found along the way
//! are kept whole and marked undividable.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PartitionerConfig;
use crate::error::Result;
use crate::partition::bisection_state::{
    BisectionId, PendingRange, RecursiveBisectionState, MAX_BISECTION_DEPTH,
};
use crate::partition::graph::{BisectionGraph, GraphView, NodeId};
use crate::partition::inertial_flow::InertialFlow;
use crate::partition::scc::{strongly_connected_components, Components};

/// Summary of a finished recursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BisectionSummary {
    pub num_leaves: usize,
    pub max_depth: u32,
    pub num_bisections: usize,
    pub num_imbalanced: usize,
    pub num_undividable_nodes: usize,
    /// Strongly connected components of the input graph
    pub num_input_components: usize,
}

#[derive(Debug)]
pub struct RecursiveBisection {
    state: RecursiveBisectionState,
    summary: BisectionSummary,
}

enum Step {
    Leaf,
    Split(Vec<bool>),
}

impl RecursiveBisection {
    /// Run the full recursion. The graph's node array is reordered so that
    /// every leaf ends up as a contiguous range.
    pub fn new(graph: &mut BisectionGraph, config: &PartitionerConfig) -> Result<Self> {
        config.validate()?;

        let start = Instant::now();
        let mut inertial = InertialFlow::new(config);
        let mut state = RecursiveBisectionState::new(graph.num_nodes());
        let mut summary = BisectionSummary::default();

        let root = strongly_connected_components(&graph.view(graph.full_range()));
        summary.num_input_components = root.count();
        if !root.is_connected() {
            let largest = root
                .largest()
                .map(|c| root.sizes[c as usize])
                .unwrap_or(0);
            warn!(
                components = root.count(),
                largest,
                nodes = graph.num_nodes(),
                "input graph is not strongly connected, small components become undividable cells"
            );
        }

        // the first pending range is the full graph
        let mut root = Some(root);
        while let Some(PendingRange { range, depth }) = state.pop() {
            let known = root.take();
            let step = {
                let view = graph.view(range);
                Self::plan(&view, depth, known, config, &mut inertial, &mut state, &mut summary)
            };

            match step {
                Step::Leaf => state.finish_leaf(depth),
                Step::Split(on_right) => {
                    let view = graph.view(range);
                    for (local, &right) in on_right.iter().enumerate() {
                        if right {
                            state.set_sink_side(view.original_id(local as NodeId), depth);
                        }
                    }
                    let mid = graph.partition_range(range, &on_right);
                    let (left, right) = range.split_at(mid);
                    state.push_children(left, right, depth + 1);
                    summary.num_bisections += 1;
                }
            }
        }

        summary.num_leaves = state.num_leaves();
        summary.max_depth = state.max_depth();
        summary.num_undividable_nodes = state.num_undividable();

        info!(
            nodes = graph.num_nodes(),
            leaves = summary.num_leaves,
            max_depth = summary.max_depth,
            bisections = summary.num_bisections,
            imbalanced = summary.num_imbalanced,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "recursive bisection finished"
        );

        Ok(Self { state, summary })
    }

    /// Decide whether a range is a leaf or how it splits. `known` holds the
    /// components of the view when they were already computed.
    fn plan(
        view: &GraphView<'_>,
        depth: u32,
        known: Option<Components>,
        config: &PartitionerConfig,
        inertial: &mut InertialFlow,
        state: &mut RecursiveBisectionState,
        summary: &mut BisectionSummary,
    ) -> Step {
        let n = view.num_nodes();
        if n <= config.leaf_cell_size() as usize {
            return Step::Leaf;
        }
        if depth >= MAX_BISECTION_DEPTH {
            warn!(nodes = n, depth, "bisection depth exhausted, keeping oversized cell");
            return Step::Leaf;
        }

        let components = known.unwrap_or_else(|| strongly_connected_components(view));
        let mut whole = vec![false; components.count()];
        if components.is_connected() {
            if (0..n as NodeId).all(|v| state.is_undividable(view.original_id(v))) {
                debug!(nodes = n, depth, "undividable component becomes a leaf");
                return Step::Leaf;
            }
        } else {
            for component in components.satellites(config.small_component_size) {
                whole[component as usize] = true;
            }
            // components flagged higher up stay whole even as the largest one
            for v in 0..n as NodeId {
                if state.is_undividable(view.original_id(v)) {
                    whole[components.component_of[v as usize] as usize] = true;
                }
            }
            for v in 0..n as NodeId {
                if whole[components.component_of[v as usize] as usize] {
                    state.mark_undividable(view.original_id(v));
                }
            }
        }

        let bisection = inertial.bisect(view);
        if !bisection.balanced {
            summary.num_imbalanced += 1;
        }
        let mut on_right = bisection.flags;

        if !components.is_connected() {
            fold_components(&components, &whole, &mut on_right);
        }

        let right = on_right.iter().filter(|&&flag| flag).count();
        if right == 0 || right == n {
            if components.is_connected() {
                warn!(nodes = n, depth, "bisection produced an empty side, keeping cell");
                return Step::Leaf;
            }
            split_off_largest(&components, &mut on_right);
        }

        debug!(
            depth,
            nodes = n,
            edges = bisection.num_edges,
            direction = bisection.direction,
            right = on_right.iter().filter(|&&flag| flag).count(),
            components = components.count(),
            inner_edges = view.num_inner_edges(),
            leaving_edges = view.num_leaving_edges(),
            "bisected range"
        );
        Step::Split(on_right)
    }

    pub fn bisection_ids(&self) -> &[BisectionId] {
        self.state.bisection_ids()
    }

    pub fn into_bisection_ids(self) -> Vec<BisectionId> {
        self.state.into_bisection_ids()
    }

    pub fn max_depth(&self) -> u32 {
        self.summary.max_depth
    }

    pub fn summary(&self) -> BisectionSummary {
        self.summary
    }
}

/// Move every component flagged in `whole` entirely to the side of its representative
fn fold_components(components: &Components, whole: &[bool], on_right: &mut [bool]) {
    let side: Vec<Option<bool>> = (0..components.count())
        .map(|c| whole[c].then(|| on_right[components.representatives[c] as usize]))
        .collect();
    for (v, flag) in on_right.iter_mut().enumerate() {
        if let Some(forced) = side[components.component_of[v] as usize] {
            *flag = forced;
        }
    }
}

/// Fallback split: the largest component against everything else
fn split_off_largest(components: &Components, on_right: &mut [bool]) {
    let largest = components.largest().unwrap_or(0);
    for (v, flag) in on_right.iter_mut().enumerate() {
        *flag = components.component_of[v] != largest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::bisection_state::depth_bit;
    use crate::partition::graph::tests::{grid_graph, path_graph};
    use crate::partition::graph::Coordinate;
    use rustc_hash::FxHashMap;

    fn config(sizes: Vec<u32>) -> PartitionerConfig {
        PartitionerConfig::new()
            .with_max_cell_sizes(sizes)
            .with_parallel_directions(false)
    }

    fn leaf_sizes(ids: &[BisectionId]) -> Vec<usize> {
        let mut counts: FxHashMap<BisectionId, usize> = FxHashMap::default();
        for &id in ids {
            *counts.entry(id).or_default() += 1;
        }
        let mut sizes: Vec<usize> = counts.into_values().collect();
        sizes.sort_unstable();
        sizes
    }

    #[test]
    fn test_single_isolated_node_is_a_leaf_at_depth_zero() {
        let mut graph = BisectionGraph::from_edges(&[Coordinate::new(7.0, 50.0)], &[]).unwrap();
        let bisection = RecursiveBisection::new(&mut graph, &config(vec![4, 8])).unwrap();
        assert_eq!(bisection.bisection_ids(), &[0]);
        assert_eq!(bisection.max_depth(), 0);
        assert_eq!(bisection.summary().num_leaves, 1);
    }

    #[test]
    fn test_path_of_eight_splits_once() {
        let mut graph = path_graph(8);
        let bisection = RecursiveBisection::new(&mut graph, &config(vec![4, 8])).unwrap();

        assert_eq!(bisection.max_depth(), 1);
        let ids = bisection.bisection_ids();
        assert!(ids[..4].iter().all(|&id| id == ids[0]));
        assert!(ids[4..].iter().all(|&id| id == ids[4]));
        assert_ne!(ids[0], ids[4]);
        assert_eq!(ids[0] ^ ids[4], depth_bit(0));
    }

    #[test]
    fn test_grid_leaves_respect_cell_size() {
        let mut graph = grid_graph(16, 16);
        // No component is small enough to be exempt from the size bound
        let config = config(vec![16, 64]).with_small_component_size(1);
        let bisection = RecursiveBisection::new(&mut graph, &config).unwrap();

        let sizes = leaf_sizes(bisection.bisection_ids());
        assert_eq!(sizes.iter().sum::<usize>(), 256);
        assert!(sizes.iter().all(|&size| size <= 16));
        assert!(bisection.max_depth() >= 4);
    }

    #[test]
    fn test_leaves_are_contiguous_in_the_node_array() {
        let mut graph = grid_graph(10, 6);
        let bisection = RecursiveBisection::new(&mut graph, &config(vec![8, 32])).unwrap();
        let ids = bisection.bisection_ids();

        let order: Vec<BisectionId> = graph
            .nodes()
            .iter()
            .map(|node| ids[node.original_id as usize])
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_results_are_deterministic() {
        let run = |parallel: bool| {
            let mut graph = grid_graph(12, 9);
            let config = config(vec![6, 24]).with_parallel_directions(parallel);
            RecursiveBisection::new(&mut graph, &config)
                .unwrap()
                .into_bisection_ids()
        };
        let first = run(false);
        assert_eq!(first, run(false));
        assert_eq!(first, run(true));
    }

    #[test]
    fn test_small_component_is_never_split() {
        // 16-node path plus a separate 3-node triangle far away
        let mut coords: Vec<Coordinate> = (0..16).map(|i| Coordinate::new(i as f64, 0.0)).collect();
        coords.extend([
            Coordinate::new(100.0, 0.0),
            Coordinate::new(101.0, 0.0),
            Coordinate::new(100.5, 1.0),
        ]);
        let mut edges = Vec::new();
        for i in 0..15u32 {
            edges.push((i, i + 1, 1));
            edges.push((i + 1, i, 1));
        }
        for (u, v) in [(16, 17), (17, 18), (18, 16)] {
            edges.push((u, v, 1));
            edges.push((v, u, 1));
        }
        let mut graph = BisectionGraph::from_edges(&coords, &edges).unwrap();
        let config = config(vec![2, 8]).with_small_component_size(4);
        let bisection = RecursiveBisection::new(&mut graph, &config).unwrap();
        let ids = bisection.bisection_ids();

        assert_eq!(ids[16], ids[17]);
        assert_eq!(ids[17], ids[18]);
        assert!(ids[..16].iter().all(|&id| id != ids[16]));
        assert_eq!(bisection.summary().num_input_components, 2);
        // path pieces cut off next to the triangle are small components too
        assert!(bisection.summary().num_undividable_nodes >= 3);
    }

    #[test]
    fn test_dangling_one_way_node_does_not_freeze_the_grid() {
        // 20x20 grid plus node 400 with the single arc 400 -> 0
        let grid = grid_graph(20, 20);
        let mut coords: Vec<Coordinate> = grid.nodes().iter().map(|node| node.coordinate).collect();
        coords.push(Coordinate::new(-1.0, 0.0));
        let mut edges = Vec::new();
        for position in 0..grid.num_nodes() as NodeId {
            for edge in grid.edges(position) {
                edges.push((position, edge.target, edge.weight));
            }
        }
        edges.push((400, 0, 1));
        let mut graph = BisectionGraph::from_edges(&coords, &edges).unwrap();

        // default small_component_size is far above the grid size
        let config = config(vec![32, 128, 512]);
        assert!(config.small_component_size > 401);
        let bisection = RecursiveBisection::new(&mut graph, &config).unwrap();

        let sizes = leaf_sizes(bisection.bisection_ids());
        assert_eq!(sizes.iter().sum::<usize>(), 401);
        assert!(sizes.iter().all(|&size| size <= 32), "leaf sizes {:?}", sizes);
        assert_eq!(bisection.summary().num_input_components, 2);
        assert!(bisection.summary().num_undividable_nodes < 32);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut graph = path_graph(4);
        let config = PartitionerConfig::new().with_balance(0.9);
        assert!(RecursiveBisection::new(&mut graph, &config).is_err());
    }
}
