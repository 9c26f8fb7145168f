//! Inertial flow: geometric bisection by projected min-cuts
//!
//! Nodes of a view are sorted along a fixed set of projection directions.
//! For each direction the first and last `boundary_fraction` of nodes become
//! sources and sinks of a min-cut. The best cut over all directions wins,
//! optionally refined by retrying the best direction with perturbed
//! extremal fractions.
//!
//! Candidates are always compared in enumeration order and only replaced on
//! strict improvement, so the result does not depend on which rayon worker
//! finished first.

use rayon::prelude::*;
use std::cmp::Ordering;
use std::f64::consts::PI;
use tracing::{debug, warn};

use crate::config::PartitionerConfig;
use crate::partition::graph::{GraphView, NodeId};
use crate::partition::max_flow::{DinicMaxFlow, MinCut};

/// Outcome of one inertial flow bisection
#[derive(Debug, Clone, PartialEq)]
pub struct Bisection {
    /// `true` for nodes on the sink side, indexed by view-local id
    pub flags: Vec<bool>,
    pub num_edges: u64,
    pub num_nodes_source: usize,
    /// Index of the winning projection direction
    pub direction: usize,
    /// Extremal fraction the winning cut was computed with
    pub fraction: f64,
    /// Whether the smaller side reached the balance target
    pub balanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InertialFlowParams {
    balance: f64,
    boundary_fraction: f64,
    num_directions: usize,
    refinement_steps: usize,
    parallel: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    direction: usize,
    fraction: f64,
    cut: MinCut,
}

/// Ordering key of a cut: balanced first, then fewer edges, then closer to 50/50
#[derive(Debug, Clone, Copy)]
struct CutScore {
    balanced: bool,
    num_edges: u64,
    deviation: f64,
}

impl CutScore {
    fn of(cut: &MinCut, n: usize, balance: f64) -> Self {
        let smaller = cut.num_nodes_source.min(n - cut.num_nodes_source);
        Self {
            balanced: smaller as f64 >= balance * n as f64,
            num_edges: cut.num_edges,
            deviation: (cut.num_nodes_source as f64 / n as f64 - 0.5).abs(),
        }
    }

    fn is_better_than(&self, other: &CutScore) -> bool {
        if self.balanced != other.balanced {
            return self.balanced;
        }
        match self.num_edges.cmp(&other.num_edges) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.deviation < other.deviation,
        }
    }
}

/// Projection angle of direction `index` out of `count`, spread over [0, π)
pub fn direction_angle(index: usize, count: usize) -> f64 {
    index as f64 * PI / count as f64
}

/// View-local ids sorted by their projection onto `angle`, ties by id
pub fn projection_order(view: &GraphView<'_>, angle: f64) -> Vec<NodeId> {
    let (sin, cos) = angle.sin_cos();
    let mut keyed: Vec<(f64, NodeId)> = (0..view.num_nodes() as NodeId)
        .map(|v| {
            let c = view.coordinate(v);
            (c.lon * cos + c.lat * sin, v)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, v)| v).collect()
}

/// Number of sources (and sinks) for `fraction` of `n` nodes
fn terminal_count(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).floor() as usize).clamp(1, n / 2)
}

impl InertialFlowParams {
    fn evaluate(
        &self,
        view: &GraphView<'_>,
        flow: &mut DinicMaxFlow,
        direction: usize,
        fraction: f64,
    ) -> Candidate {
        let order = projection_order(view, direction_angle(direction, self.num_directions));
        let count = terminal_count(order.len(), fraction);
        let sources = &order[..count];
        let sinks = &order[order.len() - count..];
        Candidate {
            direction,
            fraction,
            cut: flow.min_cut(view, sources, sinks),
        }
    }

    /// Extremal fractions tried around the best direction: r(1 + 1/(k+1)),
    /// r(1 - 1/(k+1)), r(1 + 2/(k+1)), ...
    fn refinement_fractions(&self) -> impl Iterator<Item = f64> + '_ {
        let k = self.refinement_steps;
        (1..=k).map(move |j| {
            let step = j.div_ceil(2) as f64 / (k + 1) as f64;
            let sign = if j % 2 == 1 { 1.0 } else { -1.0 };
            (self.boundary_fraction * (1.0 + sign * step)).clamp(f64::EPSILON, 0.5)
        })
    }
}

/// Bisection driver holding one reusable max-flow workspace per direction
#[derive(Debug)]
pub struct InertialFlow {
    params: InertialFlowParams,
    workspaces: Vec<DinicMaxFlow>,
}

impl InertialFlow {
    pub fn new(config: &PartitionerConfig) -> Self {
        let num_directions = config.num_directions.max(1);
        Self {
            params: InertialFlowParams {
                balance: config.balance,
                boundary_fraction: config.boundary_fraction,
                num_directions,
                refinement_steps: config.refinement_steps,
                parallel: config.parallel_directions,
            },
            workspaces: (0..num_directions)
                .map(|_| DinicMaxFlow::new(config.capacity_model))
                .collect(),
        }
    }

    /// Split the view in two. Views with fewer than two nodes come back
    /// entirely on the source side.
    pub fn bisect(&mut self, view: &GraphView<'_>) -> Bisection {
        let n = view.num_nodes();
        if n < 2 {
            return Bisection {
                flags: vec![false; n],
                num_edges: 0,
                num_nodes_source: n,
                direction: 0,
                fraction: self.params.boundary_fraction,
                balanced: false,
            };
        }

        let params = self.params;
        let mut candidates: Vec<Candidate> = if params.parallel {
            self.workspaces
                .par_iter_mut()
                .enumerate()
                .map(|(direction, flow)| {
                    params.evaluate(view, flow, direction, params.boundary_fraction)
                })
                .collect()
        } else {
            self.workspaces
                .iter_mut()
                .enumerate()
                .map(|(direction, flow)| {
                    params.evaluate(view, flow, direction, params.boundary_fraction)
                })
                .collect()
        };

        let scores: Vec<CutScore> = candidates
            .iter()
            .map(|candidate| CutScore::of(&candidate.cut, n, params.balance))
            .collect();
        let mut best_index = 0;
        for (index, score) in scores.iter().enumerate().skip(1) {
            if score.is_better_than(&scores[best_index]) {
                best_index = index;
            }
        }
        let mut best_score = scores[best_index];
        let mut best = candidates.swap_remove(best_index);

        for fraction in params.refinement_fractions() {
            let flow = &mut self.workspaces[best.direction];
            let candidate = params.evaluate(view, flow, best.direction, fraction);
            let score = CutScore::of(&candidate.cut, n, params.balance);
            if score.is_better_than(&best_score) {
                debug!(
                    direction = best.direction,
                    fraction,
                    edges = candidate.cut.num_edges,
                    "refinement improved cut"
                );
                best = candidate;
                best_score = score;
            }
        }

        if !best_score.balanced {
            warn!(
                nodes = n,
                source_side = best.cut.num_nodes_source,
                edges = best.cut.num_edges,
                balance = params.balance,
                "no direction reached the balance target, using best cut"
            );
        }

        Bisection {
            num_edges: best.cut.num_edges,
            num_nodes_source: best.cut.num_nodes_source,
            flags: best.cut.flags,
            direction: best.direction,
            fraction: best.fraction,
            balanced: best_score.balanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::graph::{count_cut_edges, NodeRange};
    use crate::partition::graph::tests::{grid_graph, path_graph};

    fn sequential() -> PartitionerConfig {
        PartitionerConfig::new().with_parallel_directions(false)
    }

    #[test]
    fn test_projection_order_breaks_ties_by_id() {
        let graph = grid_graph(3, 2);
        let view = graph.view(graph.full_range());
        // Along x, columns tie: ids 0 and 3 share x = 0
        assert_eq!(projection_order(&view, 0.0), vec![0, 3, 1, 4, 2, 5]);
        // Along y
        assert_eq!(
            projection_order(&view, direction_angle(4, 8)),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_terminal_count_bounds() {
        assert_eq!(terminal_count(2, 0.25), 1);
        assert_eq!(terminal_count(100, 0.25), 25);
        assert_eq!(terminal_count(3, 0.49), 1);
    }

    #[test]
    fn test_path_is_cut_in_the_middle() {
        let graph = path_graph(16);
        let view = graph.view(graph.full_range());
        let mut inertial = InertialFlow::new(&sequential());

        let bisection = inertial.bisect(&view);
        assert_eq!(bisection.num_edges, 1);
        assert_eq!(bisection.num_nodes_source, 8);
        assert!(bisection.balanced);
        assert_eq!(count_cut_edges(&view, &bisection.flags), 1);
    }

    #[test]
    fn test_wide_grid_is_cut_across_the_short_side() {
        let graph = grid_graph(8, 4);
        let view = graph.view(graph.full_range());
        let mut inertial = InertialFlow::new(&sequential());

        let bisection = inertial.bisect(&view);
        assert_eq!(bisection.num_edges, 4);
        assert_eq!(bisection.num_nodes_source, 16);
        assert!(bisection.balanced);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let graph = grid_graph(9, 7);
        let view = graph.view(graph.full_range());

        let mut sequential_flow = InertialFlow::new(&sequential());
        let mut parallel_flow =
            InertialFlow::new(&PartitionerConfig::new().with_parallel_directions(true));

        let a = sequential_flow.bisect(&view);
        let b = parallel_flow.bisect(&view);
        assert_eq!(a, b);
        assert_eq!(a, sequential_flow.bisect(&view));
    }

    #[test]
    fn test_workspaces_survive_between_bisections() {
        let graph = grid_graph(12, 12);
        let mut inertial = InertialFlow::new(&PartitionerConfig::new().with_parallel_directions(true));
        assert_eq!(inertial.workspaces.len(), PartitionerConfig::new().num_directions);

        inertial.bisect(&graph.view(graph.full_range()));
        let reserved: Vec<usize> = inertial.workspaces.iter().map(|w| w.reserved_arcs()).collect();
        assert!(reserved.iter().all(|&arcs| arcs > 0));

        // a smaller view fits into the buffers of the first call
        inertial.bisect(&graph.view(NodeRange::new(0, 72)));
        let again: Vec<usize> = inertial.workspaces.iter().map(|w| w.reserved_arcs()).collect();
        assert_eq!(reserved, again);
    }

    #[test]
    fn test_refinement_fractions_alternate_around_base() {
        let params = InertialFlow::new(&sequential().with_refinement_steps(3)).params;
        let fractions: Vec<f64> = params.refinement_fractions().collect();
        assert_eq!(fractions.len(), 3);
        assert!(fractions[0] > 0.25);
        assert!(fractions[1] < 0.25);
        assert!(fractions[2] > fractions[0]);
    }

    #[test]
    fn test_single_node_view_is_not_split() {
        let graph = path_graph(1);
        let view = graph.view(graph.full_range());
        let bisection = InertialFlow::new(&sequential()).bisect(&view);
        assert_eq!(bisection.flags, vec![false]);
    }
}
