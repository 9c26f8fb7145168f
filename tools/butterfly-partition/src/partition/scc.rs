//! Strongly connected components of a view (Tarjan, explicit stack)
//!
//! Used before every bisection to find components that must stay whole.
//! Only edges inside the view are followed.

use crate::partition::graph::{GraphView, NodeId};

const UNVISITED: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Component id per view-local node
    pub component_of: Vec<u32>,
    /// Node count per component
    pub sizes: Vec<u32>,
    /// Smallest view-local node of each component
    pub representatives: Vec<NodeId>,
}

impl Components {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_connected(&self) -> bool {
        self.sizes.len() <= 1
    }

    /// Components with fewer than `threshold` nodes
    pub fn small(&self, threshold: u32) -> impl Iterator<Item = u32> + '_ {
        self.sizes
            .iter()
            .enumerate()
            .filter(move |(_, &size)| size < threshold)
            .map(|(c, _)| c as u32)
    }

    /// Small components other than the largest one
    pub fn satellites(&self, threshold: u32) -> impl Iterator<Item = u32> + '_ {
        let largest = self.largest();
        self.small(threshold).filter(move |&c| Some(c) != largest)
    }

    /// Largest component, ties broken by smallest representative
    pub fn largest(&self) -> Option<u32> {
        (0..self.sizes.len() as u32).max_by(|&a, &b| {
            self.sizes[a as usize]
                .cmp(&self.sizes[b as usize])
                .then_with(|| self.representatives[b as usize].cmp(&self.representatives[a as usize]))
        })
    }
}

/// Label every node of the view with its strongly connected component
pub fn strongly_connected_components(view: &GraphView<'_>) -> Components {
    let n = view.num_nodes();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0u32; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<NodeId> = Vec::new();
    let mut component_of = vec![UNVISITED; n];
    let mut sizes: Vec<u32> = Vec::new();
    let mut representatives: Vec<NodeId> = Vec::new();
    let mut next_index = 0u32;

    let mut call_stack = Vec::new();

    for root in 0..n as NodeId {
        if index[root as usize] != UNVISITED {
            continue;
        }

        index[root as usize] = next_index;
        lowlink[root as usize] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root as usize] = true;
        call_stack.push((root, view.edges(root)));

        loop {
            let Some(top) = call_stack.last_mut() else {
                break;
            };
            let u = top.0;
            match top.1.next() {
                Some(edge) => {
                    let w = edge.target;
                    if index[w as usize] == UNVISITED {
                        index[w as usize] = next_index;
                        lowlink[w as usize] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w as usize] = true;
                        call_stack.push((w, view.edges(w)));
                    } else if on_stack[w as usize] {
                        lowlink[u as usize] = lowlink[u as usize].min(index[w as usize]);
                    }
                }
                None => {
                    call_stack.pop();
                    if let Some((parent, _)) = call_stack.last() {
                        let parent = *parent as usize;
                        lowlink[parent] = lowlink[parent].min(lowlink[u as usize]);
                    }

                    if lowlink[u as usize] == index[u as usize] {
                        let component = sizes.len() as u32;
                        let mut size = 0u32;
                        let mut representative = u;
                        while let Some(w) = stack.pop() {
                            on_stack[w as usize] = false;
                            component_of[w as usize] = component;
                            size += 1;
                            representative = representative.min(w);
                            if w == u {
                                break;
                            }
                        }
                        sizes.push(size);
                        representatives.push(representative);
                    }
                }
            }
        }
    }

    Components {
        component_of,
        sizes,
        representatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::graph::tests::path_graph;
    use crate::partition::graph::{BisectionGraph, Coordinate, NodeRange};

    #[test]
    fn test_symmetric_path_is_one_component() {
        let graph = path_graph(10);
        let components = strongly_connected_components(&graph.view(graph.full_range()));
        assert!(components.is_connected());
        assert_eq!(components.sizes, vec![10]);
        assert_eq!(components.representatives, vec![0]);
    }

    #[test]
    fn test_one_way_link_separates_cycles() {
        // cycle {0,1,2} -> cycle {3,4}, plus isolated node 5
        let coords = vec![Coordinate::default(); 6];
        let edges = vec![
            (0, 1, 1),
            (1, 2, 1),
            (2, 0, 1),
            (2, 3, 1),
            (3, 4, 1),
            (4, 3, 1),
        ];
        let graph = BisectionGraph::from_edges(&coords, &edges).unwrap();
        let components = strongly_connected_components(&graph.view(graph.full_range()));

        assert_eq!(components.count(), 3);
        let c = &components.component_of;
        assert_eq!(c[0], c[1]);
        assert_eq!(c[1], c[2]);
        assert_eq!(c[3], c[4]);
        assert_ne!(c[0], c[3]);
        assert_ne!(c[5], c[0]);
        assert_ne!(c[5], c[3]);

        let mut sizes = components.sizes.clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 3]);

        let small: Vec<u32> = components.small(3).collect();
        assert_eq!(small.len(), 2);
        assert_eq!(components.largest(), Some(c[0]));

        // below the threshold the main component is still not a satellite
        let satellites: Vec<u32> = components.satellites(10).collect();
        assert_eq!(satellites.len(), 2);
        assert!(!satellites.contains(&c[0]));
    }

    #[test]
    fn test_view_boundary_splits_components() {
        let graph = path_graph(6);
        let view = graph.view(NodeRange::new(1, 5));
        let components = strongly_connected_components(&view);
        assert_eq!(components.sizes, vec![4]);
    }

    #[test]
    fn test_long_path_does_not_recurse() {
        let graph = path_graph(200_000);
        let components = strongly_connected_components(&graph.view(graph.full_range()));
        assert_eq!(components.count(), 1);
    }
}
