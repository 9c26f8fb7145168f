//! Per-level cell statistics
//!
//! Computed against the input adjacency (original node ids), since edge
//! targets in the bisection graph are only meaningful inside a range.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::partition::graph::NodeId;
use crate::partition::multi_level_partition::CellHierarchy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: usize,
    /// Configured maximum for this level
    pub max_allowed: u32,
    pub num_cells: u32,
    pub min_cell_size: u32,
    pub max_cell_size: u32,
    pub mean_cell_size: f64,
    /// Cells above `max_allowed` (undividable components)
    pub oversized_cells: u32,
    /// Nodes with at least one edge into another cell
    pub boundary_nodes: u64,
    /// Directed edges between different cells
    pub boundary_edges: u64,
}

/// Statistics for partition levels `1..num_levels()`
pub fn compute_cell_stats<H: CellHierarchy>(
    hierarchy: &H,
    max_cell_sizes: &[u32],
    offsets: &[u64],
    heads: &[u32],
) -> Vec<LevelStats> {
    (1..hierarchy.num_levels())
        .map(|level| {
            let max_allowed = max_cell_sizes.get(level - 1).copied().unwrap_or(u32::MAX);
            level_stats(hierarchy, level, max_allowed, offsets, heads)
        })
        .collect()
}

fn level_stats<H: CellHierarchy>(
    hierarchy: &H,
    level: usize,
    max_allowed: u32,
    offsets: &[u64],
    heads: &[u32],
) -> LevelStats {
    let num_nodes = hierarchy.num_cells(0) as usize;
    let num_cells = hierarchy.num_cells(level);

    let mut sizes = vec![0u32; num_cells as usize];
    let mut boundary_nodes = 0u64;
    let mut boundary_edges = 0u64;
    for u in 0..num_nodes {
        let cell = hierarchy.cell(level, u as NodeId);
        sizes[cell as usize] += 1;

        let mut on_boundary = false;
        for &v in &heads[offsets[u] as usize..offsets[u + 1] as usize] {
            if hierarchy.cell(level, v) != cell {
                boundary_edges += 1;
                on_boundary = true;
            }
        }
        if on_boundary {
            boundary_nodes += 1;
        }
    }

    LevelStats {
        level,
        max_allowed,
        num_cells,
        min_cell_size: sizes.iter().copied().min().unwrap_or(0),
        max_cell_size: sizes.iter().copied().max().unwrap_or(0),
        mean_cell_size: if num_cells == 0 {
            0.0
        } else {
            num_nodes as f64 / num_cells as f64
        },
        oversized_cells: sizes.iter().filter(|&&size| size > max_allowed).count() as u32,
        boundary_nodes,
        boundary_edges,
    }
}

pub fn log_cell_stats(stats: &[LevelStats]) {
    for level in stats {
        info!(
            level = level.level,
            cells = level.num_cells,
            min = level.min_cell_size,
            max = level.max_cell_size,
            mean = format!("{:.1}", level.mean_cell_size),
            oversized = level.oversized_cells,
            boundary_nodes = level.boundary_nodes,
            boundary_edges = level.boundary_edges,
            "partition level"
        );
    }
}
