//! Turn per-node bisection ids into per-level cell ids
//!
//! Nodes sorted by bisection id form one contiguous run per recursion leaf,
//! and every recursion range is a contiguous run as well. Going from the
//! coarsest level to the finest, each cell that is larger than the level's
//! maximum is split along the next bisection bit that actually separates
//! it. A cell no remaining bit can separate is kept whole.

use crate::config::validate_cell_sizes;
use crate::error::{PartitionError, Result};
use crate::partition::bisection_state::{depth_bit, BisectionId, MAX_BISECTION_DEPTH};
use crate::partition::graph::NodeId;

pub type CellId = u32;

/// Node to cell assignment of one level
pub type Partition = Vec<CellId>;

const INVALID_CELL: CellId = CellId::MAX;

/// Run of nodes in id-sorted order sharing all bits above `depth`
#[derive(Debug, Clone, Copy)]
struct CellRun {
    begin: usize,
    end: usize,
    depth: u32,
}

impl CellRun {
    fn len(&self) -> usize {
        self.end - self.begin
    }
}

/// Encode bisection ids into one partition per level (finest first) and
/// the number of cells of each level.
pub fn bisection_to_partition(
    bisection_ids: &[BisectionId],
    max_cell_sizes: &[u32],
) -> Result<(Vec<Partition>, Vec<u32>)> {
    validate_cell_sizes(max_cell_sizes)?;

    let n = bisection_ids.len();
    let mut order: Vec<NodeId> = (0..n as NodeId).collect();
    order.sort_by_key(|&v| (bisection_ids[v as usize], v));

    let mut partitions: Vec<Partition> = vec![Vec::new(); max_cell_sizes.len()];
    let mut num_cells = vec![0u32; max_cell_sizes.len()];

    let mut cells = Vec::new();
    if n > 0 {
        cells.push(CellRun {
            begin: 0,
            end: n,
            depth: 0,
        });
    }

    for level in (0..max_cell_sizes.len()).rev() {
        let max_size = max_cell_sizes[level] as usize;
        let mut finer = Vec::with_capacity(cells.len());
        for &cell in &cells {
            split_cell(cell, max_size, &order, bisection_ids, &mut finer);
        }
        cells = finer;

        let (partition, count) = label_cells(level, &cells, &order, n)?;
        partitions[level] = partition;
        num_cells[level] = count;
    }

    check_coarsening(&partitions, &num_cells)?;
    Ok((partitions, num_cells))
}

/// Split `cell` until every piece fits `max_size` or cannot be split further
fn split_cell(
    cell: CellRun,
    max_size: usize,
    order: &[NodeId],
    bisection_ids: &[BisectionId],
    out: &mut Vec<CellRun>,
) {
    let mut stack = vec![cell];
    while let Some(cell) = stack.pop() {
        if cell.len() <= max_size {
            out.push(cell);
            continue;
        }

        let mut depth = cell.depth;
        let mut mid = None;
        while depth < MAX_BISECTION_DEPTH {
            let bit = depth_bit(depth);
            let offset = order[cell.begin..cell.end]
                .partition_point(|&v| bisection_ids[v as usize] & bit == 0);
            depth += 1;
            if offset > 0 && offset < cell.len() {
                mid = Some(cell.begin + offset);
                break;
            }
        }

        match mid {
            Some(mid) => {
                stack.push(CellRun {
                    begin: mid,
                    end: cell.end,
                    depth,
                });
                stack.push(CellRun {
                    begin: cell.begin,
                    end: mid,
                    depth,
                });
            }
            // undividable leaf
            None => out.push(CellRun { depth, ..cell }),
        }
    }
}

/// Assign cell ids in order of the first node (by node id) of each cell
fn label_cells(
    level: usize,
    cells: &[CellRun],
    order: &[NodeId],
    n: usize,
) -> Result<(Partition, u32)> {
    let mut run_of = vec![INVALID_CELL; n];
    for (run, cell) in cells.iter().enumerate() {
        for &v in &order[cell.begin..cell.end] {
            if run_of[v as usize] != INVALID_CELL {
                return Err(PartitionError::NodeInTwoCells {
                    level,
                    node: v as usize,
                    first: run_of[v as usize],
                    second: run as CellId,
                });
            }
            run_of[v as usize] = run as CellId;
        }
    }

    let mut relabel = vec![INVALID_CELL; cells.len()];
    let mut next = 0;
    let mut partition = Vec::with_capacity(n);
    for &run in &run_of {
        let run = run as usize;
        if relabel[run] == INVALID_CELL {
            relabel[run] = next;
            next += 1;
        }
        partition.push(relabel[run]);
    }
    Ok((partition, next))
}

/// Every finer cell must lie inside exactly one cell of the next coarser level
fn check_coarsening(partitions: &[Partition], num_cells: &[u32]) -> Result<()> {
    for level in 0..partitions.len().saturating_sub(1) {
        let mut parent = vec![INVALID_CELL; num_cells[level] as usize];
        for (fine, coarse) in partitions[level].iter().zip(&partitions[level + 1]) {
            let slot = &mut parent[*fine as usize];
            if *slot == INVALID_CELL {
                *slot = *coarse;
            } else if *slot != *coarse {
                return Err(PartitionError::InconsistentCoarsening {
                    level,
                    cell: *fine,
                    first: *slot,
                    second: *coarse,
                });
            }
        }
    }
    Ok(())
}
