//! Partition invariant validation
//!
//! Fast-fail checks run on every produced partition:
//! - every node has exactly one valid cell per level
//! - coarser cells are unions of finer cells
//! - cell counts match the stored counts (no empty cell ids)
//! - nodes with equal bisection ids share their finest cell
//! - cell sizes stay below the level maximum (oversized cells are warnings,
//!   they can only come from undividable components)
//! - highest_different_level agrees with per-level cell comparison on a
//!   seeded random sample of node pairs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::partition::bisection_state::BisectionId;
use crate::partition::bisection_to_partition::CellId;
use crate::partition::graph::NodeId;
use crate::partition::multi_level_partition::CellHierarchy;

pub const DEFAULT_SAMPLE_PAIRS: usize = 10_000;
pub const DEFAULT_SEED: u64 = 0x5EED_CE11;

/// Invariant check results
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InvariantReport {
    pub passed: bool,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl InvariantReport {
    fn new() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn check_passed(&mut self) {
        self.checks_run += 1;
        self.checks_passed += 1;
    }

    fn check_failed(&mut self, msg: String) {
        self.checks_run += 1;
        self.passed = false;
        self.errors.push(msg);
    }

    fn record(&mut self, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => self.check_passed(),
            Err(msg) => self.check_failed(msg),
        }
    }
}

pub fn validate_partition<H: CellHierarchy>(
    hierarchy: &H,
    bisection_ids: &[BisectionId],
    max_cell_sizes: &[u32],
) -> InvariantReport {
    validate_partition_sampled(
        hierarchy,
        bisection_ids,
        max_cell_sizes,
        DEFAULT_SAMPLE_PAIRS,
        DEFAULT_SEED,
    )
}

pub fn validate_partition_sampled<H: CellHierarchy>(
    hierarchy: &H,
    bisection_ids: &[BisectionId],
    max_cell_sizes: &[u32],
    sample_pairs: usize,
    seed: u64,
) -> InvariantReport {
    let mut report = InvariantReport::new();

    let num_nodes = hierarchy.num_cells(0) as usize;
    if num_nodes != bisection_ids.len() {
        report.check_failed(format!(
            "partition has {} nodes but {} bisection ids were given",
            num_nodes,
            bisection_ids.len()
        ));
        return report;
    }
    report.check_passed();

    for level in 1..hierarchy.num_levels() {
        report.record(check_cells_in_range(hierarchy, level, num_nodes));
        let mut warnings = Vec::new();
        let outcome = check_cell_sizes(
            hierarchy,
            level,
            num_nodes,
            max_cell_sizes.get(level - 1).copied(),
            &mut warnings,
        );
        report.record(outcome);
        for msg in warnings {
            report.warn(msg);
        }
    }
    for level in 1..hierarchy.num_levels().saturating_sub(1) {
        report.record(check_coarsening(hierarchy, level, num_nodes));
    }
    if hierarchy.num_levels() > 1 {
        report.record(check_bisection_prefixes(hierarchy, bisection_ids));
    }
    report.record(check_sampled_levels(hierarchy, num_nodes, sample_pairs, seed));

    debug!(
        checks = report.checks_run,
        passed = report.checks_passed,
        warnings = report.warnings.len(),
        "partition validation finished"
    );
    report
}

fn check_cells_in_range<H: CellHierarchy>(
    hierarchy: &H,
    level: usize,
    num_nodes: usize,
) -> Result<(), String> {
    let num_cells = hierarchy.num_cells(level);
    for v in 0..num_nodes as NodeId {
        let cell = hierarchy.cell(level, v);
        if cell >= num_cells {
            return Err(format!(
                "level {}: node {} has cell {} but the level has {} cells",
                level, v, cell, num_cells
            ));
        }
    }
    Ok(())
}

fn check_cell_sizes<H: CellHierarchy>(
    hierarchy: &H,
    level: usize,
    num_nodes: usize,
    max_size: Option<u32>,
    warnings: &mut Vec<String>,
) -> Result<(), String> {
    let num_cells = hierarchy.num_cells(level) as usize;
    let mut sizes = vec![0u32; num_cells];
    for v in 0..num_nodes as NodeId {
        if let Some(size) = sizes.get_mut(hierarchy.cell(level, v) as usize) {
            *size += 1;
        }
    }

    if let Some(empty) = sizes.iter().position(|&size| size == 0) {
        return Err(format!(
            "level {}: cell {} of {} is empty",
            level, empty, num_cells
        ));
    }

    if let Some(max_size) = max_size {
        let oversized = sizes.iter().filter(|&&size| size > max_size).count();
        if oversized > 0 {
            let largest = sizes.iter().copied().max().unwrap_or(0);
            warnings.push(format!(
                "level {}: {} cells exceed {} nodes (largest {}), undividable components",
                level, oversized, max_size, largest
            ));
        }
    }
    Ok(())
}

fn check_coarsening<H: CellHierarchy>(
    hierarchy: &H,
    level: usize,
    num_nodes: usize,
) -> Result<(), String> {
    let mut parent_of: FxHashMap<CellId, CellId> = FxHashMap::default();
    for v in 0..num_nodes as NodeId {
        let child = hierarchy.cell(level, v);
        let parent = hierarchy.cell(level + 1, v);
        match parent_of.insert(child, parent) {
            Some(previous) if previous != parent => {
                return Err(format!(
                    "level {}: cell {} lies in cells {} and {} of level {}",
                    level,
                    child,
                    previous,
                    parent,
                    level + 1
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_bisection_prefixes<H: CellHierarchy>(
    hierarchy: &H,
    bisection_ids: &[BisectionId],
) -> Result<(), String> {
    let mut cell_of: FxHashMap<BisectionId, CellId> = FxHashMap::default();
    for (v, &id) in bisection_ids.iter().enumerate() {
        let cell = hierarchy.cell(1, v as NodeId);
        let first = *cell_of.entry(id).or_insert(cell);
        if first != cell {
            return Err(format!(
                "bisection id {:#010x} is spread over cells {} and {}",
                id, first, cell
            ));
        }
    }
    Ok(())
}

fn check_sampled_levels<H: CellHierarchy>(
    hierarchy: &H,
    num_nodes: usize,
    sample_pairs: usize,
    seed: u64,
) -> Result<(), String> {
    if num_nodes == 0 {
        return Ok(());
    }
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..sample_pairs {
        let a = rng.random_range(0..num_nodes) as NodeId;
        let b = rng.random_range(0..num_nodes) as NodeId;
        let level = hierarchy.highest_different_level(a, b);

        for above in (level + 1)..hierarchy.num_levels() {
            if hierarchy.cell(above, a) != hierarchy.cell(above, b) {
                return Err(format!(
                    "nodes {} and {}: highest different level is {} but cells differ on level {}",
                    a, b, level, above
                ));
            }
        }
        if level > 0 && hierarchy.cell(level, a) == hierarchy.cell(level, b) {
            return Err(format!(
                "nodes {} and {}: highest different level is {} but cells are equal there",
                a, b, level
            ));
        }
    }
    Ok(())
}
