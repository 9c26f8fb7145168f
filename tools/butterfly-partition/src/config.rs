//! Partitioner configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PartitionError, Result};

/// At most 16 levels including the base graph (level 0).
pub const MAX_PARTITION_LEVELS: usize = 15;

/// How cut capacities are assigned in the flow network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapacityModel {
    /// Every directed arc has capacity 1; the cut counts boundary arcs.
    #[default]
    UnitEdge,
    /// Arc capacity is the edge weight (minimum 1).
    WeightedEdge,
    /// Every node has capacity 1 (node splitting); arcs are uncapacitated.
    UnitVertex,
}

/// Configuration for the recursive bisection and the level encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionerConfig {
    /// Maximum cell size per level, finest first. The first entry also
    /// stops the recursion.
    pub max_cell_sizes: Vec<u32>,
    /// Minimum fraction of nodes on the smaller side of a bisection.
    pub balance: f64,
    /// Fraction of nodes on each end of a projection used as sources/sinks.
    pub boundary_fraction: f64,
    /// Number of projection directions tried per bisection.
    pub num_directions: usize,
    /// Extremal-fraction perturbations tried around the best direction.
    pub refinement_steps: usize,
    /// Components smaller than this are never split.
    pub small_component_size: u32,
    pub capacity_model: CapacityModel,
    /// Evaluate directions on the rayon pool.
    pub parallel_directions: bool,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            max_cell_sizes: vec![128, 4096, 65536, 2097152],
            balance: 0.4,
            boundary_fraction: 0.25,
            num_directions: 8,
            refinement_steps: 2,
            small_component_size: 1000,
            capacity_model: CapacityModel::UnitEdge,
            parallel_directions: true,
        }
    }
}

impl PartitionerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading partitioner config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing partitioner config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_cell_sizes(mut self, sizes: Vec<u32>) -> Self {
        self.max_cell_sizes = sizes;
        self
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_boundary_fraction(mut self, fraction: f64) -> Self {
        self.boundary_fraction = fraction;
        self
    }

    pub fn with_num_directions(mut self, directions: usize) -> Self {
        self.num_directions = directions;
        self
    }

    pub fn with_refinement_steps(mut self, steps: usize) -> Self {
        self.refinement_steps = steps;
        self
    }

    pub fn with_small_component_size(mut self, size: u32) -> Self {
        self.small_component_size = size;
        self
    }

    pub fn with_capacity_model(mut self, model: CapacityModel) -> Self {
        self.capacity_model = model;
        self
    }

    pub fn with_parallel_directions(mut self, parallel: bool) -> Self {
        self.parallel_directions = parallel;
        self
    }

    /// Size at which recursion stops splitting.
    pub fn leaf_cell_size(&self) -> u32 {
        self.max_cell_sizes.first().copied().unwrap_or(1)
    }

    /// Reject configurations the recursion cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.balance > 0.0 && self.balance <= 0.5) {
            return Err(PartitionError::InvalidBalance(self.balance));
        }
        if !(self.boundary_fraction > 0.0 && self.boundary_fraction < 0.5) {
            return Err(PartitionError::InvalidBoundaryFraction(self.boundary_fraction));
        }
        if self.num_directions == 0 {
            return Err(PartitionError::NoDirections);
        }
        validate_cell_sizes(&self.max_cell_sizes)
    }
}

/// Cell sizes must be non-empty, positive and strictly increasing (finest first)
pub fn validate_cell_sizes(max_cell_sizes: &[u32]) -> Result<()> {
    if max_cell_sizes.is_empty() {
        return Err(PartitionError::NoLevels);
    }
    if max_cell_sizes.len() > MAX_PARTITION_LEVELS {
        return Err(PartitionError::TooManyLevels {
            got: max_cell_sizes.len(),
            max: MAX_PARTITION_LEVELS,
        });
    }
    for (level, &size) in max_cell_sizes.iter().enumerate() {
        if size == 0 {
            return Err(PartitionError::ZeroCellSize { level });
        }
        if level > 0 {
            let previous = max_cell_sizes[level - 1];
            if size <= previous {
                return Err(PartitionError::UnsortedCellSizes {
                    level,
                    size,
                    previous,
                });
            }
        }
    }
    Ok(())
}
