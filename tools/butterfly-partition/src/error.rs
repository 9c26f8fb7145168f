//! Error types for the partitioner
//!
//! Configuration and input errors are rejected before recursion starts.
//! Invariant violations indicate a bug in the encoder and fail fast.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PartitionError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PartitionError {
    #[error("balance must be in (0, 0.5], got {0}")]
    InvalidBalance(f64),

    #[error("boundary fraction must be in (0, 0.5), got {0}")]
    InvalidBoundaryFraction(f64),

    #[error("max_cell_sizes must not be empty")]
    NoLevels,

    #[error("max_cell_sizes must be positive, level {level} has size 0")]
    ZeroCellSize { level: usize },

    #[error("max_cell_sizes must be strictly increasing, level {level} ({size}) <= previous ({previous})")]
    UnsortedCellSizes {
        level: usize,
        size: u32,
        previous: u32,
    },

    #[error("at most {max} partition levels are supported, got {got}")]
    TooManyLevels { got: usize, max: usize },

    #[error("num_directions must be at least 1")]
    NoDirections,

    #[error("graph has {nodes} nodes but {coordinates} coordinates")]
    CoordinateCountMismatch { nodes: usize, coordinates: usize },

    #[error("edge {edge} of node {node} targets {target}, but the graph has {nodes} nodes")]
    EdgeTargetOutOfRange {
        node: usize,
        edge: usize,
        target: u32,
        nodes: usize,
    },

    #[error("partition id of level {level} needs {bits} bits, only 64 are available")]
    PartitionBitsExhausted { level: usize, bits: u32 },

    #[error("node {node} is assigned to cells {first} and {second} on level {level}")]
    NodeInTwoCells {
        level: usize,
        node: usize,
        first: u32,
        second: u32,
    },

    #[error("cell {cell} on level {level} is split across coarser cells {first} and {second}")]
    InconsistentCoarsening {
        level: usize,
        cell: u32,
        first: u32,
        second: u32,
    },

    #[error("malformed partition data: {0}")]
    MalformedPartition(String),
}
