//! butterfly-partition: multi-level graph partitioning for butterfly-osm
//!
//! Prepares a road graph for hierarchical shortest-path search by cutting it
//! into nested, balanced cells with small boundaries:
//! - recursive bisection with inertial flow (projected Dinic min-cuts)
//! - strongly connected component repair for undividable pieces
//! - encoding of bisection ids into per-level cells
//! - a packed, read-only multi-level partition for queries

pub mod config;
pub mod error;
pub mod formats;
pub mod partition;
pub mod step;
pub mod validate;

pub use config::{CapacityModel, PartitionerConfig};
pub use error::{PartitionError, Result};
pub use partition::{
    bisection_to_partition, BisectionGraph, CellHierarchy, Coordinate, MultiLevelPartition,
    RecursiveBisection,
};
pub use step::{generate_partition, PartitionStepConfig, PartitionStepResult};
