//! Multi-level graph partitioning by recursive inertial flow bisection

pub mod bisection_state;
pub mod bisection_to_partition;
pub mod cell_stats;
pub mod graph;
pub mod inertial_flow;
pub mod max_flow;
pub mod multi_level_partition;
pub mod recursive_bisection;
pub mod scc;

pub use bisection_state::{BisectionId, RecursiveBisectionState};
pub use bisection_to_partition::{bisection_to_partition, CellId, Partition};
pub use cell_stats::{compute_cell_stats, LevelStats};
pub use graph::{BisectionGraph, Coordinate, GraphView, NodeId, NodeRange};
pub use inertial_flow::{Bisection, InertialFlow};
pub use max_flow::{DinicMaxFlow, MinCut};
pub use multi_level_partition::{CellHierarchy, MultiLevelPartition, PartitionId};
pub use recursive_bisection::{BisectionSummary, RecursiveBisection};
pub use scc::{strongly_connected_components, Components};
