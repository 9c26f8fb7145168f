//! Binary artifacts read and written by the partition step

pub mod container;

pub mod bisection_ids;
pub mod graph_csr;
pub mod partition_mlp;

pub use bisection_ids::{BisectionIds, BisectionIdsFile};
pub use graph_csr::{GraphCsr, GraphCsrFile};
pub use partition_mlp::{PartitionFile, StoredPartition};
