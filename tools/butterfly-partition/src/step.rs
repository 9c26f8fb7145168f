//! Partition step: graph.csr -> bisection.ids + partition.mlp + stats
//!
//! Runs the recursive bisection on the input graph, encodes the bisection
//! ids into levels, validates the packed partition and writes all artifacts
//! into the output directory.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::config::PartitionerConfig;
use crate::formats::{
    BisectionIds, BisectionIdsFile, GraphCsrFile, PartitionFile, StoredPartition,
};
use crate::partition::cell_stats::{compute_cell_stats, log_cell_stats, LevelStats};
use crate::partition::multi_level_partition::CellHierarchy;
use crate::partition::{
    bisection_to_partition, BisectionSummary, MultiLevelPartition, RecursiveBisection,
};
use crate::validate::{validate_partition, InvariantReport};

pub const BISECTION_IDS_FILE: &str = "bisection.ids";
pub const PARTITION_FILE: &str = "partition.mlp";
pub const STATS_FILE: &str = "partition.stats.json";

/// Configuration for the partition step
#[derive(Debug, Clone)]
pub struct PartitionStepConfig {
    pub graph_path: PathBuf,
    pub outdir: PathBuf,
    pub partitioner: PartitionerConfig,
}

/// Result of the partition step
#[derive(Debug)]
pub struct PartitionStepResult {
    pub bisection_ids_path: PathBuf,
    pub partition_path: PathBuf,
    pub stats_path: PathBuf,
    pub n_nodes: u32,
    pub n_arcs: usize,
    pub cells_per_level: Vec<u32>,
    pub max_depth: u32,
    pub build_time_ms: u64,
}

/// Contents of partition.stats.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStats {
    pub inputs_sha256: String,
    pub partition_sha256: String,
    pub n_nodes: u32,
    pub n_arcs: usize,
    pub config: PartitionerConfig,
    pub bisection: BisectionSummary,
    pub levels: Vec<LevelStats>,
    pub validation: InvariantReport,
    pub build_time_ms: u64,
    pub created_at_utc: String,
}

impl PartitionStats {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self)?;
        println!("  ✓ Wrote {}", path.as_ref().display());
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Compute the multi-level partition of graph.csr
pub fn generate_partition(config: PartitionStepConfig) -> Result<PartitionStepResult> {
    let start_time = Instant::now();
    println!("\n🧩 Partition: multi-level recursive bisection\n");

    config.partitioner.validate()?;
    let max_cell_sizes = &config.partitioner.max_cell_sizes;

    println!("Loading graph.csr...");
    let csr = GraphCsrFile::read(&config.graph_path)?;
    println!("  ✓ {} nodes, {} arcs", csr.n_nodes, csr.n_arcs());
    let inputs_sha = compute_inputs_sha(&config.graph_path)?;

    println!("\nRunning recursive bisection...");
    let mut graph = csr.to_bisection_graph()?;
    let bisection = RecursiveBisection::new(&mut graph, &config.partitioner)?;
    let summary = bisection.summary();
    println!(
        "  ✓ {} leaves, {} bisections, max depth {}",
        summary.num_leaves, summary.num_bisections, summary.max_depth
    );
    if summary.num_input_components > 1 {
        println!(
            "  ⚠ input has {} strongly connected components ({} nodes in undividable cells)",
            summary.num_input_components, summary.num_undividable_nodes
        );
    }
    if summary.num_imbalanced > 0 {
        println!("  ⚠ {} bisections missed the balance target", summary.num_imbalanced);
    }
    let bisection_ids = bisection.into_bisection_ids();

    println!("\nEncoding levels...");
    let (partitions, num_cells) = bisection_to_partition(&bisection_ids, max_cell_sizes)?;
    let mlp = MultiLevelPartition::new(&partitions, &num_cells)?;
    for level in 1..mlp.num_levels() {
        println!(
            "  ✓ level {}: {} cells (max {} nodes)",
            level,
            mlp.num_cells(level),
            max_cell_sizes[level - 1]
        );
    }

    println!("\nValidating partition...");
    let report = validate_partition(&mlp, &bisection_ids, max_cell_sizes);
    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }
    ensure!(
        report.passed,
        "partition validation failed: {}",
        report.errors.join("; ")
    );
    println!("  ✓ {}/{} checks passed", report.checks_passed, report.checks_run);

    let levels = compute_cell_stats(&mlp, max_cell_sizes, &csr.offsets, &csr.heads);
    log_cell_stats(&levels);

    println!("\nWriting outputs...");
    std::fs::create_dir_all(&config.outdir)?;

    let bisection_ids_path = config.outdir.join(BISECTION_IDS_FILE);
    BisectionIdsFile::write(
        &bisection_ids_path,
        &BisectionIds {
            n_nodes: csr.n_nodes,
            max_depth: summary.max_depth,
            inputs_sha,
            ids: bisection_ids,
        },
    )?;
    println!("  ✓ Wrote {}", bisection_ids_path.display());

    let created_unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let partition_path = config.outdir.join(PARTITION_FILE);
    let cells_per_level = mlp.cell_counts();
    PartitionFile::write(
        &partition_path,
        &StoredPartition {
            created_unix,
            inputs_sha,
            partition: mlp,
        },
    )?;
    println!("  ✓ Wrote {}", partition_path.display());

    let build_time_ms = start_time.elapsed().as_millis() as u64;
    let stats_path = config.outdir.join(STATS_FILE);
    let stats = PartitionStats {
        inputs_sha256: hex::encode(inputs_sha),
        partition_sha256: compute_file_sha256(&partition_path)?,
        n_nodes: csr.n_nodes,
        n_arcs: csr.n_arcs(),
        config: config.partitioner.clone(),
        bisection: summary,
        levels,
        validation: report,
        build_time_ms,
        created_at_utc: chrono::Utc::now().to_rfc3339(),
    };
    stats.write(&stats_path)?;

    info!(
        nodes = csr.n_nodes,
        levels = cells_per_level.len(),
        build_time_ms,
        "partition step finished"
    );
    println!("\n✅ Partition complete in {} ms", build_time_ms);

    Ok(PartitionStepResult {
        bisection_ids_path,
        partition_path,
        stats_path,
        n_nodes: csr.n_nodes,
        n_arcs: csr.n_arcs(),
        cells_per_level,
        max_depth: summary.max_depth,
        build_time_ms,
    })
}

fn compute_inputs_sha(graph_path: &Path) -> Result<[u8; 32]> {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(&std::fs::read(graph_path)?);

    let result = hasher.finalize();
    let mut sha = [0u8; 32];
    sha.copy_from_slice(&result);
    Ok(sha)
}

fn compute_file_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    let data = std::fs::read(path)?;
    let hash = Sha256::digest(&data);
    Ok(hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::GraphCsr;
    use crate::partition::Coordinate;

    fn write_path_csr(path: &Path, n: u32) {
        let coords: Vec<Coordinate> = (0..n)
            .map(|i| Coordinate::new(4.35 + i as f64 * 0.001, 50.85))
            .collect();
        let mut arcs = Vec::new();
        for i in 0..n - 1 {
            arcs.push((i, i + 1, 10));
            arcs.push((i + 1, i, 10));
        }
        GraphCsrFile::write(path, &GraphCsr::from_arcs(&coords, &arcs).unwrap()).unwrap();
    }

    #[test]
    fn test_generate_partition_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.csr");
        write_path_csr(&graph_path, 32);

        let result = generate_partition(PartitionStepConfig {
            graph_path: graph_path.clone(),
            outdir: dir.path().join("out"),
            partitioner: PartitionerConfig::new().with_max_cell_sizes(vec![8, 32]),
        })
        .unwrap();

        assert_eq!(result.n_nodes, 32);
        assert_eq!(result.n_arcs, 62);
        assert_eq!(result.cells_per_level, vec![4, 1]);

        let ids = BisectionIdsFile::read(&result.bisection_ids_path).unwrap();
        assert_eq!(ids.ids.len(), 32);
        assert_eq!(ids.inputs_sha, compute_inputs_sha(&graph_path).unwrap());

        let stored = PartitionFile::read(&result.partition_path).unwrap();
        assert_eq!(stored.partition.num_levels(), 3);
        assert_eq!(stored.inputs_sha, ids.inputs_sha);

        let stats = PartitionStats::read(&result.stats_path).unwrap();
        assert!(stats.validation.passed);
        assert_eq!(stats.levels.len(), 2);
        assert!(stats.levels[0].max_cell_size <= 8);
        assert_eq!(stats.inputs_sha256, hex::encode(ids.inputs_sha));
    }

    #[test]
    fn test_generate_partition_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.csr");
        write_path_csr(&graph_path, 4);

        let result = generate_partition(PartitionStepConfig {
            graph_path,
            outdir: dir.path().join("out"),
            partitioner: PartitionerConfig::new().with_max_cell_sizes(vec![8, 4]),
        });
        assert!(result.is_err());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_missing_graph_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate_partition(PartitionStepConfig {
            graph_path: dir.path().join("missing.csr"),
            outdir: dir.path().join("out"),
            partitioner: PartitionerConfig::new(),
        });
        assert!(result.is_err());
    }
}
