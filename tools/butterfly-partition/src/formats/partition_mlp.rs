//! partition.mlp format - packed multi-level partition
//!
//! Header:
//!   magic: u32 = 0x4D4C5054 ("MLPT")
//!   version: u16 = 1
//!   reserved: u16
//!   n_nodes: u32
//!   n_levels: u32          (partition levels, base graph excluded)
//!   created_unix: u64
//!   inputs_sha: [u8; 32]
//! Arrays (length-prefixed):
//!   num_cells: [u32; n_levels]            (finest first)
//!   partition_ids: [u64; n_nodes + 1]     (last entry is the sentinel)
//!   cell_to_children: [u32; ...]          (levels >= 2)
//! Footer: body_crc: u64, file_crc: u64

use anyhow::{ensure, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::container::{ContainerReader, ContainerWriter};
use crate::partition::multi_level_partition::MultiLevelPartition;

const MAGIC: u32 = 0x4D4C5054; // "MLPT"
const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPartition {
    pub created_unix: u64,
    pub inputs_sha: [u8; 32],
    pub partition: MultiLevelPartition,
}

pub struct PartitionFile;

impl PartitionFile {
    pub fn write<P: AsRef<Path>>(path: P, data: &StoredPartition) -> Result<()> {
        let mlp = &data.partition;
        let num_cells = mlp.cell_counts();

        let mut writer = ContainerWriter::new(BufWriter::new(File::create(path)?));
        writer.header(MAGIC, VERSION)?;
        writer.value(mlp.num_nodes() as u32)?;
        writer.value(num_cells.len() as u32)?;
        writer.value(data.created_unix)?;
        writer.bytes(&data.inputs_sha)?;
        writer.array(&num_cells)?;
        writer.array(mlp.partition_ids())?;
        writer.array(mlp.cell_to_children())?;
        writer.finish()?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<StoredPartition> {
        let mut reader = ContainerReader::new(BufReader::new(File::open(path)?), "partition.mlp");
        reader.header(MAGIC, VERSION)?;
        let n_nodes: u32 = reader.value()?;
        let n_levels: u32 = reader.value()?;
        let created_unix: u64 = reader.value()?;
        let inputs_sha = reader.bytes::<32>()?;
        let num_cells: Vec<u32> = reader.array()?;
        let partition_ids: Vec<u64> = reader.array()?;
        let cell_to_children: Vec<u32> = reader.array()?;
        reader.finish()?;

        ensure!(
            num_cells.len() == n_levels as usize,
            "partition.mlp: header says {} levels, found {} cell counts",
            n_levels,
            num_cells.len()
        );
        ensure!(
            partition_ids.len() == n_nodes as usize + 1,
            "partition.mlp: header says {} nodes, found {} partition ids",
            n_nodes,
            partition_ids.len()
        );

        let partition = MultiLevelPartition::from_raw_parts(&num_cells, partition_ids, cell_to_children)?;
        Ok(StoredPartition {
            created_unix,
            inputs_sha,
            partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::multi_level_partition::CellHierarchy;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partition.mlp");
        let partition = MultiLevelPartition::new(
            &[vec![0, 0, 1, 1, 2, 2], vec![0, 0, 0, 0, 1, 1]],
            &[3, 2],
        )
        .unwrap();
        let data = StoredPartition {
            created_unix: 1_700_000_000,
            inputs_sha: [3; 32],
            partition,
        };

        PartitionFile::write(&path, &data).unwrap();
        let loaded = PartitionFile::read(&path).unwrap();
        assert_eq!(loaded, data);
        assert_eq!(loaded.partition.num_levels(), 3);
        assert_eq!(loaded.partition.highest_different_level(0, 5), 2);
    }

    #[test]
    fn test_rejects_other_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bisection.ids");
        crate::formats::BisectionIdsFile::write(
            &path,
            &crate::formats::BisectionIds {
                n_nodes: 0,
                max_depth: 0,
                inputs_sha: [0; 32],
                ids: vec![],
            },
        )
        .unwrap();

        let err = PartitionFile::read(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid magic"));
    }
}
