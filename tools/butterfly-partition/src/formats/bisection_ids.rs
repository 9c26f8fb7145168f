//! bisection.ids format - per-node recursive bisection ids
//!
//! Header:
//!   magic: u32 = 0x42534944 ("BSID")
//!   version: u16 = 1
//!   reserved: u16
//!   n_nodes: u32
//!   max_depth: u32
//!   inputs_sha: [u8; 32]
//! Arrays (length-prefixed):
//!   ids: [u32; n_nodes]   (bit 31 - depth set = sink side at that depth)
//! Footer: body_crc: u64, file_crc: u64

use anyhow::{ensure, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::container::{ContainerReader, ContainerWriter};

const MAGIC: u32 = 0x42534944; // "BSID"
const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BisectionIds {
    pub n_nodes: u32,
    pub max_depth: u32,
    pub inputs_sha: [u8; 32],
    pub ids: Vec<u32>,
}

pub struct BisectionIdsFile;

impl BisectionIdsFile {
    pub fn write<P: AsRef<Path>>(path: P, data: &BisectionIds) -> Result<()> {
        let mut writer = ContainerWriter::new(BufWriter::new(File::create(path)?));
        writer.header(MAGIC, VERSION)?;
        writer.value(data.n_nodes)?;
        writer.value(data.max_depth)?;
        writer.bytes(&data.inputs_sha)?;
        writer.array(&data.ids)?;
        writer.finish()?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<BisectionIds> {
        let mut reader = ContainerReader::new(BufReader::new(File::open(path)?), "bisection.ids");
        reader.header(MAGIC, VERSION)?;
        let n_nodes: u32 = reader.value()?;
        let max_depth: u32 = reader.value()?;
        let inputs_sha = reader.bytes::<32>()?;
        let ids: Vec<u32> = reader.array()?;
        reader.finish()?;

        ensure!(
            ids.len() == n_nodes as usize,
            "bisection.ids: header says {} nodes, found {} ids",
            n_nodes,
            ids.len()
        );
        ensure!(max_depth <= 32, "bisection.ids: max_depth {} > 32", max_depth);

        Ok(BisectionIds {
            n_nodes,
            max_depth,
            inputs_sha,
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bisection.ids");
        let data = BisectionIds {
            n_nodes: 4,
            max_depth: 2,
            inputs_sha: [0xAB; 32],
            ids: vec![0, 0x4000_0000, 0x8000_0000, 0xC000_0000],
        };

        BisectionIdsFile::write(&path, &data).unwrap();
        assert_eq!(BisectionIdsFile::read(&path).unwrap(), data);
    }

    #[test]
    fn test_rejects_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bisection.ids");
        let data = BisectionIds {
            n_nodes: 3,
            max_depth: 1,
            inputs_sha: [0; 32],
            ids: vec![0, 0x8000_0000],
        };

        BisectionIdsFile::write(&path, &data).unwrap();
        assert!(BisectionIdsFile::read(&path).is_err());
    }
}
