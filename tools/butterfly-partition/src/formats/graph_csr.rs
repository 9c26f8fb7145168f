//! graph.csr format - input graph for the partitioner
//!
//! Directed adjacency in CSR form with one fixed-point coordinate per node.
//!
//! Header:
//!   magic: u32 = 0x50475243 ("PGRC")
//!   version: u16 = 1
//!   reserved: u16
//!   n_nodes: u32
//!   reserved: u32
//! Arrays (length-prefixed):
//!   offsets: [u64; n_nodes + 1]
//!   heads: [u32; n_arcs]
//!   weights: [u32; n_arcs]
//!   lon_fxp: [i32; n_nodes]   (1e-7 degrees)
//!   lat_fxp: [i32; n_nodes]
//! Footer: body_crc: u64, file_crc: u64

use anyhow::{ensure, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::container::{ContainerReader, ContainerWriter};
use crate::partition::graph::{BisectionGraph, Coordinate};

const MAGIC: u32 = 0x50475243; // "PGRC"
const VERSION: u16 = 1;

/// Degrees per fixed-point unit
pub const COORD_SCALE: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphCsr {
    pub n_nodes: u32,
    pub offsets: Vec<u64>,
    pub heads: Vec<u32>,
    pub weights: Vec<u32>,
    pub lon_fxp: Vec<i32>,
    pub lat_fxp: Vec<i32>,
}

impl GraphCsr {
    /// Build from `(source, target, weight)` arcs and coordinates in degrees
    pub fn from_arcs(coordinates: &[Coordinate], arcs: &[(u32, u32, u32)]) -> Result<Self> {
        let n = coordinates.len();
        let mut sorted = arcs.to_vec();
        sorted.sort_unstable();

        let mut offsets = vec![0u64; n + 1];
        for &(u, v, _) in &sorted {
            ensure!(
                (u as usize) < n && (v as usize) < n,
                "arc {} -> {} is out of range for {} nodes",
                u,
                v,
                n
            );
            offsets[u as usize + 1] += 1;
        }
        for i in 0..n {
            offsets[i + 1] += offsets[i];
        }

        Ok(Self {
            n_nodes: n as u32,
            offsets,
            heads: sorted.iter().map(|&(_, v, _)| v).collect(),
            weights: sorted.iter().map(|&(_, _, w)| w).collect(),
            lon_fxp: coordinates.iter().map(|c| to_fxp(c.lon)).collect(),
            lat_fxp: coordinates.iter().map(|c| to_fxp(c.lat)).collect(),
        })
    }

    pub fn n_arcs(&self) -> usize {
        self.heads.len()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.lon_fxp
            .iter()
            .zip(&self.lat_fxp)
            .map(|(&lon, &lat)| Coordinate::new(lon as f64 * COORD_SCALE, lat as f64 * COORD_SCALE))
            .collect()
    }

    pub fn to_bisection_graph(&self) -> Result<BisectionGraph> {
        Ok(BisectionGraph::from_csr(
            &self.offsets,
            &self.heads,
            &self.weights,
            &self.coordinates(),
        )?)
    }

    fn check(&self) -> Result<()> {
        let n = self.n_nodes as usize;
        ensure!(
            self.offsets.len() == n + 1,
            "graph.csr: {} offsets for {} nodes",
            self.offsets.len(),
            n
        );
        ensure!(
            self.offsets.windows(2).all(|w| w[0] <= w[1]),
            "graph.csr: offsets are not monotonic"
        );
        ensure!(
            self.offsets.last().copied() == Some(self.heads.len() as u64),
            "graph.csr: last offset {:?} != {} arcs",
            self.offsets.last(),
            self.heads.len()
        );
        ensure!(
            self.weights.len() == self.heads.len(),
            "graph.csr: {} weights for {} arcs",
            self.weights.len(),
            self.heads.len()
        );
        ensure!(
            self.lon_fxp.len() == n && self.lat_fxp.len() == n,
            "graph.csr: coordinate arrays do not match {} nodes",
            n
        );
        Ok(())
    }
}

fn to_fxp(degrees: f64) -> i32 {
    (degrees / COORD_SCALE).round() as i32
}

pub struct GraphCsrFile;

impl GraphCsrFile {
    pub fn write<P: AsRef<Path>>(path: P, graph: &GraphCsr) -> Result<()> {
        let mut writer = ContainerWriter::new(BufWriter::new(File::create(path)?));
        writer.header(MAGIC, VERSION)?;
        writer.value(graph.n_nodes)?;
        writer.value(0u32)?;
        writer.array(&graph.offsets)?;
        writer.array(&graph.heads)?;
        writer.array(&graph.weights)?;
        writer.array(&graph.lon_fxp)?;
        writer.array(&graph.lat_fxp)?;
        writer.finish()?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<GraphCsr> {
        let mut reader = ContainerReader::new(BufReader::new(File::open(path)?), "graph.csr");
        reader.header(MAGIC, VERSION)?;
        let n_nodes: u32 = reader.value()?;
        let _reserved: u32 = reader.value()?;
        let graph = GraphCsr {
            n_nodes,
            offsets: reader.array()?,
            heads: reader.array()?,
            weights: reader.array()?,
            lon_fxp: reader.array()?,
            lat_fxp: reader.array()?,
        };
        reader.finish()?;
        graph.check()?;
        Ok(graph)
    }
}
