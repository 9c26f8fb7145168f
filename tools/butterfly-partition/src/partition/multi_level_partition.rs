//! Query-time multi-level partition
//!
//! All cell ids of a node are packed into one `u64`: level 1 (finest) in
//! the low bits, the coarsest level in the high bits, each level using just
//! enough bits for its cell count. Cell lookups are a mask and a shift, and
//! the highest level on which two nodes differ is the most significant bit
//! of the XOR of their packed ids.
//!
//! Level 0 is the base graph (every node its own cell). Partition levels
//! are `1..num_levels()`. A sentinel entry after the last node stores the
//! number of cells of every level.
//!
//! Cells are renumbered top-down on construction so that the children of a
//! cell always form a contiguous id range on the next finer level.

use crate::config::MAX_PARTITION_LEVELS;
use crate::error::{PartitionError, Result};
use crate::partition::bisection_to_partition::{CellId, Partition};
use crate::partition::graph::NodeId;

pub type PartitionId = u64;

const NUM_PARTITION_BITS: usize = PartitionId::BITS as usize;

/// Read-only cell lookups shared by everything consuming a partition
pub trait CellHierarchy {
    /// Number of levels including the base graph level 0
    fn num_levels(&self) -> usize;

    fn num_cells(&self, level: usize) -> u32;

    /// Cell of `node` on `level`. Level 0 returns the node itself.
    fn cell(&self, level: usize, node: NodeId) -> CellId;

    /// Highest level on which the two nodes are in different cells, 0 if
    /// they share a cell on every partition level
    fn highest_different_level(&self, first: NodeId, second: NodeId) -> usize;

    /// Level a search from `start` to `target` has to use at `node`
    fn query_level(&self, start: NodeId, target: NodeId, node: NodeId) -> usize {
        self.highest_different_level(start, node)
            .min(self.highest_different_level(target, node))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LevelData {
    /// Bit offset per partition level, plus the end offset
    offsets: Vec<u32>,
    masks: Vec<PartitionId>,
    bit_to_level: [u8; NUM_PARTITION_BITS],
    /// Start of each level's slice in `cell_to_children` (levels >= 2)
    children_offsets: Vec<u32>,
}

/// Bits needed to store values `0..=count`
fn bits_for(count: u32) -> u32 {
    u32::BITS - count.leading_zeros()
}

fn low_mask(bits: u32) -> PartitionId {
    if bits as usize >= NUM_PARTITION_BITS {
        PartitionId::MAX
    } else {
        (1 << bits) - 1
    }
}

impl LevelData {
    fn new(num_cells: &[u32]) -> Result<Self> {
        if num_cells.is_empty() {
            return Err(PartitionError::NoLevels);
        }
        if num_cells.len() > MAX_PARTITION_LEVELS {
            return Err(PartitionError::TooManyLevels {
                got: num_cells.len(),
                max: MAX_PARTITION_LEVELS,
            });
        }

        let mut offsets = Vec::with_capacity(num_cells.len() + 1);
        let mut sum_bits = 0u32;
        for (index, &count) in num_cells.iter().enumerate() {
            offsets.push(sum_bits);
            sum_bits += bits_for(count);
            if sum_bits as usize > NUM_PARTITION_BITS {
                return Err(PartitionError::PartitionBitsExhausted {
                    level: index + 1,
                    bits: sum_bits,
                });
            }
        }
        offsets.push(sum_bits);

        let masks = offsets
            .windows(2)
            .map(|pair| low_mask(pair[1]) ^ low_mask(pair[0]))
            .collect();

        let mut bit_to_level = [0u8; NUM_PARTITION_BITS];
        for level in 1..=num_cells.len() {
            for bit in offsets[level - 1] as usize..NUM_PARTITION_BITS {
                bit_to_level[bit] = level as u8;
            }
        }

        let mut children_offsets = vec![0u32; num_cells.len()];
        let mut total = 0u32;
        for index in 1..num_cells.len() {
            children_offsets[index] = total;
            total += num_cells[index] + 1;
        }

        Ok(Self {
            offsets,
            masks,
            bit_to_level,
            children_offsets,
        })
    }

    fn num_partition_levels(&self) -> usize {
        self.masks.len()
    }

    fn children_len(&self, num_cells: &[u32]) -> usize {
        num_cells.iter().skip(1).map(|&c| c as usize + 1).sum()
    }
}

/// Packed multi-level partition with contiguous child ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLevelPartition {
    level_data: LevelData,
    /// Packed ids per node, followed by the sentinel
    partition: Vec<PartitionId>,
    cell_to_children: Vec<CellId>,
}

impl MultiLevelPartition {
    /// Build from per-level partitions (finest first) and their cell counts
    pub fn new(partitions: &[Partition], num_cells: &[u32]) -> Result<Self> {
        if partitions.len() != num_cells.len() {
            return Err(PartitionError::MalformedPartition(format!(
                "{} partitions but {} cell counts",
                partitions.len(),
                num_cells.len()
            )));
        }
        let level_data = LevelData::new(num_cells)?;
        let num_nodes = partitions[0].len();
        for (index, partition) in partitions.iter().enumerate() {
            if partition.len() != num_nodes {
                return Err(PartitionError::MalformedPartition(format!(
                    "level {} has {} nodes, expected {}",
                    index + 1,
                    partition.len(),
                    num_nodes
                )));
            }
            if let Some(&cell) = partition.iter().find(|&&cell| cell >= num_cells[index]) {
                return Err(PartitionError::MalformedPartition(format!(
                    "level {} uses cell {} but has {} cells",
                    index + 1,
                    cell,
                    num_cells[index]
                )));
            }
        }

        let mut mlp = Self {
            level_data,
            partition: vec![0; num_nodes + 1],
            cell_to_children: Vec::new(),
        };
        mlp.initialize(partitions);
        Ok(mlp)
    }

    /// Rebuild from stored arrays
    pub fn from_raw_parts(
        num_cells: &[u32],
        partition: Vec<PartitionId>,
        cell_to_children: Vec<CellId>,
    ) -> Result<Self> {
        let level_data = LevelData::new(num_cells)?;
        if partition.is_empty() {
            return Err(PartitionError::MalformedPartition(
                "missing sentinel entry".to_string(),
            ));
        }
        let expected = level_data.children_len(num_cells);
        if cell_to_children.len() != expected {
            return Err(PartitionError::MalformedPartition(format!(
                "cell_to_children has {} entries, expected {}",
                cell_to_children.len(),
                expected
            )));
        }

        let mlp = Self {
            level_data,
            partition,
            cell_to_children,
        };
        for (index, &count) in num_cells.iter().enumerate() {
            let stored = mlp.num_cells(index + 1);
            if stored != count {
                return Err(PartitionError::MalformedPartition(format!(
                    "sentinel stores {} cells on level {}, expected {}",
                    stored,
                    index + 1,
                    count
                )));
            }
        }
        Ok(mlp)
    }

    fn initialize(&mut self, partitions: &[Partition]) {
        let num_nodes = partitions[0].len();
        let sentinel = num_nodes as NodeId;

        // Bottom-up stable sorts leave nodes grouped by coarsest cell, then
        // by each finer cell in turn
        let mut permutation: Vec<NodeId> = (0..num_nodes as NodeId).collect();
        for partition in partitions {
            permutation.sort_by_key(|&v| partition[v as usize]);
        }

        for (index, partition) in partitions.iter().enumerate().rev() {
            let level = index + 1;
            let mut cell_id: CellId = 0;
            let mut last = permutation.first().map(|&v| partition[v as usize]);
            for &v in &permutation {
                let cell = partition[v as usize];
                if Some(cell) != last {
                    cell_id += 1;
                    last = Some(cell);
                }
                self.set_cell(level, v, cell_id);
            }
            let count = if num_nodes == 0 { 0 } else { cell_id + 1 };
            self.set_cell(level, sentinel, count);
        }

        for index in 1..partitions.len() {
            let parent = &partitions[index];
            debug_assert_eq!(
                self.cell_to_children.len(),
                self.level_data.children_offsets[index] as usize
            );
            let mut last_parent = None;
            for &v in &permutation {
                if last_parent != Some(parent[v as usize]) {
                    let first_child = self.cell(index, v);
                    self.cell_to_children.push(first_child);
                    last_parent = Some(parent[v as usize]);
                }
            }
            let end = self.num_cells(index);
            self.cell_to_children.push(end);
        }
    }

    fn set_cell(&mut self, level: usize, node: NodeId, cell: CellId) {
        let index = level - 1;
        let shifted = (cell as PartitionId) << self.level_data.offsets[index];
        let cleared = self.partition[node as usize] & !self.level_data.masks[index];
        self.partition[node as usize] = cleared | shifted;
    }

    fn sentinel(&self) -> NodeId {
        (self.partition.len() - 1) as NodeId
    }

    pub fn num_nodes(&self) -> usize {
        self.partition.len() - 1
    }

    /// First child cell (on `level - 1`) of `cell`. Only valid for `level >= 2`.
    pub fn begin_children(&self, level: usize, cell: CellId) -> CellId {
        debug_assert!(level > 1);
        let offset = self.level_data.children_offsets[level - 1] as usize;
        self.cell_to_children[offset + cell as usize]
    }

    /// One past the last child cell of `cell`. Only valid for `level >= 2`.
    pub fn end_children(&self, level: usize, cell: CellId) -> CellId {
        debug_assert!(level > 1);
        let offset = self.level_data.children_offsets[level - 1] as usize;
        self.cell_to_children[offset + cell as usize + 1]
    }

    /// Cell counts of partition levels 1.., finest first
    pub fn cell_counts(&self) -> Vec<u32> {
        (1..self.num_levels()).map(|level| self.num_cells(level)).collect()
    }

    /// Packed ids including the trailing sentinel
    pub fn partition_ids(&self) -> &[PartitionId] {
        &self.partition
    }

    pub fn cell_to_children(&self) -> &[CellId] {
        &self.cell_to_children
    }
}

impl CellHierarchy for MultiLevelPartition {
    fn num_levels(&self) -> usize {
        self.level_data.num_partition_levels() + 1
    }

    fn num_cells(&self, level: usize) -> u32 {
        if level == 0 {
            return self.num_nodes() as u32;
        }
        self.cell(level, self.sentinel())
    }

    fn cell(&self, level: usize, node: NodeId) -> CellId {
        if level == 0 {
            return node;
        }
        let index = level - 1;
        let masked = self.partition[node as usize] & self.level_data.masks[index];
        (masked >> self.level_data.offsets[index]) as CellId
    }

    fn highest_different_level(&self, first: NodeId, second: NodeId) -> usize {
        let diff = self.partition[first as usize] ^ self.partition[second as usize];
        if diff == 0 {
            return 0;
        }
        let msb = NUM_PARTITION_BITS - 1 - diff.leading_zeros() as usize;
        self.level_data.bit_to_level[msb] as usize
    }
}
