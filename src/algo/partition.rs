//! Block partitioning.
//!
//! Block-compressed formats encode fixed-size tiles of texels. The
//! [`BlockPartitioner`] tiles a raster into such blocks and tallies, per
//! block, how many of its texels are Exterior, Interior and Seam. Blocks
//! without Seam texels have no cross-block coupling and can be processed
//! independently; blocks with Seam texels take part in the global system.
//!
//! When the raster size is not a multiple of the block size the last row and
//! column of blocks are shorter.

use log::info;

use crate::error::{Result, SeamError};
use crate::texture::{ClassCounts, ClassMask};

/// Aggregate classification of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Every texel is Exterior.
    Exterior,
    /// No Seam texels, at least one Interior texel.
    Interior,
    /// At least one Seam texel.
    Seam,
}

/// A tile of the raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Column of the top-left texel.
    pub x: usize,
    /// Row of the top-left texel.
    pub y: usize,
    /// Width in texels (shorter than the block size on the right edge).
    pub width: usize,
    /// Height in texels (shorter than the block size on the bottom edge).
    pub height: usize,
    /// Linear indices of the member texels, row-major within the block.
    pub texels: Vec<usize>,
    /// Member counts per class.
    pub counts: ClassCounts,
}

impl Block {
    /// Aggregate classification.
    pub fn kind(&self) -> BlockKind {
        if self.counts.seam > 0 {
            BlockKind::Seam
        } else if self.counts.interior > 0 {
            BlockKind::Interior
        } else {
            BlockKind::Exterior
        }
    }

    /// Whether the block is tied to other blocks through seam correspondences.
    #[inline]
    pub fn is_coupled(&self) -> bool {
        self.counts.seam > 0
    }

    /// Whether any member texel is not Exterior.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.counts.active() > 0
    }

    /// Number of member texels.
    #[inline]
    pub fn len(&self) -> usize {
        self.texels.len()
    }

    /// Whether the block has no texels (never true for a partitioned raster).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }
}

/// Tiles a raster into fixed-size blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPartitioner {
    width: usize,
    height: usize,
    block_size: usize,
}

impl BlockPartitioner {
    /// Establish the block grid for a `width x height` raster.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension or the block size is zero.
    pub fn new(width: usize, height: usize, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(SeamError::invalid_param(
                "block_size",
                block_size,
                "must be at least 1",
            ));
        }
        if width == 0 || height == 0 {
            return Err(SeamError::invalid_param(
                "resolution",
                format!("{}x{}", width, height),
                "raster must be non-empty",
            ));
        }
        Ok(Self {
            width,
            height,
            block_size,
        })
    }

    /// Block edge length.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks along each axis: `(ceil(W / B), ceil(H / B))`.
    #[inline]
    pub fn grid_size(&self) -> (usize, usize) {
        (
            self.width.div_ceil(self.block_size),
            self.height.div_ceil(self.block_size),
        )
    }

    /// Assign every texel to its block and count classes per block.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask resolution differs from the grid's.
    pub fn compute_partitions(&self, mask: &ClassMask) -> Result<Partitions> {
        if (mask.width(), mask.height()) != (self.width, self.height) {
            return Err(SeamError::shape_mismatch(
                "mask resolution",
                (self.width, self.height, 1),
                (mask.width(), mask.height(), 1),
            ));
        }

        let (blocks_x, blocks_y) = self.grid_size();
        let b = self.block_size;
        let mut blocks = Vec::with_capacity(blocks_x * blocks_y);

        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let x = bx * b;
                let y = by * b;
                let width = b.min(self.width - x);
                let height = b.min(self.height - y);

                let mut texels = Vec::with_capacity(width * height);
                let mut counts = ClassCounts::default();
                for ty in y..y + height {
                    for tx in x..x + width {
                        let index = ty * self.width + tx;
                        texels.push(index);
                        counts.add(mask.get(index));
                    }
                }

                blocks.push(Block {
                    x,
                    y,
                    width,
                    height,
                    texels,
                    counts,
                });
            }
        }

        let partitions = Partitions {
            width: self.width,
            height: self.height,
            block_size: b,
            blocks_x,
            blocks_y,
            blocks,
        };

        info!(
            "{}x{} blocks: {} seam, {} interior, {} exterior",
            blocks_x,
            blocks_y,
            partitions.count(BlockKind::Seam),
            partitions.count(BlockKind::Interior),
            partitions.count(BlockKind::Exterior)
        );

        Ok(partitions)
    }
}

/// The blocks of a partitioned raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
    width: usize,
    height: usize,
    block_size: usize,
    blocks_x: usize,
    blocks_y: usize,
    blocks: Vec<Block>,
}

impl Partitions {
    /// Raster width in texels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raster height in texels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Block edge length.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks along each axis.
    #[inline]
    pub fn grid_size(&self) -> (usize, usize) {
        (self.blocks_x, self.blocks_y)
    }

    /// All blocks, row-major over the block grid.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether there are no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index of the block containing a texel.
    #[inline]
    pub fn block_of_texel(&self, texel: usize) -> usize {
        let x = texel % self.width;
        let y = texel / self.width;
        (y / self.block_size) * self.blocks_x + x / self.block_size
    }

    /// Number of blocks of a kind.
    pub fn count(&self, kind: BlockKind) -> usize {
        self.blocks.iter().filter(|b| b.kind() == kind).count()
    }

    /// Indices of blocks with no seam coupling.
    pub fn independent_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_coupled())
            .map(|(i, _)| i)
    }

    /// Indices of blocks coupled through seams.
    pub fn coupled_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_coupled())
            .map(|(i, _)| i)
    }
}
