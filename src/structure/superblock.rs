use log::warn;

use crate::consts::{
    BlockPointer, InodePointer, BLOCK_BITMAP_INDEX, BLOCK_SIZE, INODE_BITMAP_INDEX,
    INODE_TABLE_INDEX, MAX_INODES, ROOT_INODE, SUPERBLOCK_INDEX,
};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, ByteSerializable, KnownSize};

const FIELD_COUNT: usize = 10;

/// Geometry and free counters, stored verbatim at block 0 as ten
/// little-endian `u32` fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub block_size: u32,
    pub block_bitmap_start: BlockPointer,
    pub inode_bitmap_start: BlockPointer,
    pub inode_table_start: BlockPointer,
    pub data_block_start: BlockPointer,
    pub root_inode: InodePointer,
}

impl SuperBlock {
    /// Smallest device that fits the metadata plus the root directory block.
    pub const MIN_BLOCKS: u32 = INODE_TABLE_INDEX + 2;

    /// Lays out a fresh filesystem of `total_blocks` blocks.
    ///
    /// The inode count is capped at [`MAX_INODES`] and shrunk on small devices
    /// so the inode table never takes more than a quarter of the blocks left
    /// after the three fixed metadata blocks.
    pub fn new(total_blocks: u32) -> Result<SuperBlock> {
        let max_blocks = (BLOCK_SIZE * 8) as u32;
        if total_blocks < Self::MIN_BLOCKS || total_blocks > max_blocks {
            return Err(FsError::OutOfRange {
                what: "device block count",
                index: total_blocks as u64,
                limit: max_blocks as u64,
            });
        }

        let per_block = inodes_per_block(BLOCK_SIZE as u32);
        let table_budget = ((total_blocks - INODE_TABLE_INDEX) / 4).max(1);
        let total_inodes = MAX_INODES.min(per_block * table_budget);
        let data_block_start = INODE_TABLE_INDEX + table_blocks(total_inodes, BLOCK_SIZE as u32);

        Ok(SuperBlock {
            total_blocks,
            total_inodes,
            free_blocks: total_blocks - data_block_start,
            free_inodes: total_inodes,
            block_size: BLOCK_SIZE as u32,
            block_bitmap_start: BLOCK_BITMAP_INDEX,
            inode_bitmap_start: INODE_BITMAP_INDEX,
            inode_table_start: INODE_TABLE_INDEX,
            data_block_start,
            root_inode: ROOT_INODE,
        })
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<SuperBlock> {
        let bytes = io.read_bytes(SUPERBLOCK_INDEX, 0, Self::size_on_disk())?;
        Ok(SuperBlock::from_bytes(&bytes))
    }

    /// Persists the record. Only the bytes of the record itself are written.
    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        io.write_bytes(SUPERBLOCK_INDEX, 0, &self.to_bytes())
    }

    pub fn inode_table_blocks(&self) -> u32 {
        table_blocks(self.total_inodes, self.block_size)
    }

    pub fn inodes_per_block(&self) -> u32 {
        inodes_per_block(self.block_size)
    }

    /// Checks everything that can be checked without the bitmaps.
    pub fn validate(&self, device_blocks: u64) -> Result<()> {
        let corrupt = |reason: String| {
            warn!("rejecting superblock: {}", reason);
            Err(FsError::CorruptLayout(reason))
        };

        if self.block_size as usize != BLOCK_SIZE {
            return corrupt(format!("unsupported block size {}", self.block_size));
        }
        if self.total_blocks as u64 > device_blocks {
            return corrupt(format!(
                "superblock claims {} blocks but the device holds {}",
                self.total_blocks, device_blocks
            ));
        }
        let bitmap_capacity = self.block_size * 8;
        if self.total_blocks > bitmap_capacity || self.total_inodes > bitmap_capacity {
            return corrupt("totals exceed what a one-block bitmap can track".to_string());
        }
        if self.total_inodes == 0 {
            return corrupt("no inodes".to_string());
        }
        if self.free_blocks > self.total_blocks {
            return corrupt(format!("free blocks {} > total {}", self.free_blocks, self.total_blocks));
        }
        if self.free_inodes > self.total_inodes {
            return corrupt(format!("free inodes {} > total {}", self.free_inodes, self.total_inodes));
        }
        if self.root_inode >= self.total_inodes {
            return corrupt(format!("root inode {} outside the table", self.root_inode));
        }

        let mut regions = [
            ("superblock", SUPERBLOCK_INDEX, SUPERBLOCK_INDEX + 1),
            ("block bitmap", self.block_bitmap_start, self.block_bitmap_start.saturating_add(1)),
            ("inode bitmap", self.inode_bitmap_start, self.inode_bitmap_start.saturating_add(1)),
            (
                "inode table",
                self.inode_table_start,
                self.inode_table_start.saturating_add(self.inode_table_blocks()),
            ),
            ("data", self.data_block_start, self.total_blocks),
        ];
        regions.sort_by_key(|&(_, start, _)| start);

        for pair in regions.windows(2) {
            let (name, _, end) = pair[0];
            let (next, start, _) = pair[1];
            if end > start {
                return corrupt(format!("{} overlaps {}", name, next));
            }
        }
        for (name, start, end) in regions {
            if start >= end || end > self.total_blocks {
                return corrupt(format!("{} region {}..{} is empty or out of bounds", name, start, end));
            }
        }
        Ok(())
    }
}

pub(crate) fn inodes_per_block(block_size: u32) -> u32 {
    block_size / Inode::size_on_disk() as u32
}

fn table_blocks(total_inodes: u32, block_size: u32) -> u32 {
    total_inodes.div_ceil(inodes_per_block(block_size))
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let fields = [
            self.total_blocks,
            self.total_inodes,
            self.free_blocks,
            self.free_inodes,
            self.block_size,
            self.block_bitmap_start,
            self.inode_bitmap_start,
            self.inode_table_start,
            self.data_block_start,
            self.root_inode,
        ];
        let mut buffer = Vec::with_capacity(FIELD_COUNT * 4);
        for field in fields {
            buffer.extend_from_slice(&field.to_le_bytes());
        }
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        SuperBlock {
            total_blocks: read_u32(bytes, 0),
            total_inodes: read_u32(bytes, 4),
            free_blocks: read_u32(bytes, 8),
            free_inodes: read_u32(bytes, 12),
            block_size: read_u32(bytes, 16),
            block_bitmap_start: read_u32(bytes, 20),
            inode_bitmap_start: read_u32(bytes, 24),
            inode_table_start: read_u32(bytes, 28),
            data_block_start: read_u32(bytes, 32),
            root_inode: read_u32(bytes, 36),
        }
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        FIELD_COUNT * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;

    #[test]
    fn read_write_superblock() {
        let drive = MemoryDrive::new(64 * 4096, 512);
        let mut io = IO::new(drive, 4096).unwrap();
        let mut superblock = SuperBlock::new(64).unwrap();
        superblock.write(&mut io).unwrap();
        superblock.free_blocks -= 1;
        superblock.write(&mut io).unwrap();
        assert_eq!(SuperBlock::read(&io).unwrap(), superblock);
    }

    #[test]
    fn field_order_on_disk() {
        let superblock = SuperBlock::new(100).unwrap();
        let bytes = superblock.to_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(read_u32(&bytes, 0), 100);
        assert_eq!(read_u32(&bytes, 4), 512);
        assert_eq!(read_u32(&bytes, 16), 4096);
        assert_eq!(read_u32(&bytes, 28), 3);
        assert_eq!(read_u32(&bytes, 32), 13);
    }

    #[test]
    fn canonical_layout() {
        let superblock = SuperBlock::new(100).unwrap();
        assert_eq!(superblock.total_inodes, 512);
        assert_eq!(superblock.inodes_per_block(), 53);
        assert_eq!(superblock.inode_table_blocks(), 10);
        assert_eq!(superblock.data_block_start, 13);
        assert_eq!(superblock.free_blocks, 87);
        superblock.validate(100).unwrap();
    }

    #[test]
    fn small_device_layout() {
        let superblock = SuperBlock::new(10).unwrap();
        assert_eq!(superblock.total_inodes, 53);
        assert_eq!(superblock.inode_table_blocks(), 1);
        assert_eq!(superblock.data_block_start, 4);
        assert_eq!(superblock.free_blocks, 6);
        superblock.validate(10).unwrap();
    }

    #[test]
    fn rejects_unusable_sizes() {
        assert!(SuperBlock::new(4).is_err());
        assert!(SuperBlock::new(4096 * 8 + 1).is_err());
        assert!(SuperBlock::new(5).is_ok());
    }

    #[test]
    fn validate_catches_overlap() {
        let mut superblock = SuperBlock::new(100).unwrap();
        superblock.data_block_start = 8;
        assert!(matches!(superblock.validate(100), Err(FsError::CorruptLayout(_))));

        let mut superblock = SuperBlock::new(100).unwrap();
        superblock.inode_bitmap_start = 1;
        assert!(matches!(superblock.validate(100), Err(FsError::CorruptLayout(_))));
    }

    #[test]
    fn validate_catches_bad_counters() {
        let mut superblock = SuperBlock::new(100).unwrap();
        superblock.free_inodes = 513;
        assert!(matches!(superblock.validate(100), Err(FsError::CorruptLayout(_))));

        let superblock = SuperBlock::new(100).unwrap();
        assert!(matches!(superblock.validate(50), Err(FsError::CorruptLayout(_))));
    }
}
