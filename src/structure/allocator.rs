use log::{debug, warn};

use crate::consts::{BlockPointer, InodePointer};
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Resource, Result};

impl<A: DeviceDriver> FS<A> {
    /// Claims the first free data block.
    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        let block = self
            .block_map
            .find_free(self.superblock.data_block_start)
            .ok_or(FsError::Exhausted(Resource::Blocks))?;

        self.block_map.mark_used(&mut self.io, block)?;
        let mut updated = self.superblock.clone();
        updated.free_blocks -= 1;
        self.commit_superblock(updated)?;
        debug!("allocated block {} ({} free)", block, self.superblock.free_blocks);
        Ok(block)
    }

    /// Claims the first free inode number.
    pub fn allocate_inode(&mut self) -> Result<InodePointer> {
        let inode = self.inode_map.find_free(0).ok_or(FsError::Exhausted(Resource::Inodes))?;

        self.inode_map.mark_used(&mut self.io, inode)?;
        let mut updated = self.superblock.clone();
        updated.free_inodes -= 1;
        self.commit_superblock(updated)?;
        debug!("allocated inode {} ({} free)", inode, self.superblock.free_inodes);
        Ok(inode)
    }

    pub fn release_block(&mut self, block: BlockPointer) -> Result<()> {
        if block < self.superblock.data_block_start || block >= self.superblock.total_blocks {
            return Err(FsError::block_out_of_range(block, self.superblock.total_blocks));
        }
        if self.block_map.is_free(block) {
            warn!("block {} released twice", block);
            return Ok(());
        }

        self.block_map.mark_free(&mut self.io, block)?;
        let mut updated = self.superblock.clone();
        updated.free_blocks += 1;
        self.commit_superblock(updated)?;
        debug!("released block {}", block);
        Ok(())
    }

    pub fn release_inode(&mut self, inode: InodePointer) -> Result<()> {
        if inode >= self.superblock.total_inodes {
            return Err(FsError::inode_out_of_range(inode, self.superblock.total_inodes));
        }
        if self.inode_map.is_free(inode) {
            warn!("inode {} released twice", inode);
            return Ok(());
        }

        self.inode_map.mark_free(&mut self.io, inode)?;
        let mut updated = self.superblock.clone();
        updated.free_inodes += 1;
        self.commit_superblock(updated)?;
        debug!("released inode {}", inode);
        Ok(())
    }

    /// Swaps in `updated` only once it reached the device.
    fn commit_superblock(&mut self, updated: SuperBlock) -> Result<()> {
        updated.write(&mut self.io)?;
        self.superblock = updated;
        Ok(())
    }

    pub fn is_block_used(&self, block: BlockPointer) -> bool {
        block < self.superblock.total_blocks && self.block_map.is_used(block)
    }

    pub fn is_inode_used(&self, inode: InodePointer) -> bool {
        inode < self.superblock.total_inodes && self.inode_map.is_used(inode)
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::memory_drive::MemoryDrive;
    use crate::fs::FS;
    use crate::structure::bitmap::Bitmap;
    use crate::util::error::{FsError, Resource};

    fn blank(total_blocks: u32) -> FS<MemoryDrive> {
        FS::initialize(MemoryDrive::new(total_blocks as u64 * 4096, 512), total_blocks).unwrap()
    }

    #[test]
    fn blocks_until_exhaustion() {
        let mut fs = blank(10);
        let data_start = fs.superblock.data_block_start;
        let total = fs.superblock.total_blocks;

        for expected in data_start..total {
            assert_eq!(fs.allocate_block().unwrap(), expected);
        }
        assert_eq!(fs.free_blocks(), 0);

        // the (total - data_start + 1)-th call
        assert!(matches!(fs.allocate_block(), Err(FsError::Exhausted(Resource::Blocks))));
        assert_eq!(fs.free_blocks(), 0);
    }

    #[test]
    fn inodes_until_exhaustion() {
        let mut fs = blank(10);
        for expected in 0..fs.superblock.total_inodes {
            assert_eq!(fs.allocate_inode().unwrap(), expected);
        }
        assert!(matches!(fs.allocate_inode(), Err(FsError::Exhausted(Resource::Inodes))));
        assert_eq!(fs.free_inodes(), 0);
    }

    #[test]
    fn release_reuses_lowest_slot() {
        let mut fs = blank(32);
        let first = fs.allocate_block().unwrap();
        let second = fs.allocate_block().unwrap();
        let free = fs.free_blocks();

        fs.release_block(first).unwrap();
        assert_eq!(fs.free_blocks(), free + 1);
        assert!(!fs.is_block_used(first));
        assert!(fs.is_block_used(second));
        assert_eq!(fs.allocate_block().unwrap(), first);
    }

    #[test]
    fn double_release_keeps_counters() {
        let mut fs = blank(32);
        let inode = fs.allocate_inode().unwrap();
        fs.release_inode(inode).unwrap();
        let free = fs.free_inodes();
        fs.release_inode(inode).unwrap();
        assert_eq!(fs.free_inodes(), free);
    }

    #[test]
    fn release_outside_data_region() {
        let mut fs = blank(32);
        assert!(matches!(fs.release_block(0), Err(FsError::OutOfRange { .. })));
        assert!(matches!(fs.release_block(32), Err(FsError::OutOfRange { .. })));
        assert!(matches!(fs.release_inode(10_000), Err(FsError::OutOfRange { .. })));
    }

    #[test]
    fn disk_mirrors_memory_after_every_call() {
        let mut fs = blank(32);
        let block = fs.allocate_block().unwrap();
        let inode = fs.allocate_inode().unwrap();
        fs.release_block(block).unwrap();

        let on_disk = Bitmap::read(&fs.io, fs.superblock.block_bitmap_start, 32).unwrap();
        assert_eq!(on_disk.count_free(), fs.block_map.count_free());
        assert_eq!(on_disk.count_free(), fs.free_blocks());
        let on_disk = Bitmap::read(&fs.io, fs.superblock.inode_bitmap_start, fs.superblock.total_inodes).unwrap();
        assert!(on_disk.is_used(inode));
        assert_eq!(on_disk.count_free(), fs.free_inodes());

        let superblock = crate::structure::superblock::SuperBlock::read(&fs.io).unwrap();
        assert_eq!(&superblock, fs.superblock());
    }
}
