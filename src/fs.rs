use log::{info, warn};

use crate::consts::{InodePointer, BLOCK_SIZE, SUPERBLOCK_INDEX};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::bitmap::Bitmap;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Result};
use crate::util::mode::{InodeType, DEFAULT_DIR_MODE};

/// A mounted filesystem session.
///
/// Owns the device together with the cached superblock and both bitmaps.
/// Every mutating call writes through before it returns.
pub struct FS<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) superblock: SuperBlock,
    pub(crate) block_map: Bitmap,
    pub(crate) inode_map: Bitmap,
}

impl<A: DeviceDriver> FS<A> {
    /// Formats the first `total_blocks` blocks of `device` and mounts the result.
    ///
    /// The root directory gets inode 0 with "." and ".." both pointing at itself.
    pub fn format(device: A, total_blocks: u32) -> Result<FS<A>> {
        let mut fs = FS::initialize(device, total_blocks)?;

        let root = fs.create_dir(DEFAULT_DIR_MODE)?;
        if root != fs.superblock.root_inode {
            return Err(FsError::CorruptLayout(format!(
                "root directory landed on inode {} instead of {}",
                root, fs.superblock.root_inode
            )));
        }
        fs.dir_add(root, "..", root, InodeType::Directory)?;

        info!(
            "formatted {} blocks: {} inodes, data starts at block {}",
            total_blocks, fs.superblock.total_inodes, fs.superblock.data_block_start
        );

        let device = fs.unmount()?;
        FS::mount(device)
    }

    /// Writes an empty layout: superblock, bitmaps with the metadata blocks
    /// marked used, and a zeroed inode table. No inode is allocated yet.
    pub(crate) fn initialize(device: A, total_blocks: u32) -> Result<FS<A>> {
        let mut io = IO::new(device, BLOCK_SIZE)?;
        if total_blocks as u64 > io.block_count() {
            return Err(FsError::block_out_of_range(total_blocks, io.block_count() as u32));
        }

        let superblock = SuperBlock::new(total_blocks)?;
        for block in SUPERBLOCK_INDEX..superblock.data_block_start {
            io.zero_block(block)?;
        }
        superblock.write(&mut io)?;

        let mut block_map = Bitmap::new(superblock.block_bitmap_start, superblock.total_blocks, BLOCK_SIZE);
        for block in SUPERBLOCK_INDEX..superblock.data_block_start {
            block_map.mark_used_mem(block);
        }
        block_map.write_full(&mut io)?;

        let inode_map = Bitmap::new(superblock.inode_bitmap_start, superblock.total_inodes, BLOCK_SIZE);
        inode_map.write_full(&mut io)?;

        Ok(FS { io, superblock, block_map, inode_map })
    }

    /// Loads and validates an existing filesystem.
    pub fn mount(device: A) -> Result<FS<A>> {
        let io = IO::new(device, BLOCK_SIZE)?;
        let superblock = SuperBlock::read(&io)?;
        superblock.validate(io.block_count())?;

        let block_map = Bitmap::read(&io, superblock.block_bitmap_start, superblock.total_blocks)?;
        let inode_map = Bitmap::read(&io, superblock.inode_bitmap_start, superblock.total_inodes)?;

        if block_map.count_free() != superblock.free_blocks {
            warn!("block bitmap has {} free blocks, superblock says {}", block_map.count_free(), superblock.free_blocks);
            return Err(FsError::CorruptLayout("free block count disagrees with the block bitmap".to_string()));
        }
        if inode_map.count_free() != superblock.free_inodes {
            warn!("inode bitmap has {} free inodes, superblock says {}", inode_map.count_free(), superblock.free_inodes);
            return Err(FsError::CorruptLayout("free inode count disagrees with the inode bitmap".to_string()));
        }
        if let Some(block) = (SUPERBLOCK_INDEX..superblock.data_block_start).find(|&b| block_map.is_free(b)) {
            return Err(FsError::CorruptLayout(format!("metadata block {} is marked free", block)));
        }
        if inode_map.is_free(superblock.root_inode) {
            return Err(FsError::CorruptLayout("root inode is not allocated".to_string()));
        }

        info!(
            "mounted: {}/{} blocks free, {}/{} inodes free",
            superblock.free_blocks, superblock.total_blocks, superblock.free_inodes, superblock.total_inodes
        );
        Ok(FS { io, superblock, block_map, inode_map })
    }

    /// Pushes every completed write down to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.io.flush()
    }

    /// Flushes the device and hands it back.
    pub fn unmount(mut self) -> Result<A> {
        self.io.flush()?;
        info!("unmounted");
        Ok(self.io.into_device())
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn block_size(&self) -> usize {
        self.io.block_size()
    }

    pub fn root_inode(&self) -> InodePointer {
        self.superblock.root_inode
    }

    pub fn free_blocks(&self) -> u32 {
        self.superblock.free_blocks
    }

    pub fn free_inodes(&self) -> u32 {
        self.superblock.free_inodes
    }

    pub fn device(&self) -> &A {
        self.io.device()
    }

    pub fn device_mut(&mut self) -> &mut A {
        self.io.device_mut()
    }
}
