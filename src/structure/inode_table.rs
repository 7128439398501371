use log::debug;

use crate::consts::{BlockPointer, InodePointer};
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::mode::{ModeBits, TYPE_MASK};
use crate::util::serializable::{ByteSerializable, KnownSize};

impl<A: DeviceDriver> FS<A> {
    /// Allocates an inode, stamps `mode` and the current time into a zeroed
    /// record and persists it.
    pub fn create_inode(&mut self, mode: ModeBits) -> Result<InodePointer> {
        let index = self.allocate_inode()?;
        let inode = Inode::new(mode);
        self.store_inode(index, &inode)?;
        debug!("created inode {} with mode {:#06x}", index, mode);
        Ok(index)
    }

    pub fn read_inode(&self, index: InodePointer) -> Result<Inode> {
        let (block, offset) = self.inode_location(index)?;
        let bytes = self.io.read_bytes(block, offset, Inode::size_on_disk())?;
        Ok(Inode::from_bytes(&bytes))
    }

    /// Persists `inode` as record `index`. Once a record carries a file type,
    /// writes that would change it fail with `InvalidMode`.
    pub fn write_inode(&mut self, index: InodePointer, inode: &Inode) -> Result<()> {
        let stored = self.read_inode(index)?.mode & TYPE_MASK;
        if stored != 0 && stored != inode.mode & TYPE_MASK {
            return Err(FsError::InvalidMode(inode.mode));
        }
        self.store_inode(index, inode)
    }

    fn store_inode(&mut self, index: InodePointer, inode: &Inode) -> Result<()> {
        let (block, offset) = self.inode_location(index)?;
        self.io.write_bytes(block, offset, &inode.to_bytes())
    }

    /// Releases every block reachable from the inode, clears its record and
    /// returns the number to the free pool.
    pub fn free_inode(&mut self, index: InodePointer) -> Result<()> {
        self.release_file_blocks(index)?;
        self.store_inode(index, &Inode::default())?;
        self.release_inode(index)
    }

    #[inline]
    fn inode_location(&self, index: InodePointer) -> Result<(BlockPointer, usize)> {
        if index >= self.superblock.total_inodes {
            return Err(FsError::inode_out_of_range(index, self.superblock.total_inodes));
        }
        let per_block = self.superblock.inodes_per_block();
        let block = index / per_block + self.superblock.inode_table_start;
        let offset = (index % per_block) as usize * Inode::size_on_disk();
        Ok((block, offset))
    }
}
