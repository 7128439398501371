//! Logical-to-physical block translation.
//!
//! A file's logical block `L` lives behind one of three pointer paths, with
//! `P = block_size / 4` pointers per indirect block:
//!
//! * `L < 12` maps to `direct[L]`
//! * `L < 12 + P` maps to slot `L - 12` of the single-indirect block
//! * `L < 12 + P + P²` maps to slot `(L - 12 - P) / P` of the double-indirect block
//!   selects an inner indirect block, slot `(L - 12 - P) % P` of that selects
//!   the data block
//!
//! Writers allocate missing blocks on the way down. Every new block is zeroed
//! and its pointer persisted into the owner before anything below it is
//! claimed, so a crash can strand a used block but never leave a pointer to a
//! free one.

use log::debug;

use crate::consts::{BlockPointer, InodePointer, DIRECT_POINTERS, NULL_POINTER};
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::inode::{timestamp, Inode};
use crate::util::error::{FsError, Result};
use crate::util::serializable::read_u32;

const POINTER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Direct(usize),
    Indirect(u32),
    DoubleIndirect { outer: u32, inner: u32 },
}

impl<A: DeviceDriver> FS<A> {
    pub fn pointers_per_block(&self) -> u32 {
        (self.block_size() / POINTER_SIZE) as u32
    }

    /// Number of logical blocks a single file can address.
    pub fn max_file_blocks(&self) -> u64 {
        let per_block = self.pointers_per_block() as u64;
        DIRECT_POINTERS as u64 + per_block + per_block * per_block
    }

    fn locate(&self, logical: u64) -> Result<Slot> {
        let per_block = self.pointers_per_block() as u64;
        let direct = DIRECT_POINTERS as u64;

        if logical < direct {
            Ok(Slot::Direct(logical as usize))
        } else if logical < direct + per_block {
            Ok(Slot::Indirect((logical - direct) as u32))
        } else if logical < self.max_file_blocks() {
            let rest = logical - direct - per_block;
            Ok(Slot::DoubleIndirect {
                outer: (rest / per_block) as u32,
                inner: (rest % per_block) as u32,
            })
        } else {
            Err(FsError::FileTooLarge(logical))
        }
    }

    /// Physical block behind `logical`, or `None` for a hole. Never allocates.
    pub fn lookup_block(&self, inode: &Inode, logical: u64) -> Result<Option<BlockPointer>> {
        let block = match self.locate(logical)? {
            Slot::Direct(i) => inode.direct[i],
            Slot::Indirect(slot) => self.follow(inode.indirect, slot)?,
            Slot::DoubleIndirect { outer, inner } => {
                let table = self.follow(inode.double_indirect, outer)?;
                self.follow(table, inner)?
            }
        };
        Ok(self.check_pointer(block)?.then_some(block))
    }

    /// Contents of logical block `logical`; holes read as zeroes.
    pub fn read_file_block(&self, inode: &Inode, logical: u64) -> Result<Vec<u8>> {
        match self.lookup_block(inode, logical)? {
            Some(block) => self.io.read_block(block),
            None => Ok(vec![0; self.block_size()]),
        }
    }

    /// Physical block behind `logical`, allocating whatever is missing.
    ///
    /// `inode` is the in-memory copy of record `number`; it is updated and
    /// persisted whenever one of its own pointers changes.
    pub fn resolve_for_write(&mut self, number: InodePointer, inode: &mut Inode, logical: u64) -> Result<BlockPointer> {
        match self.locate(logical)? {
            Slot::Direct(i) => {
                if self.check_pointer(inode.direct[i])? {
                    return Ok(inode.direct[i]);
                }
                let block = self.allocate_zeroed_block()?;
                inode.direct[i] = block;
                self.write_inode(number, inode)?;
                Ok(block)
            }
            Slot::Indirect(slot) => {
                let table = self.ensure_inode_table(number, inode, |inode| &mut inode.indirect)?;
                self.ensure_slot(table, slot)
            }
            Slot::DoubleIndirect { outer, inner } => {
                let outer_table = self.ensure_inode_table(number, inode, |inode| &mut inode.double_indirect)?;
                let inner_table = self.ensure_slot(outer_table, outer)?;
                self.ensure_slot(inner_table, inner)
            }
        }
    }

    /// Releases every data and indirect block reachable from inode `number`
    /// and resets its size to zero.
    ///
    /// The cleared record is persisted before any block is released.
    pub fn release_file_blocks(&mut self, number: InodePointer) -> Result<()> {
        let mut inode = self.read_inode(number)?;
        let blocks = self.reachable_blocks(&inode)?;

        inode.direct = [NULL_POINTER; DIRECT_POINTERS];
        inode.indirect = NULL_POINTER;
        inode.double_indirect = NULL_POINTER;
        inode.size = 0;
        inode.mtime = timestamp();
        self.write_inode(number, &inode)?;

        debug!("releasing {} blocks of inode {}", blocks.len(), number);
        for block in blocks {
            self.release_block(block)?;
        }
        Ok(())
    }

    /// Device blocks held by `inode`, data and indirect blocks alike.
    pub fn allocated_blocks(&self, inode: &Inode) -> Result<u64> {
        Ok(self.reachable_blocks(inode)?.len() as u64)
    }

    fn reachable_blocks(&self, inode: &Inode) -> Result<Vec<BlockPointer>> {
        let mut blocks = Vec::new();
        for &pointer in inode.direct.iter() {
            if self.check_pointer(pointer)? {
                blocks.push(pointer);
            }
        }
        if self.check_pointer(inode.indirect)? {
            self.collect_table(inode.indirect, 1, &mut blocks)?;
        }
        if self.check_pointer(inode.double_indirect)? {
            self.collect_table(inode.double_indirect, 2, &mut blocks)?;
        }
        Ok(blocks)
    }

    /// Pushes every block below `table` (children first) and then `table` itself.
    fn collect_table(&self, table: BlockPointer, depth: u32, blocks: &mut Vec<BlockPointer>) -> Result<()> {
        let bytes = self.io.read_block(table)?;
        for chunk in bytes.chunks_exact(POINTER_SIZE) {
            let pointer = read_u32(chunk, 0);
            if !self.check_pointer(pointer)? {
                continue;
            }
            if depth > 1 {
                self.collect_table(pointer, depth - 1, blocks)?;
            } else {
                blocks.push(pointer);
            }
        }
        blocks.push(table);
        Ok(())
    }

    fn follow(&self, table: BlockPointer, slot: u32) -> Result<BlockPointer> {
        if !self.check_pointer(table)? {
            return Ok(NULL_POINTER);
        }
        self.read_pointer(table, slot)
    }

    fn read_pointer(&self, table: BlockPointer, slot: u32) -> Result<BlockPointer> {
        let bytes = self.io.read_bytes(table, slot as usize * POINTER_SIZE, POINTER_SIZE)?;
        Ok(read_u32(&bytes, 0))
    }

    fn write_pointer(&mut self, table: BlockPointer, slot: u32, pointer: BlockPointer) -> Result<()> {
        self.io.write_bytes(table, slot as usize * POINTER_SIZE, &pointer.to_le_bytes())
    }

    /// `false` for the null pointer, an error for anything outside the data region.
    fn check_pointer(&self, pointer: BlockPointer) -> Result<bool> {
        if pointer == NULL_POINTER {
            return Ok(false);
        }
        if pointer < self.superblock.data_block_start || pointer >= self.superblock.total_blocks {
            return Err(FsError::CorruptLayout(format!("block pointer {} outside the data region", pointer)));
        }
        Ok(true)
    }

    fn allocate_zeroed_block(&mut self) -> Result<BlockPointer> {
        let block = self.allocate_block()?;
        self.io.zero_block(block)?;
        Ok(block)
    }

    fn ensure_inode_table<F>(&mut self, number: InodePointer, inode: &mut Inode, field: F) -> Result<BlockPointer>
    where
        F: Fn(&mut Inode) -> &mut BlockPointer,
    {
        let current = *field(&mut *inode);
        if self.check_pointer(current)? {
            return Ok(current);
        }
        let table = self.allocate_zeroed_block()?;
        *field(&mut *inode) = table;
        self.write_inode(number, inode)?;
        debug!("inode {} gained indirect block {}", number, table);
        Ok(table)
    }

    fn ensure_slot(&mut self, table: BlockPointer, slot: u32) -> Result<BlockPointer> {
        let current = self.read_pointer(table, slot)?;
        if self.check_pointer(current)? {
            return Ok(current);
        }
        let block = self.allocate_zeroed_block()?;
        self.write_pointer(table, slot, block)?;
        Ok(block)
    }
}
