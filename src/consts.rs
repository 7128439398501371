pub const BLOCK_SIZE: usize = 4096;
pub const MAX_INODES: u32 = 512;
pub const DIRECT_POINTERS: usize = 12;
pub const NAME_LENGTH: usize = 32;

pub const SUPERBLOCK_INDEX: BlockPointer = 0;
pub const BLOCK_BITMAP_INDEX: BlockPointer = 1;
pub const INODE_BITMAP_INDEX: BlockPointer = 2;
pub const INODE_TABLE_INDEX: BlockPointer = 3;
pub const ROOT_INODE: InodePointer = 0;

/// A block number on the device. Zero doubles as the null pointer inside
/// inodes and indirect blocks, since block 0 always holds the superblock.
pub type BlockPointer = u32;
pub type InodePointer = u32;
pub type DirectPointers = [BlockPointer; DIRECT_POINTERS];

pub const NULL_POINTER: BlockPointer = 0;
