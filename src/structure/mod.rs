//! On-disk structures and the session operations that maintain them.

pub mod address;
pub mod allocator;
pub mod bitmap;
pub mod inode;
pub mod inode_table;
pub mod superblock;
