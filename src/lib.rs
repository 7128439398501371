//! A Unix-style filesystem stored in a single block device image.
//!
//! The image is split into 4 KiB blocks: a superblock, one bitmap block each
//! for data blocks and inodes, the inode table, and the data region. A mounted
//! session is an [`FS`]; every mutating call on it is written through to the
//! device before it returns.

pub mod consts;
pub mod driver;
pub mod fs;
pub mod fuse;
pub mod io;
pub mod ops;
pub mod structure;
pub mod util;

pub use driver::file_drive::FileDrive;
pub use driver::memory_drive::MemoryDrive;
pub use driver::DeviceDriver;
pub use fs::FS;
pub use ops::directory::{DirEntry, DirIter};
pub use structure::inode::Inode;
pub use structure::superblock::SuperBlock;
pub use util::error::{FsError, Resource, Result};
pub use util::mode;
