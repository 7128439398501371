use std::io;
use std::os::raw::c_int;

use thiserror::Error;

use crate::consts::{BlockPointer, InodePointer};
use crate::util::mode::ModeBits;

type ErrorNum = c_int;

/// What ran out when an allocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Blocks,
    Inodes,
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no free {0:?} left")]
    Exhausted(Resource),
    #[error("no entry named {0:?}")]
    NotFound(String),
    #[error("an entry named {0:?} already exists")]
    AlreadyExists(String),
    #[error("{what} {index} is out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        index: u64,
        limit: u64,
    },
    #[error("logical block {0} is beyond the addressable range")]
    FileTooLarge(u64),
    #[error("corrupt layout: {0}")]
    CorruptLayout(String),
    #[error("name {0:?} does not fit in a directory entry")]
    NameTooLong(String),
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
    #[error("inode {0} is not a directory")]
    NotADirectory(InodePointer),
    #[error("inode {0} is not a regular file")]
    NotAFile(InodePointer),
    #[error("mode {0:#06x} has the wrong file type")]
    InvalidMode(ModeBits),
    #[error("device IO failed")]
    IoFailure(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    pub(crate) fn inode_out_of_range(index: InodePointer, limit: u32) -> FsError {
        FsError::OutOfRange { what: "inode", index: index as u64, limit: limit as u64 }
    }

    pub(crate) fn block_out_of_range(index: BlockPointer, limit: u32) -> FsError {
        FsError::OutOfRange { what: "block", index: index as u64, limit: limit as u64 }
    }

    /// The errno a kernel-facing caller should report for this error.
    pub fn errno(&self) -> ErrorNum {
        match self {
            FsError::Exhausted(_) => libc::ENOSPC,
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::OutOfRange { .. } => libc::EINVAL,
            FsError::FileTooLarge(_) => libc::EFBIG,
            FsError::CorruptLayout(_) => libc::EUCLEAN,
            FsError::NameTooLong(_) => libc::ENAMETOOLONG,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::NotAFile(_) => libc::EISDIR,
            FsError::InvalidMode(_) => libc::EINVAL,
            FsError::IoFailure(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
