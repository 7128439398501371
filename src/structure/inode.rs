use std::time::SystemTime;

use crate::consts::{BlockPointer, DirectPointers, DIRECT_POINTERS, NULL_POINTER};
use crate::util::mode::{InodeType, ModeBits, ModeBitsHelper};
use crate::util::serializable::{read_u16, read_u32, ByteSerializable, KnownSize};

const DIRECT_OFFSET: usize = 20;
const INDIRECT_OFFSET: usize = DIRECT_OFFSET + DIRECT_POINTERS * 4;
const DOUBLE_INDIRECT_OFFSET: usize = INDIRECT_OFFSET + 4;
const RECORD_SIZE: usize = DOUBLE_INDIRECT_OFFSET + 4;

/// One on-disk inode record (76 bytes, no padding).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inode {
    pub mode: ModeBits,
    pub links_count: u16,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub direct: DirectPointers,
    pub indirect: BlockPointer,
    pub double_indirect: BlockPointer,
}

impl Inode {
    /// A zeroed record carrying `mode` and three identical fresh timestamps.
    pub fn new(mode: ModeBits) -> Inode {
        let now = timestamp();
        Inode { mode, atime: now, mtime: now, ctime: now, ..Inode::default() }
    }

    pub fn inode_type(&self) -> Option<InodeType> {
        self.mode.inode_type()
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    /// True when no block is reachable from this inode.
    pub fn has_no_blocks(&self) -> bool {
        self.direct.iter().all(|&pointer| pointer == NULL_POINTER)
            && self.indirect == NULL_POINTER
            && self.double_indirect == NULL_POINTER
    }
}

/// Seconds since the epoch, truncated to the 32-bit on-disk field.
pub(crate) fn timestamp() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RECORD_SIZE);
        bytes.extend_from_slice(&self.mode.to_le_bytes());
        bytes.extend_from_slice(&self.links_count.to_le_bytes());
        bytes.extend_from_slice(&self.size.to_le_bytes());
        bytes.extend_from_slice(&self.atime.to_le_bytes());
        bytes.extend_from_slice(&self.mtime.to_le_bytes());
        bytes.extend_from_slice(&self.ctime.to_le_bytes());
        for pointer in self.direct {
            bytes.extend_from_slice(&pointer.to_le_bytes());
        }
        bytes.extend_from_slice(&self.indirect.to_le_bytes());
        bytes.extend_from_slice(&self.double_indirect.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut direct = [NULL_POINTER; DIRECT_POINTERS];
        for (i, pointer) in direct.iter_mut().enumerate() {
            *pointer = read_u32(bytes, DIRECT_OFFSET + i * 4);
        }

        Inode {
            mode: read_u16(bytes, 0),
            links_count: read_u16(bytes, 2),
            size: read_u32(bytes, 4),
            atime: read_u32(bytes, 8),
            mtime: read_u32(bytes, 12),
            ctime: read_u32(bytes, 16),
            direct,
            indirect: read_u32(bytes, INDIRECT_OFFSET),
            double_indirect: read_u32(bytes, DOUBLE_INDIRECT_OFFSET),
        }
    }
}

impl KnownSize for Inode {
    #[inline]
    fn size_on_disk() -> usize {
        RECORD_SIZE
    }
}
