//! Directories are files whose data blocks each start with a 4-byte count of
//! populated entries, followed by that many packed 40-byte entries.
//!
//! The header count is the only occupancy marker. Entries are appended at
//! the header offset and the `used` byte is written but never consulted.

use log::debug;

use crate::consts::{BlockPointer, InodePointer, NAME_LENGTH};
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::inode::{timestamp, Inode};
use crate::util::error::{FsError, Result};
use crate::util::mode::{InodeType, ModeBits, ModeBitsHelper};
use crate::util::serializable::{read_u32, ByteSerializable, KnownSize};

pub const DIR_HEADER_SIZE: usize = 4;

const TYPE_OFFSET: usize = 4;
const USED_OFFSET: usize = 5;
const NAME_OFFSET: usize = 8;
const ENTRY_SIZE: usize = NAME_OFFSET + NAME_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_num: InodePointer,
    /// Raw type byte; see [`InodeType::to_entry_byte`].
    pub kind: u8,
    pub used: bool,
    pub name: String,
}

impl DirEntry {
    pub fn new(name: &str, inode_num: InodePointer, kind: InodeType) -> DirEntry {
        DirEntry { inode_num, kind: kind.to_entry_byte(), used: true, name: name.to_string() }
    }

    pub fn inode_type(&self) -> Option<InodeType> {
        InodeType::from_entry_byte(self.kind)
    }
}

impl ByteSerializable for DirEntry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENTRY_SIZE);
        bytes.extend_from_slice(&self.inode_num.to_le_bytes());
        bytes.push(self.kind);
        bytes.push(self.used as u8);
        bytes.extend_from_slice(&[0, 0]);

        let mut name = [0u8; NAME_LENGTH];
        let mut len = self.name.len().min(NAME_LENGTH - 1);
        while !self.name.is_char_boundary(len) {
            len -= 1;
        }
        name[..len].copy_from_slice(&self.name.as_bytes()[..len]);
        bytes.extend_from_slice(&name);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let raw_name = &bytes[NAME_OFFSET..ENTRY_SIZE];
        let len = raw_name.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
        DirEntry {
            inode_num: read_u32(bytes, 0),
            kind: bytes[TYPE_OFFSET],
            used: bytes[USED_OFFSET] != 0,
            name: String::from_utf8_lossy(&raw_name[..len]).into_owned(),
        }
    }
}

impl KnownSize for DirEntry {
    fn size_on_disk() -> usize {
        ENTRY_SIZE
    }
}

/// The NUL-padded on-disk form of `name`. At least one NUL always remains.
fn encode_name(name: &str) -> Result<[u8; NAME_LENGTH]> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    if name.len() > NAME_LENGTH - 1 {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    let mut encoded = [0u8; NAME_LENGTH];
    encoded[..name.len()].copy_from_slice(name.as_bytes());
    Ok(encoded)
}

impl<A: DeviceDriver> FS<A> {
    pub fn entries_per_block(&self) -> u32 {
        ((self.block_size() - DIR_HEADER_SIZE) / ENTRY_SIZE) as u32
    }

    /// The populated-entry count stored in a directory block's header.
    pub fn dir_block_entries(&self, block: BlockPointer) -> Result<u32> {
        let bytes = self.io.read_bytes(block, 0, DIR_HEADER_SIZE)?;
        let count = read_u32(&bytes, 0);
        if count > self.entries_per_block() {
            return Err(FsError::CorruptLayout(format!(
                "directory block {} claims {} entries",
                block, count
            )));
        }
        Ok(count)
    }

    pub fn dir_block_full(&self, block: BlockPointer) -> Result<bool> {
        Ok(self.dir_block_entries(block)? >= self.entries_per_block())
    }

    pub fn dir_block_empty(&self, block: BlockPointer) -> Result<bool> {
        Ok(self.dir_block_entries(block)? == 0)
    }

    fn write_dir_block_entries(&mut self, block: BlockPointer, count: u32) -> Result<()> {
        self.io.write_bytes(block, 0, &count.to_le_bytes())
    }

    fn read_directory(&self, dir: InodePointer) -> Result<Inode> {
        let inode = self.read_inode(dir)?;
        if !inode.is_directory() {
            return Err(FsError::NotADirectory(dir));
        }
        Ok(inode)
    }

    /// Directory blocks are contiguous from logical block 0; the first hole ends them.
    fn next_dir_block(&self, inode: &Inode, logical: u64) -> Result<Option<BlockPointer>> {
        if logical >= self.max_file_blocks() {
            return Ok(None);
        }
        self.lookup_block(inode, logical)
    }

    /// Inode number bound to `name` in directory `dir`. Never allocates.
    pub fn dir_lookup(&self, dir: InodePointer, name: &str) -> Result<InodePointer> {
        let encoded = encode_name(name)?;
        let inode = self.read_directory(dir)?;

        let mut logical = 0;
        while let Some(block) = self.next_dir_block(&inode, logical)? {
            let count = self.dir_block_entries(block)? as usize;
            let bytes = self.io.read_bytes(block, DIR_HEADER_SIZE, count * ENTRY_SIZE)?;
            for raw in bytes.chunks_exact(ENTRY_SIZE) {
                if raw[NAME_OFFSET..] == encoded[..] {
                    return Ok(read_u32(raw, 0));
                }
            }
            logical += 1;
        }
        Err(FsError::NotFound(name.to_string()))
    }

    pub(crate) fn ensure_absent(&self, dir: InodePointer, name: &str) -> Result<()> {
        match self.dir_lookup(dir, name) {
            Ok(_) => Err(FsError::AlreadyExists(name.to_string())),
            Err(FsError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Appends the entry `name -> child` to directory `dir`.
    ///
    /// The entry goes into the first block with room, or into a newly
    /// allocated block past the current end. The block header is bumped
    /// before the entry itself is written; the two writes are not atomic.
    /// Afterwards the directory's size and link count grow by one entry; a
    /// regular-file child also gains a link.
    pub fn dir_add(&mut self, dir: InodePointer, name: &str, child: InodePointer, kind: InodeType) -> Result<()> {
        self.ensure_absent(dir, name)?;
        if !self.is_inode_used(child) {
            if child >= self.superblock.total_inodes {
                return Err(FsError::inode_out_of_range(child, self.superblock.total_inodes));
            }
            return Err(FsError::NotFound(format!("inode {}", child)));
        }

        let mut inode = self.read_directory(dir)?;
        let capacity = self.entries_per_block();
        let mut logical = 0;
        let (block, count) = loop {
            match self.next_dir_block(&inode, logical)? {
                Some(block) => {
                    let count = self.dir_block_entries(block)?;
                    if count < capacity {
                        break (block, count);
                    }
                    logical += 1;
                }
                None => {
                    let block = self.resolve_for_write(dir, &mut inode, logical)?;
                    self.write_dir_block_entries(block, 0)?;
                    debug!("directory {} grew to {} blocks", dir, logical + 1);
                    break (block, 0);
                }
            }
        };

        self.write_dir_block_entries(block, count + 1)?;
        let entry = DirEntry::new(name, child, kind);
        let offset = DIR_HEADER_SIZE + count as usize * ENTRY_SIZE;
        self.io.write_bytes(block, offset, &entry.to_bytes())?;

        let now = timestamp();
        inode.size += ENTRY_SIZE as u32;
        inode.mtime = now;
        inode.links_count = inode.links_count.saturating_add(1);
        self.write_inode(dir, &inode)?;

        // a directory's count is driven by its own entries
        if child != dir {
            let mut target = self.read_inode(child)?;
            if !target.is_directory() {
                target.links_count = target.links_count.saturating_add(1);
                target.ctime = now;
                self.write_inode(child, &target)?;
            }
        }

        debug!("linked {:?} -> inode {} in directory {}", name, child, dir);
        Ok(())
    }

    /// Lazily streams the entries of `dir` in on-disk order.
    pub fn dir_list(&self, dir: InodePointer) -> Result<DirIter<'_, A>> {
        let inode = self.read_directory(dir)?;
        Ok(DirIter { fs: self, inode, logical: 0, block: 0, count: 0, index: 0, finished: false })
    }

    /// Allocates a directory inode that already contains its "." entry.
    ///
    /// The caller still has to link ".." and the name in the parent; see [`FS::mkdir`].
    pub fn create_dir(&mut self, mode: ModeBits) -> Result<InodePointer> {
        if !mode.is_directory() {
            return Err(FsError::InvalidMode(mode));
        }
        let dir = self.create_inode(mode)?;
        self.dir_add(dir, ".", dir, InodeType::Directory)?;
        Ok(dir)
    }

    /// Creates directory `name` inside `parent`: ".", then "..", then the
    /// parent's entry, so the new directory is complete before it is reachable.
    pub fn mkdir(&mut self, parent: InodePointer, name: &str, mode: ModeBits) -> Result<InodePointer> {
        encode_name(name)?;
        self.ensure_absent(parent, name)?;

        let dir = self.create_dir(mode)?;
        self.dir_add(dir, "..", parent, InodeType::Directory)?;
        self.dir_add(parent, name, dir, InodeType::Directory)?;
        Ok(dir)
    }
}

/// Entries of one directory, read one at a time.
pub struct DirIter<'a, A: DeviceDriver> {
    fs: &'a FS<A>,
    inode: Inode,
    logical: u64,
    block: BlockPointer,
    count: u32,
    index: u32,
    finished: bool,
}

impl<'a, A: DeviceDriver> DirIter<'a, A> {
    /// Starts over from the first entry.
    pub fn rewind(&mut self) {
        self.logical = 0;
        self.count = 0;
        self.index = 0;
        self.finished = false;
    }

    fn advance(&mut self) -> Result<Option<DirEntry>> {
        while self.index >= self.count {
            let Some(block) = self.fs.next_dir_block(&self.inode, self.logical)? else {
                return Ok(None);
            };
            self.logical += 1;
            self.block = block;
            self.count = self.fs.dir_block_entries(block)?;
            self.index = 0;
        }

        let offset = DIR_HEADER_SIZE + self.index as usize * ENTRY_SIZE;
        let bytes = self.fs.io.read_bytes(self.block, offset, ENTRY_SIZE)?;
        self.index += 1;
        Ok(Some(DirEntry::from_bytes(&bytes)))
    }
}

impl<'a, A: DeviceDriver> Iterator for DirIter<'a, A> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;
    use crate::util::mode::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};

    fn formatted(total_blocks: u32) -> FS<MemoryDrive> {
        FS::format(MemoryDrive::new(total_blocks as u64 * 4096, 512), total_blocks).unwrap()
    }

    fn names<A: DeviceDriver>(fs: &FS<A>, dir: InodePointer) -> Vec<String> {
        fs.dir_list(dir).unwrap().map(|entry| entry.unwrap().name).collect()
    }

    #[test]
    fn test_entry_to_bytes() {
        let entry = DirEntry::new("file1", 5, InodeType::File);
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DirEntry::size_on_disk());
        assert_eq!(&bytes[..8], &[5, 0, 0, 0, 1, 1, 0, 0]);
        assert_eq!(&bytes[8..13], b"file1");
        assert!(bytes[13..].iter().all(|&b| b == 0));
        assert_eq!(DirEntry::from_bytes(&bytes), entry);
    }

    #[test]
    fn long_names_are_cut_on_char_boundaries() {
        // 15 two-byte characters followed by a third: byte 31 falls inside it
        let name = format!("{}é", "é".repeat(15));
        let bytes = DirEntry::new(&name, 1, InodeType::File).to_bytes();
        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(DirEntry::from_bytes(&bytes).name, "é".repeat(15));
        assert_eq!(bytes[ENTRY_SIZE - 2], 0);
    }

    #[test]
    fn name_validation() {
        assert!(encode_name("a.txt").is_ok());
        assert!(encode_name(&"x".repeat(31)).is_ok());
        assert!(matches!(encode_name(&"x".repeat(32)), Err(FsError::NameTooLong(_))));
        assert!(matches!(encode_name(""), Err(FsError::InvalidName(_))));
        assert!(matches!(encode_name("a/b"), Err(FsError::InvalidName(_))));
    }

    #[test]
    fn root_has_dot_entries() {
        let mut fs = formatted(16);
        assert_eq!(names(&fs, 0), vec![".", ".."]);
        assert_eq!(fs.dir_lookup(0, ".").unwrap(), 0);
        assert_eq!(fs.dir_lookup(0, "..").unwrap(), 0);

        let root = fs.read_inode(0).unwrap();
        assert_eq!(root.size, 2 * ENTRY_SIZE as u32);
        assert_eq!(root.links_count, 2);
        assert_eq!(fs.dir_block_entries(root.direct[0]).unwrap(), 2);
        assert!(!fs.dir_block_empty(root.direct[0]).unwrap());
        assert!(!fs.dir_block_full(root.direct[0]).unwrap());

        let spare = fs.allocate_block().unwrap();
        assert!(fs.dir_block_empty(spare).unwrap());
    }

    #[test]
    fn add_then_lookup() {
        let mut fs = formatted(16);
        let a = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        let b = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        fs.dir_add(0, "bin", a, InodeType::File).unwrap();
        fs.dir_add(0, "etc", b, InodeType::File).unwrap();

        assert_eq!(fs.dir_lookup(0, "bin").unwrap(), a);
        assert_eq!(fs.dir_lookup(0, "etc").unwrap(), b);
        assert!(matches!(fs.dir_lookup(0, "usr"), Err(FsError::NotFound(_))));
        assert_eq!(fs.read_inode(a).unwrap().links_count, 1);
        assert_eq!(fs.read_inode(0).unwrap().size, 4 * ENTRY_SIZE as u32);
    }

    #[test]
    fn duplicate_name_changes_nothing() {
        let mut fs = formatted(16);
        let a = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        let b = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        fs.dir_add(0, "etc", a, InodeType::File).unwrap();

        let before = fs.read_inode(0).unwrap();
        let header = fs.dir_block_entries(before.direct[0]).unwrap();
        let free = fs.free_blocks();

        assert!(matches!(fs.dir_add(0, "etc", b, InodeType::File), Err(FsError::AlreadyExists(_))));
        assert_eq!(fs.read_inode(0).unwrap(), before);
        assert_eq!(fs.dir_block_entries(before.direct[0]).unwrap(), header);
        assert_eq!(fs.free_blocks(), free);
        assert_eq!(fs.read_inode(b).unwrap().links_count, 0);
    }

    #[test]
    fn full_block_spills_into_next() {
        let mut fs = formatted(16);
        let file = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        let capacity = fs.entries_per_block();
        assert_eq!(capacity, 102);

        // "." and ".." already occupy two slots
        for i in 0..capacity - 2 {
            fs.dir_add(0, &format!("f{}", i), file, InodeType::File).unwrap();
        }
        let root = fs.read_inode(0).unwrap();
        assert!(fs.dir_block_full(root.direct[0]).unwrap());
        assert_eq!(root.direct[1], 0);

        fs.dir_add(0, "spill", file, InodeType::File).unwrap();
        let root = fs.read_inode(0).unwrap();
        assert_ne!(root.direct[1], 0);
        assert!(!fs.dir_block_empty(root.direct[1]).unwrap());
        assert_eq!(fs.dir_block_entries(root.direct[1]).unwrap(), 1);
        assert_eq!(fs.dir_lookup(0, "spill").unwrap(), file);
        assert_eq!(fs.dir_lookup(0, "f0").unwrap(), file);

        let listed = names(&fs, 0);
        assert_eq!(listed.len(), capacity as usize + 1);
        assert_eq!(listed.last().unwrap(), "spill");
        assert_eq!(root.size, (capacity + 1) * ENTRY_SIZE as u32);
    }

    #[test]
    fn mkdir_links_both_ways() {
        let mut fs = formatted(16);
        let sub = fs.mkdir(0, "sub", DEFAULT_DIR_MODE).unwrap();

        assert_eq!(fs.dir_lookup(0, "sub").unwrap(), sub);
        assert_eq!(fs.dir_lookup(sub, ".").unwrap(), sub);
        assert_eq!(fs.dir_lookup(sub, "..").unwrap(), 0);
        assert_eq!(names(&fs, sub), vec![".", ".."]);
        assert_eq!(fs.read_inode(sub).unwrap().links_count, 2);
        assert_eq!(fs.read_inode(0).unwrap().links_count, 3);

        let listed: Vec<DirEntry> = fs.dir_list(0).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(listed[2].inode_type(), Some(InodeType::Directory));
        assert!(matches!(fs.mkdir(0, "sub", DEFAULT_DIR_MODE), Err(FsError::AlreadyExists(_))));
    }

    #[test]
    fn listing_restarts() {
        let mut fs = formatted(16);
        fs.mkdir(0, "one", DEFAULT_DIR_MODE).unwrap();
        let mut iter = fs.dir_list(0).unwrap();
        let first: Vec<String> = iter.by_ref().map(|e| e.unwrap().name).collect();
        assert!(iter.next().is_none());
        iter.rewind();
        let second: Vec<String> = iter.map(|e| e.unwrap().name).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![".", "..", "one"]);
    }

    #[test]
    fn rejects_non_directories() {
        let mut fs = formatted(16);
        let file = fs.create_inode(DEFAULT_FILE_MODE).unwrap();
        assert!(matches!(fs.dir_lookup(file, "x"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.dir_list(file), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.dir_add(file, "x", 0, InodeType::Directory), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.create_dir(DEFAULT_FILE_MODE), Err(FsError::InvalidMode(_))));
    }

    #[test]
    fn rejects_unallocated_child() {
        let mut fs = formatted(16);
        assert!(matches!(fs.dir_add(0, "ghost", 7, InodeType::File), Err(FsError::NotFound(_))));
        assert!(matches!(fs.dir_add(0, "ghost", 100_000, InodeType::File), Err(FsError::OutOfRange { .. })));
    }
}
