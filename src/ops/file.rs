use log::debug;

use crate::consts::InodePointer;
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::inode::{timestamp, Inode};
use crate::util::error::{FsError, Result};
use crate::util::mode::{InodeType, ModeBits, ModeBitsHelper};

impl<A: DeviceDriver> FS<A> {
    /// Creates an empty regular file and links it into `parent` as `name`.
    pub fn create_file(&mut self, parent: InodePointer, name: &str, mode: ModeBits) -> Result<InodePointer> {
        if !mode.is_file() {
            return Err(FsError::InvalidMode(mode));
        }
        self.ensure_absent(parent, name)?;

        let file = self.create_inode(mode)?;
        self.dir_add(parent, name, file, InodeType::File)?;
        Ok(file)
    }

    fn read_regular(&self, file: InodePointer) -> Result<Inode> {
        let inode = self.read_inode(file)?;
        if !inode.mode.is_file() {
            return Err(FsError::NotAFile(file));
        }
        Ok(inode)
    }

    /// Writes `data` at byte `offset`, allocating blocks as needed, and
    /// returns the number of bytes written. Gaps before `offset` stay holes.
    pub fn write_file(&mut self, file: InodePointer, offset: u64, data: &[u8]) -> Result<usize> {
        let mut inode = self.read_regular(file)?;
        if data.is_empty() {
            return Ok(0);
        }

        let block_size = self.block_size() as u64;
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= u32::MAX as u64)
            .ok_or(FsError::FileTooLarge(offset / block_size))?;

        let mut written = 0;
        while written < data.len() {
            let position = offset + written as u64;
            let within = (position % block_size) as usize;
            let chunk = (block_size as usize - within).min(data.len() - written);

            let block = self.resolve_for_write(file, &mut inode, position / block_size)?;
            self.io.write_bytes(block, within, &data[written..written + chunk])?;
            written += chunk;
        }

        inode.size = inode.size.max(end as u32);
        inode.mtime = timestamp();
        self.write_inode(file, &inode)?;
        debug!("wrote {} bytes at {} into inode {}", written, offset, file);
        Ok(written)
    }

    /// Reads up to `len` bytes from byte `offset`. Holes read as zeroes and
    /// the result stops at the end of the file.
    pub fn read_file(&mut self, file: InodePointer, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut inode = self.read_regular(file)?;
        let size = inode.size as u64;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }

        let block_size = self.block_size() as u64;
        let end = size.min(offset.saturating_add(len as u64));
        let mut data = Vec::with_capacity((end - offset) as usize);
        while (offset + data.len() as u64) < end {
            let position = offset + data.len() as u64;
            let within = (position % block_size) as usize;
            let chunk = (block_size - within as u64).min(end - position) as usize;

            match self.lookup_block(&inode, position / block_size)? {
                Some(block) => data.extend(self.io.read_bytes(block, within, chunk)?),
                None => data.resize(data.len() + chunk, 0),
            }
        }

        inode.atime = timestamp();
        self.write_inode(file, &inode)?;
        Ok(data)
    }
}
