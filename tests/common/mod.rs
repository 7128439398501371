#![allow(dead_code)]

use std::io;

use blockfs::consts::BLOCK_SIZE;
use blockfs::{DeviceDriver, MemoryDrive, FS};

pub const SECTOR_SIZE: usize = 512;

pub fn memory_drive(blocks: u32) -> MemoryDrive {
    MemoryDrive::new(blocks as u64 * BLOCK_SIZE as u64, SECTOR_SIZE)
}

pub fn memory_fs(blocks: u32) -> FS<MemoryDrive> {
    FS::format(memory_drive(blocks), blocks).unwrap()
}

/// Passes writes through until its budget runs out, then fails every write.
pub struct CrashingDrive {
    pub inner: MemoryDrive,
    pub writes_left: Option<usize>,
}

impl CrashingDrive {
    pub fn new(inner: MemoryDrive) -> CrashingDrive {
        CrashingDrive { inner, writes_left: None }
    }
}

impl DeviceDriver for CrashingDrive {
    fn get_sector_count(&self) -> u64 {
        self.inner.get_sector_count()
    }

    fn get_sector_size(&self) -> usize {
        self.inner.get_sector_size()
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        self.inner.read_sector(index, buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        match self.writes_left {
            Some(0) => Err(io::Error::new(io::ErrorKind::Other, "simulated power loss")),
            Some(ref mut left) => {
                *left -= 1;
                self.inner.write_sector(index, data)
            }
            None => self.inner.write_sector(index, data),
        }
    }
}
