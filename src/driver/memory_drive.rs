use std::io;

use crate::driver::{check_sector, DeviceDriver};

/// A device held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(bytes: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![0; bytes as usize], sector_size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        check_sector(index, self.get_sector_count(), buffer.len(), self.sector_size)?;
        let start = index as usize * self.sector_size;
        buffer.copy_from_slice(&self.data[start..start + self.sector_size]);
        Ok(())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        check_sector(index, self.get_sector_count(), data.len(), self.sector_size)?;
        let start = index as usize * self.sector_size;
        self.data[start..start + self.sector_size].copy_from_slice(data);
        Ok(())
    }
}
