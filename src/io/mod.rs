use std::ops::Range;

use log::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::util::error::{FsError, Result};
use raw::{raw_read_sectors, raw_write_sectors};

mod raw;

/// Block-addressed access to a sector device.
///
/// Besides whole blocks, `IO` can read and write a byte range inside one
/// block. Ranges are widened to the covering sectors, so updating a single
/// bitmap byte or directory entry touches one sector rather than the block.
pub struct IO<A: DeviceDriver> {
    device: A,
    block_size: usize,
    block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A, block_size: usize) -> Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || block_size < sector_size || block_size % sector_size != 0 {
            return Err(FsError::CorruptLayout(format!(
                "block size {} is not a multiple of sector size {}",
                block_size, sector_size
            )));
        }
        let block_count = device.get_size() / block_size as u64;
        Ok(IO { device, block_size, block_count })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn into_device(self) -> A {
        self.device
    }

    pub fn device(&self) -> &A {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut A {
        &mut self.device
    }

    pub fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        self.read_bytes(index, 0, self.block_size)
    }

    pub fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        if block.len() != self.block_size {
            return Err(FsError::OutOfRange {
                what: "block length",
                index: block.len() as u64,
                limit: self.block_size as u64,
            });
        }
        self.write_bytes(index, 0, block)
    }

    pub fn zero_block(&mut self, index: BlockPointer) -> Result<()> {
        let zeroes = vec![0u8; self.block_size];
        self.write_block(index, &zeroes)
    }

    /// Reads `len` bytes starting `offset` bytes into block `index`.
    pub fn read_bytes(&self, index: BlockPointer, offset: usize, len: usize) -> Result<Vec<u8>> {
        let sectors = self.covering_sectors(index, offset, len)?;
        let sector_size = self.device.get_sector_size();
        let mut buffer = vec![0u8; (sectors.end - sectors.start) as usize * sector_size];
        raw_read_sectors(&self.device, sectors.start, &mut buffer)?;

        let skip = offset % sector_size;
        buffer.drain(..skip);
        buffer.truncate(len);
        Ok(buffer)
    }

    /// Writes `data` starting `offset` bytes into block `index`. Only the
    /// sectors covering the range are rewritten.
    pub fn write_bytes(&mut self, index: BlockPointer, offset: usize, data: &[u8]) -> Result<()> {
        let sectors = self.covering_sectors(index, offset, data.len())?;
        let sector_size = self.device.get_sector_size();
        let skip = offset % sector_size;
        let mut buffer = vec![0u8; (sectors.end - sectors.start) as usize * sector_size];

        if data.len() != buffer.len() {
            raw_read_sectors(&self.device, sectors.start, &mut buffer)?;
        }
        buffer[skip..skip + data.len()].copy_from_slice(data);

        trace!("write block {} bytes {}..{}", index, offset, offset + data.len());
        raw_write_sectors(&mut self.device, sectors.start, &buffer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }

    fn covering_sectors(&self, index: BlockPointer, offset: usize, len: usize) -> Result<Range<u64>> {
        if index as u64 >= self.block_count {
            return Err(FsError::OutOfRange {
                what: "block",
                index: index as u64,
                limit: self.block_count,
            });
        }
        if offset + len > self.block_size {
            return Err(FsError::OutOfRange {
                what: "byte offset",
                index: (offset + len) as u64,
                limit: self.block_size as u64,
            });
        }

        let sector_size = self.device.get_sector_size();
        let sectors_per_block = (self.block_size / sector_size) as u64;
        let first = index as u64 * sectors_per_block + (offset / sector_size) as u64;
        let last = index as u64 * sectors_per_block + ((offset + len.max(1) - 1) / sector_size) as u64;
        Ok(first..last + 1)
    }
}
