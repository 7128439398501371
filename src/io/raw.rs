use std::io;

use crate::driver::DeviceDriver;

/// Reads `buffer.len() / sector_size` consecutive sectors starting at `first_sector`.
pub(crate) fn raw_read_sectors<A: DeviceDriver>(drive: &A, first_sector: u64, buffer: &mut [u8]) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    for (i, chunk) in buffer.chunks_mut(sector_size).enumerate() {
        drive.read_sector(first_sector + i as u64, chunk)?;
    }
    Ok(())
}

/// Writes `data` over consecutive sectors starting at `first_sector`.
/// `data.len()` must be a multiple of the sector size.
pub(crate) fn raw_write_sectors<A: DeviceDriver>(drive: &mut A, first_sector: u64, data: &[u8]) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    for (i, chunk) in data.chunks(sector_size).enumerate() {
        drive.write_sector(first_sector + i as u64, chunk)?;
    }
    Ok(())
}
