pub mod file_drive;
pub mod memory_drive;

use std::io;

/// A sector-addressed backing store. Every call either completes fully or
/// returns the underlying error; short transfers are reported as errors.
pub trait DeviceDriver {
    fn get_sector_count(&self) -> u64;
    fn get_sector_size(&self) -> usize;
    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()>;

    /// Pushes completed writes down to stable storage.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn get_size(&self) -> u64 {
        self.get_sector_count() * self.get_sector_size() as u64
    }
}

pub(crate) fn check_sector(index: u64, sector_count: u64, len: usize, sector_size: usize) -> io::Result<()> {
    if index >= sector_count {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("sector {} beyond device end ({} sectors)", index, sector_count),
        ));
    }
    if len != sector_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("sector size mismatch - expected {}, got {}", sector_size, len),
        ));
    }
    Ok(())
}
