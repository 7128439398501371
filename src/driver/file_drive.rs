use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::driver::{check_sector, DeviceDriver};

/// A device backed by a regular file. All access is positional, so the
/// file cursor is never moved.
#[derive(Debug)]
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a new zero-filled image of `bytes` bytes. Fails if the file exists.
    pub fn create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).create_new(true).open(path)?;
        file.set_len(bytes)?;
        Ok(FileDrive { file, bytes, sector_size })
    }

    /// Opens an existing image for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        Ok(FileDrive { file, bytes, sector_size })
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        check_sector(index, self.get_sector_count(), buffer.len(), self.sector_size)?;
        self.file.read_exact_at(buffer, index * self.sector_size as u64)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        check_sector(index, self.get_sector_count(), data.len(), self.sector_size)?;
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_drive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        let mut drive = FileDrive::create(&path, 1024 * 512, 512).unwrap();

        let sector0 = vec![0x42; 512];
        let sector1023 = vec![0x52; 512];
        drive.write_sector(0, &sector0).unwrap();
        drive.write_sector(1023, &sector1023).unwrap();

        let mut buffer = vec![0; 512];
        drive.read_sector(0, &mut buffer).unwrap();
        assert_eq!(buffer, sector0);
        drive.read_sector(1023, &mut buffer).unwrap();
        assert_eq!(buffer, sector1023);
        drive.read_sector(2, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0; 512]);

        assert!(drive.write_sector(1024, &sector0).is_err());
        assert!(drive.write_sector(0, &[0; 12]).is_err());
        drop(drive);

        let reopened = FileDrive::open(&path, 512).unwrap();
        assert_eq!(reopened.get_sector_count(), 1024);
        reopened.read_sector(1023, &mut buffer).unwrap();
        assert_eq!(buffer, sector1023);
    }

    #[test]
    fn create_refuses_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        FileDrive::create(&path, 4096, 512).unwrap();
        assert!(FileDrive::create(&path, 4096, 512).is_err());
    }
}
