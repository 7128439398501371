use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::Result;

/// A one-block allocation bitmap, one bit per unit, LSB first.
///
/// The in-memory copy only changes after the matching byte reached the
/// device, so mirror and disk agree whenever a call returns.
pub struct Bitmap {
    pub(crate) block: BlockPointer,
    capacity: u32,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(block: BlockPointer, capacity: u32, block_size: usize) -> Bitmap {
        Bitmap { block, capacity, data: vec![0; block_size] }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, block: BlockPointer, capacity: u32) -> Result<Bitmap> {
        let data = io.read_block(block)?;
        Ok(Bitmap { block, capacity, data })
    }

    pub fn write_full<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        io.write_block(self.block, &self.data)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// First free unit at or after `from`.
    pub fn find_free(&self, from: u32) -> Option<u32> {
        (from..self.capacity).find(|&index| self.is_free(index))
    }

    pub fn count_free(&self) -> u32 {
        (0..self.capacity).filter(|&index| self.is_free(index)).count() as u32
    }

    pub fn is_free(&self, index: u32) -> bool {
        self.data[(index / 8) as usize] & (1 << (index % 8)) == 0
    }

    pub fn is_used(&self, index: u32) -> bool {
        !self.is_free(index)
    }

    pub(crate) fn mark_used_mem(&mut self, index: u32) {
        self.data[(index / 8) as usize] |= 1 << (index % 8);
    }

    pub(crate) fn mark_used<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u32) -> Result<()> {
        let byte = self.data[(index / 8) as usize] | (1 << (index % 8));
        self.write_byte(io, index, byte)
    }

    pub(crate) fn mark_free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u32) -> Result<()> {
        let byte = self.data[(index / 8) as usize] & !(1 << (index % 8));
        self.write_byte(io, index, byte)
    }

    fn write_byte<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u32, byte: u8) -> Result<()> {
        let byte_index = (index / 8) as usize;
        io.write_bytes(self.block, byte_index, &[byte])?;
        self.data[byte_index] = byte;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::memory_drive::MemoryDrive;
    use crate::io::IO;

    #[test]
    fn read_write() {
        let drive = MemoryDrive::new(16 * 4096, 512);
        let mut io = IO::new(drive, 4096).unwrap();
        let mut bitmap = super::Bitmap::new(1, 1000, 4096);
        for i in 0..5 {
            bitmap.mark_used_mem(i);
        }
        bitmap.write_full(&mut io).unwrap();
        assert_eq!(bitmap.data, super::Bitmap::read(&io, 1, 1000).unwrap().data);
    }

    #[test]
    fn allocate() {
        let drive = MemoryDrive::new(16 * 4096, 512);
        let mut io = IO::new(drive, 4096).unwrap();
        let mut bitmap = super::Bitmap::new(1, 1000, 4096);
        bitmap.write_full(&mut io).unwrap();

        let index = bitmap.find_free(13).unwrap();
        assert_eq!(index, 13);
        bitmap.mark_used(&mut io, index).unwrap();
        assert!(bitmap.is_used(index));
        assert_eq!(bitmap.find_free(13), Some(14));
        assert_eq!(bitmap.count_free(), 999);
        assert_eq!(bitmap.data, super::Bitmap::read(&io, 1, 1000).unwrap().data);

        bitmap.mark_free(&mut io, index).unwrap();
        assert!(bitmap.is_free(index));
        assert_eq!(bitmap.data, super::Bitmap::read(&io, 1, 1000).unwrap().data);
    }

    #[test]
    fn scan_stops_at_capacity() {
        let mut bitmap = super::Bitmap::new(1, 10, 4096);
        for i in 0..10 {
            bitmap.mark_used_mem(i);
        }
        assert_eq!(bitmap.find_free(0), None);
        assert_eq!(bitmap.count_free(), 0);
    }
}
