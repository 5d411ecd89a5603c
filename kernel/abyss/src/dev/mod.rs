//! Devices.

#[macro_use]
pub mod mmio;
pub mod pci;
pub mod x86_64;

use alloc::boxed::Box;

#[derive(Debug)]
#[allow(dead_code)]
pub struct DeviceError(&'static str);

// Even though, there could be more than 4 virtio dev, just set maxium device
// number to 4. Slot 0: Kernel image. For debugging purpose.
// Slot 1: Filesystem disk 1.
static mut BLOCK_DEVS: [Option<Box<dyn BlockOps>>; 4] = [None, None, None, None];

/// Get block device.
///
/// - Slot 0: Kernel image. For debugging purpose.
/// - Slot 1: Filesystem disk 1.
pub fn get_bdev(slot_idx: usize) -> Option<&'static dyn BlockOps> {
    unsafe { BLOCK_DEVS.get(slot_idx).and_then(|n| n.as_deref()) }
}

/// Sector, an access granuality for the disk.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sector(pub usize);

impl Sector {
    /// Get offset that represented by the sector.
    #[inline]
    pub fn into_offset(self) -> usize {
        self.0 * 512
    }

    /// Cast into usize.
    #[inline]
    pub fn into_usize(self) -> usize {
        self.0
    }
}

impl core::ops::Add<usize> for Sector {
    type Output = Self;

    fn add(self, rhs: usize) -> Self {
        Self(self.0 + rhs)
    }
}

pub trait BlockOps {
    /// Initialize the block device.
    fn init(&self) -> bool;
    /// Get total block count of this device.
    fn block_cnt(&self) -> usize;
    /// get block size of this device.
    fn block_size(&self) -> usize;
    /// Read 512 bytes from disk starting from sector.
    fn read(&self, sector: Sector, buf: &mut [u8; 512]) -> bool;
    /// Write 512 bytes to disk starting from sector.
    fn write(&self, sector: Sector, buf: &[u8; 512]) -> bool;
    #[doc(hidden)]
    fn read_block_many(&self, _offset: usize, _buf: &mut [u8]) -> bool {
        unimplemented!()
    }

    /// Reads one or more byte ranges given as `(byte offset, destination)`
    /// pairs, each offset sector-aligned. Every 512-byte chunk of a
    /// destination is its own single-sector transaction, matching the IDE
    /// contract: `n` sectors means `n` `read` calls, and any call reporting
    /// failure panics the kernel rather than returning an error.
    fn read_bios<'a>(
        &self,
        reqs: &mut dyn Iterator<Item = (usize, &'a mut [u8])>,
    ) -> Result<(), DeviceError> {
        for (offset, buf) in reqs {
            assert_eq!(offset % 512, 0, "read_bios: offset must be sector-aligned");
            for (i, chunk) in buf.chunks_mut(512).enumerate() {
                let mut sector_buf = [0u8; 512];
                if !self.read(Sector(offset / 512 + i), &mut sector_buf) {
                    panic!("block device read failed");
                }
                chunk.copy_from_slice(&sector_buf[..chunk.len()]);
            }
        }
        Ok(())
    }

    /// Writes one or more byte ranges given as `(byte offset, source)` pairs,
    /// each offset sector-aligned. Mirrors [`read_bios`](Self::read_bios):
    /// one `write` transaction per 512-byte chunk, panicking on failure.
    fn write_bios<'a>(
        &self,
        reqs: &mut dyn Iterator<Item = (usize, &'a [u8])>,
    ) -> Result<(), DeviceError> {
        for (offset, buf) in reqs {
            assert_eq!(offset % 512, 0, "write_bios: offset must be sector-aligned");
            for (i, chunk) in buf.chunks(512).enumerate() {
                let mut sector_buf = [0u8; 512];
                sector_buf[..chunk.len()].copy_from_slice(chunk);
                if !self.write(Sector(offset / 512 + i), &sector_buf) {
                    panic!("block device write failed");
                }
            }
        }
        Ok(())
    }
}
