//! Collaborators supplied by the platform.
//!
//! The loader never reaches for firmware services on its own; the boot driver
//! hands it a volume to open the image from and the physical memory to place
//! segments into.

use crate::error::*;
use alloc::vec::Vec;

/// Size of a reservation unit.
pub const PAGE_SIZE: u64 = 0x1000;

/// A readable, seekable kernel image.
pub trait ImageFile {
    /// Moves the read cursor to an absolute offset.
    fn seek(&mut self, offset: u64) -> core::result::Result<(), IoError>;

    /// Reads up to `buf.len()` bytes at the cursor and returns the count.
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, IoError>;

    fn close(self) -> core::result::Result<(), IoError>;
}

/// A directory the kernel image is opened from.
pub trait ImageVolume {
    type File: ImageFile;

    /// Opens `path` read-only. Fails with [`LoadError::NotFound`] when there
    /// is nothing at `path`.
    fn open(&mut self, path: &str) -> Result<Self::File>;
}

/// Physical memory at fixed addresses.
///
/// Implementations must reject `write` and `zero` calls that fall outside a
/// range previously returned by `reserve_at`.
pub trait PhysicalMemory {
    /// Reserves `pages` pages starting at `address`, which is fixed by the
    /// image and cannot be moved.
    fn reserve_at(&mut self, address: u64, pages: usize) -> Result<()>;

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()>;

    fn zero(&mut self, address: u64, len: usize) -> Result<()>;
}

/// Fills `buf` completely or fails with [`IoError::ShortRead`].
pub fn read_exact<F: ImageFile + ?Sized>(file: &mut F, buf: &mut [u8]) -> Result<()> {
    let expected = buf.len();
    let mut filled = 0;
    while filled < expected {
        match file.read(&mut buf[filled..])? {
            0 => {
                return Err(IoError::ShortRead {
                    expected,
                    actual: filled,
                }
                .into())
            }
            n => filled += n,
        }
    }
    Ok(())
}

/// Allocates a zeroed scratch buffer without aborting on exhaustion.
pub fn transient_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if buffer.try_reserve_exact(len).is_err() {
        return Err(AllocationError::Buffer(len).into());
    }
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Number of pages covering `len` bytes.
#[inline]
pub const fn pages_for(len: u64) -> u64 {
    len / PAGE_SIZE + (len % PAGE_SIZE != 0) as u64
}
