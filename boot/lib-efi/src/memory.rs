// Physical pages from boot services

use alloc::vec::Vec;
use core::ptr;
use elfldr::{AllocationError, LoadError, PhysicalMemory, PAGE_SIZE};
use log::debug;
use uefi::table::boot::{AllocateType, BootServices, MemoryType};

/// Memory type the kernel image is placed in.
pub const KERNEL_MEMORY_TYPE: MemoryType = MemoryType::LOADER_DATA;

/// Pages allocated at fixed addresses. Boot services identity map all
/// memory, so a reserved physical address is directly writable.
pub struct UefiMemory<'a> {
    bs: &'a BootServices,
    reserved: Vec<(u64, usize)>,
}

impl<'a> UefiMemory<'a> {
    #[inline]
    pub fn new(bs: &'a BootServices) -> Self {
        Self {
            bs,
            reserved: Vec::new(),
        }
    }

    fn check_range(&self, address: u64, len: usize) -> Result<(), LoadError> {
        let out_of_range = AllocationError::OutOfRange { address, len };
        let end = address.checked_add(len as u64).ok_or(out_of_range)?;
        let covers = |(base, pages): &(u64, usize)| {
            address >= *base && end <= base + *pages as u64 * PAGE_SIZE
        };
        if self.reserved.iter().any(covers) {
            Ok(())
        } else {
            Err(out_of_range.into())
        }
    }
}

impl PhysicalMemory for UefiMemory<'_> {
    fn reserve_at(&mut self, address: u64, pages: usize) -> Result<(), LoadError> {
        let entry_size = core::mem::size_of::<(u64, usize)>();
        self.reserved
            .try_reserve(1)
            .map_err(|_| AllocationError::Buffer(entry_size))?;
        let base = self
            .bs
            .allocate_pages(AllocateType::Address(address), KERNEL_MEMORY_TYPE, pages)
            .map_err(|err| {
                debug!("AllocatePages({:#x}, {}): {:?}", address, pages, err.status());
                AllocationError::Reserve { address, pages }
            })?;
        self.reserved.push((base, pages));
        Ok(())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<(), LoadError> {
        self.check_range(address, data.len())?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), address as usize as *mut u8, data.len());
        }
        Ok(())
    }

    fn zero(&mut self, address: u64, len: usize) -> Result<(), LoadError> {
        self.check_range(address, len)?;
        unsafe {
            ptr::write_bytes(address as usize as *mut u8, 0, len);
        }
        Ok(())
    }
}
