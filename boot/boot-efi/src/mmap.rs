// Memory map handoff

use bootprot::*;
use uefi::table::boot::MemoryType;

pub trait MemoryTypeHelper {
    fn as_boot_memory_type(&self) -> BootMemoryType;
}

impl MemoryTypeHelper for MemoryType {
    #[inline]
    fn as_boot_memory_type(&self) -> BootMemoryType {
        match *self {
            MemoryType::CONVENTIONAL
            | MemoryType::BOOT_SERVICES_CODE
            | MemoryType::BOOT_SERVICES_DATA => BootMemoryType::Available,
            MemoryType::LOADER_CODE => BootMemoryType::OsLoaderCode,
            MemoryType::LOADER_DATA => BootMemoryType::OsLoaderData,
            MemoryType::ACPI_RECLAIM => BootMemoryType::AcpiReclaim,
            MemoryType::ACPI_NON_VOLATILE => BootMemoryType::AcpiNonVolatile,
            MemoryType::MMIO => BootMemoryType::Mmio,
            MemoryType::MMIO_PORT_SPACE => BootMemoryType::MmioPortSpace,
            MemoryType::RESERVED => BootMemoryType::Reserved,
            MemoryType::UNUSABLE => BootMemoryType::Unavailable,
            MemoryType::RUNTIME_SERVICES_CODE | MemoryType::PAL_CODE => {
                BootMemoryType::FirmwareCode
            }
            _ => BootMemoryType::FirmwareData,
        }
    }
}

/// Fills a fixed buffer with boot memory map descriptors.
///
/// Runs after boot services are gone, so it never allocates. Adjacent
/// available regions are merged into one descriptor.
pub struct MemoryMapWriter<'a> {
    buffer: &'a mut [BootMemoryMapDescriptor],
    len: usize,
    dropped: usize,
}

impl<'a> MemoryMapWriter<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [BootMemoryMapDescriptor]) -> Self {
        Self {
            buffer,
            len: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, base: u64, page_count: u64, mem_type: BootMemoryType) {
        if page_count == 0 {
            return;
        }
        if let Some(last) = self.len.checked_sub(1).map(|i| &mut self.buffer[i]) {
            if mem_type.is_available() && last.mem_type.is_available() && last.end() == base {
                last.page_count += page_count;
                return;
            }
        }
        match self.buffer.get_mut(self.len) {
            Some(slot) => {
                *slot = BootMemoryMapDescriptor {
                    base,
                    page_count,
                    mem_type,
                };
                self.len += 1;
            }
            None => self.dropped += 1,
        }
    }

    /// Regions that did not fit into the buffer.
    #[inline]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    #[inline]
    pub fn finish(self) -> &'a [BootMemoryMapDescriptor] {
        &self.buffer[..self.len]
    }

    /// Hands the map to the kernel, flagging it if regions were dropped.
    pub fn finish_into(self, info: &mut BootInfo) {
        let dropped = self.dropped;
        info.set_memory_map(self.finish(), dropped);
    }
}
