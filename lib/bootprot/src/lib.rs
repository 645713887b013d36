//! Boot Protocol
//!
//! What the loader hands to the kernel entry point. Everything here is laid
//! out for the kernel to read after boot services are gone.

#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;
use byteorder::{ByteOrder, LE};
use core::{fmt, slice};

/// Kernel command line capacity, including the terminating NUL.
pub const CMDLINE_MAX: usize = 256;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct BootInfo {
    pub kernel_entry: u64,
    pub kernel_base: u64,
    pub kernel_end: u64,
    pub mmap_base: u64,
    pub mmap_len: u32,
    pub mmap_descriptor_size: u32,
    /// Regions the loader could not fit into the map.
    pub mmap_dropped: u32,
    pub cmdline: [u8; CMDLINE_MAX],
    pub flags: BootFlags,
}

impl Default for BootInfo {
    #[inline]
    fn default() -> Self {
        Self {
            kernel_entry: 0,
            kernel_base: 0,
            kernel_end: 0,
            mmap_base: 0,
            mmap_len: 0,
            mmap_descriptor_size: 0,
            mmap_dropped: 0,
            cmdline: [0; CMDLINE_MAX],
            flags: BootFlags::empty(),
        }
    }
}

impl BootInfo {
    /// Stores `cmdline` NUL terminated, truncated to fit.
    pub fn set_cmdline(&mut self, cmdline: &str) {
        let len = cmdline.len().min(CMDLINE_MAX - 1);
        self.cmdline = [0; CMDLINE_MAX];
        let bytes = &cmdline.as_bytes()[..len];
        self.cmdline[..len].copy_from_slice(bytes);
    }

    /// The command line up to the first NUL, or up to the last complete
    /// character if truncation split one.
    pub fn cmdline(&self) -> &str {
        let len = self
            .cmdline
            .iter()
            .position(|c| *c == 0)
            .unwrap_or(CMDLINE_MAX);
        match core::str::from_utf8(&self.cmdline[..len]) {
            Ok(s) => s,
            Err(err) => {
                let valid = &self.cmdline[..err.valid_up_to()];
                core::str::from_utf8(valid).unwrap_or("")
            }
        }
    }

    /// Records `map` as the memory map handed to the kernel. A nonzero
    /// `dropped` count marks the map as truncated.
    pub fn set_memory_map(&mut self, map: &[BootMemoryMapDescriptor], dropped: usize) {
        self.mmap_base = map.as_ptr() as u64;
        self.mmap_len = map.len() as u32;
        self.mmap_descriptor_size = BootMemoryMapDescriptor::SIZE as u32;
        self.mmap_dropped = u32::try_from(dropped).unwrap_or(u32::MAX);
        self.flags.set(BootFlags::MMAP_TRUNCATED, dropped > 0);
    }

    /// # Safety
    ///
    /// `mmap_base` must point at `mmap_len` entries of
    /// `mmap_descriptor_size` bytes each that are still mapped, as it does
    /// after [`Self::set_memory_map`].
    pub unsafe fn memory_map(&self) -> MemoryMapView<'_> {
        let size = self.mmap_len as usize * self.mmap_descriptor_size as usize;
        let blob: &[u8] = if self.mmap_base == 0 || size == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(self.mmap_base as usize as *const u8, size) }
        };
        MemoryMapView::new(blob, self.mmap_descriptor_size as usize).unwrap_or_default()
    }
}

bitflags! {
    #[derive(Default)]
    pub struct BootFlags: u32 {
        /// The loader ran with debug logging enabled.
        const DEBUG_MODE    = 0x0000_0001;
        /// The kernel image is an ELF32 image.
        const KERNEL_32BIT  = 0x0000_0002;
        /// Some memory map regions were dropped, see `mmap_dropped`.
        const MMAP_TRUNCATED = 0x0000_0004;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMemoryMapDescriptor {
    pub base: u64,
    pub page_count: u64,
    pub mem_type: BootMemoryType,
}

impl BootMemoryMapDescriptor {
    pub const SIZE: usize = core::mem::size_of::<Self>();
    pub const PAGE_SIZE: u64 = 0x1000;

    #[inline]
    pub const fn end(&self) -> u64 {
        self.base + self.page_count * Self::PAGE_SIZE
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootMemoryType {
    Available,
    AcpiReclaim,
    AcpiNonVolatile,
    Mmio,
    MmioPortSpace,
    OsLoaderCode,
    OsLoaderData,
    FirmwareCode,
    FirmwareData,
    Reserved,
    Unavailable,
}

impl BootMemoryType {
    /// Memory the kernel may take over once it runs.
    #[inline]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub const fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Available,
            1 => Self::AcpiReclaim,
            2 => Self::AcpiNonVolatile,
            3 => Self::Mmio,
            4 => Self::MmioPortSpace,
            5 => Self::OsLoaderCode,
            6 => Self::OsLoaderData,
            7 => Self::FirmwareCode,
            8 => Self::FirmwareData,
            9 => Self::Reserved,
            10 => Self::Unavailable,
            _ => return None,
        })
    }
}

/// Memory map entries as an opaque blob of `stride` sized elements.
///
/// The producer picks the stride, which may be larger than
/// [`BootMemoryMapDescriptor::SIZE`], so entries are decoded one by one at
/// `index * stride` instead of being viewed as a typed array.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryMapView<'a> {
    blob: &'a [u8],
    stride: usize,
}

impl<'a> MemoryMapView<'a> {
    const OFFSET_BASE: usize = 0;
    const OFFSET_PAGE_COUNT: usize = 8;
    const OFFSET_MEM_TYPE: usize = 16;

    /// Fails if `stride` cannot hold a descriptor.
    pub fn new(blob: &'a [u8], stride: usize) -> Option<Self> {
        (stride >= BootMemoryMapDescriptor::SIZE).then_some(Self { blob, stride })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blob.len() / self.stride.max(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries with an unknown memory type read as [`BootMemoryType::Unavailable`].
    pub fn element_at(&self, index: usize) -> Option<BootMemoryMapDescriptor> {
        if index >= self.len() {
            return None;
        }
        let entry = &self.blob[index * self.stride..][..BootMemoryMapDescriptor::SIZE];
        Some(BootMemoryMapDescriptor {
            base: LE::read_u64(&entry[Self::OFFSET_BASE..]),
            page_count: LE::read_u64(&entry[Self::OFFSET_PAGE_COUNT..]),
            mem_type: BootMemoryType::from_raw(LE::read_u32(&entry[Self::OFFSET_MEM_TYPE..]))
                .unwrap_or(BootMemoryType::Unavailable),
        })
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = BootMemoryMapDescriptor> + 'a {
        let view = *self;
        (0..view.len()).filter_map(move |i| view.element_at(i))
    }
}

impl fmt::Display for BootMemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "Available",
            Self::AcpiReclaim => "ACPI Reclaim",
            Self::AcpiNonVolatile => "ACPI NVS",
            Self::Mmio => "MMIO",
            Self::MmioPortSpace => "MMIO Port",
            Self::OsLoaderCode => "Loader Code",
            Self::OsLoaderData => "Loader Data",
            Self::FirmwareCode => "Firmware Code",
            Self::FirmwareData => "Firmware Data",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}
