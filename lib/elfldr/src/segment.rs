// Segment placement

use crate::{error::*, header::*, io::*};
use log::{debug, error};

/// Where one loadable segment comes from and where it goes.
///
/// Construction checks every size and address so that placement never has
/// to deal with wrap-around or a negative zero-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub file_offset: u64,
    pub file_size: usize,
    pub memory_size: u64,
    pub address: u64,
}

impl Segment {
    /// Validates the program header at `index` of the table.
    pub fn from_header(index: usize, ph: &ProgramHeader) -> Result<Self> {
        if ph.zero_fill_size().is_none() {
            error!(
                "Segment {}: memory size {:#x} is smaller than file size {:#x}",
                index, ph.memory_size, ph.file_size
            );
            return Err(InvalidParameter::SegmentSize { index }.into());
        }
        let overflow = InvalidParameter::SegmentOverflow { index };
        let file_size = usize::try_from(ph.file_size).map_err(|_| overflow)?;
        ph.offset.checked_add(ph.file_size).ok_or(overflow)?;
        ph.physical_address
            .checked_add(ph.memory_size)
            .ok_or(overflow)?;

        let segment = Self {
            index,
            file_offset: ph.offset,
            file_size,
            memory_size: ph.memory_size,
            address: ph.physical_address,
        };
        let zero_fill = segment.zero_fill_size();
        usize::try_from(zero_fill).map_err(|_| overflow)?;
        segment.page_count().ok_or(overflow)?;
        Ok(segment)
    }

    /// First address past the segment in memory.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.address + self.memory_size
    }

    #[inline]
    pub const fn zero_fill_size(&self) -> u64 {
        self.memory_size - self.file_size as u64
    }

    /// Start of the page holding the first byte of the segment.
    #[inline]
    pub const fn page_base(&self) -> u64 {
        self.address & !(PAGE_SIZE - 1)
    }

    /// Pages to reserve at [`Self::page_base`]. For a page aligned address
    /// this is `ceil(memory_size / PAGE_SIZE)`.
    pub fn page_count(&self) -> Option<usize> {
        let lead = self.address - self.page_base();
        let span = lead.checked_add(self.memory_size)?;
        usize::try_from(pages_for(span)).ok()
    }
}

/// Copies the file-backed part of `segment` to its physical address and
/// zero-fills the rest up to its memory size.
///
/// The first failure aborts; nothing is retried or rolled back.
pub fn load_segment<F, M>(file: &mut F, memory: &mut M, segment: &Segment) -> Result<()>
where
    F: ImageFile,
    M: PhysicalMemory,
{
    debug!(
        "Setting file pointer to segment offset {:#x}",
        segment.file_offset
    );
    file.seek(segment.file_offset).map_err(|err| {
        error!("Error setting file pointer to segment offset: {}", err);
        err
    })?;

    let page_count = segment
        .page_count()
        .ok_or(InvalidParameter::SegmentOverflow {
            index: segment.index,
        })?;
    if page_count > 0 {
        debug!(
            "Allocating {} pages at address {:#x}",
            page_count,
            segment.page_base()
        );
        memory
            .reserve_at(segment.page_base(), page_count)
            .map_err(|err| {
                error!("Error allocating pages for ELF segment: {}", err);
                err
            })?;
    }

    if segment.file_size > 0 {
        debug!(
            "Allocating segment buffer with size {:#x}",
            segment.file_size
        );
        let mut buffer = transient_buffer(segment.file_size)?;

        debug!("Reading segment data with file size {:#x}", segment.file_size);
        read_exact(file, &mut buffer).map_err(|err| {
            error!("Error reading segment data: {}", err);
            err
        })?;

        debug!("Copying segment to memory address {:#x}", segment.address);
        memory.write(segment.address, &buffer).map_err(|err| {
            error!("Error copying program section into memory: {}", err);
            err
        })?;
    }

    // the object format requires memory past the file image to read as zero
    let zero_fill_count = segment.zero_fill_size() as usize;
    if zero_fill_count > 0 {
        let zero_fill_start = segment.address + segment.file_size as u64;
        debug!(
            "Zero-filling {} bytes at address {:#x}",
            zero_fill_count, zero_fill_start
        );
        memory
            .zero(zero_fill_start, zero_fill_count)
            .map_err(|err| {
                error!("Error zero filling segment: {}", err);
                err
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{elf::*, testing::*};

    fn load_header(offset: u64, filesz: u64, memsz: u64, paddr: u64) -> ProgramHeader {
        ProgramHeader {
            p_type: PT_LOAD,
            flags: SegmentFlags::READ,
            offset,
            virtual_address: paddr,
            physical_address: paddr,
            file_size: filesz,
            memory_size: memsz,
            align: PAGE_SIZE,
        }
    }

    fn segment(offset: u64, filesz: u64, memsz: u64, paddr: u64) -> Segment {
        let header = load_header(offset, filesz, memsz, paddr);
        Segment::from_header(0, &header).unwrap()
    }

    fn file_with(offset: usize, data: &[u8]) -> MemoryImage {
        let mut blob = vec![0xEE; offset + data.len()];
        blob[offset..].copy_from_slice(data);
        MemoryImage::new(blob)
    }

    #[test]
    fn copies_and_zero_fills() {
        let data: Vec<u8> = (0..0x200).map(|v| v as u8).collect();
        let mut file = file_with(0x1000, &data);
        let mut memory = ArenaMemory::new(0x10_0000, 0x4000);
        let segment = segment(0x1000, 0x200, 0x1000, 0x10_0000);

        load_segment(&mut file, &mut memory, &segment).unwrap();

        assert_eq!(memory.bytes(0x10_0000, 0x200), &data[..]);
        assert!(memory.bytes(0x10_0200, 0xE00).iter().all(|b| *b == 0));
        // untouched beyond the segment
        assert_eq!(memory.bytes(0x10_1000, 1), [ArenaMemory::GARBAGE]);
        assert_eq!(memory.reservations(), [(0x10_0000, 1)]);
    }

    #[test]
    fn bss_only_segment_is_all_zero() {
        let mut file = MemoryImage::new(vec![]);
        let mut memory = ArenaMemory::new(0x10_0000, 0x4000);
        let segment = segment(0, 0, 0x2800, 0x10_0000);

        load_segment(&mut file, &mut memory, &segment).unwrap();

        assert!(memory.bytes(0x10_0000, 0x2800).iter().all(|b| *b == 0));
        assert_eq!(memory.reservations(), [(0x10_0000, 3)]);
    }

    #[test]
    fn exact_fit_needs_no_fill() {
        let data = [0x5A; 0x1000];
        let mut file = file_with(0, &data);
        let mut memory = ArenaMemory::new(0x10_0000, 0x2000);
        let segment = segment(0, 0x1000, 0x1000, 0x10_0000);

        load_segment(&mut file, &mut memory, &segment).unwrap();

        assert_eq!(memory.bytes(0x10_0000, 0x1000), &data[..]);
        assert_eq!(memory.zero_calls(), 0);
    }

    #[test]
    fn unaligned_address_reserves_covering_pages() {
        let segment = segment(0, 0x10, 0x1000, 0x10_0F00);
        assert_eq!(segment.page_base(), 0x10_0000);
        assert_eq!(segment.page_count(), Some(2));
    }

    #[test]
    fn memory_smaller_than_file_is_rejected() {
        assert_eq!(
            Segment::from_header(3, &load_header(0, 0x200, 0x100, 0x10_0000)),
            Err(LoadError::InvalidParameter(InvalidParameter::SegmentSize {
                index: 3
            }))
        );
    }

    #[test]
    fn wrapping_segment_is_rejected() {
        assert_eq!(
            Segment::from_header(1, &load_header(0, 0, 0x2000, u64::MAX - 0xFFF)),
            Err(LoadError::InvalidParameter(
                InvalidParameter::SegmentOverflow { index: 1 }
            ))
        );
        assert_eq!(
            Segment::from_header(1, &load_header(u64::MAX, 2, 2, 0x10_0000)),
            Err(LoadError::InvalidParameter(
                InvalidParameter::SegmentOverflow { index: 1 }
            ))
        );
    }

    #[test]
    fn occupied_range_fails_before_reading() {
        let mut file = file_with(0, &[1; 0x100]);
        let mut memory = ArenaMemory::new(0x10_0000, 0x4000);
        memory.reserve_at(0x10_0000, 1).unwrap();
        let segment = segment(0, 0x100, 0x100, 0x10_0000);

        assert_eq!(
            load_segment(&mut file, &mut memory, &segment),
            Err(LoadError::Allocation(AllocationError::Reserve {
                address: 0x10_0000,
                pages: 1
            }))
        );
        assert_eq!(memory.bytes(0x10_0000, 1), [ArenaMemory::GARBAGE]);
    }

    #[test]
    fn short_segment_data_is_an_io_error() {
        let mut file = file_with(0x100, &[1; 0x10]);
        let mut memory = ArenaMemory::new(0x10_0000, 0x1000);
        let segment = segment(0x100, 0x20, 0x20, 0x10_0000);

        assert_eq!(
            load_segment(&mut file, &mut memory, &segment),
            Err(LoadError::Io(IoError::ShortRead {
                expected: 0x20,
                actual: 0x10
            }))
        );
    }

    #[test]
    fn seek_failure_is_propagated() {
        let mut file = file_with(0x100, &[1; 0x10]).fail_seek_to(0x100);
        let mut memory = ArenaMemory::new(0x10_0000, 0x1000);
        let segment = segment(0x100, 0x10, 0x10, 0x10_0000);

        assert_eq!(
            load_segment(&mut file, &mut memory, &segment),
            Err(LoadError::Io(IoError::Seek(0x100)))
        );
        assert!(memory.reservations().is_empty());
    }

    #[test]
    fn read_failure_leaves_memory_untouched() {
        let mut file = file_with(0x100, &[1; 0x10]).fail_read_at(0x100);
        let mut memory = ArenaMemory::new(0x10_0000, 0x1000);
        let segment = segment(0x100, 0x10, 0x20, 0x10_0000);

        assert_eq!(
            load_segment(&mut file, &mut memory, &segment),
            Err(LoadError::Io(IoError::Read(MemoryImage::READ_FAILURE)))
        );
        let untouched = [ArenaMemory::GARBAGE; 0x20];
        assert_eq!(memory.bytes(0x10_0000, 0x20), &untouched[..]);
        assert_eq!(memory.zero_calls(), 0);
    }
}
