// In-memory stand-ins for the firmware collaborators

use crate::{elf::*, error::*, ident::*, io::*};
use byteorder::{ByteOrder, LE};
use std::{cell::Cell, collections::BTreeMap, rc::Rc};

/// An image held in memory. Reads return at most `chunk` bytes at a time.
pub struct MemoryImage {
    data: Vec<u8>,
    position: u64,
    chunk: usize,
    fail_seek: Option<u64>,
    fail_read: Option<u64>,
    fail_close: bool,
    closed: Rc<Cell<usize>>,
}

impl MemoryImage {
    /// Status carried by injected read failures.
    pub const READ_FAILURE: usize = 7;

    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            chunk: usize::MAX,
            fail_seek: None,
            fail_read: None,
            fail_close: false,
            closed: Rc::default(),
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Makes seeking to `offset` fail with [`IoError::Seek`].
    pub fn fail_seek_to(mut self, offset: u64) -> Self {
        self.fail_seek = Some(offset);
        self
    }

    /// Makes a read starting at `offset` fail with [`IoError::Read`].
    pub fn fail_read_at(mut self, offset: u64) -> Self {
        self.fail_read = Some(offset);
        self
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl ImageFile for MemoryImage {
    fn seek(&mut self, offset: u64) -> core::result::Result<(), IoError> {
        if self.fail_seek == Some(offset) {
            return Err(IoError::Seek(offset));
        }
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, IoError> {
        if self.fail_read == Some(self.position) {
            return Err(IoError::Read(Self::READ_FAILURE));
        }
        let start = match usize::try_from(self.position) {
            Ok(start) if start < self.data.len() => start,
            _ => return Ok(0),
        };
        let count = buf.len().min(self.chunk).min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn close(self) -> core::result::Result<(), IoError> {
        if self.fail_close {
            return Err(IoError::Close);
        }
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}

/// A directory of in-memory images keyed by path.
#[derive(Default)]
pub struct MemoryVolume {
    files: BTreeMap<String, Vec<u8>>,
    fail_read: Option<u64>,
    fail_close: bool,
    closed: Rc<Cell<usize>>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.to_string(), data);
    }

    /// Every image opened from now on fails to read at `offset`.
    pub fn fail_read_at(mut self, offset: u64) -> Self {
        self.fail_read = Some(offset);
        self
    }

    /// Every image opened from now on fails to close.
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// How many opened images were closed successfully.
    pub fn closed(&self) -> usize {
        self.closed.get()
    }
}

impl ImageVolume for MemoryVolume {
    type File = MemoryImage;

    fn open(&mut self, path: &str) -> Result<MemoryImage> {
        let data = self.files.get(path).ok_or(LoadError::NotFound)?;
        let mut file = MemoryImage::new(data.clone());
        file.fail_read = self.fail_read;
        file.fail_close = self.fail_close;
        file.closed = self.closed.clone();
        Ok(file)
    }
}

/// A window of physical memory starting at `base`, prefilled with
/// [`Self::GARBAGE`] so that untouched bytes stand out.
pub struct ArenaMemory {
    base: u64,
    bytes: Vec<u8>,
    reserved: Vec<(u64, usize)>,
    occupied: Vec<(u64, usize)>,
    zero_calls: usize,
}

impl ArenaMemory {
    pub const GARBAGE: u8 = 0xA5;

    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![Self::GARBAGE; size],
            reserved: Vec::new(),
            occupied: Vec::new(),
            zero_calls: 0,
        }
    }

    /// Marks a range as owned by someone else.
    pub fn occupy(&mut self, address: u64, pages: usize) {
        self.occupied.push((address, pages));
    }

    /// Ranges handed out by `reserve_at`, in call order.
    pub fn reservations(&self) -> &[(u64, usize)] {
        &self.reserved
    }

    pub fn zero_calls(&self) -> usize {
        self.zero_calls
    }

    pub fn bytes(&self, address: u64, len: usize) -> &[u8] {
        let start = (address - self.base) as usize;
        &self.bytes[start..start + len]
    }

    fn range_end(address: u64, len: u64) -> Option<u64> {
        address.checked_add(len)
    }

    fn is_reserved(&self, address: u64, len: usize) -> bool {
        let Some(end) = Self::range_end(address, len as u64) else {
            return false;
        };
        self.reserved.iter().any(|(base, pages)| {
            address >= *base && end <= base + *pages as u64 * PAGE_SIZE
        })
    }

    fn slice_mut(&mut self, address: u64, len: usize) -> Result<&mut [u8]> {
        if !self.is_reserved(address, len) {
            return Err(AllocationError::OutOfRange { address, len }.into());
        }
        let start = (address - self.base) as usize;
        Ok(&mut self.bytes[start..start + len])
    }
}

impl PhysicalMemory for ArenaMemory {
    fn reserve_at(&mut self, address: u64, pages: usize) -> Result<()> {
        let refused = AllocationError::Reserve { address, pages };
        let end = (pages as u64)
            .checked_mul(PAGE_SIZE)
            .and_then(|len| Self::range_end(address, len))
            .ok_or(refused)?;
        if address < self.base || end > self.base + self.bytes.len() as u64 {
            return Err(refused.into());
        }
        let overlaps = |(base, count): &(u64, usize)| {
            address < base + *count as u64 * PAGE_SIZE && *base < end
        };
        if self.reserved.iter().any(overlaps) || self.occupied.iter().any(overlaps) {
            return Err(refused.into());
        }
        self.reserved.push((address, pages));
        Ok(())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        self.slice_mut(address, data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn zero(&mut self, address: u64, len: usize) -> Result<()> {
        self.slice_mut(address, len)?.fill(0);
        self.zero_calls += 1;
        Ok(())
    }
}

struct PendingSegment {
    p_type: SegmentType,
    flags: SegmentFlags,
    offset: u64,
    data: Vec<u8>,
    memory_size: u64,
    address: u64,
}

/// Assembles little-endian ELF images.
///
/// The program header table follows the file header directly. The image ends
/// with the last segment's file data.
pub struct ImageBuilder {
    class: ImageClass,
    entry: u64,
    phentsize: Option<u16>,
    segments: Vec<PendingSegment>,
}

impl ImageBuilder {
    pub fn new(class: ImageClass) -> Self {
        Self {
            class,
            entry: 0,
            phentsize: None,
            segments: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Overrides `e_phentsize`. Entries are still written at least one
    /// layout size apart.
    pub fn phentsize(mut self, size: u16) -> Self {
        self.phentsize = Some(size);
        self
    }

    pub fn segment(
        mut self,
        p_type: SegmentType,
        offset: u64,
        data: &[u8],
        memory_size: u64,
        address: u64,
    ) -> Self {
        self.segments.push(PendingSegment {
            p_type,
            flags: SegmentFlags::READ | SegmentFlags::EXEC,
            offset,
            data: data.to_vec(),
            memory_size,
            address,
        });
        self
    }

    pub fn load(self, offset: u64, data: &[u8], memory_size: u64, address: u64) -> Self {
        self.segment(PT_LOAD, offset, data, memory_size, address)
    }

    pub fn build(self) -> Vec<u8> {
        let is64 = self.class == ImageClass::Class64;
        let (header_size, layout) = if is64 {
            (elf64::Header::SIZE, elf64::ProgramHeader::SIZE)
        } else {
            (elf32::Header::SIZE, elf32::ProgramHeader::SIZE)
        };
        let phentsize = self.phentsize.unwrap_or(layout as u16);
        let stride = layout.max(phentsize as usize);
        let phnum = self.segments.len();

        let table_end = header_size + stride * phnum;
        let data_end = self
            .segments
            .iter()
            .map(|s| s.offset as usize + s.data.len())
            .max()
            .unwrap_or(0);
        let mut image = vec![0u8; table_end.max(data_end)];

        image[..4].copy_from_slice(&ELFMAG);
        image[EI_CLASS] = if is64 { ELFCLASS64 } else { ELFCLASS32 };
        image[EI_DATA] = ELFDATA2LSB;
        image[EI_VERSION] = 1;

        let phoff = if phnum > 0 { header_size as u64 } else { 0 };
        LE::write_u16(&mut image[16..], ET_EXEC.0);
        LE::write_u16(
            &mut image[18..],
            if is64 { EM_X86_64.0 } else { EM_386.0 },
        );
        LE::write_u32(&mut image[20..], 1);
        if is64 {
            LE::write_u64(&mut image[24..], self.entry);
            LE::write_u64(&mut image[32..], phoff);
            LE::write_u16(&mut image[52..], header_size as u16);
            LE::write_u16(&mut image[54..], phentsize);
            LE::write_u16(&mut image[56..], phnum as u16);
        } else {
            LE::write_u32(&mut image[24..], self.entry as u32);
            LE::write_u32(&mut image[28..], phoff as u32);
            LE::write_u16(&mut image[40..], header_size as u16);
            LE::write_u16(&mut image[42..], phentsize);
            LE::write_u16(&mut image[44..], phnum as u16);
        }

        for (index, segment) in self.segments.iter().enumerate() {
            let ph = &mut image[header_size + index * stride..];
            LE::write_u32(&mut ph[0..], segment.p_type.0);
            if is64 {
                LE::write_u32(&mut ph[4..], segment.flags.bits());
                LE::write_u64(&mut ph[8..], segment.offset);
                LE::write_u64(&mut ph[16..], segment.address);
                LE::write_u64(&mut ph[24..], segment.address);
                LE::write_u64(&mut ph[32..], segment.data.len() as u64);
                LE::write_u64(&mut ph[40..], segment.memory_size);
                LE::write_u64(&mut ph[48..], PAGE_SIZE);
            } else {
                LE::write_u32(&mut ph[4..], segment.offset as u32);
                LE::write_u32(&mut ph[8..], segment.address as u32);
                LE::write_u32(&mut ph[12..], segment.address as u32);
                LE::write_u32(&mut ph[16..], segment.data.len() as u32);
                LE::write_u32(&mut ph[20..], segment.memory_size as u32);
                LE::write_u32(&mut ph[24..], segment.flags.bits());
                LE::write_u32(&mut ph[28..], PAGE_SIZE as u32);
            }
        }

        for segment in &self.segments {
            let start = segment.offset as usize;
            let end = start + segment.data.len();
            image[start..end].copy_from_slice(&segment.data);
        }

        image
    }
}
