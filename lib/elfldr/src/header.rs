// File header and program header table

use crate::{elf::*, error::*, ident::*, io::*};
use alloc::boxed::Box;
use log::{debug, error};

/// Upper bound for the program header table read from an image.
///
/// Both the entry count and the entry size come from the file, so the table
/// size is checked against this before any allocation happens.
pub const MAX_PROGRAM_HEADER_TABLE: u64 = 0x1_0000;

/// Class-independent view of the file header. Address fields are widened to
/// 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub class: ImageClass,
    pub data: u8,
    pub ident_version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
    pub elf_type: ElfType,
    pub machine: Machine,
    pub version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub phentsize: u16,
    pub phnum: u16,
    pub shnum: u16,
}

impl FileHeader {
    /// Size of the on-disk header for `class`.
    #[inline]
    pub const fn size_of(class: ImageClass) -> Option<usize> {
        match class {
            ImageClass::Class32 => Some(elf32::Header::SIZE),
            ImageClass::Class64 => Some(elf64::Header::SIZE),
            ImageClass::Unknown => None,
        }
    }

    /// Decodes the header layout selected by `class`. `blob` must hold at
    /// least [`Self::size_of`] bytes.
    pub fn decode(class: ImageClass, blob: &[u8]) -> Option<Self> {
        match class {
            ImageClass::Class32 => Some(elf32::Header::decode(blob).into()),
            ImageClass::Class64 => Some(elf64::Header::decode(blob).into()),
            ImageClass::Unknown => None,
        }
    }

    /// Number of bytes in the program header table.
    #[inline]
    pub fn program_header_table_size(&self) -> Option<u64> {
        (self.phentsize as u64).checked_mul(self.phnum as u64)
    }
}

impl From<elf32::Header> for FileHeader {
    fn from(hdr: elf32::Header) -> Self {
        let mut magic = [0; 4];
        magic.copy_from_slice(&hdr.e_ident[EI_MAG0..EI_MAG0 + 4]);
        Self {
            magic,
            class: ImageClass::Class32,
            data: hdr.e_ident[EI_DATA],
            ident_version: hdr.e_ident[EI_VERSION],
            os_abi: hdr.e_ident[EI_OSABI],
            abi_version: hdr.e_ident[EI_ABIVERSION],
            elf_type: hdr.e_type,
            machine: hdr.e_machine,
            version: hdr.e_version,
            entry: hdr.e_entry as u64,
            phoff: hdr.e_phoff as u64,
            shoff: hdr.e_shoff as u64,
            flags: hdr.e_flags,
            phentsize: hdr.e_phentsize,
            phnum: hdr.e_phnum,
            shnum: hdr.e_shnum,
        }
    }
}

impl From<elf64::Header> for FileHeader {
    fn from(hdr: elf64::Header) -> Self {
        let mut magic = [0; 4];
        magic.copy_from_slice(&hdr.e_ident[EI_MAG0..EI_MAG0 + 4]);
        Self {
            magic,
            class: ImageClass::Class64,
            data: hdr.e_ident[EI_DATA],
            ident_version: hdr.e_ident[EI_VERSION],
            os_abi: hdr.e_ident[EI_OSABI],
            abi_version: hdr.e_ident[EI_ABIVERSION],
            elf_type: hdr.e_type,
            machine: hdr.e_machine,
            version: hdr.e_version,
            entry: hdr.e_entry,
            phoff: hdr.e_phoff,
            shoff: hdr.e_shoff,
            flags: hdr.e_flags,
            phentsize: hdr.e_phentsize,
            phnum: hdr.e_phnum,
            shnum: hdr.e_shnum,
        }
    }
}

/// Class-independent program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: SegmentType,
    pub flags: SegmentFlags,
    pub offset: u64,
    pub virtual_address: u64,
    pub physical_address: u64,
    pub file_size: u64,
    pub memory_size: u64,
    pub align: u64,
}

impl ProgramHeader {
    #[inline]
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// Bytes past the file-backed part that have to be zero-filled, or
    /// `None` if the segment claims more file bytes than memory.
    #[inline]
    pub const fn zero_fill_size(&self) -> Option<u64> {
        self.memory_size.checked_sub(self.file_size)
    }
}

impl From<elf32::ProgramHeader> for ProgramHeader {
    fn from(ph: elf32::ProgramHeader) -> Self {
        Self {
            p_type: ph.p_type,
            flags: ph.p_flags,
            offset: ph.p_offset as u64,
            virtual_address: ph.p_vaddr as u64,
            physical_address: ph.p_paddr as u64,
            file_size: ph.p_filesz as u64,
            memory_size: ph.p_memsz as u64,
            align: ph.p_align as u64,
        }
    }
}

impl From<elf64::ProgramHeader> for ProgramHeader {
    fn from(ph: elf64::ProgramHeader) -> Self {
        Self {
            p_type: ph.p_type,
            flags: ph.p_flags,
            offset: ph.p_offset,
            virtual_address: ph.p_vaddr,
            physical_address: ph.p_paddr,
            file_size: ph.p_filesz,
            memory_size: ph.p_memsz,
            align: ph.p_align,
        }
    }
}

/// The raw program header table, decoded one entry at a time.
///
/// The entry stride is whatever `e_phentsize` says, which may exceed the
/// layout size of the class; entries are located at `index * stride`.
pub struct ProgramHeaderTable {
    class: ImageClass,
    stride: usize,
    blob: Box<[u8]>,
}

impl ProgramHeaderTable {
    /// Size of one entry's fixed layout for `class`.
    #[inline]
    pub const fn layout_size(class: ImageClass) -> Option<usize> {
        match class {
            ImageClass::Class32 => Some(elf32::ProgramHeader::SIZE),
            ImageClass::Class64 => Some(elf64::ProgramHeader::SIZE),
            ImageClass::Unknown => None,
        }
    }

    /// Wraps `blob`, which must hold a whole number of `stride` sized
    /// entries of at least the layout size.
    pub fn new(class: ImageClass, stride: usize, blob: Box<[u8]>) -> Option<Self> {
        let layout = Self::layout_size(class)?;
        if stride < layout || blob.len() % stride != 0 {
            return None;
        }
        Some(Self {
            class,
            stride,
            blob,
        })
    }

    #[inline]
    pub fn class(&self) -> ImageClass {
        self.class
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blob.len() / self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }

    pub fn element_at(&self, index: usize) -> Option<ProgramHeader> {
        if index >= self.len() {
            return None;
        }
        let base = index * self.stride;
        let entry = &self.blob[base..base + self.stride];
        match self.class {
            ImageClass::Class32 => Some(elf32::ProgramHeader::decode(entry).into()),
            ImageClass::Class64 => Some(elf64::ProgramHeader::decode(entry).into()),
            ImageClass::Unknown => None,
        }
    }

    #[inline]
    pub fn iter(&self) -> ProgramHeaderIter<'_> {
        ProgramHeaderIter {
            table: self,
            index: 0,
        }
    }
}

impl<'a> IntoIterator for &'a ProgramHeaderTable {
    type Item = ProgramHeader;
    type IntoIter = ProgramHeaderIter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone)]
pub struct ProgramHeaderIter<'a> {
    table: &'a ProgramHeaderTable,
    index: usize,
}

impl Iterator for ProgramHeaderIter<'_> {
    type Item = ProgramHeader;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.table.element_at(self.index)?;
        self.index += 1;
        Some(item)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remain = self.table.len().saturating_sub(self.index);
        (remain, Some(remain))
    }
}

impl ExactSizeIterator for ProgramHeaderIter<'_> {}

/// Reads the file header and the program header table of an image whose
/// identity was already validated as `class`.
pub fn read_headers<F: ImageFile>(
    file: &mut F,
    class: ImageClass,
) -> Result<(FileHeader, ProgramHeaderTable)> {
    let Some(header_size) = FileHeader::size_of(class) else {
        error!("Invalid file class");
        return Err(LoadError::UnsupportedFormat(ELFCLASSNONE));
    };

    debug!("Setting file pointer to read executable header");
    file.seek(0).map_err(|err| {
        error!("Error setting file pointer position: {}", err);
        err
    })?;

    debug!(
        "Allocating {:#x} bytes for kernel executable header buffer",
        header_size
    );
    let mut header_buffer = transient_buffer(header_size)?;

    debug!("Reading kernel executable header");
    read_exact(file, &mut header_buffer).map_err(|err| {
        error!("Error reading kernel header: {}", err);
        err
    })?;

    let header = FileHeader::decode(class, &header_buffer)
        .ok_or(LoadError::UnsupportedFormat(ELFCLASSNONE))?;
    drop(header_buffer);

    let Some(layout) = ProgramHeaderTable::layout_size(class) else {
        return Err(LoadError::UnsupportedFormat(ELFCLASSNONE));
    };
    if header.phnum == 0 {
        // nothing to read, the loading driver rejects the empty table
        let table = ProgramHeaderTable::new(class, layout, Box::new([]))
            .ok_or(LoadError::UnsupportedFormat(ELFCLASSNONE))?;
        return Ok((header, table));
    }
    if (header.phentsize as usize) < layout {
        error!(
            "Program header entry size {} is smaller than {}",
            header.phentsize, layout
        );
        return Err(InvalidParameter::EntrySize(header.phentsize).into());
    }

    let table_size = match header.program_header_table_size() {
        Some(size) if size <= MAX_PROGRAM_HEADER_TABLE => size as usize,
        size => {
            let size = size.unwrap_or(u64::MAX);
            error!("Program header table of {:#x} bytes is too large", size);
            return Err(InvalidParameter::TableTooLarge(size).into());
        }
    };

    debug!(
        "Setting file offset to {:#x} to read program headers",
        header.phoff
    );
    file.seek(header.phoff).map_err(|err| {
        error!("Error setting file pointer position: {}", err);
        err
    })?;

    debug!(
        "Allocating {:#x} bytes for program headers buffer",
        table_size
    );
    let mut table_buffer = transient_buffer(table_size)?;

    debug!("Reading program headers");
    read_exact(file, &mut table_buffer).map_err(|err| {
        error!("Error reading kernel program headers: {}", err);
        err
    })?;

    let table = ProgramHeaderTable::new(
        class,
        header.phentsize as usize,
        table_buffer.into_boxed_slice(),
    )
    .ok_or(InvalidParameter::EntrySize(header.phentsize))?;

    Ok((header, table))
}
