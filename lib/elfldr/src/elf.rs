//! Executable and Linking Format
//!
//! On-disk layouts of the identity block, the file header and the program
//! header, for both classes. Every structure is decoded field by field from
//! little-endian bytes; nothing here is ever reinterpreted in place.

use bitflags::bitflags;
use byteorder::*;
use core::fmt;

pub const EI_NIDENT: usize = 16;
pub const EI_MAG0: usize = 0;
pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;
pub const EI_VERSION: usize = 6;
pub const EI_OSABI: usize = 7;
pub const EI_ABIVERSION: usize = 8;

pub const ELFMAG: [u8; 4] = *b"\x7FELF";

// e_ident[EI_CLASS]
pub const ELFCLASSNONE: u8 = 0;
pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;

// e_ident[EI_DATA]
pub const ELFDATANONE: u8 = 0;
pub const ELFDATA2LSB: u8 = 1;
pub const ELFDATA2MSB: u8 = 2;

pub type ElfHalf = u16;
pub type ElfWord = u32;
pub type ElfXWord = u64;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ElfType(pub u16);

pub const ET_NONE: ElfType = ElfType(0);
pub const ET_REL: ElfType = ElfType(1);
pub const ET_EXEC: ElfType = ElfType(2);
pub const ET_DYN: ElfType = ElfType(3);
pub const ET_CORE: ElfType = ElfType(4);

impl fmt::Display for ElfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ET_NONE => write!(f, "None"),
            ET_REL => write!(f, "Relocatable"),
            ET_EXEC => write!(f, "Executable"),
            ET_DYN => write!(f, "Dynamic"),
            ET_CORE => write!(f, "Core"),
            _ => write!(f, "Other ({:#x})", self.0),
        }
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Machine(pub u16);

pub const EM_NONE: Machine = Machine(0);
/// SPARC
pub const EM_SPARC: Machine = Machine(2);
/// Intel 80386
pub const EM_386: Machine = Machine(3);
/// MIPS R3000
pub const EM_MIPS: Machine = Machine(8);
/// PowerPC
pub const EM_PPC: Machine = Machine(20);
/// IBM S/390
pub const EM_S390: Machine = Machine(22);
/// ARM 32 bit
pub const EM_ARM: Machine = Machine(40);
/// SuperH
pub const EM_SH: Machine = Machine(42);
/// HP/Intel IA-64
pub const EM_IA_64: Machine = Machine(50);
/// AMD x86-64
pub const EM_X86_64: Machine = Machine(62);
/// ARM 64 bit
pub const EM_AARCH64: Machine = Machine(183);
/// RISC-V
pub const EM_RISCV: Machine = Machine(243);

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EM_NONE => write!(f, "No specific instruction set"),
            EM_SPARC => write!(f, "SPARC"),
            EM_386 => write!(f, "x86"),
            EM_MIPS => write!(f, "MIPS"),
            EM_PPC => write!(f, "PowerPC"),
            EM_S390 => write!(f, "S390"),
            EM_ARM => write!(f, "ARM"),
            EM_SH => write!(f, "SuperH"),
            EM_IA_64 => write!(f, "IA-64"),
            EM_X86_64 => write!(f, "x86-64"),
            EM_AARCH64 => write!(f, "AArch64"),
            EM_RISCV => write!(f, "RISC-V"),
            _ => write!(f, "Unknown ({:#x})", self.0),
        }
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentType(pub u32);

//
// These constants are for the segment types stored in the image headers
//
pub const PT_NULL: SegmentType = SegmentType(0);
pub const PT_LOAD: SegmentType = SegmentType(1);
pub const PT_DYNAMIC: SegmentType = SegmentType(2);
pub const PT_INTERP: SegmentType = SegmentType(3);
pub const PT_NOTE: SegmentType = SegmentType(4);
pub const PT_SHLIB: SegmentType = SegmentType(5);
pub const PT_PHDR: SegmentType = SegmentType(6);
pub const PT_TLS: SegmentType = SegmentType(7);

pub const PT_LOOS: SegmentType = SegmentType(0x6000_0000);
pub const PT_HIOS: SegmentType = SegmentType(0x6FFF_FFFF);

pub const PT_GNU_EH_FRAME: SegmentType = SegmentType(0x6474_E550);
pub const PT_GNU_STACK: SegmentType = SegmentType(0x6474_E551);
pub const PT_GNU_RELRO: SegmentType = SegmentType(0x6474_E552);

pub const PT_LOPROC: SegmentType = SegmentType(0x7000_0000);
pub const PT_HIPROC: SegmentType = SegmentType(0x7FFF_FFFF);

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PT_NULL => write!(f, "NULL"),
            PT_LOAD => write!(f, "LOAD"),
            PT_DYNAMIC => write!(f, "DYNAMIC"),
            PT_INTERP => write!(f, "INTERP"),
            PT_NOTE => write!(f, "NOTE"),
            PT_SHLIB => write!(f, "SHLIB"),
            PT_PHDR => write!(f, "PHDR"),
            PT_TLS => write!(f, "TLS"),
            PT_GNU_EH_FRAME => write!(f, "GNU_EH_FRAME"),
            PT_GNU_STACK => write!(f, "GNU_STACK"),
            PT_GNU_RELRO => write!(f, "GNU_RELRO"),
            SegmentType(v) if v >= PT_LOOS.0 && v <= PT_HIOS.0 => write!(f, "OS+{:#x}", v),
            SegmentType(v) if v >= PT_LOPROC.0 && v <= PT_HIPROC.0 => {
                write!(f, "PROC+{:#x}", v)
            }
            SegmentType(v) => write!(f, "{:#x}", v),
        }
    }
}

bitflags! {
    pub struct SegmentFlags: u32 {
        const EXEC  = 0x1;
        const WRITE = 0x2;
        const READ  = 0x4;
    }
}

impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |bit, c| if self.contains(bit) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Self::READ, 'R'),
            flag(Self::WRITE, 'W'),
            flag(Self::EXEC, 'X')
        )
    }
}

pub mod elf32 {
    use super::*;

    pub type ElfAddr = u32;
    pub type ElfOff = u32;

    #[derive(Debug, Clone, Copy)]
    pub struct Header {
        pub e_ident: [u8; EI_NIDENT],
        pub e_type: ElfType,
        pub e_machine: Machine,
        pub e_version: ElfWord,
        pub e_entry: ElfAddr,
        pub e_phoff: ElfOff,
        pub e_shoff: ElfOff,
        pub e_flags: ElfWord,
        pub e_ehsize: ElfHalf,
        pub e_phentsize: ElfHalf,
        pub e_phnum: ElfHalf,
        pub e_shentsize: ElfHalf,
        pub e_shnum: ElfHalf,
        pub e_shstrndx: ElfHalf,
    }

    impl Header {
        pub const SIZE: usize = 52;

        /// `blob` must hold at least [`Self::SIZE`] bytes.
        #[track_caller]
        pub fn decode(blob: &[u8]) -> Self {
            let mut e_ident = [0; EI_NIDENT];
            e_ident.copy_from_slice(&blob[..EI_NIDENT]);
            Self {
                e_ident,
                e_type: ElfType(LE::read_u16(&blob[16..18])),
                e_machine: Machine(LE::read_u16(&blob[18..20])),
                e_version: LE::read_u32(&blob[20..24]),
                e_entry: LE::read_u32(&blob[24..28]),
                e_phoff: LE::read_u32(&blob[28..32]),
                e_shoff: LE::read_u32(&blob[32..36]),
                e_flags: LE::read_u32(&blob[36..40]),
                e_ehsize: LE::read_u16(&blob[40..42]),
                e_phentsize: LE::read_u16(&blob[42..44]),
                e_phnum: LE::read_u16(&blob[44..46]),
                e_shentsize: LE::read_u16(&blob[46..48]),
                e_shnum: LE::read_u16(&blob[48..50]),
                e_shstrndx: LE::read_u16(&blob[50..52]),
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct ProgramHeader {
        pub p_type: SegmentType,
        pub p_offset: ElfOff,
        pub p_vaddr: ElfAddr,
        pub p_paddr: ElfAddr,
        pub p_filesz: ElfWord,
        pub p_memsz: ElfWord,
        pub p_flags: SegmentFlags,
        pub p_align: ElfWord,
    }

    impl ProgramHeader {
        pub const SIZE: usize = 32;

        /// `blob` must hold at least [`Self::SIZE`] bytes.
        #[track_caller]
        pub fn decode(blob: &[u8]) -> Self {
            Self {
                p_type: SegmentType(LE::read_u32(&blob[0..4])),
                p_offset: LE::read_u32(&blob[4..8]),
                p_vaddr: LE::read_u32(&blob[8..12]),
                p_paddr: LE::read_u32(&blob[12..16]),
                p_filesz: LE::read_u32(&blob[16..20]),
                p_memsz: LE::read_u32(&blob[20..24]),
                p_flags: SegmentFlags::from_bits_truncate(LE::read_u32(&blob[24..28])),
                p_align: LE::read_u32(&blob[28..32]),
            }
        }
    }
}

pub mod elf64 {
    use super::*;

    pub type ElfAddr = u64;
    pub type ElfOff = u64;

    #[derive(Debug, Clone, Copy)]
    pub struct Header {
        pub e_ident: [u8; EI_NIDENT],
        pub e_type: ElfType,
        pub e_machine: Machine,
        pub e_version: ElfWord,
        pub e_entry: ElfAddr,
        pub e_phoff: ElfOff,
        pub e_shoff: ElfOff,
        pub e_flags: ElfWord,
        pub e_ehsize: ElfHalf,
        pub e_phentsize: ElfHalf,
        pub e_phnum: ElfHalf,
        pub e_shentsize: ElfHalf,
        pub e_shnum: ElfHalf,
        pub e_shstrndx: ElfHalf,
    }

    impl Header {
        pub const SIZE: usize = 64;

        /// `blob` must hold at least [`Self::SIZE`] bytes.
        #[track_caller]
        pub fn decode(blob: &[u8]) -> Self {
            let mut e_ident = [0; EI_NIDENT];
            e_ident.copy_from_slice(&blob[..EI_NIDENT]);
            Self {
                e_ident,
                e_type: ElfType(LE::read_u16(&blob[16..18])),
                e_machine: Machine(LE::read_u16(&blob[18..20])),
                e_version: LE::read_u32(&blob[20..24]),
                e_entry: LE::read_u64(&blob[24..32]),
                e_phoff: LE::read_u64(&blob[32..40]),
                e_shoff: LE::read_u64(&blob[40..48]),
                e_flags: LE::read_u32(&blob[48..52]),
                e_ehsize: LE::read_u16(&blob[52..54]),
                e_phentsize: LE::read_u16(&blob[54..56]),
                e_phnum: LE::read_u16(&blob[56..58]),
                e_shentsize: LE::read_u16(&blob[58..60]),
                e_shnum: LE::read_u16(&blob[60..62]),
                e_shstrndx: LE::read_u16(&blob[62..64]),
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct ProgramHeader {
        pub p_type: SegmentType,
        pub p_flags: SegmentFlags,
        pub p_offset: ElfOff,
        pub p_vaddr: ElfAddr,
        pub p_paddr: ElfAddr,
        pub p_filesz: ElfXWord,
        pub p_memsz: ElfXWord,
        pub p_align: ElfXWord,
    }

    impl ProgramHeader {
        pub const SIZE: usize = 56;

        /// `blob` must hold at least [`Self::SIZE`] bytes.
        #[track_caller]
        pub fn decode(blob: &[u8]) -> Self {
            Self {
                p_type: SegmentType(LE::read_u32(&blob[0..4])),
                p_flags: SegmentFlags::from_bits_truncate(LE::read_u32(&blob[4..8])),
                p_offset: LE::read_u64(&blob[8..16]),
                p_vaddr: LE::read_u64(&blob[16..24]),
                p_paddr: LE::read_u64(&blob[24..32]),
                p_filesz: LE::read_u64(&blob[32..40]),
                p_memsz: LE::read_u64(&blob[40..48]),
                p_align: LE::read_u64(&blob[48..56]),
            }
        }
    }
}
