// Header dump

use crate::{elf::*, header::*};
use log::info;

/// Name of an `e_ident[EI_OSABI]` value.
pub const fn os_abi_name(os_abi: u8) -> Option<&'static str> {
    Some(match os_abi {
        0x00 => "System V",
        0x01 => "HP-UX",
        0x02 => "NetBSD",
        0x03 => "Linux",
        0x04 => "GNU Hurd",
        0x06 => "Solaris",
        0x07 => "AIX",
        0x08 => "IRIX",
        0x09 => "FreeBSD",
        0x0A => "Tru64",
        0x0B => "Novell Modesto",
        0x0C => "OpenBSD",
        0x0D => "OpenVMS",
        0x0E => "NonStop Kernel",
        0x0F => "AROS",
        0x10 => "Fenix OS",
        0x11 => "CloudABI",
        _ => return None,
    })
}

pub const fn encoding_name(data: u8) -> &'static str {
    match data {
        ELFDATA2LSB => "Little-Endian",
        ELFDATA2MSB => "Big-Endian",
        _ => "Unknown",
    }
}

/// Logs the file header followed by one line per program header.
pub fn dump_headers(header: &FileHeader, table: &ProgramHeaderTable) {
    info!("ELF Header Info:");
    info!(
        "  Magic:                    {:#x} {:#x} {:#x} {:#x}",
        header.magic[0], header.magic[1], header.magic[2], header.magic[3]
    );
    info!("  Class:                    {}", header.class);
    info!("  Endianness:               {}", encoding_name(header.data));
    info!("  Version:                  {:#x}", header.ident_version);
    match os_abi_name(header.os_abi) {
        Some(name) => info!("  OS ABI:                   {}", name),
        None => info!("  OS ABI:                   {:#x}", header.os_abi),
    }
    info!("  ABI Version:              {:#x}", header.abi_version);
    info!("  File Type:                {}", header.elf_type);
    info!("  Machine Type:             {}", header.machine);
    info!("  Entry point:              {:#x}", header.entry);
    info!("  Program header offset:    {:#x}", header.phoff);
    info!("  Section header offset:    {:#x}", header.shoff);
    info!("  Program header count:     {}", header.phnum);
    info!("  Section header count:     {}", header.shnum);

    for (index, ph) in table.iter().enumerate() {
        info!(
            "  [{:2}] {} {} off {:#010x} vaddr {:#018x} paddr {:#018x}",
            index, ph.p_type, ph.flags, ph.offset, ph.virtual_address, ph.physical_address
        );
        info!(
            "       filesz {:#x} memsz {:#x} align {:#x}",
            ph.file_size, ph.memory_size, ph.align
        );
    }
}
