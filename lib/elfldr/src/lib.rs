//! Minimal ELF kernel loader
//!
//! Reads a little-endian ELF32 or ELF64 image through [`ImageVolume`] and
//! places its `PT_LOAD` segments at their physical addresses through
//! [`PhysicalMemory`]. The platform supplies both.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod elf;
mod error;
pub mod header;
pub mod ident;
pub mod info;
mod io;
pub mod loader;
pub mod segment;
#[cfg(test)]
mod testing;

pub use error::*;
pub use ident::{ElfIdentity, ImageClass};
pub use io::*;
pub use loader::{load_kernel_image, ElfLoader, EntryPoint, LoadedImage};
