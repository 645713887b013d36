// ELF identity

use crate::{elf::*, error::*, io::*};
use alloc::boxed::Box;
use core::fmt;
use log::{debug, error};

/// Bit width of the image, taken from `e_ident[EI_CLASS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageClass {
    #[default]
    Unknown,
    Class32,
    Class64,
}

impl ImageClass {
    #[inline]
    pub const fn from_ident(class: u8) -> Self {
        match class {
            ELFCLASS32 => Self::Class32,
            ELFCLASS64 => Self::Class64,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ImageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Class32 => write!(f, "32bit"),
            Self::Class64 => write!(f, "64bit"),
        }
    }
}

/// The first [`EI_NIDENT`] bytes of an image.
pub type ElfIdentity = [u8; EI_NIDENT];

/// Reads the identity block from offset 0, leaving the cursor right after it.
pub fn read_identity<F: ImageFile>(file: &mut F) -> Result<Box<ElfIdentity>> {
    debug!("Setting file pointer position to read ELF identity");
    file.seek(0).map_err(|err| {
        error!("Error resetting file pointer position: {}", err);
        err
    })?;

    let mut identity = Box::new([0; EI_NIDENT]);
    read_exact(file, &mut identity[..]).map_err(|err| {
        error!("Error reading kernel identity: {}", err);
        err
    })?;

    Ok(identity)
}

/// Checks magic, class and data encoding, in that order.
pub fn validate_identity(identity: &ElfIdentity) -> Result<ImageClass> {
    if identity[EI_MAG0..EI_MAG0 + 4] != ELFMAG {
        error!("Invalid ELF header");
        return Err(LoadError::InvalidFormat);
    }

    let class = ImageClass::from_ident(identity[EI_CLASS]);
    if class == ImageClass::Unknown {
        error!("Invalid executable class {}", identity[EI_CLASS]);
        return Err(LoadError::UnsupportedFormat(identity[EI_CLASS]));
    }
    debug!("Found {} executable", class);

    if identity[EI_DATA] != ELFDATA2LSB {
        error!("Only LSB ELF executables are currently supported");
        return Err(LoadError::UnsupportedEncoding(identity[EI_DATA]));
    }

    Ok(class)
}
