// Load errors

use thiserror::Error;

/// Every way a kernel image load can fail. All of them are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("kernel image not found")]
    NotFound,
    #[error("i/o error: {0}")]
    Io(#[from] IoError),
    #[error("invalid ELF header")]
    InvalidFormat,
    #[error("unsupported ELF class {0}")]
    UnsupportedFormat(u8),
    #[error("unsupported data encoding {0}, only little-endian images are supported")]
    UnsupportedEncoding(u8),
    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocationError),
    #[error("no loadable program segments found in kernel image")]
    NoLoadableSegments,
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] InvalidParameter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("cannot open image (status {0:#x})")]
    Open(usize),
    #[error("cannot set file position to {0:#x}")]
    Seek(u64),
    #[error("read failed (status {0:#x})")]
    Read(usize),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("cannot close image")]
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("cannot reserve {pages} pages at {address:#x}")]
    Reserve { address: u64, pages: usize },
    #[error("cannot allocate a {0} byte buffer")]
    Buffer(usize),
    #[error("{len:#x} bytes at {address:#x} lie outside any reserved range")]
    OutOfRange { address: u64, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidParameter {
    #[error("no program headers")]
    NoProgramHeaders,
    #[error("program header entry size {0} is too small")]
    EntrySize(u16),
    #[error("program header table of {0:#x} bytes is too large")]
    TableTooLarge(u64),
    #[error("segment {index} has a memory size smaller than its file size")]
    SegmentSize { index: usize },
    #[error("segment {index} wraps around the address space")]
    SegmentOverflow { index: usize },
}

pub type Result<T> = core::result::Result<T, LoadError>;
