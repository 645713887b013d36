//! UEFI side of the kernel loader
//!
//! Binds the collaborator traits of `elfldr` to the firmware: files come from
//! the simple file system protocol, physical pages from boot services.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod fs;
mod memory;

pub use fs::*;
pub use memory::*;

use elfldr::{IoError, LoadError};
use uefi::Status;

/// Status reported to the firmware for a failed load.
pub trait LoadErrorExt {
    fn status(&self) -> Status;
}

impl LoadErrorExt for LoadError {
    fn status(&self) -> Status {
        match self {
            LoadError::NotFound => Status::NOT_FOUND,
            LoadError::Io(IoError::Open(status)) | LoadError::Io(IoError::Read(status)) => {
                Status(*status)
            }
            LoadError::Io(_) => Status::DEVICE_ERROR,
            LoadError::InvalidFormat => Status::INVALID_PARAMETER,
            LoadError::UnsupportedFormat(_) => Status::UNSUPPORTED,
            LoadError::UnsupportedEncoding(_) => Status::INCOMPATIBLE_VERSION,
            LoadError::Allocation(_) => Status::OUT_OF_RESOURCES,
            LoadError::NoLoadableSegments => Status::NOT_FOUND,
            LoadError::InvalidParameter(_) => Status::INVALID_PARAMETER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elfldr::{AllocationError, InvalidParameter};

    #[test]
    fn status_mapping() {
        assert_eq!(LoadError::NotFound.status(), Status::NOT_FOUND);
        assert_eq!(LoadError::InvalidFormat.status(), Status::INVALID_PARAMETER);
        assert_eq!(
            LoadError::UnsupportedFormat(3).status(),
            Status::UNSUPPORTED
        );
        assert_eq!(
            LoadError::UnsupportedEncoding(2).status(),
            Status::INCOMPATIBLE_VERSION
        );
        assert_eq!(LoadError::NoLoadableSegments.status(), Status::NOT_FOUND);
        assert_eq!(
            LoadError::from(InvalidParameter::NoProgramHeaders).status(),
            Status::INVALID_PARAMETER
        );
        assert_eq!(
            LoadError::from(AllocationError::Reserve {
                address: 0x10_0000,
                pages: 1
            })
            .status(),
            Status::OUT_OF_RESOURCES
        );
        assert_eq!(
            LoadError::from(AllocationError::Buffer(16)).status(),
            Status::OUT_OF_RESOURCES
        );
    }

    #[test]
    fn io_errors_keep_firmware_status() {
        assert_eq!(
            LoadError::from(IoError::Read(Status::VOLUME_CORRUPTED.0)).status(),
            Status::VOLUME_CORRUPTED
        );
        assert_eq!(
            LoadError::from(IoError::ShortRead {
                expected: 16,
                actual: 3
            })
            .status(),
            Status::DEVICE_ERROR
        );
        assert_eq!(
            LoadError::from(IoError::Seek(0)).status(),
            Status::DEVICE_ERROR
        );
    }
}
