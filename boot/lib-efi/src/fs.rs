// Files on the boot volume

use alloc::{boxed::Box, string::String};
use elfldr::{
    read_exact, transient_buffer, AllocationError, ImageFile, ImageVolume, IoError, LoadError,
};
use log::debug;
use uefi::{
    proto::media::file::{Directory, File, FileAttribute, FileMode, FileType, RegularFile},
    table::boot::BootServices,
    CString16, Handle, Status,
};

/// Firmware paths use `\` as separator. `/` is accepted as well.
pub fn efi_path(path: &str) -> Result<CString16, LoadError> {
    let path = path
        .chars()
        .map(|c| match c {
            '/' => '\\',
            _ => c,
        })
        .collect::<String>();
    CString16::try_from(path.as_str())
        .map_err(|_| IoError::Open(Status::INVALID_PARAMETER.0).into())
}

/// A regular file opened read-only.
pub struct UefiImageFile(RegularFile);

impl UefiImageFile {
    /// Size of the file, found by seeking to its end. Leaves the cursor at 0.
    pub fn size(&mut self) -> Result<u64, IoError> {
        self.0
            .set_position(RegularFile::END_OF_FILE)
            .map_err(|_| IoError::Seek(RegularFile::END_OF_FILE))?;
        let size = self
            .0
            .get_position()
            .map_err(|err| IoError::Read(err.status().0))?;
        self.seek(0)?;
        Ok(size)
    }
}

impl ImageFile for UefiImageFile {
    fn seek(&mut self, offset: u64) -> Result<(), IoError> {
        self.0
            .set_position(offset)
            .map_err(|_| IoError::Seek(offset))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.0
            .read(buf)
            .map_err(|err| IoError::Read(err.status().0))
    }

    fn close(self) -> Result<(), IoError> {
        self.0.close();
        Ok(())
    }
}

/// A directory on a simple file system, usually the volume root.
pub struct UefiVolume(Directory);

impl UefiVolume {
    /// Opens the root of the volume `image` was loaded from.
    pub fn boot_volume(bs: &BootServices, image: Handle) -> uefi::Result<Self> {
        let mut fs = bs.get_image_file_system(image)?;
        fs.open_volume().map(Self)
    }

    /// Reads a whole file. Returns `Ok(None)` when there is no such file.
    pub fn read_file(&mut self, path: &str) -> Result<Option<Box<[u8]>>, LoadError> {
        let mut file = match self.open(path) {
            Ok(file) => file,
            Err(LoadError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };

        let size = file.size()?;
        let size = usize::try_from(size).map_err(|_| AllocationError::Buffer(usize::MAX))?;
        debug!("Reading {} ({} bytes)", path, size);
        let mut buffer = transient_buffer(size)?;
        read_exact(&mut file, &mut buffer)?;
        file.close()?;

        Ok(Some(buffer.into_boxed_slice()))
    }
}

impl ImageVolume for UefiVolume {
    type File = UefiImageFile;

    fn open(&mut self, path: &str) -> Result<UefiImageFile, LoadError> {
        let name = efi_path(path)?;
        let handle = self
            .0
            .open(&name, FileMode::Read, FileAttribute::empty())
            .map_err(|err| {
                if err.status() == Status::NOT_FOUND {
                    LoadError::NotFound
                } else {
                    IoError::Open(err.status().0).into()
                }
            })?;

        match handle
            .into_type()
            .map_err(|err| IoError::Open(err.status().0))?
        {
            FileType::Regular(file) => Ok(UefiImageFile(file)),
            FileType::Dir(_) => Err(IoError::Open(Status::UNSUPPORTED.0).into()),
        }
    }
}
