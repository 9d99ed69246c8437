//! File-system assets through the firmware's Simple File System protocol.

extern crate alloc;

use crate::BootError;
use crate::platform::PATH_MAX;
use crate::stream::{AssetStream, StreamSource};
use alloc::string::String;
use log::{debug, error};
use uefi::CStr16;
use uefi::boot::{self, ScopedProtocol};
use uefi::proto::media::file::{Directory, File, FileAttribute, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;

/// The volume the boot loader image was loaded from.
pub struct EfiVolume {
    _fs: ScopedProtocol<SimpleFileSystem>,
    root: Directory,
}

impl EfiVolume {
    /// Open the root directory of the image's own volume.
    ///
    /// # Errors
    /// [`BootError::NotFound`] if the image has no file system or its volume
    /// cannot be opened.
    pub fn open_image_volume() -> Result<Self, BootError> {
        let mut fs = boot::get_image_file_system(boot::image_handle()).map_err(|e| {
            error!("Failed to get file system: {e:?}");
            BootError::NotFound
        })?;
        let root = fs.open_volume().map_err(|e| {
            error!("Failed to open root directory: {e:?}");
            BootError::NotFound
        })?;
        Ok(Self { _fs: fs, root })
    }
}

impl StreamSource for EfiVolume {
    type Stream = EfiStream;

    fn open(&mut self, path: &str) -> Result<Self::Stream, BootError> {
        let native: String = path
            .chars()
            .map(|c| if c == '/' { '\\' } else { c })
            .collect();

        let mut buf = [0u16; PATH_MAX];
        let name = CStr16::from_str_with_buf(&native, &mut buf)
            .map_err(|_| BootError::BadArgument("path is not representable in UCS-2"))?;

        let handle = self
            .root
            .open(name, FileMode::Read, FileAttribute::empty())
            .map_err(|e| {
                debug!("Failed to open {path}: {e:?}");
                BootError::NotFound
            })?;

        let Some(mut file) = handle.into_regular_file() else {
            error!("Failed to open {path}: not a file");
            return Err(BootError::NotFound);
        };

        // Get file size
        file.set_position(RegularFile::END_OF_FILE)
            .map_err(|_| BootError::Length("cannot seek to end of file"))?;
        let size = file
            .get_position()
            .map_err(|_| BootError::Length("cannot determine file size"))?;
        file.set_position(0)
            .map_err(|_| BootError::Length("cannot seek to start of file"))?;

        debug!("Opened {path} ({size} bytes)");
        Ok(EfiStream { file, size })
    }
}

/// An open regular file. Dropping it closes the file.
pub struct EfiStream {
    file: RegularFile,
    size: u64,
}

impl AssetStream for EfiStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError> {
        let expected = buf.len();
        self.file.read(buf).map_err(|e| {
            error!("Failed to read file contents: {e:?}");
            BootError::Read {
                expected,
                actual: 0,
            }
        })
    }

    fn seek(&mut self, position: u64) -> Result<(), BootError> {
        if position > self.size {
            return Err(BootError::Length("seek beyond end of file"));
        }
        self.file
            .set_position(position)
            .map_err(|_| BootError::Length("cannot seek in file"))
    }

    fn size(&self) -> u64 {
        self.size
    }
}
