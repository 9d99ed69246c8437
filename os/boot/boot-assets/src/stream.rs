//! Named-stream collaborator backing file-system assets.

use crate::BootError;
use core::convert::Infallible;

/// An open file, read sequentially. Dropping the stream closes it.
pub trait AssetStream {
    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// # Errors
    /// [`BootError::Read`] if the underlying driver fails.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError>;

    /// Move the read position to `position` bytes from the start.
    ///
    /// # Errors
    /// [`BootError::Length`] if the position cannot be reached.
    fn seek(&mut self, position: u64) -> Result<(), BootError>;

    /// Total length in bytes.
    fn size(&self) -> u64;
}

/// Opens streams by path.
pub trait StreamSource {
    type Stream: AssetStream;

    /// # Errors
    /// [`BootError::NotFound`] if there is no such file.
    fn open(&mut self, path: &str) -> Result<Self::Stream, BootError>;
}

impl<T> StreamSource for &mut T
where
    T: StreamSource + ?Sized,
{
    type Stream = T::Stream;

    fn open(&mut self, path: &str) -> Result<Self::Stream, BootError> {
        (**self).open(path)
    }
}

/// Source for flash-only deployments; every open fails.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoFileSystem;

impl StreamSource for NoFileSystem {
    type Stream = Infallible;

    fn open(&mut self, _path: &str) -> Result<Self::Stream, BootError> {
        Err(BootError::NotFound)
    }
}

impl AssetStream for Infallible {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, BootError> {
        match *self {}
    }

    fn seek(&mut self, _position: u64) -> Result<(), BootError> {
        match *self {}
    }

    fn size(&self) -> u64 {
        match *self {}
    }
}
