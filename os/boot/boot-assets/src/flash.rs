//! Access to the memory-mapped flash window.

use crate::BootError;
use boot_addresses::PhysicalAddress;

/// Byte-addressable view of flash contents by physical address.
pub trait FlashWindow {
    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    ///
    /// # Errors
    /// [`BootError::Length`] if the range leaves the 32-bit address space or
    /// the window.
    fn copy_out(&self, address: PhysicalAddress, buf: &mut [u8]) -> Result<(), BootError>;
}

impl<T> FlashWindow for &T
where
    T: FlashWindow + ?Sized,
{
    #[inline]
    fn copy_out(&self, address: PhysicalAddress, buf: &mut [u8]) -> Result<(), BootError> {
        (**self).copy_out(address, buf)
    }
}

/// The SPI flash as mapped below 4 GiB by the SoC, read with plain loads.
#[derive(Debug)]
pub struct MappedFlash {
    _private: (),
}

impl MappedFlash {
    /// # Safety
    /// Physical addresses must be identity-mapped and every address a caller
    /// passes to [`FlashWindow::copy_out`] must be readable memory.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl FlashWindow for MappedFlash {
    fn copy_out(&self, address: PhysicalAddress, buf: &mut [u8]) -> Result<(), BootError> {
        let len = u32::try_from(buf.len())
            .map_err(|_| BootError::Length("flash read exceeds address space"))?;
        // Ending exactly at 4 GiB is fine.
        if address.as_u64() + u64::from(len) > 1 << 32 {
            return Err(BootError::Length("flash read wraps the address space"));
        }

        let src = core::ptr::with_exposed_provenance::<u8>(address.as_usize());
        // SAFETY: identity mapping and readability are preconditions of `new`;
        // the range was checked not to wrap and `buf` cannot alias flash.
        unsafe {
            core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }
}
