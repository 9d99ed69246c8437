//! # Signature Verification
//!
//! The boot loader does not implement any cryptography. Signed modules are
//! handed to the validator in the SoC's immutable boot ROM, which was itself
//! authenticated by hardware. The ROM publishes its entry point in a fixed slot
//! just below 4 GiB and expects:
//!
//! 1. the module's [`SecurityHeader`], directly followed by the rest of the
//!    signed image,
//! 2. the OEM public key ([`KeyHeader`]) from the key module in flash,
//! 3. a scratch heap, described by a [`ScratchDescriptor`] at its own start.
//!
//! The scratch heap is a bump allocator without free; it is wiped and its
//! descriptor reinstalled before every call. After a failed call the
//! descriptor's debug and fatal codes tell why.

extern crate alloc;

use crate::BootError;
use crate::platform::{OEM_KEY_ADDRESS, SCRATCH_ARENA_SIZE};
use crate::sbh::{KeyHeader, SBH_SIZE, SecurityHeader};
use alloc::boxed::Box;
use boot_addresses::PhysicalAddress;
use core::mem::size_of;
use log::{debug, error, info};

/// Heap bookkeeping shared with the ROM validator.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct ScratchDescriptor {
    /// First allocatable byte.
    pub heap_start: *mut u8,
    /// One past the last allocatable byte.
    pub heap_end: *mut u8,
    pub next_free: *mut u8,
    /// Progress code, updated as the validator goes along.
    pub debug_code: u32,
    /// Why the validator rejected the module.
    pub fatal_code: u32,
}

/// Fixed-size scratch memory with its descriptor embedded at the start.
#[repr(C, align(8))]
pub struct ScratchArena {
    bytes: [u8; SCRATCH_ARENA_SIZE],
}

impl ScratchArena {
    const HEAP_OFFSET: usize = size_of::<ScratchDescriptor>();

    /// A zeroed arena on the heap, not yet initialized.
    #[must_use]
    pub fn boxed() -> Box<Self> {
        // SAFETY: a byte array is valid for any bit pattern, zero included.
        unsafe { Box::<Self>::new_zeroed().assume_init() }
    }

    /// Wipe the arena and install a fresh descriptor.
    pub fn reset(&mut self) {
        self.bytes.fill(0);

        let base = self.bytes.as_mut_ptr();
        // SAFETY: both offsets are within (or one past) `bytes`.
        let (heap_start, heap_end) =
            unsafe { (base.add(Self::HEAP_OFFSET), base.add(SCRATCH_ARENA_SIZE)) };
        let descriptor = ScratchDescriptor {
            heap_start,
            heap_end,
            next_free: heap_start,
            debug_code: 0,
            fatal_code: 0,
        };

        // SAFETY: the arena is 8-aligned and larger than the descriptor.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            base.cast::<ScratchDescriptor>().write(descriptor);
        }
    }

    /// Pointer handed to the validator.
    #[allow(clippy::cast_ptr_alignment)]
    pub const fn descriptor_ptr(&mut self) -> *mut ScratchDescriptor {
        self.bytes.as_mut_ptr().cast::<ScratchDescriptor>()
    }

    #[must_use]
    pub const fn descriptor(&self) -> ScratchDescriptor {
        // SAFETY: aligned, in bounds, and every bit pattern of the fields is valid.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.bytes.as_ptr().cast::<ScratchDescriptor>().read()
        }
    }

    #[must_use]
    pub const fn debug_code(&self) -> u32 {
        self.descriptor().debug_code
    }

    #[must_use]
    pub const fn fatal_code(&self) -> u32 {
        self.descriptor().fatal_code
    }

    pub fn set_debug_code(&mut self, code: u32) {
        // SAFETY: see `descriptor_ptr`.
        unsafe { (*self.descriptor_ptr()).debug_code = code };
    }

    pub fn set_fatal_code(&mut self, code: u32) {
        // SAFETY: see `descriptor_ptr`.
        unsafe { (*self.descriptor_ptr()).fatal_code = code };
    }

    /// Bytes still available for allocation.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let descriptor = self.descriptor();
        (descriptor.heap_end as usize).saturating_sub(descriptor.next_free as usize)
    }

    /// Bump-allocate `len` bytes aligned to `align`.
    ///
    /// Returns `None` when the arena is exhausted or was never reset.
    pub fn allocate(&mut self, len: usize, align: usize) -> Option<&mut [u8]> {
        if !align.is_power_of_two() {
            return None;
        }

        let base = self.bytes.as_mut_ptr() as usize;
        let descriptor = self.descriptor();
        let next = (descriptor.next_free as usize).checked_sub(base)?;
        if next < Self::HEAP_OFFSET || next > SCRATCH_ARENA_SIZE {
            return None;
        }

        let start = (base + next).checked_next_multiple_of(align)? - base;
        let end = start.checked_add(len)?;
        if end > SCRATCH_ARENA_SIZE {
            return None;
        }

        let next_free = self.bytes.as_mut_ptr().wrapping_add(end);
        // SAFETY: see `descriptor_ptr`.
        unsafe { (*self.descriptor_ptr()).next_free = next_free };
        Some(&mut self.bytes[start..end])
    }
}

/// Signature check of a module against the OEM key.
pub trait TrustedValidator {
    /// Validate `module`, which starts with its security header.
    ///
    /// `scratch` was reset right before the call.
    fn validate(
        &mut self,
        module: &[u8],
        oem_key: *const KeyHeader,
        scratch: &mut ScratchArena,
    ) -> bool;
}

impl<T> TrustedValidator for &mut T
where
    T: TrustedValidator + ?Sized,
{
    fn validate(
        &mut self,
        module: &[u8],
        oem_key: *const KeyHeader,
        scratch: &mut ScratchArena,
    ) -> bool {
        (**self).validate(module, oem_key, scratch)
    }
}

/// Entry point of the boot ROM's module validator.
pub type RomValidateFn = unsafe extern "C" fn(
    security_header: *const SecurityHeader,
    oem_key: *const KeyHeader,
    scratch: *mut ScratchDescriptor,
) -> u8;

/// The boot ROM's validator, called through its published entry point.
#[derive(Debug, Copy, Clone)]
pub struct RomValidator {
    entry: RomValidateFn,
}

impl RomValidator {
    /// Read the entry point from `slot`.
    ///
    /// Returns `None` if the slot is empty.
    ///
    /// # Safety
    /// `slot` must be identity-mapped and, if non-zero, hold the address of a
    /// function with the [`RomValidateFn`] ABI.
    #[must_use]
    pub unsafe fn from_slot(slot: PhysicalAddress) -> Option<Self> {
        let slot = core::ptr::with_exposed_provenance::<u32>(slot.as_usize());
        // SAFETY: the caller guarantees the slot is mapped.
        let raw = unsafe { slot.read_volatile() };
        if raw == 0 {
            return None;
        }

        let entry = core::ptr::with_exposed_provenance::<()>(raw as usize);
        // SAFETY: the caller guarantees the slot holds a RomValidateFn.
        let entry = unsafe { core::mem::transmute::<*const (), RomValidateFn>(entry) };
        Some(Self { entry })
    }

    #[must_use]
    pub const fn from_fn(entry: RomValidateFn) -> Self {
        Self { entry }
    }
}

impl TrustedValidator for RomValidator {
    fn validate(
        &mut self,
        module: &[u8],
        oem_key: *const KeyHeader,
        scratch: &mut ScratchArena,
    ) -> bool {
        let security_header = module.as_ptr().cast::<SecurityHeader>();

        debug!(
            "Calling into boot ROM at {:p} for module at {:p}",
            self.entry as *const (), security_header
        );
        // SAFETY: the module is at least a security header long (checked by
        // the verifier); the key and entry point are platform guarantees.
        unsafe { (self.entry)(security_header, oem_key, scratch.descriptor_ptr()) != 0 }
    }
}

/// Runs the trusted validator over signed images.
pub struct SignatureVerifier<V> {
    validator: V,
    scratch: Box<ScratchArena>,
    oem_key: *const KeyHeader,
}

impl<V> SignatureVerifier<V>
where
    V: TrustedValidator,
{
    #[must_use]
    pub fn new(validator: V) -> Self {
        Self {
            validator,
            scratch: ScratchArena::boxed(),
            oem_key: core::ptr::with_exposed_provenance(OEM_KEY_ADDRESS.as_usize()),
        }
    }

    /// Use the OEM key at `oem_key` instead of the one in the key module.
    #[must_use]
    pub fn with_oem_key(mut self, oem_key: *const KeyHeader) -> Self {
        self.oem_key = oem_key;
        self
    }

    #[must_use]
    pub const fn oem_key(&self) -> *const KeyHeader {
        self.oem_key
    }

    /// Scratch arena of the last verification, for diagnostics.
    #[must_use]
    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    #[must_use]
    pub const fn validator(&self) -> &V {
        &self.validator
    }

    /// Verify a signed image: security header first, payload behind it.
    ///
    /// # Errors
    /// - [`BootError::Length`] if `image` cannot even hold the header.
    /// - [`BootError::Verification`] with the validator's codes on rejection.
    pub fn verify(&mut self, image: &[u8]) -> Result<(), BootError> {
        if image.len() < SBH_SIZE {
            return Err(BootError::Length("signed image shorter than its security header"));
        }

        self.scratch.reset();
        debug!("OEM key at {:p}", self.oem_key);

        let valid = self
            .validator
            .validate(image, self.oem_key, &mut self.scratch);

        let debug_code = self.scratch.debug_code();
        let fatal_code = self.scratch.fatal_code();
        if valid {
            info!("Signature verified (debug_code={debug_code:#x})");
            Ok(())
        } else {
            error!("Signature verification failed: debug_code={debug_code:#x}, fatal_code={fatal_code:#x}");
            Err(BootError::Verification {
                debug_code,
                fatal_code,
            })
        }
    }
}
