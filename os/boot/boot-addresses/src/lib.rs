//! # Physical Addresses for a 32-bit Boot Environment
//!
//! Strongly typed wrapper for raw physical addresses as seen by the boot
//! loader on a 32-bit SoC, together with marker types for the alignment
//! granules the loader has to respect.
//!
//! ## Overview
//!
//! Everything the asset loader touches is addressed physically: the
//! memory-mapped flash window near the top of the 4 GiB space, the scratch
//! arena handed to the trusted validator, and the DRAM ranges fenced off by
//! the memory-protection registers. Mixing these up with plain integers (or
//! with lengths) is an easy mistake, so this crate keeps them apart at the
//! type level while remaining a zero-cost `u32` wrapper.
//!
//! | Concept | Description |
//! |---------|-------------|
//! | [`PhysicalAddress`] | A raw 32-bit physical address (DRAM or MMIO). |
//! | [`Granule`] | Marker trait for a power-of-two alignment unit. |
//! | [`Size1K`] | 1 KiB, the granularity of the memory-protection registers. |
//! | [`Size4K`] | 4 KiB, the page size used by the firmware page allocator. |
//!
//! ## Typical Usage
//!
//! ```rust
//! # use boot_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_0401);
//! assert_eq!(pa.align_down::<Size1K>().as_u32(), 0x0010_0400);
//! assert_eq!(pa.align_up::<Size1K>().map(PhysicalAddress::as_u32), Some(0x0010_0800));
//! assert_eq!(pa.offset::<Size1K>(), 0x1);
//! ```
//!
//! ## Design Notes
//!
//! - Arithmetic that can leave the 32-bit space is only offered in checked
//!   form; the flash window sits right below 4 GiB, so wrapping is a real
//!   failure mode rather than a theoretical one.
//! - The granule marker is sealed; alignment units are a property of the
//!   platform, not something callers should invent.

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `Granule` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported alignment granules.
pub trait Granule:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Granule size in bytes (power of two).
    const SIZE: u32;
    /// log2(SIZE), i.e., number of low bits covered by the granule.
    const SHIFT: u32;
}

/// 1 KiB granule (memory-protection register resolution).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size1K;
impl sealed::Sealed for Size1K {}
impl Granule for Size1K {
    const SIZE: u32 = 1024;
    const SHIFT: u32 = 10;
}

/// 4 KiB granule (firmware page size).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl Granule for Size4K {
    const SIZE: u32 = 4096;
    const SHIFT: u32 = 12;
}

/// Physical memory address.
///
/// ### Semantics
/// - Use [`PhysicalAddress::align_down`] / [`PhysicalAddress::align_up`] to
///   snap to a [`Granule`] boundary, [`PhysicalAddress::offset`] for the
///   remainder within the granule.
/// - [`PhysicalAddress::checked_add`] is the only way to move an address;
///   it returns `None` instead of wrapping past 4 GiB.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        u64::from(self.0)
    }

    /// The address as a native pointer-sized integer.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Align down to granule boundary `G`.
    #[inline]
    #[must_use]
    pub const fn align_down<G: Granule>(self) -> Self {
        Self(self.0 & !(G::SIZE - 1))
    }

    /// Align up to granule boundary `G`, or `None` if that leaves the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn align_up<G: Granule>(self) -> Option<Self> {
        match self.0.checked_add(G::SIZE - 1) {
            Some(v) => Some(Self(v & !(G::SIZE - 1))),
            None => None,
        }
    }

    /// The offset of this address within its granule of size `G`.
    #[inline]
    #[must_use]
    pub const fn offset<G: Granule>(self) -> u32 {
        self.0 & (G::SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<G: Granule>(self) -> bool {
        self.offset::<G>() == 0
    }

    /// Index of the granule containing this address.
    #[inline]
    #[must_use]
    pub const fn granule_index<G: Granule>(self) -> u32 {
        self.0 >> G::SHIFT
    }

    /// Checked add of a byte count, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u32) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u32 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers_1k() {
        let a = PhysicalAddress::new(0x0010_0401);
        assert_eq!(a.align_down::<Size1K>().as_u32(), 0x0010_0400);
        assert_eq!(a.align_up::<Size1K>().unwrap().as_u32(), 0x0010_0800);
        assert_eq!(a.offset::<Size1K>(), 0x1);
        assert_eq!(a.granule_index::<Size1K>(), 0x401);
        assert!(!a.is_aligned::<Size1K>());
        assert!(a.align_down::<Size1K>().is_aligned::<Size1K>());
    }

    #[test]
    fn alignment_helpers_4k() {
        let a = PhysicalAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x12000);
        assert_eq!(a.align_up::<Size4K>().unwrap().as_u32(), 0x13000);
        assert_eq!(a.offset::<Size4K>(), 0x345);
    }

    #[test]
    fn aligned_address_is_a_fixed_point() {
        let a = PhysicalAddress::new(0xFFF0_8000);
        assert_eq!(a.align_down::<Size4K>(), a);
        assert_eq!(a.align_up::<Size4K>(), Some(a));
    }

    #[test]
    fn arithmetic_does_not_wrap() {
        let top = PhysicalAddress::new(0xFFFF_FC01);
        assert_eq!(top.align_up::<Size1K>(), None);
        assert_eq!(top.checked_add(0x3FE).map(PhysicalAddress::as_u32), Some(0xFFFF_FFFF));
        assert_eq!(top.checked_add(0x400), None);
    }

    #[test]
    fn formatting() {
        let a = PhysicalAddress::new(0xFFF0_8000);
        assert_eq!(format!("{a}"), "0xFFF08000");
        assert_eq!(format!("{a:?}"), "PA(0xFFF08000)");
        assert_eq!(format!("{a:#x}"), "0xfff08000");
    }
}
