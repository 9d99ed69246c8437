//! # Master Flash Header
//!
//! The flash image starts with a 512-byte master header: a short fixed prefix,
//! a boot priority list of `boot_prio_list_count` dwords, then
//! `flash_item_count` item descriptors of 16 bytes each. Every item maps a type
//! tag to an absolute address and length in the memory-mapped flash window.
//!
//! [`FlashDirectory`] caches the header after the first lookup and scans the
//! item table linearly. Type tags are unique within one directory, so the
//! first match is the match.

use crate::BootError;
use crate::flash::FlashWindow;
use boot_addresses::PhysicalAddress;
use core::fmt;
use core::mem::size_of;
use core::ptr::read_unaligned;
use log::{debug, error};

/// `"_MFH"` in ASCII.
pub const MFH_IDENTIFIER: u32 = 0x5F4D_4648;

/// Size of the master header, item table included.
pub const MFH_SIZE: usize = 512;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct MasterHeaderPrefix {
    identifier: u32,
    version: u32,
    flags: u32,
    next_header_block: u32,
    flash_item_count: u32,
    boot_prio_list_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct RawFlashItem {
    item_type: u32,
    address: u32,
    len: u32,
    reserved: u32,
}

/// Flash item type tag.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ItemType(u32);

impl ItemType {
    pub const FW_STAGE1: Self = Self(0x00);
    pub const FW_STAGE1_SIGNED: Self = Self(0x01);
    pub const FW_STAGE2: Self = Self(0x03);
    pub const FW_STAGE2_SIGNED: Self = Self(0x04);
    pub const FW_STAGE2_CONFIG: Self = Self(0x05);
    pub const FW_STAGE2_CONFIG_SIGNED: Self = Self(0x06);
    pub const FW_PARAMS: Self = Self(0x07);
    pub const FW_RECOVERY: Self = Self(0x08);
    pub const FW_RECOVERY_SIGNED: Self = Self(0x09);
    pub const BOOTLOADER: Self = Self(0x0B);
    pub const BOOTLOADER_SIGNED: Self = Self(0x0C);
    pub const BOOTLOADER_CONFIG: Self = Self(0x0D);
    pub const BOOTLOADER_CONFIG_SIGNED: Self = Self(0x0E);
    pub const KERNEL: Self = Self(0x10);
    pub const KERNEL_SIGNED: Self = Self(0x11);
    pub const RAMDISK: Self = Self(0x12);
    pub const RAMDISK_SIGNED: Self = Self(0x13);
    pub const LOADABLE_PROGRAM: Self = Self(0x15);
    pub const LOADABLE_PROGRAM_SIGNED: Self = Self(0x16);
    /// Text dump of the flash layout the image was built from.
    pub const BUILD_INFO: Self = Self(0x18);

    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::FW_STAGE1 => "FW_STAGE1",
            Self::FW_STAGE1_SIGNED => "FW_STAGE1_SIGNED",
            Self::FW_STAGE2 => "FW_STAGE2",
            Self::FW_STAGE2_SIGNED => "FW_STAGE2_SIGNED",
            Self::FW_STAGE2_CONFIG => "FW_STAGE2_CONFIG",
            Self::FW_STAGE2_CONFIG_SIGNED => "FW_STAGE2_CONFIG_SIGNED",
            Self::FW_PARAMS => "FW_PARAMS",
            Self::FW_RECOVERY => "FW_RECOVERY",
            Self::FW_RECOVERY_SIGNED => "FW_RECOVERY_SIGNED",
            Self::BOOTLOADER => "BOOTLOADER",
            Self::BOOTLOADER_SIGNED => "BOOTLOADER_SIGNED",
            Self::BOOTLOADER_CONFIG => "BOOTLOADER_CONFIG",
            Self::BOOTLOADER_CONFIG_SIGNED => "BOOTLOADER_CONFIG_SIGNED",
            Self::KERNEL => "KERNEL",
            Self::KERNEL_SIGNED => "KERNEL_SIGNED",
            Self::RAMDISK => "RAMDISK",
            Self::RAMDISK_SIGNED => "RAMDISK_SIGNED",
            Self::LOADABLE_PROGRAM => "LOADABLE_PROGRAM",
            Self::LOADABLE_PROGRAM_SIGNED => "LOADABLE_PROGRAM_SIGNED",
            Self::BUILD_INFO => "BUILD_INFO",
            _ => return None,
        })
    }
}

impl fmt::Debug for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "ItemType({:#x})", self.0),
        }
    }
}

/// Location of a flash item in the memory-mapped window.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashExtent {
    pub address: PhysicalAddress,
    pub len: u32,
}

impl FlashExtent {
    #[must_use]
    pub const fn new(address: PhysicalAddress, len: u32) -> Self {
        Self { address, len }
    }

    /// Exclusive end address, widened so that an end at 4 GiB is representable.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.address.as_u64() + u64::from(self.len)
    }

    /// Whether the extent runs past the top of the 32-bit address space.
    #[must_use]
    pub fn wraps(&self) -> bool {
        self.end() > 1 << 32
    }
}

/// Cached master flash header.
pub struct FlashDirectory {
    cache: [u8; MFH_SIZE],
    loaded: bool,
}

impl Default for FlashDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashDirectory {
    /// Offset of the boot priority list inside the header.
    const PRIORITY_LIST_OFFSET: usize = size_of::<MasterHeaderPrefix>();

    #[must_use]
    pub const fn new() -> Self {
        Self {
            cache: [0; MFH_SIZE],
            loaded: false,
        }
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Drop the cached header; the next lookup reloads it.
    pub const fn invalidate(&mut self) {
        self.loaded = false;
    }

    /// Resolve `item` to its extent.
    ///
    /// The header is copied from `base` on first use only; later calls keep
    /// using the cached copy regardless of `base` until it is invalidated.
    ///
    /// # Errors
    /// - [`BootError::BadArgument`] for a null `base`.
    /// - [`BootError::Format`] if the identifier does not match or the item
    ///   table does not fit the header; the cache is invalidated.
    /// - [`BootError::NotFound`] if no item carries the requested tag.
    pub fn lookup<F>(
        &mut self,
        flash: &F,
        base: PhysicalAddress,
        item: ItemType,
    ) -> Result<FlashExtent, BootError>
    where
        F: FlashWindow + ?Sized,
    {
        if base == PhysicalAddress::zero() {
            return Err(BootError::BadArgument("null flash directory address"));
        }

        if !self.loaded {
            flash.copy_out(base, &mut self.cache)?;
            self.loaded = true;
        }

        // SAFETY: the cache is larger than the prefix; read_unaligned has no alignment requirement.
        let prefix = unsafe { read_unaligned(self.cache.as_ptr().cast::<MasterHeaderPrefix>()) };
        if prefix.identifier != MFH_IDENTIFIER {
            self.loaded = false;
            error!("invalid flash header identifier {:#010x}", prefix.identifier);
            return Err(BootError::Format("invalid flash header identifier"));
        }

        let Some((table, count)) = Self::item_table(&prefix) else {
            self.loaded = false;
            error!(
                "flash item table does not fit the header ({} priorities, {} items)",
                prefix.boot_prio_list_count, prefix.flash_item_count
            );
            return Err(BootError::Format("flash item table exceeds header"));
        };

        for i in 0..count {
            let off = table + i * size_of::<RawFlashItem>();
            // SAFETY: `item_table` bounded the whole table by the cache size.
            let raw =
                unsafe { read_unaligned(self.cache.as_ptr().add(off).cast::<RawFlashItem>()) };
            if raw.item_type == item.raw() {
                let extent = FlashExtent::new(PhysicalAddress::new(raw.address), raw.len);
                debug!(
                    "found flash item {item:?} at {}, len={:#x}",
                    extent.address, extent.len
                );
                return Ok(extent);
            }
        }

        debug!("flash item {item:?} not found");
        Err(BootError::NotFound)
    }

    /// Start offset and entry count of the item table, if it fits the header.
    fn item_table(prefix: &MasterHeaderPrefix) -> Option<(usize, usize)> {
        let priorities = usize::try_from(prefix.boot_prio_list_count).ok()?;
        let count = usize::try_from(prefix.flash_item_count).ok()?;

        let table = priorities
            .checked_mul(size_of::<u32>())?
            .checked_add(Self::PRIORITY_LIST_OFFSET)?;
        let end = count
            .checked_mul(size_of::<RawFlashItem>())?
            .checked_add(table)?;

        (end <= MFH_SIZE).then_some((table, count))
    }

    /// Version and flags of the cached header, if loaded and valid.
    #[must_use]
    pub fn header_info(&self) -> Option<(u32, u32)> {
        if !self.loaded {
            return None;
        }
        // SAFETY: see `lookup`.
        let prefix = unsafe { read_unaligned(self.cache.as_ptr().cast::<MasterHeaderPrefix>()) };
        (prefix.identifier == MFH_IDENTIFIER).then_some((prefix.version, prefix.flags))
    }
}
