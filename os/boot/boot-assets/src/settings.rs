//! Run-time boot configuration.

use crate::asset::AssetKind;
use crate::platform::FLASH_DIRECTORY_BASE;
use boot_addresses::PhysicalAddress;
use boot_registers::{RegisterAccess, detect_secure_sku};
use log::info;

/// Where an asset kind is loaded from.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum AssetSource {
    /// Item in the memory-mapped flash directory.
    Flash,
    /// File on the boot medium.
    #[default]
    FileSystem,
}

/// Settings the boot orchestrator establishes before loading anything.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootSettings {
    /// Every asset must carry a valid security header.
    pub secure: bool,
    /// Physical address of the master flash header.
    pub directory_base: PhysicalAddress,
    pub kernel: AssetSource,
    pub ramdisk: AssetSource,
    pub config: AssetSource,
}

impl Default for BootSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl BootSettings {
    /// Non-secure, everything from the file system.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            secure: false,
            directory_base: FLASH_DIRECTORY_BASE,
            kernel: AssetSource::FileSystem,
            ramdisk: AssetSource::FileSystem,
            config: AssetSource::FileSystem,
        }
    }

    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub const fn with_directory_base(mut self, base: PhysicalAddress) -> Self {
        self.directory_base = base;
        self
    }

    #[must_use]
    pub const fn with_source(mut self, kind: AssetKind, source: AssetSource) -> Self {
        match kind {
            AssetKind::Kernel => self.kernel = source,
            AssetKind::Ramdisk => self.ramdisk = source,
            AssetKind::Config => self.config = source,
        }
        self
    }

    #[must_use]
    pub const fn source(&self, kind: AssetKind) -> AssetSource {
        match kind {
            AssetKind::Kernel => self.kernel,
            AssetKind::Ramdisk => self.ramdisk,
            AssetKind::Config => self.config,
        }
    }

    /// Set [`secure`](Self::secure) from the SoC's SPI ROM fuse.
    #[must_use]
    pub fn detect_secure_mode<R>(mut self, registers: &mut R) -> Self
    where
        R: RegisterAccess + ?Sized,
    {
        self.secure = detect_secure_sku(registers);
        info!("Detected {}secure SKU", if self.secure { "" } else { "non-" });
        self
    }
}
