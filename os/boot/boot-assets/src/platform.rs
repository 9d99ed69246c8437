//! Fixed addresses and limits of the SoC boot environment.

use crate::sbh::SBH_SIZE;
use boot_addresses::PhysicalAddress;

/// Master flash header in the memory-mapped SPI window.
pub const FLASH_DIRECTORY_BASE: PhysicalAddress = PhysicalAddress::new(0xFFF0_8000);

/// Signed key module; the OEM public key follows its own security header.
pub const KEY_MODULE_BASE: PhysicalAddress = PhysicalAddress::new(0xFFFD_8000);

/// OEM public key, behind the key module's own security header.
#[allow(clippy::cast_possible_truncation)]
pub const OEM_KEY_ADDRESS: PhysicalAddress =
    PhysicalAddress::new(KEY_MODULE_BASE.as_u32() + SBH_SIZE as u32);

/// Slot holding the entry point of the ROM's module validator.
pub const VALIDATOR_SLOT: PhysicalAddress = PhysicalAddress::new(0xFFFF_FFE0);

/// Load address of the protected-mode kernel image.
pub const KERNEL_LOAD_ADDRESS: PhysicalAddress = PhysicalAddress::new(0x0010_0000);

/// Bytes skipped at the start of a signed flash item.
///
/// Flash images pad the security header to this block size. The header's own
/// `header_len` is not consulted for flash reads.
pub const SECURITY_HEADER_SKIP: u32 = 0x400;

/// Scratch memory for SHA-256 / RSA-2048 in the ROM validator.
pub const SCRATCH_ARENA_SIZE: usize = 0x4000;

/// Upper bound for a (signed) boot loader configuration.
pub const CONFIG_BUFFER_SIZE: usize = 0x2000;

/// Extension of the detached security header file next to an asset.
pub const SECURITY_HEADER_EXTENSION: &str = ".csbh";

/// Longest path accepted for a detached security header file.
pub const PATH_MAX: usize = 1024;

/// Real-mode kernel header, from the boot sector through `initrd_addr_max`.
pub const KERNEL_HEADER_SIZE: u32 = 0x230;
