//! # Secure Asset Loading
//!
//! The part of the boot loader that finds, reads and authenticates the boot
//! configuration, kernel and ramdisk, and fences the loaded kernel against
//! DMA before handing over.
//!
//! ## Overview
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`mfh`] | Master flash header: type tag to flash extent. |
//! | [`sbh`] | Secure boot header layout and bounds. |
//! | [`asset`] | One handle over flash extents and file-system streams. |
//! | [`verify`] | Shim over the boot ROM's signature validator and its scratch arena. |
//! | [`imr`] | Isolated memory region programming. |
//! | [`fault`] | Command-line driven fault injection for recovery testing. |
//! | [`session`] | [`BootSession`], which owns all of the above for one boot. |
//!
//! Hardware is reached through three collaborators, so all of this runs
//! against fakes in tests:
//!
//! * [`FlashWindow`] copies bytes out of the memory-mapped flash,
//! * [`StreamSource`] opens files on the boot medium,
//! * [`RegisterAccess`](boot_registers::RegisterAccess) talks to the SoC's
//!   sideband units.
//!
//! ## Features
//!
//! * `fault-injection` (default): arm failure modes from the kernel command
//!   line. Without it every intercept is a no-op on a zero-sized type.
//! * `trace` (default): turn on `boot-trace` port output, used by the
//!   protection fence probe.
//! * `uefi`: [`EfiVolume`](efi_stream::EfiVolume), a [`StreamSource`] over
//!   the firmware's Simple File System protocol.
//!
//! ```rust,no_run
//! use boot_assets::{
//!     AssetKind, AssetSource, BootSession, BootSettings, MappedFlash, NoFileSystem,
//!     RomValidator, SignatureVerifier, platform,
//! };
//! # use boot_registers::{Opcode, RegisterAccess, SidebandPort};
//! # struct Registers;
//! # impl RegisterAccess for Registers {
//! #     fn read_register(&mut self, _: SidebandPort, _: Opcode, _: u8) -> u32 { 0 }
//! #     fn write_register(&mut self, _: SidebandPort, _: Opcode, _: u8, _: u32) {}
//! # }
//!
//! // SAFETY: flash and the validator slot are identity-mapped at this stage.
//! let (flash, validator) = unsafe {
//!     (MappedFlash::new(), RomValidator::from_slot(platform::VALIDATOR_SLOT))
//! };
//! let settings = BootSettings::new().with_source(AssetKind::Kernel, AssetSource::Flash);
//! let mut session = BootSession::new(
//!     settings,
//!     flash,
//!     NoFileSystem,
//!     SignatureVerifier::new(validator.expect("boot ROM validator")),
//!     Registers,
//! );
//! session.detect_secure_mode();
//!
//! let mut kernel = vec![0u8; 0x80_0000];
//! let payload = session.load_verified(AssetKind::Kernel, "", &mut kernel)?;
//! # Ok::<(), boot_assets::BootError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod asset;
#[cfg(feature = "uefi")]
pub mod efi_stream;
mod error;
pub mod fault;
pub mod flash;
pub mod imr;
pub mod mfh;
pub mod platform;
pub mod sbh;
pub mod session;
pub mod settings;
pub mod stream;
pub mod verify;

pub use asset::{Asset, AssetHandle, AssetKind, AssetView};
pub use error::BootError;
pub use fault::{FaultInjector, FaultModes};
pub use flash::{FlashWindow, MappedFlash};
pub use imr::{LockPolicy, MemoryProtection, ProtectOutcome, ProtectedRegion, ProtectedWindow};
pub use mfh::{FlashDirectory, FlashExtent, ItemType};
pub use sbh::{SBH_SIZE, SecureBootHeader};
pub use session::BootSession;
pub use settings::{AssetSource, BootSettings};
pub use stream::{AssetStream, NoFileSystem, StreamSource};
pub use verify::{RomValidator, ScratchArena, SignatureVerifier, TrustedValidator};
