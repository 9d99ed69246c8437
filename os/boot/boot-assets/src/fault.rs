//! # Fault Injection
//!
//! Self-test hooks that make the boot loader fail in controlled ways, so that
//! recovery paths can be exercised on real hardware. They are armed by a
//! kernel command line token:
//!
//! ```text
//! __cln_drive_failure=no-kernel,ramdisk-sig-verification
//! ```
//!
//! Two intercept points exist. Opening an asset can be made to fail as if the
//! asset were missing. Signature verification can be made to fail for the
//! kernel or the ramdisk; verifications are told apart by their position in
//! the boot sequence (configuration, then kernel, then ramdisk).
//!
//! Without the `fault-injection` feature [`FaultInjector`] is a zero-sized
//! type whose intercepts compile to nothing.

use crate::asset::{Asset, AssetKind, AssetView};
use bitfield_struct::bitfield;
use log::warn;

/// Command line token prefix that arms the harness.
pub const DIRECTIVE: &str = "__cln_drive_failure=";

/// Requested failure modes.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct FaultModes {
    /// `no-kernel`: the kernel cannot be opened.
    pub no_kernel: bool,
    /// `no-ramdisk`: the ramdisk cannot be opened.
    pub no_ramdisk: bool,
    /// `no-kernel-signature`: the kernel's security header cannot be opened.
    pub no_kernel_signature: bool,
    /// `no-ramdisk-signature`: the ramdisk's security header cannot be opened.
    pub no_ramdisk_signature: bool,
    /// `kernel-sig-verification`: the kernel signature is rejected.
    pub kernel_signature_fails: bool,
    /// `ramdisk-sig-verification`: the ramdisk signature is rejected.
    pub ramdisk_signature_fails: bool,
    /// `bad-imr`: DMA into a protected region to prove the fence holds.
    pub bad_imr: bool,
    #[bits(1)]
    __: u8,
}

impl FaultModes {
    /// Modes requested on `cmdline`.
    ///
    /// Only the first directive token counts. Unknown modes are logged and
    /// ignored.
    #[must_use]
    pub fn parse(cmdline: &str) -> Self {
        let mut modes = Self::new();
        let Some(list) = cmdline
            .split_whitespace()
            .find_map(|token| token.strip_prefix(DIRECTIVE))
        else {
            return modes;
        };

        for mode in list.split(',').filter(|mode| !mode.is_empty()) {
            match mode {
                "no-kernel" => modes.set_no_kernel(true),
                "no-ramdisk" => modes.set_no_ramdisk(true),
                "no-kernel-signature" => modes.set_no_kernel_signature(true),
                "no-ramdisk-signature" => modes.set_no_ramdisk_signature(true),
                "kernel-sig-verification" => modes.set_kernel_signature_fails(true),
                "ramdisk-sig-verification" => modes.set_ramdisk_signature_fails(true),
                "bad-imr" => modes.set_bad_imr(true),
                unknown => warn!("Ignoring unknown fault injection mode '{unknown}'"),
            }
        }
        modes
    }

    /// Whether opening `asset` is forced to fail.
    #[must_use]
    pub const fn blocks(self, asset: Asset) -> bool {
        match (asset.kind, asset.view) {
            (AssetKind::Kernel, AssetView::Payload) => self.no_kernel(),
            (AssetKind::Ramdisk, AssetView::Payload) => self.no_ramdisk(),
            (AssetKind::Kernel, AssetView::SecurityHeader) => self.no_kernel_signature(),
            (AssetKind::Ramdisk, AssetView::SecurityHeader) => self.no_ramdisk_signature(),
            (AssetKind::Config, _) => false,
        }
    }
}

/// Position of a signature verification in the boot sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VerifyStage {
    Config,
    Kernel,
    Ramdisk,
    /// Anything verified after the ramdisk.
    Other,
}

impl VerifyStage {
    #[must_use]
    pub const fn from_ordinal(ordinal: u32) -> Self {
        match ordinal {
            0 => Self::Config,
            1 => Self::Kernel,
            2 => Self::Ramdisk,
            _ => Self::Other,
        }
    }
}

#[cfg(feature = "fault-injection")]
pub use armed::FaultInjector;

#[cfg(not(feature = "fault-injection"))]
pub use disarmed::FaultInjector;

#[cfg(feature = "fault-injection")]
mod armed {
    use super::{FaultModes, VerifyStage, spi_dma};
    use crate::BootError;
    use crate::asset::Asset;
    use boot_addresses::PhysicalAddress;
    use boot_registers::RegisterAccess;
    use boot_trace::boot_trace;
    use log::{error, info, warn};

    /// Intercepts asset opens and signature checks.
    #[derive(Debug, Default)]
    pub struct FaultInjector {
        modes: FaultModes,
        verifications: u32,
    }

    impl FaultInjector {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                modes: FaultModes::new(),
                verifications: 0,
            }
        }

        /// Arm the modes requested on `cmdline`.
        pub fn arm(&mut self, cmdline: &str) {
            self.modes = FaultModes::parse(cmdline);
            if self.modes.into_bits() != 0 {
                info!("Fault injection armed: {:?}", self.modes);
            }
        }

        #[must_use]
        pub const fn modes(&self) -> FaultModes {
            self.modes
        }

        /// Number of signature verifications seen so far.
        #[must_use]
        pub const fn verifications(&self) -> u32 {
            self.verifications
        }

        /// Called before any asset lookup.
        ///
        /// # Errors
        /// [`BootError::NotFound`] if a mode blocks `asset`.
        pub fn intercept_open(&self, asset: Asset) -> Result<(), BootError> {
            if self.modes.blocks(asset) {
                warn!("Fault injection: {asset:?} reported missing");
                return Err(BootError::NotFound);
            }
            Ok(())
        }

        /// Called at the start of every verification; `true` forces a rejection.
        pub fn intercept_verify(&mut self) -> bool {
            let stage = VerifyStage::from_ordinal(self.verifications);
            self.verifications = self.verifications.saturating_add(1);

            let fail = match stage {
                VerifyStage::Kernel => self.modes.kernel_signature_fails(),
                VerifyStage::Ramdisk => self.modes.ramdisk_signature_fails(),
                VerifyStage::Config | VerifyStage::Other => false,
            };
            if fail {
                warn!("Fault injection: rejecting {stage:?} signature");
            }
            fail
        }

        #[must_use]
        pub const fn protection_probe_requested(&self) -> bool {
            self.modes.bad_imr()
        }

        /// With `bad-imr` armed, DMA one block from `source` into `scratch`,
        /// then into the protected `target`. The second transfer should make
        /// the memory controller reset the platform; returning means it did
        /// not. Returns whether the probe ran.
        pub fn probe_protection<R>(
            &self,
            registers: &mut R,
            source: PhysicalAddress,
            scratch: PhysicalAddress,
            target: PhysicalAddress,
        ) -> bool
        where
            R: RegisterAccess + ?Sized,
        {
            if !self.protection_probe_requested() {
                return false;
            }

            spi_dma::read_blocks(registers, source, scratch, 1);
            boot_trace!(
                "power unit DMA of {}B into scratch buffer at {scratch} passed\n",
                spi_dma::BLOCK_SIZE
            );

            boot_trace!(
                "power unit DMA of {}B into protected region at {target}\n",
                spi_dma::BLOCK_SIZE
            );
            spi_dma::read_blocks(registers, source, target, 1);
            error!("BUG: power unit DMA into protected region at {target} did not fail");
            true
        }
    }
}

/// SPI DMA engine of the power unit.
#[cfg(feature = "fault-injection")]
pub mod spi_dma {
    use boot_addresses::PhysicalAddress;
    use boot_registers::{Opcode, RegisterAccess, SidebandPort};
    use log::debug;

    /// Remaining blocks; writing it starts the transfer.
    pub const COUNT_REGISTER: u8 = 0x60;
    pub const DESTINATION_REGISTER: u8 = 0x61;
    pub const SOURCE_REGISTER: u8 = 0x62;

    /// Transfer unit in bytes.
    pub const BLOCK_SIZE: usize = 512;

    /// Copy `blocks` blocks from `source` to `destination` and wait for completion.
    ///
    /// Polls the count register without a timeout.
    pub fn read_blocks<R>(
        registers: &mut R,
        source: PhysicalAddress,
        destination: PhysicalAddress,
        blocks: u32,
    ) where
        R: RegisterAccess + ?Sized,
    {
        debug!("SPI DMA: src={source}, dst={destination}, count={blocks}");

        let port = SidebandPort::PowerUnit;
        registers.write_register(port, Opcode::Write, SOURCE_REGISTER, source.as_u32());
        registers.write_register(port, Opcode::Write, DESTINATION_REGISTER, destination.as_u32());
        registers.write_register(port, Opcode::Write, COUNT_REGISTER, blocks);

        let mut remaining = blocks;
        while remaining > 0 {
            remaining = registers.read_register(port, Opcode::Read, COUNT_REGISTER);
        }
        debug!("SPI DMA: transaction completed");
    }
}

#[cfg(not(feature = "fault-injection"))]
mod disarmed {
    use super::FaultModes;
    use crate::BootError;
    use crate::asset::Asset;
    use boot_addresses::PhysicalAddress;
    use boot_registers::RegisterAccess;

    /// Stand-in when the harness is compiled out; every intercept passes.
    #[derive(Debug, Default)]
    pub struct FaultInjector;

    impl FaultInjector {
        #[must_use]
        pub const fn new() -> Self {
            Self
        }

        #[inline]
        pub fn arm(&mut self, _cmdline: &str) {}

        #[must_use]
        pub const fn modes(&self) -> FaultModes {
            FaultModes::new()
        }

        #[must_use]
        pub const fn verifications(&self) -> u32 {
            0
        }

        /// # Errors
        /// Never fails.
        #[inline]
        pub const fn intercept_open(&self, _asset: Asset) -> Result<(), BootError> {
            Ok(())
        }

        #[inline]
        pub const fn intercept_verify(&mut self) -> bool {
            false
        }

        #[must_use]
        pub const fn protection_probe_requested(&self) -> bool {
            false
        }

        #[inline]
        pub fn probe_protection<R>(
            &self,
            _registers: &mut R,
            _source: PhysicalAddress,
            _scratch: PhysicalAddress,
            _target: PhysicalAddress,
        ) -> bool
        where
            R: RegisterAccess + ?Sized,
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exact_modes() {
        let modes = FaultModes::parse(
            "console=ttyS1 __cln_drive_failure=no-kernel-signature,bad-imr quiet",
        );
        assert!(modes.no_kernel_signature());
        assert!(modes.bad_imr());
        // No substring matching: "no-kernel-signature" does not imply "no-kernel".
        assert!(!modes.no_kernel());
        assert!(!modes.kernel_signature_fails());
    }

    #[test]
    fn parse_ignores_unknown_and_missing_directive() {
        assert_eq!(FaultModes::parse("root=/dev/ram0").into_bits(), 0);
        assert_eq!(
            FaultModes::parse("__cln_drive_failure=bogus,,no-ramdisk").into_bits(),
            FaultModes::new().with_no_ramdisk(true).into_bits()
        );
    }

    #[test]
    fn blocked_views() {
        let modes = FaultModes::new().with_no_kernel(true);
        assert!(modes.blocks(Asset::KERNEL));
        assert!(!modes.blocks(Asset::KERNEL_HEADER));
        assert!(!modes.blocks(Asset::RAMDISK));

        let modes = FaultModes::new().with_no_ramdisk_signature(true);
        assert!(modes.blocks(Asset::RAMDISK_HEADER));
        assert!(!modes.blocks(Asset::CONFIG_HEADER));
    }

    #[cfg(feature = "fault-injection")]
    #[test]
    fn verification_order_is_config_kernel_ramdisk() {
        let mut injector = FaultInjector::new();
        injector.arm("__cln_drive_failure=ramdisk-sig-verification");

        assert!(!injector.intercept_verify(), "config");
        assert!(!injector.intercept_verify(), "kernel");
        assert!(injector.intercept_verify(), "ramdisk");
        assert!(!injector.intercept_verify(), "anything after");
        assert_eq!(injector.verifications(), 4);
    }
}
