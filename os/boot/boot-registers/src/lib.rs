//! # SoC Message-Bus Registers
//!
//! Typed access to the registers the boot loader reaches through the SoC's
//! sideband message bus: memory-protection registers in the eSRAM/memory
//! manager unit, the power unit's SPI DMA engine and the security fuse bank.
//!
//! The bus itself is tunnelled through two dwords in the host bridge's PCI
//! configuration space. [`SidebandBus`] implements that transport on top of
//! any [`PciConfigAccess`]; everything above it only sees [`RegisterAccess`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod fuse;
pub mod pci;
pub mod sideband;

pub use fuse::detect_secure_sku;
pub use pci::{ConfigAddress, PciConfigAccess, PciFunction};
pub use sideband::{SidebandBus, SidebandCommand};

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub use pci::LegacyConfigPorts;

/// Destination unit of a sideband message.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SidebandPort {
    /// Host bridge unit.
    HostUnit = 0x03,
    /// Power management unit, owner of the SPI DMA engine.
    PowerUnit = 0x04,
    /// eSRAM / memory manager, owner of the isolated memory regions.
    EmbeddedSram = 0x05,
    /// Security fuse banks.
    SecurityFuse = 0x33,
}

/// Message opcode.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    FuseRead = 0x06,
    Read = 0x10,
    Write = 0x11,
}

impl SidebandPort {
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }
}

impl Opcode {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Opaque 32-bit register read/write on a sideband unit.
pub trait RegisterAccess {
    fn read_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8) -> u32;
    fn write_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8, value: u32);
}

impl<T> RegisterAccess for &mut T
where
    T: RegisterAccess + ?Sized,
{
    #[inline]
    fn read_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8) -> u32 {
        (**self).read_register(port, opcode, register)
    }

    #[inline]
    fn write_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8, value: u32) {
        (**self).write_register(port, opcode, register, value);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegisterError {
    #[error("sideband host bridge not found on bus {bus}")]
    DeviceNotFound { bus: u8 },
}
