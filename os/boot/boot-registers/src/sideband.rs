//! Message bus transport over the host bridge's configuration space.

use crate::pci::{PciConfigAccess, PciFunction};
use crate::{Opcode, RegisterAccess, RegisterError, SidebandPort};
use bitfield_struct::bitfield;

/// Message control register (MCR) word.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SidebandCommand {
    #[bits(4)]
    __: u8,

    /// Byte enables; all four lanes for 32-bit transfers.
    #[bits(4, default = 0xF)]
    pub byte_enable: u8,

    pub register: u8,

    pub port: u8,

    pub opcode: u8,
}

impl SidebandCommand {
    #[must_use]
    pub const fn compose(opcode: Opcode, port: SidebandPort, register: u8) -> Self {
        Self::new()
            .with_opcode(opcode.code())
            .with_port(port.id())
            .with_register(register)
    }
}

/// [`RegisterAccess`] over the host bridge's MCR/MDR configuration dwords.
#[derive(Debug)]
pub struct SidebandBus<C> {
    config: C,
    bridge: PciFunction,
}

impl<C> SidebandBus<C>
where
    C: PciConfigAccess,
{
    /// Config offset of the message control register.
    pub const MCR_OFFSET: u8 = 0xD0;
    /// Config offset of the message data register.
    pub const MDR_OFFSET: u8 = 0xD4;

    pub const VENDOR_INTEL: u16 = 0x8086;
    pub const DEVICE_HOST_BRIDGE: u16 = 0x0958;

    pub const fn new(config: C, bridge: PciFunction) -> Self {
        Self { config, bridge }
    }

    /// Scan bus 0 for the SoC host bridge and bind to it.
    ///
    /// # Errors
    /// [`RegisterError::DeviceNotFound`] if no function on bus 0 reports the
    /// host bridge's vendor/device pair.
    pub fn probe(mut config: C) -> Result<Self, RegisterError> {
        const BUS: u8 = 0;
        for dev_fn in 0..u8::MAX {
            let function = PciFunction::new(BUS, dev_fn);

            let [_, _, class_lo, class_hi] = config.read_dword(function, 0x08).to_le_bytes();
            if u16::from_le_bytes([class_lo, class_hi]) == 0xFFFF {
                continue;
            }

            let [v0, v1, d0, d1] = config.read_dword(function, 0x00).to_le_bytes();
            let vendor = u16::from_le_bytes([v0, v1]);
            let device = u16::from_le_bytes([d0, d1]);
            if vendor == Self::VENDOR_INTEL && device == Self::DEVICE_HOST_BRIDGE {
                return Ok(Self::new(config, function));
            }
        }

        Err(RegisterError::DeviceNotFound { bus: BUS })
    }

    #[must_use]
    pub const fn bridge(&self) -> PciFunction {
        self.bridge
    }

    pub const fn config(&self) -> &C {
        &self.config
    }
}

impl<C> RegisterAccess for SidebandBus<C>
where
    C: PciConfigAccess,
{
    fn read_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8) -> u32 {
        let command = SidebandCommand::compose(opcode, port, register);
        self.config
            .write_dword(self.bridge, Self::MCR_OFFSET, command.into_bits());
        self.config.read_dword(self.bridge, Self::MDR_OFFSET)
    }

    fn write_register(&mut self, port: SidebandPort, opcode: Opcode, register: u8, value: u32) {
        let command = SidebandCommand::compose(opcode, port, register);
        self.config.write_dword(self.bridge, Self::MDR_OFFSET, value);
        self.config
            .write_dword(self.bridge, Self::MCR_OFFSET, command.into_bits());
    }
}
