//! Security fuse bank.

use crate::{Opcode, RegisterAccess, SidebandPort};

/// Fuse bank 0 register holding `spi_rom_fuse_in`.
pub const SPI_ROM_FUSE_REGISTER: u8 = 0x25;

/// `spi_rom_fuse_in` bit within [`SPI_ROM_FUSE_REGISTER`].
pub const SPI_ROM_FUSE_MASK: u32 = 0x0000_0010;

/// Whether the part is a secure-boot SKU.
///
/// The SPI ROM fuse is blown on parts that only boot signed images.
pub fn detect_secure_sku<R>(registers: &mut R) -> bool
where
    R: RegisterAccess + ?Sized,
{
    let fuses = registers.read_register(
        SidebandPort::SecurityFuse,
        Opcode::FuseRead,
        SPI_ROM_FUSE_REGISTER,
    );
    fuses & SPI_ROM_FUSE_MASK != 0
}
