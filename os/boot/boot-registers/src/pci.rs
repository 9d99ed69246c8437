//! PCI configuration space, type 1 mechanism.

use bitfield_struct::bitfield;

/// Bus/device/function of a PCI function.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PciFunction {
    pub bus: u8,
    /// Device number in bits 7..3, function number in bits 2..0.
    pub dev_fn: u8,
}

impl PciFunction {
    #[must_use]
    pub const fn new(bus: u8, dev_fn: u8) -> Self {
        Self { bus, dev_fn }
    }
}

/// Value written to `CONFIG_ADDRESS` (port `0xCF8`).
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct ConfigAddress {
    #[bits(2)]
    __: u8,

    /// Dword index into the function's configuration space.
    #[bits(6)]
    pub register: u8,

    pub dev_fn: u8,

    pub bus: u8,

    #[bits(7)]
    __: u8,

    /// Bit 31: configuration cycle enable.
    pub enabled: bool,
}

impl ConfigAddress {
    /// Address for the dword containing byte `offset`.
    #[must_use]
    pub const fn for_dword(function: PciFunction, offset: u8) -> Self {
        Self::new()
            .with_enabled(true)
            .with_bus(function.bus)
            .with_dev_fn(function.dev_fn)
            .with_register(offset >> 2)
    }
}

/// Dword access to PCI configuration space.
pub trait PciConfigAccess {
    fn read_dword(&mut self, function: PciFunction, offset: u8) -> u32;
    fn write_dword(&mut self, function: PciFunction, offset: u8, value: u32);
}

impl<T> PciConfigAccess for &mut T
where
    T: PciConfigAccess + ?Sized,
{
    #[inline]
    fn read_dword(&mut self, function: PciFunction, offset: u8) -> u32 {
        (**self).read_dword(function, offset)
    }

    #[inline]
    fn write_dword(&mut self, function: PciFunction, offset: u8, value: u32) {
        (**self).write_dword(function, offset, value);
    }
}

/// Legacy `0xCF8`/`0xCFC` port pair.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug)]
pub struct LegacyConfigPorts {
    _private: (),
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl LegacyConfigPorts {
    const CONFIG_ADDRESS: u16 = 0xCF8;
    const CONFIG_DATA: u16 = 0xCFC;

    /// # Safety
    /// The caller must run with I/O privilege and be the only user of the
    /// configuration ports for the lifetime of the returned value.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn outl(port: u16, val: u32) {
        unsafe {
            core::arch::asm!(
                "out dx, eax",
                in("dx") port,
                in("eax") val,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn inl(port: u16) -> u32 {
        let val: u32;
        unsafe {
            core::arch::asm!(
                "in eax, dx",
                in("dx") port,
                out("eax") val,
                options(nomem, nostack, preserves_flags)
            );
        }
        val
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl PciConfigAccess for LegacyConfigPorts {
    fn read_dword(&mut self, function: PciFunction, offset: u8) -> u32 {
        let address = ConfigAddress::for_dword(function, offset);
        // SAFETY: exclusive port ownership is a precondition of `new`.
        unsafe {
            Self::outl(Self::CONFIG_ADDRESS, address.into_bits());
            Self::inl(Self::CONFIG_DATA)
        }
    }

    fn write_dword(&mut self, function: PciFunction, offset: u8, value: u32) {
        let address = ConfigAddress::for_dword(function, offset);
        // SAFETY: exclusive port ownership is a precondition of `new`.
        unsafe {
            Self::outl(Self::CONFIG_ADDRESS, address.into_bits());
            Self::outl(Self::CONFIG_DATA, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_address_layout() {
        let addr = ConfigAddress::for_dword(PciFunction::new(0, 0x08), 0xD4);
        assert_eq!(addr.into_bits(), 0x8000_08D4);
    }

    #[test]
    fn config_address_drops_byte_offset() {
        let addr = ConfigAddress::for_dword(PciFunction::new(0x12, 0x34), 0x0A);
        assert_eq!(addr.into_bits(), 0x8012_3408);
        assert_eq!(addr.register(), 0x02);
        assert!(addr.enabled());
    }
}
