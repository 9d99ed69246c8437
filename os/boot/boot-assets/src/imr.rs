//! # Isolated Memory Regions
//!
//! The memory controller can fence physical ranges so that only selected bus
//! agents may read or write them. Each region has four registers on the eSRAM
//! sideband unit: low bound (with lock bit), high bound, read mask and write
//! mask. Bounds have 1 KiB granularity and the high bound names the last
//! protected granule, so a region always covers one more KiB than
//! `high - low`.
//!
//! The boot loader fences the real-mode boot parameters and the protected-mode
//! kernel image before untrusted data is copied into them.

use crate::BootError;
use bitfield_struct::bitfield;
use boot_addresses::{Granule, PhysicalAddress, Size1K};
use boot_registers::{Opcode, RegisterAccess, SidebandPort};
use log::{debug, warn};

/// Low/high bound register.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct ImrBound {
    #[bits(2)]
    __: u8,

    /// Physical address bits 31..10.
    #[bits(22)]
    pub granule: u32,

    #[bits(7)]
    __: u8,

    /// Bit 31 (low register only): region is locked until reset.
    pub locked: bool,
}

impl ImrBound {
    #[must_use]
    pub const fn for_address(address: PhysicalAddress) -> Self {
        Self::new().with_granule(address.granule_index::<Size1K>())
    }

    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.granule() << Size1K::SHIFT)
    }
}

/// Agent masks.
pub mod mask {
    /// Everything but the reserved bit 30 may read.
    pub const READ_ENABLE_ALL: u32 = 0xBFFF_FFFF;
    pub const WRITE_ENABLE_ALL: u32 = 0xFFFF_FFFF;
    /// Non-SMM host core only.
    pub const NON_SMM: u32 = 0x0000_0001;
    /// Non-SMM host core and its snoops.
    pub const SNOOP_NON_SMM: u32 = 0x4000_0001;
}

/// Smallest region the boot loader will program.
pub const MIN_REGION_SIZE: u32 = Size1K::SIZE;

/// The regions wired up for the boot sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProtectedRegion {
    /// IMR1: real-mode boot parameters and setup code.
    BootParams,
    /// IMR7: protected-mode kernel image.
    KernelImage,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct RegionRegisters {
    low: u8,
    high: u8,
    read_mask: u8,
    write_mask: u8,
}

impl ProtectedRegion {
    /// Region by hardware index.
    ///
    /// # Errors
    /// [`BootError::BadArgument`] for regions not used by the boot loader.
    pub const fn from_id(id: u8) -> Result<Self, BootError> {
        match id {
            1 => Ok(Self::BootParams),
            7 => Ok(Self::KernelImage),
            _ => Err(BootError::BadArgument("unknown memory protection region")),
        }
    }

    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::BootParams => 1,
            Self::KernelImage => 7,
        }
    }

    const fn registers(self) -> RegionRegisters {
        match self {
            Self::BootParams => RegionRegisters {
                low: 0x44,
                high: 0x45,
                read_mask: 0x46,
                write_mask: 0x47,
            },
            Self::KernelImage => RegionRegisters {
                low: 0x5C,
                high: 0x5D,
                read_mask: 0x5E,
                write_mask: 0x5F,
            },
        }
    }
}

/// Whether to set the lock bit after programming.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum LockPolicy {
    /// Later boot stages may still reprogram the region.
    #[default]
    Leave,
    /// Lock until the next reset.
    Lock,
}

/// The physical range covered by a programmed region.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProtectedWindow {
    pub region: ProtectedRegion,
    /// First protected byte.
    pub low: PhysicalAddress,
    /// First byte of the last protected granule.
    pub high: PhysicalAddress,
}

impl ProtectedWindow {
    #[must_use]
    pub fn start(&self) -> u64 {
        self.low.as_u64()
    }

    /// Exclusive end.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.high.as_u64() + u64::from(Size1K::SIZE)
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end() - self.start()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `[address, address + size)` lies inside the window.
    #[must_use]
    pub fn covers(&self, address: PhysicalAddress, size: u32) -> bool {
        address.as_u64() >= self.start() && address.as_u64() + u64::from(size) <= self.end()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProtectOutcome {
    Programmed(ProtectedWindow),
    /// The region was locked by an earlier stage; nothing was written.
    AlreadyLocked,
}

/// Programs isolated memory regions over the sideband bus.
#[derive(Debug)]
pub struct MemoryProtection<R> {
    registers: R,
}

impl<R> MemoryProtection<R>
where
    R: RegisterAccess,
{
    const PORT: SidebandPort = SidebandPort::EmbeddedSram;

    #[must_use]
    pub const fn new(registers: R) -> Self {
        Self { registers }
    }

    #[must_use]
    pub const fn registers(&self) -> &R {
        &self.registers
    }

    pub const fn registers_mut(&mut self) -> &mut R {
        &mut self.registers
    }

    /// Compute the register window for `[address, address + size)`.
    ///
    /// # Errors
    /// [`BootError::BadArgument`] if `size` is below [`MIN_REGION_SIZE`] or
    /// the range leaves the 32-bit address space.
    pub fn window(
        region: ProtectedRegion,
        address: PhysicalAddress,
        size: u32,
    ) -> Result<ProtectedWindow, BootError> {
        if size < MIN_REGION_SIZE {
            return Err(BootError::BadArgument("memory protection size below minimum"));
        }
        let end = address
            .checked_add(size)
            .ok_or(BootError::BadArgument("memory protection range overflows"))?;

        Ok(ProtectedWindow {
            region,
            low: address.align_down::<Size1K>(),
            high: end.align_down::<Size1K>(),
        })
    }

    /// Fence `[address, address + size)` for `region`.
    ///
    /// A region that is already locked is left untouched and reported as
    /// [`ProtectOutcome::AlreadyLocked`]. A region left enabled by an earlier
    /// stage has its masks opened before being reprogrammed.
    ///
    /// # Errors
    /// See [`MemoryProtection::window`].
    pub fn protect(
        &mut self,
        region: ProtectedRegion,
        address: PhysicalAddress,
        size: u32,
        lock: LockPolicy,
    ) -> Result<ProtectOutcome, BootError> {
        let window = Self::window(region, address, size)?;
        debug!(
            "Setting up IMR{} ({region:?}): addr={address}, size={size:#x}",
            region.id()
        );

        let regs = region.registers();
        let current = ImrBound::from_bits(self.read(regs.low));
        if current.locked() {
            warn!("Memory protection region {region:?} is already locked");
            return Ok(ProtectOutcome::AlreadyLocked);
        }

        if current.into_bits() != 0 {
            debug!(
                "Memory protection region {region:?} already in use, starting at {}",
                current.address()
            );
            self.write(regs.read_mask, mask::READ_ENABLE_ALL);
            self.write(regs.write_mask, mask::WRITE_ENABLE_ALL);
        }

        let high = ImrBound::for_address(window.high);
        let low = ImrBound::for_address(window.low);
        self.write(regs.high, high.into_bits());
        debug!("{region:?} high bound {:#010x}", high.into_bits());
        self.write(regs.low, low.into_bits());
        debug!("{region:?} low bound {:#010x}", low.into_bits());

        self.write(regs.read_mask, mask::NON_SMM);
        self.write(regs.write_mask, mask::SNOOP_NON_SMM);

        if lock == LockPolicy::Lock {
            let locked = low.with_locked(true);
            self.write(regs.low, locked.into_bits());
            debug!("{region:?} locked {:#010x}", locked.into_bits());
        }

        Ok(ProtectOutcome::Programmed(window))
    }

    fn read(&mut self, register: u8) -> u32 {
        self.registers.read_register(Self::PORT, Opcode::Read, register)
    }

    fn write(&mut self, register: u8, value: u32) {
        self.registers
            .write_register(Self::PORT, Opcode::Write, register, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_register_format() {
        // (address >> 8) & 0xFF_FFFC
        let bound = ImrBound::for_address(PhysicalAddress::new(0x0010_0400));
        assert_eq!(bound.into_bits(), 0x1004);
        assert_eq!(bound.address().as_u32(), 0x0010_0400);

        let bound = ImrBound::for_address(PhysicalAddress::new(0xFFFF_FC00));
        assert_eq!(bound.into_bits(), 0x00FF_FFFC);

        assert!(ImrBound::from_bits(0x8000_1004).locked());
    }

    #[test]
    fn unaligned_window_covers_request() {
        let window = MemoryProtection::<NoRegisters>::window(
            ProtectedRegion::KernelImage,
            PhysicalAddress::new(0x0010_0401),
            0x500,
        )
        .unwrap();

        assert_eq!(window.low.as_u32(), 0x0010_0400);
        assert_eq!(window.high.as_u32(), 0x0010_0800);
        assert_eq!(window.len() % 1024, 0);
        assert!(window.covers(PhysicalAddress::new(0x0010_0401), 0x500));
    }

    #[test]
    fn window_rejects_small_and_overflowing_ranges() {
        let small = MemoryProtection::<NoRegisters>::window(
            ProtectedRegion::BootParams,
            PhysicalAddress::new(0x9_0000),
            0x3FF,
        );
        assert!(matches!(small, Err(BootError::BadArgument(_))));

        let overflow = MemoryProtection::<NoRegisters>::window(
            ProtectedRegion::BootParams,
            PhysicalAddress::new(0xFFFF_F000),
            0x2000,
        );
        assert!(matches!(overflow, Err(BootError::BadArgument(_))));
    }

    #[test]
    fn region_ids() {
        assert_eq!(ProtectedRegion::from_id(1), Ok(ProtectedRegion::BootParams));
        assert_eq!(ProtectedRegion::from_id(7), Ok(ProtectedRegion::KernelImage));
        assert!(matches!(
            ProtectedRegion::from_id(3),
            Err(BootError::BadArgument(_))
        ));
        for region in [ProtectedRegion::BootParams, ProtectedRegion::KernelImage] {
            assert_eq!(ProtectedRegion::from_id(region.id()), Ok(region));
        }
    }

    struct NoRegisters;

    impl RegisterAccess for NoRegisters {
        fn read_register(&mut self, _: SidebandPort, _: Opcode, _: u8) -> u32 {
            0
        }

        fn write_register(&mut self, _: SidebandPort, _: Opcode, _: u8, _: u32) {}
    }
}
