use boot_registers::{
    Opcode, PciConfigAccess, PciFunction, RegisterAccess, RegisterError, SidebandBus,
    SidebandPort, detect_secure_sku,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read(PciFunction, u8),
    Write(PciFunction, u8, u32),
}

/// Configuration space that remembers every access and answers reads from a
/// table; unpopulated functions read as all-ones.
#[derive(Debug, Default)]
struct FakeConfigSpace {
    dwords: HashMap<(u8, u8, u8), u32>,
    log: Vec<Access>,
}

impl FakeConfigSpace {
    fn with_device(mut self, dev_fn: u8, vendor: u16, device: u16) -> Self {
        self.dwords
            .insert((0, dev_fn, 0x00), u32::from(device) << 16 | u32::from(vendor));
        self.dwords.insert((0, dev_fn, 0x08), 0x0600_0000);
        self
    }
}

impl PciConfigAccess for FakeConfigSpace {
    fn read_dword(&mut self, function: PciFunction, offset: u8) -> u32 {
        self.log.push(Access::Read(function, offset));
        self.dwords
            .get(&(function.bus, function.dev_fn, offset))
            .copied()
            .unwrap_or(u32::MAX)
    }

    fn write_dword(&mut self, function: PciFunction, offset: u8, value: u32) {
        self.log.push(Access::Write(function, offset, value));
        self.dwords
            .insert((function.bus, function.dev_fn, offset), value);
    }
}

#[test]
fn probe_finds_host_bridge() {
    let config = FakeConfigSpace::default()
        .with_device(0x08, 0x8086, 0x1234)
        .with_device(0x10, 0x8086, 0x0958);

    let bus = SidebandBus::probe(config).expect("host bridge present");
    assert_eq!(bus.bridge(), PciFunction::new(0, 0x10));
}

#[test]
fn probe_skips_other_vendors() {
    let config = FakeConfigSpace::default().with_device(0x00, 0x1022, 0x0958);
    let err = SidebandBus::probe(config).unwrap_err();
    assert_eq!(err, RegisterError::DeviceNotFound { bus: 0 });
}

#[test]
fn write_sends_data_before_command() {
    let bridge = PciFunction::new(0, 0);
    let mut bus = SidebandBus::new(FakeConfigSpace::default(), bridge);

    bus.write_register(SidebandPort::EmbeddedSram, Opcode::Write, 0x45, 0x0000_1008);

    assert_eq!(
        bus.config().log,
        vec![
            Access::Write(bridge, 0xD4, 0x0000_1008),
            Access::Write(bridge, 0xD0, 0x1105_45F0),
        ]
    );
}

#[test]
fn read_sends_command_before_data() {
    let bridge = PciFunction::new(0, 0);
    let mut config = FakeConfigSpace::default();
    config.dwords.insert((0, 0, 0xD4), 0xCAFE_F00D);
    let mut bus = SidebandBus::new(config, bridge);

    let value = bus.read_register(SidebandPort::PowerUnit, Opcode::Read, 0x60);

    assert_eq!(value, 0xCAFE_F00D);
    assert_eq!(
        bus.config().log,
        vec![
            Access::Write(bridge, 0xD0, 0x1004_60F0),
            Access::Read(bridge, 0xD4),
        ]
    );
}

#[test]
fn secure_sku_follows_spi_rom_fuse() {
    let bridge = PciFunction::new(0, 0);

    let mut config = FakeConfigSpace::default();
    config.dwords.insert((0, 0, 0xD4), 0x0000_0010);
    let mut bus = SidebandBus::new(config, bridge);
    assert!(detect_secure_sku(&mut bus));
    assert_eq!(
        bus.config().log.first(),
        Some(&Access::Write(bridge, 0xD0, 0x0633_25F0))
    );

    let mut config = FakeConfigSpace::default();
    config.dwords.insert((0, 0, 0xD4), 0xFFFF_FFEF);
    let mut bus = SidebandBus::new(config, bridge);
    assert!(!detect_secure_sku(&mut bus));
}
