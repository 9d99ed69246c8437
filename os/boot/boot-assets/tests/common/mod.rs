#![allow(dead_code)]

use boot_addresses::PhysicalAddress;
use boot_assets::sbh::{KeyHeader, SBH_MAGIC};
use boot_assets::{
    AssetStream, BootError, BootSession, BootSettings, FlashWindow, ItemType, SBH_SIZE,
    ScratchArena, SignatureVerifier, StreamSource, TrustedValidator, platform,
};
use boot_registers::{Opcode, RegisterAccess, SidebandPort};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

pub const DIRECTORY_BASE: u32 = platform::FLASH_DIRECTORY_BASE.as_u32();

/// Flash window backed by a few RAM regions. Reads touching unmapped bytes fail.
#[derive(Debug, Default)]
pub struct RamFlash {
    regions: Vec<(u32, Vec<u8>)>,
    reads: Cell<usize>,
}

impl RamFlash {
    pub fn with_region(mut self, address: u32, bytes: Vec<u8>) -> Self {
        self.regions.push((address, bytes));
        self
    }

    pub fn region_mut(&mut self, address: u32) -> &mut Vec<u8> {
        &mut self
            .regions
            .iter_mut()
            .find(|(base, _)| *base == address)
            .expect("region exists")
            .1
    }

    /// Number of `copy_out` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl FlashWindow for RamFlash {
    fn copy_out(&self, address: PhysicalAddress, buf: &mut [u8]) -> Result<(), BootError> {
        self.reads.set(self.reads.get() + 1);
        let start = address.as_u64();
        let end = start + buf.len() as u64;
        for (base, bytes) in &self.regions {
            let base = u64::from(*base);
            if start >= base && end <= base + bytes.len() as u64 {
                let offset = (start - base) as usize;
                buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
                return Ok(());
            }
        }
        Err(BootError::Length("unmapped flash"))
    }
}

/// A master flash header with the given boot priority count and items.
pub fn directory(priorities: u32, items: &[(ItemType, u32, u32)]) -> Vec<u8> {
    let mut bytes = vec![0u8; 512];
    let words = [
        0x5F4D_4648,
        1,
        0,
        0,
        items.len() as u32,
        priorities,
    ];
    for (i, word) in words.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }

    let mut offset = 24 + 4 * priorities as usize;
    for (item, address, len) in items {
        for word in [item.raw(), *address, *len, 0] {
            bytes[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
            offset += 4;
        }
    }
    bytes
}

/// A security header with valid magic and the given `header_len`.
pub fn security_header(header_len: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; SBH_SIZE];
    bytes[0..4].copy_from_slice(&SBH_MAGIC.to_le_bytes());
    bytes[0x20..0x24].copy_from_slice(&header_len.to_le_bytes());
    bytes[0x40..0x44].copy_from_slice(&256u32.to_le_bytes());
    bytes
}

/// A signed flash item: header padded to the skip block, then the payload.
pub fn signed_item(header_len: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = security_header(header_len);
    bytes.resize(platform::SECURITY_HEADER_SKIP as usize, 0);
    bytes.extend_from_slice(payload);
    bytes
}

/// Deterministic filler so misplaced reads are visible.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7) ^ seed).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Open(String),
    Close(String),
}

/// In-memory file system that logs every open and close.
#[derive(Debug, Default)]
pub struct MemFs {
    files: HashMap<String, Vec<u8>>,
    events: Rc<RefCell<Vec<FsEvent>>>,
}

impl MemFs {
    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    pub fn events(&self) -> Vec<FsEvent> {
        self.events.borrow().clone()
    }
}

impl StreamSource for MemFs {
    type Stream = MemStream;

    fn open(&mut self, path: &str) -> Result<Self::Stream, BootError> {
        let data = self.files.get(path).cloned().ok_or(BootError::NotFound)?;
        self.events.borrow_mut().push(FsEvent::Open(path.to_string()));
        Ok(MemStream {
            path: path.to_string(),
            data,
            position: 0,
            events: Rc::clone(&self.events),
        })
    }
}

#[derive(Debug)]
pub struct MemStream {
    path: String,
    data: Vec<u8>,
    position: usize,
    events: Rc<RefCell<Vec<FsEvent>>>,
}

impl AssetStream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError> {
        let n = buf.len().min(self.data.len() - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn seek(&mut self, position: u64) -> Result<(), BootError> {
        if position > self.data.len() as u64 {
            return Err(BootError::Length("seek beyond end of file"));
        }
        self.position = position as usize;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl Drop for MemStream {
    fn drop(&mut self) {
        self.events
            .borrow_mut()
            .push(FsEvent::Close(self.path.clone()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Read(SidebandPort, u8),
    Write(SidebandPort, u8, u32),
}

/// Sideband registers as plain storage, with an access log.
///
/// Self-clearing registers read back their value once, then zero.
#[derive(Debug, Default)]
pub struct RegisterFile {
    values: HashMap<(u8, u8), u32>,
    self_clearing: HashSet<(u8, u8)>,
    pub log: Vec<RegisterOp>,
}

impl RegisterFile {
    pub fn with_value(mut self, port: SidebandPort, register: u8, value: u32) -> Self {
        self.values.insert((port.id(), register), value);
        self
    }

    pub fn with_self_clearing(mut self, port: SidebandPort, register: u8) -> Self {
        self.self_clearing.insert((port.id(), register));
        self
    }

    pub fn value(&self, port: SidebandPort, register: u8) -> u32 {
        self.values
            .get(&(port.id(), register))
            .copied()
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<(SidebandPort, u8, u32)> {
        self.log
            .iter()
            .filter_map(|op| match *op {
                RegisterOp::Write(port, register, value) => Some((port, register, value)),
                RegisterOp::Read(..) => None,
            })
            .collect()
    }
}

impl RegisterAccess for RegisterFile {
    fn read_register(&mut self, port: SidebandPort, _opcode: Opcode, register: u8) -> u32 {
        self.log.push(RegisterOp::Read(port, register));
        let key = (port.id(), register);
        let value = self.values.get(&key).copied().unwrap_or_default();
        if self.self_clearing.contains(&key) {
            self.values.insert(key, 0);
        }
        value
    }

    fn write_register(&mut self, port: SidebandPort, _opcode: Opcode, register: u8, value: u32) {
        self.log.push(RegisterOp::Write(port, register, value));
        self.values.insert((port.id(), register), value);
    }
}

/// A verification as seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorCall {
    pub image: Vec<u8>,
    pub oem_key: usize,
    pub scratch_was_fresh: bool,
}

/// Validator answering from a script; accepts once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    verdicts: VecDeque<bool>,
    pub calls: Vec<ValidatorCall>,
}

impl ScriptedValidator {
    pub fn rejecting_after(accepted: usize) -> Self {
        let mut verdicts = VecDeque::from(vec![true; accepted]);
        verdicts.push_back(false);
        Self {
            verdicts,
            calls: Vec::new(),
        }
    }
}

pub const REJECT_DEBUG_CODE: u32 = 0x0D0D;
pub const REJECT_FATAL_CODE: u32 = 0x0BAD;

impl TrustedValidator for ScriptedValidator {
    fn validate(
        &mut self,
        module: &[u8],
        oem_key: *const KeyHeader,
        scratch: &mut ScratchArena,
    ) -> bool {
        let descriptor = scratch.descriptor();
        self.calls.push(ValidatorCall {
            image: module.to_vec(),
            oem_key: oem_key.addr(),
            scratch_was_fresh: descriptor.next_free == descriptor.heap_start
                && descriptor.debug_code == 0,
        });

        // Leave something behind that the next reset has to wipe.
        let _ = scratch.allocate(64, 8);
        scratch.set_debug_code(REJECT_DEBUG_CODE);

        let verdict = self.verdicts.pop_front().unwrap_or(true);
        if !verdict {
            scratch.set_fatal_code(REJECT_FATAL_CODE);
        }
        verdict
    }
}

pub type TestSession = BootSession<RamFlash, MemFs, ScriptedValidator, RegisterFile>;

pub fn session(settings: BootSettings, flash: RamFlash, files: MemFs) -> TestSession {
    session_with(settings, flash, files, ScriptedValidator::default())
}

pub fn session_with(
    settings: BootSettings,
    flash: RamFlash,
    files: MemFs,
    validator: ScriptedValidator,
) -> TestSession {
    BootSession::new(
        settings,
        flash,
        files,
        SignatureVerifier::new(validator),
        RegisterFile::default(),
    )
}
