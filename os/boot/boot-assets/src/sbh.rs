//! # Secure Boot Header
//!
//! Every signed module starts with a security header: a 64-byte security
//! sub-header, the RSA-2048 public key it was signed with, and the signature.
//! The layout is consumed as-is by the ROM validator, so these structures are
//! `#[repr(C)]` and must not change.
//!
//! ```text
//! 0x000  SecurityHeader  magic "_CSH", sizes, anti-rollback, header_len, ...
//! 0x040  KeyHeader       modulus size, exponent size, modulus[256], exponent[4]
//! 0x14C  signature[256]
//! 0x24C
//! ```
//!
//! Until the validator accepted the module, every field is attacker-controlled;
//! [`SecureBootHeader::payload_offset`] bounds `header_len` before it is used.

use crate::BootError;
use core::mem::size_of;
use core::ptr::read_unaligned;

/// `"_CSH"` in ASCII.
pub const SBH_MAGIC: u32 = 0x5F43_5348;

/// Size of the complete header structure.
pub const SBH_SIZE: usize = size_of::<SecureBootHeader>();

const RSA_MODULUS_WORDS: usize = 256 / size_of::<u32>();
const RSA_EXPONENT_WORDS: usize = 4 / size_of::<u32>();
const SIGNATURE_SIZE: usize = 0x100;

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SecurityHeader {
    pub magic: u32,
    pub version: u32,
    pub module_size: u32,
    pub svn_index: u32,
    pub svn: u32,
    pub module_id: u32,
    pub module_vendor: u32,
    pub date: u32,
    /// Bytes in front of the payload, this header included.
    pub header_len: u32,
    pub hashing_algorithm: u32,
    pub crypto_algorithm: u32,
    pub key_size: u32,
    pub signature_size: u32,
    pub next_header: u32,
    pub reserved: [u8; 8],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KeyHeader {
    pub modulus_size: u32,
    pub exponent_size: u32,
    pub modulus: [u32; RSA_MODULUS_WORDS],
    pub exponent: [u32; RSA_EXPONENT_WORDS],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SecureBootHeader {
    pub security: SecurityHeader,
    pub key: KeyHeader,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl SecureBootHeader {
    /// Read a header from the start of `bytes` and check its magic.
    ///
    /// # Errors
    /// - [`BootError::Read`] if `bytes` is shorter than the header.
    /// - [`BootError::Format`] on a magic mismatch.
    pub fn parse(bytes: &[u8]) -> Result<Self, BootError> {
        if bytes.len() < SBH_SIZE {
            return Err(BootError::Read {
                expected: SBH_SIZE,
                actual: bytes.len(),
            });
        }

        // SAFETY: We just checked bounds; using read_unaligned to avoid alignment assumptions.
        let header = unsafe { read_unaligned(bytes.as_ptr().cast::<Self>()) };
        if header.security.magic != SBH_MAGIC {
            return Err(BootError::Format("invalid security header"));
        }

        Ok(header)
    }

    /// The header as laid out in memory.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) of u32 and u8 arrays only, no padding bytes.
        unsafe { core::slice::from_raw_parts((&raw const *self).cast::<u8>(), SBH_SIZE) }
    }

    /// Offset of the payload behind this header in a buffer of `capacity` bytes.
    ///
    /// # Errors
    /// [`BootError::Length`] if `header_len` is smaller than the header itself
    /// or does not fit `capacity`.
    pub fn payload_offset(&self, capacity: usize) -> Result<usize, BootError> {
        let header_len = usize::try_from(self.security.header_len)
            .map_err(|_| BootError::Length("security header length out of range"))?;
        if header_len < SBH_SIZE {
            return Err(BootError::Length("security header length below header size"));
        }
        if header_len > capacity {
            return Err(BootError::Length("security header length exceeds buffer"));
        }
        Ok(header_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(header_len: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; SBH_SIZE];
        bytes[0..4].copy_from_slice(&SBH_MAGIC.to_le_bytes());
        bytes[0x20..0x24].copy_from_slice(&header_len.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(&256u32.to_le_bytes());
        bytes[0x14C] = 0xA5;
        bytes
    }

    #[test]
    fn layout_matches_rom_abi() {
        assert_eq!(size_of::<SecurityHeader>(), 0x40);
        assert_eq!(size_of::<KeyHeader>(), 0x10C);
        assert_eq!(SBH_SIZE, 0x24C);
    }

    #[test]
    fn parse_reads_fields_at_fixed_offsets() {
        let header = SecureBootHeader::parse(&header_bytes(0x400)).unwrap();
        assert_eq!(header.security.header_len, 0x400);
        assert_eq!(header.key.modulus_size, 256);
        assert_eq!(header.signature[0], 0xA5);
        assert_eq!(header.as_bytes(), header_bytes(0x400).as_slice());
    }

    #[test]
    fn parse_rejects_bad_magic_and_short_input() {
        let mut bytes = header_bytes(0x400);
        assert_eq!(
            SecureBootHeader::parse(&bytes[..0x100]),
            Err(BootError::Read {
                expected: 0x24C,
                actual: 0x100
            })
        );

        bytes[0] ^= 0xFF;
        assert_eq!(
            SecureBootHeader::parse(&bytes),
            Err(BootError::Format("invalid security header"))
        );
    }

    #[test]
    fn payload_offset_is_bounded() {
        let header = SecureBootHeader::parse(&header_bytes(0x400)).unwrap();
        assert_eq!(header.payload_offset(0x2000), Ok(0x400));
        assert!(matches!(header.payload_offset(0x3FF), Err(BootError::Length(_))));

        let header = SecureBootHeader::parse(&header_bytes(0x10)).unwrap();
        assert!(matches!(header.payload_offset(0x2000), Err(BootError::Length(_))));
    }
}
