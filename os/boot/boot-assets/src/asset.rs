//! # Asset Access
//!
//! One handle type over two storage models: a file on the boot medium, or an
//! extent in the memory-mapped flash window. Callers read, seek and size an
//! asset the same way regardless of where it lives.
//!
//! Signed flash items start with a security header padded to
//! [`SECURITY_HEADER_SKIP`] bytes. For the payload view the handle hides that
//! block: reads start behind it, seeks are in payload units and the size
//! excludes it. The header view reads from the very start of the item.
//!
//! On the file system the header is a detached file next to the asset, named
//! by appending [`SECURITY_HEADER_EXTENSION`].

extern crate alloc;

use crate::BootError;
use crate::flash::FlashWindow;
use crate::mfh::{FlashDirectory, FlashExtent, ItemType};
use crate::platform::{
    KERNEL_HEADER_SIZE, PATH_MAX, SECURITY_HEADER_EXTENSION, SECURITY_HEADER_SKIP,
};
use crate::sbh::SBH_SIZE;
use crate::settings::BootSettings;
use crate::stream::AssetStream;
use alloc::string::String;
use log::{debug, error};

/// The assets the boot loader loads.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AssetKind {
    Kernel,
    Ramdisk,
    Config,
}

/// Which part of an asset a handle exposes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AssetView {
    /// The asset data, behind any security header.
    Payload,
    /// The security header in front of (or next to) the asset.
    SecurityHeader,
}

/// An asset kind together with the view to open.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Asset {
    pub kind: AssetKind,
    pub view: AssetView,
}

impl Asset {
    pub const KERNEL: Self = Self::payload(AssetKind::Kernel);
    pub const RAMDISK: Self = Self::payload(AssetKind::Ramdisk);
    pub const CONFIG: Self = Self::payload(AssetKind::Config);
    pub const KERNEL_HEADER: Self = Self::security_header(AssetKind::Kernel);
    pub const RAMDISK_HEADER: Self = Self::security_header(AssetKind::Ramdisk);
    pub const CONFIG_HEADER: Self = Self::security_header(AssetKind::Config);

    #[must_use]
    pub const fn payload(kind: AssetKind) -> Self {
        Self {
            kind,
            view: AssetView::Payload,
        }
    }

    #[must_use]
    pub const fn security_header(kind: AssetKind) -> Self {
        Self {
            kind,
            view: AssetView::SecurityHeader,
        }
    }
}

/// Flash item tags and size floor of an asset kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AssetProfile {
    pub unsigned: ItemType,
    pub signed: ItemType,
    /// Smallest acceptable item length, not counting a security header.
    pub min_len: u32,
}

impl AssetKind {
    #[must_use]
    pub const fn profile(self) -> AssetProfile {
        match self {
            Self::Kernel => AssetProfile {
                unsigned: ItemType::KERNEL,
                signed: ItemType::KERNEL_SIGNED,
                min_len: KERNEL_HEADER_SIZE,
            },
            Self::Ramdisk => AssetProfile {
                unsigned: ItemType::RAMDISK,
                signed: ItemType::RAMDISK_SIGNED,
                min_len: 0,
            },
            Self::Config => AssetProfile {
                unsigned: ItemType::BOOTLOADER_CONFIG,
                signed: ItemType::BOOTLOADER_CONFIG_SIGNED,
                min_len: 0,
            },
        }
    }
}

/// A flash item resolved for reading.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResolvedItem {
    pub extent: FlashExtent,
    /// The unsigned item was missing and its signed variant stands in.
    pub signed_fallback: bool,
    /// Bytes hidden in front of the payload.
    pub skip: u32,
}

/// Find the flash item for `kind` and sanity check its extent.
///
/// The unsigned tag is tried first. Outside of secure mode a missing unsigned
/// item is retried once with the signed tag.
///
/// # Errors
/// - Whatever [`FlashDirectory::lookup`] reports.
/// - [`BootError::Length`] if the item is shorter than the kind's minimum
///   (plus a security header in secure mode), wraps the address space, or
///   cannot hold the skipped header block.
pub fn resolve_flash_item<F>(
    directory: &mut FlashDirectory,
    flash: &F,
    settings: &BootSettings,
    kind: AssetKind,
) -> Result<ResolvedItem, BootError>
where
    F: FlashWindow + ?Sized,
{
    let profile = kind.profile();
    let base = settings.directory_base;

    let (extent, signed_fallback) = match directory.lookup(flash, base, profile.unsigned) {
        Ok(extent) => (extent, false),
        Err(BootError::NotFound) if !settings.secure => {
            debug!("no {:?} item, trying {:?}", profile.unsigned, profile.signed);
            (directory.lookup(flash, base, profile.signed)?, true)
        }
        Err(e) => return Err(e),
    };

    // SBH_SIZE is a small compile-time constant.
    #[allow(clippy::cast_possible_truncation)]
    let header_floor = if settings.secure { SBH_SIZE as u32 } else { 0 };
    let min_len = profile.min_len + header_floor;
    if extent.len < min_len || extent.wraps() {
        error!(
            "flash item at {} with len={:#x} is outside the accepted range",
            extent.address, extent.len
        );
        return Err(BootError::Length("flash item size is outside the accepted range"));
    }

    let skip = if settings.secure || signed_fallback {
        SECURITY_HEADER_SKIP
    } else {
        0
    };
    if skip > extent.len {
        error!("flash item len={:#x} cannot hold a security header", extent.len);
        return Err(BootError::Length("flash item shorter than its security header"));
    }

    Ok(ResolvedItem {
        extent,
        signed_fallback,
        skip,
    })
}

/// Path of the detached security header for an asset path.
///
/// Only the first whitespace-separated token of `path` names the file; the
/// rest of a kernel line is its command line.
///
/// # Errors
/// [`BootError::Length`] if the resulting path would exceed the path limit.
pub fn security_header_path(path: &str) -> Result<String, BootError> {
    let file = path.split_whitespace().next().unwrap_or_default();
    if file.len() + SECURITY_HEADER_EXTENSION.len() >= PATH_MAX {
        error!("path to security header file is too long");
        return Err(BootError::Length("path to security header file is too long"));
    }

    let mut header_path = String::with_capacity(file.len() + SECURITY_HEADER_EXTENSION.len());
    header_path.push_str(file);
    header_path.push_str(SECURITY_HEADER_EXTENSION);
    Ok(header_path)
}

enum Backing<'a, F: ?Sized, S> {
    Flash {
        window: &'a F,
        item: ResolvedItem,
        /// Offset from the start of the item, header block included.
        cursor: u32,
    },
    Stream(S),
}

/// An open asset. Dropping the handle closes it.
pub struct AssetHandle<'a, F: ?Sized, S> {
    asset: Asset,
    backing: Backing<'a, F, S>,
}

impl<'a, F, S> AssetHandle<'a, F, S>
where
    F: FlashWindow + ?Sized,
    S: AssetStream,
{
    pub(crate) const fn from_flash(asset: Asset, window: &'a F, item: ResolvedItem) -> Self {
        Self {
            asset,
            backing: Backing::Flash {
                window,
                item,
                cursor: item.skip,
            },
        }
    }

    pub(crate) const fn from_stream(asset: Asset, stream: S) -> Self {
        Self {
            asset,
            backing: Backing::Stream(stream),
        }
    }

    #[must_use]
    pub const fn asset(&self) -> Asset {
        self.asset
    }

    #[must_use]
    pub const fn is_flash(&self) -> bool {
        matches!(self.backing, Backing::Flash { .. })
    }

    /// Whether a signed flash item was accepted in place of a missing unsigned one.
    #[must_use]
    pub const fn is_signed_fallback(&self) -> bool {
        match &self.backing {
            Backing::Flash { item, .. } => item.signed_fallback,
            Backing::Stream(_) => false,
        }
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Flash payload reads advance the cursor and stop at the end of the item.
    /// Flash header reads always copy from the start of the item.
    ///
    /// # Errors
    /// Propagates flash window and stream failures.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError> {
        let view = self.asset.view;
        match &mut self.backing {
            Backing::Flash {
                window,
                item,
                cursor,
            } => {
                let start = match view {
                    AssetView::Payload => *cursor,
                    AssetView::SecurityHeader => 0,
                };
                let available = item.extent.len - start;
                let len = u32::try_from(buf.len()).map_or(available, |len| len.min(available));
                let address = item
                    .extent
                    .address
                    .checked_add(start)
                    .ok_or(BootError::Length("flash read wraps the address space"))?;

                // `len` never exceeds `buf.len()`.
                let dst = &mut buf[..len as usize];
                window.copy_out(address, dst)?;

                if view == AssetView::Payload {
                    *cursor += len;
                }
                Ok(dst.len())
            }
            Backing::Stream(stream) => stream.read(buf),
        }
    }

    /// Fill `buf` completely.
    ///
    /// # Errors
    /// [`BootError::Read`] if the asset ends first.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), BootError> {
        let expected = buf.len();
        let mut filled = self.read(buf)?;

        // Header views restart at the item base on every read.
        if let Backing::Stream(stream) = &mut self.backing {
            while filled < expected {
                let n = stream.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
        }

        if filled == expected {
            Ok(())
        } else {
            Err(BootError::Read {
                expected,
                actual: filled,
            })
        }
    }

    /// Move to `offset` bytes into the payload.
    ///
    /// # Errors
    /// [`BootError::Length`] if `offset` lies beyond the end of a flash item.
    pub fn seek(&mut self, offset: u64) -> Result<(), BootError> {
        match &mut self.backing {
            Backing::Flash { item, cursor, .. } => {
                let target = u64::from(item.skip) + offset;
                if target > u64::from(item.extent.len) {
                    return Err(BootError::Length("seek beyond end of flash item"));
                }
                // Bounded by the u32 item length above.
                *cursor = u32::try_from(target)
                    .map_err(|_| BootError::Length("seek beyond end of flash item"))?;
                Ok(())
            }
            Backing::Stream(stream) => stream.seek(offset),
        }
    }

    /// Payload length: the item length less the skipped header block, or the file length.
    #[must_use]
    pub fn size(&self) -> u64 {
        match &self.backing {
            Backing::Flash { item, .. } => u64::from(item.extent.len - item.skip),
            Backing::Stream(stream) => stream.size(),
        }
    }

    pub fn close(self) {}
}
