//! # Boot Session
//!
//! Everything the asset loader keeps between calls lives in one
//! [`BootSession`]: the settings, the cached flash directory, the verifier with
//! its scratch arena, the memory-protection registers and the fault injector.
//! The orchestrator creates it once and drives the sequence through it:
//!
//! 1. configuration ([`BootSession::load_config`]),
//! 2. kernel and ramdisk ([`BootSession::load_verified`]),
//! 3. fences around what was loaded ([`BootSession::protect`]).
//!
//! Only one asset handle can be open at a time; it borrows the session.

extern crate alloc;

use crate::BootError;
use crate::asset::{
    Asset, AssetHandle, AssetKind, AssetView, resolve_flash_item, security_header_path,
};
use crate::fault::FaultInjector;
use crate::flash::FlashWindow;
use crate::imr::{LockPolicy, MemoryProtection, ProtectOutcome, ProtectedRegion};
use crate::mfh::{FlashDirectory, FlashExtent, ItemType};
use crate::platform::{CONFIG_BUFFER_SIZE, KERNEL_LOAD_ADDRESS};
use crate::sbh::{SBH_SIZE, SecureBootHeader};
use crate::settings::{AssetSource, BootSettings};
use crate::stream::StreamSource;
use crate::verify::{SignatureVerifier, TrustedValidator};
use alloc::vec;
use alloc::vec::Vec;
use boot_addresses::PhysicalAddress;
use boot_registers::RegisterAccess;
use core::ops::Range;
use log::{debug, error, info};

/// Loader state for one boot attempt.
pub struct BootSession<F, S, V, R> {
    settings: BootSettings,
    flash: F,
    files: S,
    directory: FlashDirectory,
    verifier: SignatureVerifier<V>,
    protection: MemoryProtection<R>,
    faults: FaultInjector,
}

impl<F, S, V, R> BootSession<F, S, V, R>
where
    F: FlashWindow,
    S: StreamSource,
    V: TrustedValidator,
    R: RegisterAccess,
{
    #[must_use]
    pub fn new(
        settings: BootSettings,
        flash: F,
        files: S,
        verifier: SignatureVerifier<V>,
        registers: R,
    ) -> Self {
        Self {
            settings,
            flash,
            files,
            directory: FlashDirectory::new(),
            verifier,
            protection: MemoryProtection::new(registers),
            faults: FaultInjector::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &BootSettings {
        &self.settings
    }

    /// Changing the directory base does not drop an already cached directory.
    pub const fn settings_mut(&mut self) -> &mut BootSettings {
        &mut self.settings
    }

    /// Read the secure-SKU fuse into the settings.
    pub fn detect_secure_mode(&mut self) -> bool {
        self.settings = self
            .settings
            .detect_secure_mode(self.protection.registers_mut());
        self.settings.secure
    }

    /// Arm fault injection from the kernel command line.
    ///
    /// Call before the first asset is opened.
    pub fn arm_faults(&mut self, cmdline: &str) {
        self.faults.arm(cmdline);
    }

    #[must_use]
    pub const fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    #[must_use]
    pub const fn verifier(&self) -> &SignatureVerifier<V> {
        &self.verifier
    }

    #[must_use]
    pub const fn flash(&self) -> &F {
        &self.flash
    }

    #[must_use]
    pub const fn files(&self) -> &S {
        &self.files
    }

    pub const fn protection_mut(&mut self) -> &mut MemoryProtection<R> {
        &mut self.protection
    }

    /// Look up a raw flash item in the directory.
    ///
    /// # Errors
    /// See [`FlashDirectory::lookup`].
    pub fn lookup(&mut self, item: ItemType) -> Result<FlashExtent, BootError> {
        let base = self.settings.directory_base;
        self.directory.lookup(&self.flash, base, item)
    }

    /// Open `asset` from the source configured for its kind.
    ///
    /// Only that one source is tried. `path` names the file for file-system
    /// assets; a security-header view opens the detached `.csbh` file next to
    /// it. Flash assets ignore `path`.
    ///
    /// # Errors
    /// - [`BootError::NotFound`] if the asset does not exist (or fault
    ///   injection says so).
    /// - [`BootError::Length`] if a flash item fails its size checks.
    /// - [`BootError::Format`] for a corrupt flash directory.
    pub fn open(
        &mut self,
        asset: Asset,
        path: &str,
    ) -> Result<AssetHandle<'_, F, S::Stream>, BootError> {
        self.faults.intercept_open(asset)?;

        match self.settings.source(asset.kind) {
            AssetSource::Flash => {
                let item = resolve_flash_item(
                    &mut self.directory,
                    &self.flash,
                    &self.settings,
                    asset.kind,
                )?;
                debug!(
                    "opened {asset:?} from flash at {}, len={:#x}, skip={:#x}",
                    item.extent.address, item.extent.len, item.skip
                );
                Ok(AssetHandle::from_flash(asset, &self.flash, item))
            }
            AssetSource::FileSystem => {
                let stream = match asset.view {
                    AssetView::Payload => self.files.open(path)?,
                    AssetView::SecurityHeader => {
                        self.files.open(&security_header_path(path)?)?
                    }
                };
                debug!("opened {asset:?} from file system");
                Ok(AssetHandle::from_stream(asset, stream))
            }
        }
    }

    /// Read and check the security header of `kind`.
    ///
    /// The handle is closed on every path.
    ///
    /// # Errors
    /// - Whatever [`BootSession::open`] reports for the header view.
    /// - [`BootError::Read`] if fewer than a header's worth of bytes exist.
    /// - [`BootError::Format`] on a magic mismatch.
    pub fn fetch_security_header(
        &mut self,
        kind: AssetKind,
        path: &str,
    ) -> Result<SecureBootHeader, BootError> {
        let mut handle = self.open(Asset::security_header(kind), path)?;
        let mut raw = [0u8; SBH_SIZE];
        let read = handle.read_exact(&mut raw);
        handle.close();

        if let Err(e) = read {
            error!("Failed to read security header of {kind:?}: {e}");
            return Err(e);
        }
        SecureBootHeader::parse(&raw)
    }

    /// Verify a signed image (security header followed by its payload).
    ///
    /// Verifications are expected in boot order: configuration, kernel,
    /// ramdisk.
    ///
    /// # Errors
    /// [`BootError::Verification`] if the validator rejects the image.
    pub fn verify(&mut self, image: &[u8]) -> Result<(), BootError> {
        if self.faults.intercept_verify() {
            return Err(BootError::Verification {
                debug_code: 0,
                fatal_code: 0,
            });
        }
        self.verifier.verify(image)
    }

    /// Load `kind` into `dest` and, in secure mode, verify it.
    ///
    /// In secure mode the security header is placed at the front of `dest`,
    /// followed by zeros up to its `header_len`, followed by the payload; the
    /// whole region is then verified. Outside of secure mode the payload
    /// starts at the front of `dest` and nothing is verified.
    ///
    /// Returns the range of the payload within `dest`.
    ///
    /// # Errors
    /// - [`BootError::Length`] if the header or payload does not fit `dest`.
    /// - Errors of [`BootSession::fetch_security_header`],
    ///   [`BootSession::open`] and [`BootSession::verify`].
    pub fn load_verified(
        &mut self,
        kind: AssetKind,
        path: &str,
        dest: &mut [u8],
    ) -> Result<Range<usize>, BootError> {
        let offset = if self.settings.secure {
            let header = self.fetch_security_header(kind, path)?;
            let offset = header.payload_offset(dest.len())?;
            dest[..SBH_SIZE].copy_from_slice(header.as_bytes());
            dest[SBH_SIZE..offset].fill(0);
            offset
        } else {
            0
        };

        let mut handle = self.open(Asset::payload(kind), path)?;
        let capacity = dest.len() - offset;
        let Some(len) = usize::try_from(handle.size())
            .ok()
            .filter(|len| *len <= capacity)
        else {
            error!(
                "{kind:?} of {} bytes does not fit {capacity} bytes behind its header",
                handle.size()
            );
            handle.close();
            return Err(BootError::Length("asset does not fit its buffer"));
        };

        let payload = offset..offset + len;
        let read = handle.read_exact(&mut dest[payload.clone()]);
        handle.close();
        read?;

        if self.settings.secure {
            self.verify(&dest[..payload.end])?;
        }
        info!("Loaded {kind:?}: {len} bytes");
        Ok(payload)
    }

    /// Load the boot loader configuration into `buf`.
    ///
    /// At most [`CONFIG_BUFFER_SIZE`] bytes of `buf` are used. The returned
    /// text excludes the security header.
    ///
    /// # Errors
    /// See [`BootSession::load_verified`].
    pub fn load_config<'b>(
        &mut self,
        path: &str,
        buf: &'b mut [u8],
    ) -> Result<&'b [u8], BootError> {
        let capacity = buf.len().min(CONFIG_BUFFER_SIZE);
        let payload = self.load_verified(AssetKind::Config, path, &mut buf[..capacity])?;
        Ok(&buf[payload])
    }

    /// Fence `[address, address + size)` against DMA, leaving the region unlocked.
    ///
    /// # Errors
    /// [`BootError::BadArgument`] for a size below the protection granule or
    /// a range leaving the address space.
    pub fn protect(
        &mut self,
        region: ProtectedRegion,
        address: PhysicalAddress,
        size: u32,
    ) -> Result<ProtectOutcome, BootError> {
        self.protection
            .protect(region, address, size, LockPolicy::default())
    }

    /// The build information text stored in flash.
    ///
    /// # Errors
    /// Lookup errors, or [`BootError::Length`] if the item wraps the address space.
    pub fn build_info(&mut self) -> Result<Vec<u8>, BootError> {
        let extent = self.lookup(ItemType::BUILD_INFO)?;
        if extent.wraps() {
            return Err(BootError::Length("build info item wraps the address space"));
        }
        info!("Build info at {}, {} bytes", extent.address, extent.len);

        let len = usize::try_from(extent.len)
            .map_err(|_| BootError::Length("build info item too large"))?;
        let mut text = vec![0u8; len];
        self.flash.copy_out(extent.address, &mut text)?;
        Ok(text)
    }

    /// Run the `bad-imr` fence probe, if armed: DMA from the flash directory
    /// into `scratch`, then into the kernel image.
    ///
    /// On hardware a working fence resets the platform during the second
    /// transfer. Returns whether the probe ran.
    pub fn probe_protection_fence(&mut self, scratch: PhysicalAddress) -> bool {
        self.faults.probe_protection(
            self.protection.registers_mut(),
            self.settings.directory_base,
            scratch,
            KERNEL_LOAD_ADDRESS,
        )
    }
}
