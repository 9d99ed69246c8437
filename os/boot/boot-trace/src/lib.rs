//! # Boot Loader Debug Trace
//!
//! Early diagnostics for the boot loader before any console is discovered.
//!
//! ## Overview
//!
//! Output goes byte by byte to the debug I/O port (`0x402`). Emulators capture
//! it with `-debugcon`; on hardware the port is unused and the writes are
//! harmless. Nothing here allocates, so it is usable before the firmware
//! memory services are.
//!
//! * [`boot_trace!`] formats straight to the port, bypassing `log`.
//! * [`BootLogger`] is a `log::Log` that routes records to the same port as
//!   `[LEVEL] target: message` lines.
//!
//! ## Feature `enabled` (default)
//!
//! Without it the sink is a no-op and [`boot_trace!`] compiles to nothing but
//! argument evaluation. Port I/O is only ever emitted on bare-metal and UEFI
//! x86 targets; hosted builds (tests) discard the output.
//!
//! ```rust,no_run
//! use boot_trace::BootLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: BootLogger = BootLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().expect("logger initialization");
//! info!("asset loader ready");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{BootLogger, write_record};

/// Whether trace output is compiled in.
pub const ENABLED: bool = cfg!(feature = "enabled");

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod trace_fmt {
    use core::fmt::{self, Write};

    /// The emulator debug console port.
    #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        any(target_os = "uefi", target_os = "none")
    ))]
    const DEBUG_PORT: u16 = 0x402;

    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(
            any(target_arch = "x86", target_arch = "x86_64"),
            any(target_os = "uefi", target_os = "none")
        ))]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(all(
            any(target_arch = "x86", target_arch = "x86_64"),
            any(target_os = "uefi", target_os = "none")
        )))]
        let _ = c;
    }

    pub struct TraceSink;

    impl Write for TraceSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn trace_write(args: fmt::Arguments) {
        // Best effort; nothing useful to do on a failed debug write.
        let _ = fmt::write(&mut TraceSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod trace_fmt {
    use core::fmt::{self, Write};

    pub struct TraceSink;

    impl Write for TraceSink {
        #[inline]
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Ok(())
        }
    }

    #[doc(hidden)]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn trace_write(_: fmt::Arguments) {}
}

/// Formatted write to the debug port, without allocation.
#[macro_export]
macro_rules! boot_trace {
    ($($arg:tt)*) => {{
        $crate::trace_fmt::trace_write(core::format_args!($($arg)*));
    }};
}
