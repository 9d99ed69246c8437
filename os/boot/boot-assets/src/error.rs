use boot_registers::RegisterError;

/// Failure of an asset, verification or protection operation.
///
/// Every variant is terminal for the current boot attempt. Operations leave
/// the session in a state that permits a retry (the flash directory cache is
/// dropped on a format error, asset handles are closed).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("asset or flash item not found")]
    NotFound,
    #[error("invalid format: {0}")]
    Format(&'static str),
    #[error("length out of range: {0}")]
    Length(&'static str),
    #[error("short read: expected {expected} bytes, got {actual}")]
    Read { expected: usize, actual: usize },
    #[error(
        "signature verification failed (debug code {debug_code:#x}, fatal code {fatal_code:#x})"
    )]
    Verification { debug_code: u32, fatal_code: u32 },
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
}

impl From<RegisterError> for BootError {
    fn from(value: RegisterError) -> Self {
        match value {
            RegisterError::DeviceNotFound { .. } => Self::NotFound,
        }
    }
}
