//! CPU architecture of the running process.

use std::fmt;

/// CPU architecture
///
/// The walker needs this to pick the DWARF register numbers for the stack
/// pointer, frame pointer and return address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM
    ///
    /// The return address lives in X30 (link register) on entry, the frame
    /// pointer is X29.
    Arm64,
    /// 64-bit x86 (Intel/AMD)
    ///
    /// The return address is pushed on the stack by `call`, the frame
    /// pointer is RBP.
    X86_64,
    /// Any other architecture
    ///
    /// Walking is not supported; traces come back empty.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture this crate was compiled for.
    ///
    /// ```rust
    /// use faultline_core::types::Architecture;
    ///
    /// let arch = Architecture::current();
    /// assert_eq!(arch.pointer_size_bytes(), std::mem::size_of::<usize>() as u8);
    /// ```
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Architecture::Arm64 | Architecture::X86_64 => 8,
            Architecture::Unknown(_) => std::mem::size_of::<usize>() as u8,
        }
    }

    /// Returns `true` if the walker can unwind this architecture.
    pub const fn is_supported(self) -> bool
    {
        matches!(self, Architecture::Arm64 | Architecture::X86_64)
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}
