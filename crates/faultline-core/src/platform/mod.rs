//! # Platform-Specific Implementations
//!
//! Everything that touches registers, raw stack memory or the dynamic loader.
//!
//! - **Linux (x86_64, aarch64)**: inline asm for context capture,
//!   `pthread_getattr_np` for stack bounds, `dl_iterate_phdr` for modules and
//!   `ucontext_t` decoding for faults
//!   - See: [dl_iterate_phdr(3)](https://man7.org/linux/man-pages/man3/dl_iterate_phdr.3.html)
//! - **Everything else**: the same functions, reporting
//!   [`TraceError::Unsupported`](crate::TraceError::Unsupported)

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod linux;
#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
pub use linux::*;

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
mod unsupported;
#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
pub use unsupported::*;
