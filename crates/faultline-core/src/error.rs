//! # Error Types
//!
//! General error handling for the tracing pipeline.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! These errors stay inside the crate's plumbing: the public trace API never
//! returns them. A frame that cannot be resolved carries a
//! [`ResolutionStatus`](crate::types::ResolutionStatus) instead, and
//! infrastructure failures are logged through `tracing` before the pipeline
//! carries on in a degraded mode.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for capture, unwinding and symbolication
///
/// ## Error Categories
///
/// 1. **Image errors**: ImageParse, Dwarf
/// 2. **Memory errors**: InvalidAddress, Unwind
/// 3. **Platform errors**: ModuleEnumeration, Unsupported
/// 4. **Conversion errors**: Encoding
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum TraceError
{
    /// A binary image could not be parsed
    ///
    /// This happens when:
    /// - The module is not backed by a file (the vdso)
    /// - The file was replaced or truncated after it was mapped
    /// - The object format is not ELF
    #[error("Failed to parse image {}: {details}", path.display())]
    ImageParse
    {
        /// Path of the image on disk
        path: PathBuf,
        /// Parser error text
        details: String,
    },

    /// DWARF data in an image is malformed
    #[error("DWARF error: {0}")]
    Dwarf(#[from] gimli::Error),

    /// An address was rejected before being dereferenced
    ///
    /// Stack reads are only allowed for aligned addresses inside the current
    /// thread's stack.
    #[error("Invalid address: 0x{0:016x}")]
    InvalidAddress(u64),

    /// The call frame information could not produce a caller frame
    #[error("Unwind failed: {0}")]
    Unwind(String),

    /// The loaded modules of the process could not be listed
    #[error("Module enumeration failed: {0}")]
    ModuleEnumeration(String),

    /// The operation is not available on this target
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// A string could not be converted between encodings
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// I/O error (for reading images from disk, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, TraceError>`
///
/// ```rust
/// use faultline_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, TraceError>;
