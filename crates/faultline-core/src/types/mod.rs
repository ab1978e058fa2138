//! # Types
//!
//! Platform-agnostic types shared by the tracing pipeline.
//!
//! These types abstract away architecture details, allowing the walker,
//! resolver and filter to work with "program counter" and "frame" without
//! knowing whether they run on x86-64 or ARM64.

pub mod address;
pub mod arch;
pub mod context;
pub mod frame;

// Re-export all public types
pub use address::Address;
pub use arch::Architecture;
pub use context::{CapturedContext, ContextOrigin};
pub use frame::{ResolutionStatus, ResolvedFrame, StackFrameDescriptor};
