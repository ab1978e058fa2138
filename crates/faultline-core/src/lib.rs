//! # faultline-core
//!
//! In-process call stack capture, symbolication and fault-to-error translation.
//!
//! This crate lets a running process render a readable trace of its own call
//! stack and turn hardware faults (integer divide by zero, invalid memory
//! access, illegal instruction) into ordinary Rust errors that carry such a
//! trace instead of killing the process.
//!
//! The pipeline runs synchronously on the calling thread:
//!
//! 1. [`platform::capture_context`] snapshots `pc`/`sp`/`fp` of the caller
//! 2. [`walker`] follows the `.eh_frame` call frame information of every
//!    loaded module to produce raw frames, innermost first
//! 3. [`symbols`] resolves every frame to a demangled function name and,
//!    when DWARF line tables are present, a file and line
//! 4. [`filter`] trims runtime startup frames and the crate's own frames
//! 5. [`serializer`] renders the result, optionally with ANSI colors
//!
//! [`fault`] installs the signal handlers that feed a faulting thread's
//! registers into the same pipeline, and [`exception`] holds the error types
//! that carry the rendered trace.
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::{call_stack, CallStackAccessScope};
//!
//! let _symbols = CallStackAccessScope::new();
//! println!("{}", call_stack::get_trace(false));
//! ```
//!
//! ## Platform Support
//!
//! - **Linux x86_64/aarch64**: full support
//! - **Other Unix**: compiles; context capture and module enumeration report
//!   [`TraceError::Unsupported`] and traces degrade to empty output
//!
//! ## Why unsafe code is needed
//!
//! Walking our own stack means reading raw stack memory and the in-memory
//! unwind tables of every loaded module, capturing registers needs inline
//! assembly, and translating faults means installing `sigaction` handlers and
//! reading `siginfo_t`/`ucontext_t`. Each of these is wrapped in a safe API
//! that checks addresses against the current thread's stack bounds or the
//! module's mapped segments before dereferencing.

#![allow(unsafe_code)] // Required for inline asm, sigaction and raw stack reads

pub mod call_stack;
pub mod config;
pub mod console;
pub mod encoding;
pub mod error;
pub mod exception;
pub mod fault;
pub mod filter;
pub mod modules;
pub mod os_error;
pub mod platform;
pub mod serializer;
pub mod symbols;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use error::{Result, TraceError};
pub use exception::{use_colors_on_stack_trace, Traceable, TraceableException};
pub use fault::{catch_faults, FaultException, FaultRecord, FaultTranslationScope};
pub use platform::capture_context;
pub use symbols::CallStackAccessScope;
pub use types::{CapturedContext, ResolutionStatus, ResolvedFrame, StackFrameDescriptor};
