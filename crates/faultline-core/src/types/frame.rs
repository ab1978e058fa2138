//! Raw and resolved stack frame types.

use std::fmt;

use super::Address;

/// One raw frame produced by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrameDescriptor
{
    /// Executing instruction (exact frames) or return address.
    pub pc: Address,
    /// Frame pointer restored for this frame.
    pub fp: Address,
    /// Stack pointer restored for this frame.
    pub sp: Address,
    /// `true` when `pc` is the instruction being executed rather than a
    /// return address (the innermost frame).
    pub exact: bool,
}

impl StackFrameDescriptor
{
    /// Address to look up symbols and line info with.
    ///
    /// A return address points at the instruction after the call, which may
    /// already belong to the next line or even the next function, so
    /// non-exact frames probe one byte earlier.
    pub fn probe_address(&self) -> Address
    {
        if self.exact || self.pc.is_zero() {
            self.pc
        } else {
            self.pc - 1
        }
    }
}

/// Outcome of resolving one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStatus
{
    /// A symbol covers the address.
    Success,
    /// The address is outside every mapped image (JIT or foreign code).
    ModuleNotFound,
    /// The owning image is known but no symbol covers the address.
    SymbolNotFound,
    /// The frame address is null.
    InvalidAddress,
    /// No [`CallStackAccessScope`](crate::CallStackAccessScope) is live.
    EngineUnavailable,
}

impl ResolutionStatus
{
    /// Returns `true` for [`ResolutionStatus::Success`].
    pub const fn is_success(self) -> bool
    {
        matches!(self, ResolutionStatus::Success)
    }

    /// Platform error code (`errno`) describing a failed resolution, `0` on success.
    pub const fn error_code(self) -> i32
    {
        match self {
            ResolutionStatus::Success => 0,
            ResolutionStatus::ModuleNotFound => libc::ENOENT,
            ResolutionStatus::SymbolNotFound => libc::ENXIO,
            ResolutionStatus::InvalidAddress => libc::EFAULT,
            ResolutionStatus::EngineUnavailable => libc::ENODEV,
        }
    }
}

impl fmt::Display for ResolutionStatus
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            ResolutionStatus::Success => "success",
            ResolutionStatus::ModuleNotFound => "module not found",
            ResolutionStatus::SymbolNotFound => "symbol not found",
            ResolutionStatus::InvalidAddress => "invalid address",
            ResolutionStatus::EngineUnavailable => "symbol engine unavailable",
        };
        write!(f, "{label}")
    }
}

/// A frame after symbol resolution.
///
/// `function` is present iff the status is [`ResolutionStatus::Success`];
/// `file` and `line` only ever accompany a function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame
{
    status: ResolutionStatus,
    function: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

impl ResolvedFrame
{
    /// A frame whose symbol was found.
    pub fn resolved(function: impl Into<String>) -> Self
    {
        Self {
            status: ResolutionStatus::Success,
            function: Some(function.into()),
            file: None,
            line: None,
        }
    }

    /// Attach source information to a resolved frame.
    ///
    /// Ignored on unresolved frames.
    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: Option<u32>) -> Self
    {
        if self.status.is_success() {
            self.file = Some(file.into());
            self.line = line;
        }
        self
    }

    /// A frame that could not be resolved.
    ///
    /// Passing [`ResolutionStatus::Success`] yields an unnamed frame with
    /// status [`ResolutionStatus::SymbolNotFound`].
    pub fn unresolved(status: ResolutionStatus) -> Self
    {
        let status = if status.is_success() {
            ResolutionStatus::SymbolNotFound
        } else {
            status
        };

        Self {
            status,
            function: None,
            file: None,
            line: None,
        }
    }

    pub fn status(&self) -> ResolutionStatus
    {
        self.status
    }

    pub fn function(&self) -> Option<&str>
    {
        self.function.as_deref()
    }

    pub fn file(&self) -> Option<&str>
    {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u32>
    {
        self.line
    }

    /// Returns `true` if the function name contains any of `patterns`.
    pub fn name_contains_any(&self, patterns: &[&str]) -> bool
    {
        self.function
            .as_deref()
            .is_some_and(|name| patterns.iter().any(|pattern| name.contains(pattern)))
    }
}
