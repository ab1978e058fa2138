//! Register snapshot consumed by the stack walker.

use super::Address;

/// Where a [`CapturedContext`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOrigin
{
    /// Taken by [`capture_context`](crate::platform::capture_context) on a running thread.
    Capture,
    /// Copied out of the `ucontext_t` delivered with a fault signal.
    Fault,
}

/// Snapshot of the registers the walker needs, taken on one thread at one instant.
///
/// The frame the snapshot describes must still be live when it is walked:
/// capture it in the function that requests the trace (or in one of its
/// callers), or take it from a fault that is being handled on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedContext
{
    /// Address of the executing instruction.
    pub pc: Address,
    /// Stack pointer at `pc`.
    pub sp: Address,
    /// Frame pointer (RBP / X29) at `pc`.
    pub fp: Address,
    /// Link register (X30); zero on x86-64.
    pub lr: Address,
    /// How the snapshot was taken.
    pub origin: ContextOrigin,
}

impl CapturedContext
{
    /// Build a snapshot from raw register values.
    pub const fn new(pc: Address, sp: Address, fp: Address, origin: ContextOrigin) -> Self
    {
        Self {
            pc,
            sp,
            fp,
            lr: Address::ZERO,
            origin,
        }
    }

    /// Attach a link register value (ARM64).
    #[must_use]
    pub const fn with_lr(mut self, lr: Address) -> Self
    {
        self.lr = lr;
        self
    }

    /// A context is walkable when both `pc` and `sp` are known.
    pub const fn is_valid(&self) -> bool
    {
        !self.pc.is_zero() && !self.sp.is_zero()
    }
}
