//! Fallback for targets without a walker: every entry point reports
//! [`TraceError::Unsupported`].

use std::ffi::c_void;

use crate::error::{Result, TraceError};
use crate::modules::Module;
use crate::types::{Address, CapturedContext};
use crate::walker::MemoryAccess;

#[inline(always)]
pub fn capture_context() -> Result<CapturedContext>
{
    Err(TraceError::Unsupported("register capture"))
}

/// ## Safety
///
/// Always safe on this target; never dereferences `ucontext`.
pub unsafe fn context_from_ucontext(_ucontext: *const c_void) -> Option<CapturedContext>
{
    None
}

/// ## Safety
///
/// Always safe on this target; never dereferences `ucontext`.
pub unsafe fn fault_error_code(_ucontext: *const c_void) -> Option<u64>
{
    None
}

pub fn current_stack_bounds() -> Result<(u64, u64)>
{
    Err(TraceError::Unsupported("stack bounds"))
}

#[derive(Debug, Clone, Copy)]
pub struct StackMemory;

impl StackMemory
{
    pub fn current() -> Result<Self>
    {
        Err(TraceError::Unsupported("stack memory access"))
    }

    pub fn contains(&self, _address: Address) -> bool
    {
        false
    }
}

impl MemoryAccess for StackMemory
{
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        Err(TraceError::InvalidAddress(address.value()))
    }
}

pub fn enumerate_modules() -> Result<Vec<Module>>
{
    Err(TraceError::Unsupported("module enumeration"))
}
