//! Linux implementation: register capture, stack bounds, loaded modules and
//! fault context decoding.

use std::cell::Cell;
use std::ffi::{c_int, c_void, CStr};
use std::path::PathBuf;
use std::{mem, ptr};

use smallvec::SmallVec;

use crate::encoding::from_platform_bytes;
use crate::error::{Result, TraceError};
use crate::modules::Module;
use crate::symbols::ProcessHandle;
use crate::types::{Address, CapturedContext, ContextOrigin};
use crate::walker::MemoryAccess;

thread_local! {
    static STACK_BOUNDS: Cell<Option<(u64, u64)>> = const { Cell::new(None) };
}

/// Snapshot the registers of the calling function.
///
/// Always inlined: the snapshot describes the frame of the function that
/// calls this, which therefore stays live while the trace is walked.
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_core::{call_stack, capture_context};
///
/// let context = capture_context().expect("supported target");
/// let trace = call_stack::get_trace_from(&context, false);
/// ```
#[inline(always)]
#[cfg(target_arch = "x86_64")]
pub fn capture_context() -> Result<CapturedContext>
{
    let pc: u64;
    let sp: u64;
    let fp: u64;

    // SAFETY: only copies registers into outputs.
    unsafe {
        std::arch::asm!(
            "lea {pc}, [rip]",
            "mov {sp}, rsp",
            "mov {fp}, rbp",
            pc = out(reg) pc,
            sp = out(reg) sp,
            fp = out(reg) fp,
            options(nomem, nostack, preserves_flags),
        );
    }

    Ok(CapturedContext::new(Address::new(pc), Address::new(sp), Address::new(fp), ContextOrigin::Capture))
}

/// Snapshot the registers of the calling function.
///
/// Always inlined: the snapshot describes the frame of the function that
/// calls this, which therefore stays live while the trace is walked.
#[inline(always)]
#[cfg(target_arch = "aarch64")]
pub fn capture_context() -> Result<CapturedContext>
{
    let pc: u64;
    let sp: u64;
    let fp: u64;
    let lr: u64;

    // SAFETY: only copies registers into outputs.
    unsafe {
        std::arch::asm!(
            "adr {pc}, .",
            "mov {sp}, sp",
            "mov {fp}, x29",
            "mov {lr}, x30",
            pc = out(reg) pc,
            sp = out(reg) sp,
            fp = out(reg) fp,
            lr = out(reg) lr,
            options(nomem, nostack, preserves_flags),
        );
    }

    Ok(
        CapturedContext::new(Address::new(pc), Address::new(sp), Address::new(fp), ContextOrigin::Capture)
            .with_lr(Address::new(lr)),
    )
}

/// Registers of the interrupted frame from the `ucontext_t` passed to a
/// `SA_SIGINFO` handler.
///
/// ## Safety
///
/// `ucontext` must be null or the third argument of a `SA_SIGINFO` signal
/// handler currently running on this thread.
#[allow(clippy::cast_sign_loss)]
pub unsafe fn context_from_ucontext(ucontext: *const c_void) -> Option<CapturedContext>
{
    if ucontext.is_null() {
        return None;
    }
    let uc = &*ucontext.cast::<libc::ucontext_t>();

    #[cfg(target_arch = "x86_64")]
    let context = {
        let gregs = &uc.uc_mcontext.gregs;
        CapturedContext::new(
            Address::new(gregs[libc::REG_RIP as usize] as u64),
            Address::new(gregs[libc::REG_RSP as usize] as u64),
            Address::new(gregs[libc::REG_RBP as usize] as u64),
            ContextOrigin::Fault,
        )
    };

    #[cfg(target_arch = "aarch64")]
    let context = {
        let mcontext = &uc.uc_mcontext;
        CapturedContext::new(
            Address::new(mcontext.pc),
            Address::new(mcontext.sp),
            Address::new(mcontext.regs[29]),
            ContextOrigin::Fault,
        )
        .with_lr(Address::new(mcontext.regs[30]))
    };

    Some(context)
}

/// Page-fault error code of the interrupted instruction (x86-64 `REG_ERR`).
///
/// Bit 1 is set for writes, bit 4 for instruction fetches.
///
/// ## Safety
///
/// Same contract as [`context_from_ucontext`].
#[allow(clippy::cast_sign_loss)]
pub unsafe fn fault_error_code(ucontext: *const c_void) -> Option<u64>
{
    if ucontext.is_null() {
        return None;
    }

    #[cfg(target_arch = "x86_64")]
    {
        let uc = &*ucontext.cast::<libc::ucontext_t>();
        Some(uc.uc_mcontext.gregs[libc::REG_ERR as usize] as u64)
    }

    // The ESR record lives in the reserved area of the aarch64 mcontext,
    // which libc does not expose.
    #[cfg(target_arch = "aarch64")]
    {
        None
    }
}

/// Bounds `[low, high)` of the calling thread's stack.
pub fn current_stack_bounds() -> Result<(u64, u64)>
{
    if let Some(bounds) = STACK_BOUNDS.with(Cell::get) {
        return Ok(bounds);
    }

    let bounds = query_stack_bounds()?;
    STACK_BOUNDS.with(|cell| cell.set(Some(bounds)));
    Ok(bounds)
}

fn query_stack_bounds() -> Result<(u64, u64)>
{
    // SAFETY: attr is initialized by pthread_getattr_np before use and
    // destroyed exactly once.
    unsafe {
        let mut attr: libc::pthread_attr_t = mem::zeroed();
        let rc = libc::pthread_getattr_np(libc::pthread_self(), &mut attr);
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc).into());
        }

        let mut stack_addr: *mut c_void = ptr::null_mut();
        let mut stack_size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size);
        libc::pthread_attr_destroy(&mut attr);
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc).into());
        }

        let low = stack_addr as u64;
        Ok((low, low.saturating_add(stack_size as u64)))
    }
}

/// Reads of the calling thread's own stack.
///
/// Only aligned addresses inside the thread's stack are dereferenced, so a
/// corrupted frame pointer or CFI rule cannot make the walker fault.
#[derive(Debug, Clone, Copy)]
pub struct StackMemory
{
    low: u64,
    high: u64,
}

impl StackMemory
{
    /// Accessor for the calling thread's stack.
    pub fn current() -> Result<Self>
    {
        let (low, high) = current_stack_bounds()?;
        Ok(Self { low, high })
    }

    pub fn contains(&self, address: Address) -> bool
    {
        let value = address.value();
        value >= self.low && value.checked_add(8).is_some_and(|end| end <= self.high)
    }
}

impl MemoryAccess for StackMemory
{
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        if !address.is_aligned(8) || !self.contains(address) {
            return Err(TraceError::InvalidAddress(address.value()));
        }

        // SAFETY: aligned and inside the mapped stack of the current thread.
        Ok(unsafe { ptr::read_volatile(address.value() as usize as *const u64) })
    }
}

/// List the modules mapped into the process.
pub fn enumerate_modules() -> Result<Vec<Module>>
{
    let mut modules: Vec<Module> = Vec::new();

    // SAFETY: the callback only runs during this call and `data` points to
    // `modules`, which outlives it.
    let rc = unsafe { libc::dl_iterate_phdr(Some(collect_module), ptr::addr_of_mut!(modules).cast()) };
    if rc != 0 {
        return Err(TraceError::ModuleEnumeration(format!("dl_iterate_phdr returned {rc}")));
    }

    Ok(modules)
}

unsafe extern "C" fn collect_module(info: *mut libc::dl_phdr_info, _size: libc::size_t, data: *mut c_void) -> c_int
{
    let modules = &mut *data.cast::<Vec<Module>>();
    let info = &*info;
    let bias = info.dlpi_addr;

    let path = if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
        ProcessHandle::get().executable().to_path_buf()
    } else {
        PathBuf::from(from_platform_bytes(CStr::from_ptr(info.dlpi_name).to_bytes()))
    };

    let headers: &[libc::Elf64_Phdr] = if info.dlpi_phdr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum))
    };

    let mut segments = SmallVec::new();
    let mut eh_frame_hdr = None;
    for header in headers {
        let start = bias.wrapping_add(header.p_vaddr);
        let end = start.wrapping_add(header.p_memsz);
        match header.p_type {
            libc::PT_LOAD => segments.push(start..end),
            libc::PT_GNU_EH_FRAME => eh_frame_hdr = Some(start..end),
            _ => {}
        }
    }

    modules.push(Module::new(path, bias, segments, eh_frame_hdr));
    0
}
