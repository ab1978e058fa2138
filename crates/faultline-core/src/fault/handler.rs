//! Signal handler installation and the fault translator.
//!
//! Handlers are installed process-wide for the first live
//! [`FaultTranslationScope`] and the previous dispositions are restored when
//! the last one is dropped. Translation is per thread: a fault on a thread
//! that holds no scope is forwarded to whatever handler was installed before.
//!
//! The translator unwinds out of the faulting frame with
//! [`std::panic::resume_unwind`]. Unwinding starts at an instruction that is
//! not a call, so the faulting function must not own values with a `Drop`
//! implementation that are live at the fault; otherwise the personality
//! routine finds no landing pad for the address and aborts.
//!
//! The translator runs on the faulting thread's own stack (no `SA_ONSTACK`),
//! since building a [`FaultException`] walks and resolves the stack and does
//! not fit the small alternate signal stack. Faults raised on an exhausted
//! stack are therefore not translated: while any scope is live, a stack
//! overflow on any thread terminates the process with a plain `SIGSEGV`
//! instead of the standard library's "has overflowed its stack" message.

use std::cell::Cell;
use std::ffi::c_void;
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::panic;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use libc::c_int;

use super::constants::TRANSLATED_SIGNALS;
use super::record::{FaultCode, FaultRecord, OperationKind};
use super::FaultException;
use crate::error::{Result, TraceError};
use crate::platform;

/// Trace text of a fault raised while another one was being translated.
pub const NESTED_FAULT_TRACE: &str = "(unavailable: fault during fault translation)";

/// Trace text when the faulting registers could not be read.
pub const MISSING_CONTEXT_TRACE: &str = "(unavailable: no register context)";

static INSTALLATION: Mutex<Installation> = Mutex::new(Installation {
    depth: 0,
    previous: Vec::new(),
});

thread_local! {
    static ACTIVE_SCOPES: Cell<usize> = const { Cell::new(0) };
    static TRANSLATING: Cell<Option<RawFault>> = const { Cell::new(None) };
}

/// Process-wide handler state.
struct Installation
{
    /// Number of live scopes on all threads.
    depth: usize,
    /// Dispositions replaced by the translator.
    previous: Vec<(c_int, libc::sigaction)>,
}

impl Installation
{
    fn install(&mut self) -> Result<()>
    {
        for &signal in &TRANSLATED_SIGNALS {
            let mut action = translator_action();
            let mut previous: libc::sigaction = unsafe { mem::zeroed() };
            // SAFETY: both pointers refer to live, initialized sigaction values
            let status = unsafe {
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(signal, &action, &mut previous)
            };
            if status != 0 {
                let err = io::Error::last_os_error();
                self.restore();
                return Err(TraceError::Io(err));
            }
            self.previous.push((signal, previous));
        }

        tracing::debug!(signals = ?TRANSLATED_SIGNALS, "fault translator installed");
        Ok(())
    }

    fn restore(&mut self)
    {
        for (signal, previous) in self.previous.drain(..).rev() {
            // SAFETY: `previous` was filled in by the kernel when we installed ours
            if unsafe { libc::sigaction(signal, &previous, std::ptr::null_mut()) } != 0 {
                tracing::warn!(signal, err = %io::Error::last_os_error(), "cannot restore previous signal disposition");
            }
        }
        tracing::debug!("fault translator removed");
    }

    fn previous_action(&self, signal: c_int) -> Option<libc::sigaction>
    {
        self.previous
            .iter()
            .find(|(installed, _)| *installed == signal)
            .map(|(_, action)| *action)
    }
}

/// Disposition installed for every translated signal.
///
/// `SA_NODEFER` keeps the signal unblocked after the translator unwinds out of
/// the handler, so a later fault on the same thread is delivered again.
fn translator_action() -> libc::sigaction
{
    // SAFETY: an all-zero sigaction is a valid value that we then fill in
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handle_fault as *const () as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
    action
}

fn lock_installation() -> MutexGuard<'static, Installation>
{
    INSTALLATION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// While alive, hardware faults on the creating thread become
/// [`FaultException`] panics payloads instead of terminating the process.
///
/// Scopes nest, on one thread and across threads. The scope is bound to the
/// thread that created it.
#[derive(Debug)]
pub struct FaultTranslationScope
{
    _thread_bound: PhantomData<*const ()>,
}

impl FaultTranslationScope
{
    /// Activate translation on this thread, installing the handlers if this
    /// is the first live scope of the process.
    pub fn new() -> Result<Self>
    {
        let mut installation = lock_installation();
        if installation.depth == 0 {
            installation.install()?;
        }
        installation.depth += 1;
        drop(installation);

        ACTIVE_SCOPES.with(|scopes| scopes.set(scopes.get() + 1));
        Ok(Self {
            _thread_bound: PhantomData,
        })
    }

    /// Whether faults on the calling thread are currently translated.
    pub fn is_active() -> bool
    {
        ACTIVE_SCOPES.with(Cell::get) > 0
    }
}

impl Drop for FaultTranslationScope
{
    fn drop(&mut self)
    {
        ACTIVE_SCOPES.with(|scopes| scopes.set(scopes.get().saturating_sub(1)));

        let mut installation = lock_installation();
        installation.depth = installation.depth.saturating_sub(1);
        if installation.depth == 0 {
            installation.restore();
        }
    }
}

/// What the handler reads from `siginfo_t` and `ucontext_t`.
#[derive(Debug, Clone, Copy)]
struct RawFault
{
    code: FaultCode,
    faulting_address: Option<usize>,
    operation: OperationKind,
}

impl RawFault
{
    /// ## Safety
    ///
    /// `info` and `ucontext` must be null or the arguments of a running
    /// `SA_SIGINFO` handler.
    unsafe fn read(signal: c_int, info: *const libc::siginfo_t, ucontext: *const c_void, pc: u64) -> Self
    {
        let (si_code, faulting_address) = if info.is_null() {
            (0, None)
        } else {
            ((*info).si_code, Some((*info).si_addr() as usize))
        };

        let code = FaultCode::new(signal, si_code);
        let operation = if code.is_memory_access() {
            OperationKind::infer(platform::fault_error_code(ucontext), faulting_address, pc)
        } else {
            OperationKind::Unknown
        };

        Self {
            code,
            faulting_address,
            operation,
        }
    }

    fn record(self) -> FaultRecord
    {
        FaultRecord::new(self.code, self.faulting_address, self.operation)
    }
}

/// Marks the current thread as translating `fault` until dropped.
struct TranslatingGuard;

impl TranslatingGuard
{
    fn enter(fault: RawFault) -> Self
    {
        TRANSLATING.with(|current| current.set(Some(fault)));
        TranslatingGuard
    }
}

impl Drop for TranslatingGuard
{
    fn drop(&mut self)
    {
        TRANSLATING.with(|current| current.set(None));
    }
}

unsafe extern "C-unwind" fn handle_fault(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void)
{
    if ACTIVE_SCOPES.with(Cell::get) == 0 {
        forward_to_previous(signal, info, ucontext);
        return;
    }

    let context = platform::context_from_ucontext(ucontext);
    let pc = context.map_or(0, |context| context.pc.value());
    let fault = RawFault::read(signal, info, ucontext, pc);

    if let Some(outer) = TRANSLATING.with(Cell::get) {
        let record = outer.record().with_nested(fault.record());
        panic::resume_unwind(Box::new(FaultException::untraced(record, NESTED_FAULT_TRACE)));
    }

    let exception = {
        let _translating = TranslatingGuard::enter(fault);
        match context {
            Some(context) => FaultException::from_fault(fault.record(), &context),
            None => FaultException::untraced(fault.record(), MISSING_CONTEXT_TRACE),
        }
    };
    panic::resume_unwind(Box::new(exception));
}

/// Hand a fault on an untranslated thread to the disposition we replaced.
///
/// A default or ignored disposition is reinstated and the handler returns,
/// so the faulting instruction runs again and gets the default treatment.
unsafe fn forward_to_previous(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void)
{
    // Never block in a signal handler
    let previous = match INSTALLATION.try_lock() {
        Ok(installation) => installation.previous_action(signal),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().previous_action(signal),
        Err(TryLockError::WouldBlock) => None,
    };

    match previous {
        Some(action) if action.sa_sigaction != libc::SIG_DFL && action.sa_sigaction != libc::SIG_IGN => {
            if action.sa_flags & libc::SA_SIGINFO != 0 {
                let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) = mem::transmute(action.sa_sigaction);
                handler(signal, info, ucontext);
            } else {
                let handler: extern "C" fn(c_int) = mem::transmute(action.sa_sigaction);
                handler(signal);
            }
        }
        _ => {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_scopes_nest_on_one_thread()
    {
        assert!(!FaultTranslationScope::is_active());
        {
            let _outer = FaultTranslationScope::new().unwrap();
            {
                let _inner = FaultTranslationScope::new().unwrap();
                assert!(FaultTranslationScope::is_active());
            }
            assert!(FaultTranslationScope::is_active());
        }
        assert!(!FaultTranslationScope::is_active());
    }

    #[test]
    fn test_scope_is_per_thread()
    {
        let _scope = FaultTranslationScope::new().unwrap();
        let active_elsewhere = std::thread::spawn(FaultTranslationScope::is_active).join().unwrap();
        assert!(!active_elsewhere);
        assert!(FaultTranslationScope::is_active());
    }

    fn current_action(signal: c_int) -> libc::sigaction
    {
        let mut current: libc::sigaction = unsafe { mem::zeroed() };
        let status = unsafe { libc::sigaction(signal, std::ptr::null(), &mut current) };
        assert_eq!(status, 0);
        current
    }

    #[test]
    fn test_live_scope_installs_translator()
    {
        let _scope = FaultTranslationScope::new().unwrap();
        for &signal in &TRANSLATED_SIGNALS {
            let current = current_action(signal);
            assert_eq!(current.sa_sigaction, translator_action().sa_sigaction);
            assert_ne!(current.sa_sigaction, libc::SIG_DFL);
            assert_ne!(current.sa_flags & libc::SA_SIGINFO, 0);
        }
    }

    #[test]
    fn test_translator_runs_on_faulting_stack()
    {
        let _scope = FaultTranslationScope::new().unwrap();
        let current = current_action(libc::SIGSEGV);
        assert_ne!(current.sa_flags & libc::SA_NODEFER, 0);
        assert_eq!(current.sa_flags & libc::SA_ONSTACK, 0);
    }

    #[test]
    fn test_translating_guard_clears_on_drop()
    {
        let fault = RawFault {
            code: FaultCode::new(libc::SIGFPE, 1),
            faulting_address: None,
            operation: OperationKind::Unknown,
        };
        {
            let _guard = TranslatingGuard::enter(fault);
            assert!(TRANSLATING.with(Cell::get).is_some());
        }
        assert!(TRANSLATING.with(Cell::get).is_none());
    }
}
