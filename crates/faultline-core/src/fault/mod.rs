//! # Fault Translation
//!
//! Turns synchronous hardware faults (`SIGFPE`, `SIGSEGV`, `SIGBUS`, `SIGILL`,
//! `SIGTRAP`) raised on a guarded thread into [`FaultException`] values.
//!
//! ## How it works
//!
//! 1. [`FaultTranslationScope`] installs `sigaction` handlers for the process
//!    and marks the calling thread as guarded
//! 2. On a fault, the handler decodes `siginfo_t` into a [`FaultRecord`],
//!    reads the faulting registers from `ucontext_t` and builds a
//!    [`FaultException`] whose trace starts at the faulting instruction
//! 3. The exception leaves the handler as a panic payload
//!    ([`std::panic::resume_unwind`], so no panic hook runs)
//! 4. [`catch_faults`] catches the payload and returns it as an error
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::{catch_faults, CallStackAccessScope, Traceable};
//!
//! let _symbols = CallStackAccessScope::new();
//! match catch_faults(|| unsafe { std::ptr::read_volatile(8 as *const u64) }) {
//!     Ok(value) => println!("read {value}"),
//!     Err(fault) => eprintln!("{}", fault.serialize()),
//! }
//! ```
//!
//! Building with the `disable-fault-trace` feature skips the stack walk on
//! the fault path; the exception keeps its decoded message and its trace
//! reads [`DISABLED_TRACE`](crate::exception::DISABLED_TRACE).

pub mod constants;
mod handler;
mod record;

use std::error::Error;
use std::fmt;
use std::panic::{self, UnwindSafe};

pub use handler::{FaultTranslationScope, MISSING_CONTEXT_TRACE, NESTED_FAULT_TRACE};
pub use record::{FaultCode, FaultRecord, OperationKind, REFERENCE_URL};

use crate::exception::{Traceable, TraceableException};
use crate::types::CapturedContext;

/// Whether traces are captured on the fault path in this build.
pub const FAULT_TRACE_ENABLED: bool = !cfg!(feature = "disable-fault-trace");

/// A hardware fault translated into an error.
#[derive(Debug)]
pub struct FaultException
{
    inner: TraceableException,
    record: FaultRecord,
}

impl FaultException
{
    pub const TYPE_NAME: &'static str = "FaultException";

    /// Exception for `record`, traced from the faulting frame in `context`.
    #[inline(never)]
    pub fn from_fault(record: FaultRecord, context: &CapturedContext) -> Self
    {
        let inner =
            TraceableException::from_context(record.message(), context, FAULT_TRACE_ENABLED).with_type_name(Self::TYPE_NAME);
        Self { inner, record }
    }

    /// Exception for `record` with a fixed trace text.
    pub fn untraced(record: FaultRecord, trace: &str) -> Self
    {
        let inner = TraceableException::with_trace_text(record.message(), trace).with_type_name(Self::TYPE_NAME);
        Self { inner, record }
    }

    /// The decoded fault.
    pub fn record(&self) -> &FaultRecord
    {
        &self.record
    }
}

impl fmt::Display for FaultException
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error for FaultException {}

impl Traceable for FaultException
{
    fn type_name(&self) -> &str
    {
        self.inner.type_name()
    }

    fn message(&self) -> &str
    {
        self.inner.message()
    }

    fn call_stack_trace(&self) -> &str
    {
        self.inner.call_stack_trace()
    }

    fn inner_exception(&self) -> Option<&(dyn Error + Send + Sync + 'static)>
    {
        None
    }
}

/// Run `f` with fault translation active on this thread.
///
/// Returns the translated fault if `f` faulted. Any other panic keeps
/// unwinding. If the handlers cannot be installed, `f` runs unguarded.
pub fn catch_faults<F, R>(f: F) -> std::result::Result<R, FaultException>
where
    F: FnOnce() -> R + UnwindSafe,
{
    let _scope = match FaultTranslationScope::new() {
        Ok(scope) => Some(scope),
        Err(err) => {
            tracing::warn!(%err, "cannot install the fault translator, running unguarded");
            None
        }
    };

    match panic::catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<FaultException>() {
            Ok(fault) => Err(*fault),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn segv_record() -> FaultRecord
    {
        FaultRecord::new(
            FaultCode::new(libc::SIGSEGV, constants::SEGV_MAPERR),
            Some(0x8),
            OperationKind::Read,
        )
    }

    #[test]
    fn test_untraced_exception()
    {
        let exception = FaultException::untraced(segv_record(), NESTED_FAULT_TRACE);
        assert_eq!(exception.type_name(), FaultException::TYPE_NAME);
        assert_eq!(exception.call_stack_trace(), NESTED_FAULT_TRACE);
        assert_eq!(exception.message(), segv_record().message());
        assert_eq!(exception.to_string(), exception.message());
        assert_eq!(exception.record().code.signal, libc::SIGSEGV);
        assert!(exception.inner_exception().is_none());
    }

    #[test]
    fn test_serialize_contains_decoded_message()
    {
        let text = FaultException::untraced(segv_record(), "").serialize();
        assert!(text.contains("FaultException: SIGSEGV/SEGV_MAPERR"));
        assert!(text.contains("Read access violation on address 0x8"));
    }

    #[test]
    fn test_catch_faults_passes_values_through()
    {
        assert_eq!(catch_faults(|| 6 * 7).unwrap(), 42);
        assert!(!FaultTranslationScope::is_active());
    }

    #[test]
    fn test_catch_faults_resumes_other_panics()
    {
        let outcome = panic::catch_unwind(|| catch_faults(|| panic!("not a fault")));
        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"not a fault"));
    }

    #[test]
    fn test_exception_is_send()
    {
        fn assert_send<T: Send>() {}
        assert_send::<FaultException>();
    }
}
