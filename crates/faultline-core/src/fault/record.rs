//! Typed fault records and their human-readable decoding.

use std::collections::HashMap;
use std::fmt::{self, Write};

use libc::c_int;
use once_cell::sync::Lazy;

use super::constants::*;

/// Manual page linked at the end of every fault message.
pub const REFERENCE_URL: &str = "https://man7.org/linux/man-pages/man2/sigaction.2.html";

static DESCRIPTIONS: Lazy<HashMap<(c_int, c_int), &'static str>> = Lazy::new(|| {
    HashMap::from([
        ((libc::SIGFPE, FPE_INTDIV), "SIGFPE/FPE_INTDIV: integer divide by zero"),
        ((libc::SIGFPE, FPE_INTOVF), "SIGFPE/FPE_INTOVF: integer overflow"),
        ((libc::SIGFPE, FPE_FLTDIV), "SIGFPE/FPE_FLTDIV: floating-point divide by zero"),
        ((libc::SIGFPE, FPE_FLTOVF), "SIGFPE/FPE_FLTOVF: floating-point overflow"),
        ((libc::SIGFPE, FPE_FLTUND), "SIGFPE/FPE_FLTUND: floating-point underflow"),
        ((libc::SIGFPE, FPE_FLTRES), "SIGFPE/FPE_FLTRES: floating-point inexact result"),
        ((libc::SIGFPE, FPE_FLTINV), "SIGFPE/FPE_FLTINV: floating-point invalid operation"),
        ((libc::SIGFPE, FPE_FLTSUB), "SIGFPE/FPE_FLTSUB: subscript out of range"),
        ((libc::SIGSEGV, SEGV_MAPERR), "SIGSEGV/SEGV_MAPERR: address not mapped to object"),
        ((libc::SIGSEGV, SEGV_ACCERR), "SIGSEGV/SEGV_ACCERR: invalid permissions for mapped object"),
        ((libc::SIGSEGV, SI_KERNEL), "SIGSEGV/SI_KERNEL: general protection fault"),
        ((libc::SIGBUS, BUS_ADRALN), "SIGBUS/BUS_ADRALN: invalid address alignment"),
        ((libc::SIGBUS, BUS_ADRERR), "SIGBUS/BUS_ADRERR: nonexistent physical address"),
        ((libc::SIGBUS, BUS_OBJERR), "SIGBUS/BUS_OBJERR: object-specific hardware error"),
        ((libc::SIGILL, ILL_ILLOPC), "SIGILL/ILL_ILLOPC: illegal opcode"),
        ((libc::SIGILL, ILL_ILLOPN), "SIGILL/ILL_ILLOPN: illegal operand"),
        ((libc::SIGILL, ILL_ILLADR), "SIGILL/ILL_ILLADR: illegal addressing mode"),
        ((libc::SIGILL, ILL_ILLTRP), "SIGILL/ILL_ILLTRP: illegal trap"),
        ((libc::SIGILL, ILL_PRVOPC), "SIGILL/ILL_PRVOPC: privileged opcode"),
        ((libc::SIGILL, ILL_PRVREG), "SIGILL/ILL_PRVREG: privileged register"),
        ((libc::SIGILL, ILL_COPROC), "SIGILL/ILL_COPROC: coprocessor error"),
        ((libc::SIGILL, ILL_BADSTK), "SIGILL/ILL_BADSTK: internal stack error"),
        ((libc::SIGTRAP, TRAP_BRKPT), "SIGTRAP/TRAP_BRKPT: process breakpoint"),
        ((libc::SIGTRAP, TRAP_TRACE), "SIGTRAP/TRAP_TRACE: process trace trap"),
        ((libc::SIGTRAP, SI_KERNEL), "SIGTRAP/SI_KERNEL: breakpoint instruction"),
    ])
});

/// Signal number and `si_code` of a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaultCode
{
    pub signal: c_int,
    pub si_code: c_int,
}

impl FaultCode
{
    pub const fn new(signal: c_int, si_code: c_int) -> Self
    {
        Self { signal, si_code }
    }

    /// Literal description of the code, for example
    /// `SIGFPE/FPE_INTDIV: integer divide by zero`.
    pub fn description(self) -> String
    {
        if let Some(description) = DESCRIPTIONS.get(&(self.signal, self.si_code)) {
            return (*description).to_string();
        }

        let name = signal_name(self.signal);
        match self.si_code {
            SI_USER => format!("{name}/SI_USER: sent by kill"),
            SI_TKILL => format!("{name}/SI_TKILL: sent by tkill"),
            _ => format!("{name}: unknown fault code"),
        }
    }

    /// Whether the record of this fault carries a memory access.
    pub fn is_memory_access(self) -> bool
    {
        matches!(self.signal, libc::SIGSEGV | libc::SIGBUS)
    }
}

/// Kind of memory access that caused a `SIGSEGV`/`SIGBUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind
{
    Read,
    Write,
    Execute,
    Unknown,
}

impl OperationKind
{
    /// Decode an x86-64 page-fault error code.
    pub fn from_error_code(error_code: u64) -> Self
    {
        if error_code & PF_INSTR != 0 {
            Self::Execute
        } else if error_code & PF_WRITE != 0 {
            Self::Write
        } else {
            Self::Read
        }
    }

    /// Best guess from what the fault handler can observe.
    ///
    /// Without an error code, a fault on the address being executed is an
    /// instruction fetch and anything else is unknown.
    pub fn infer(error_code: Option<u64>, faulting_address: Option<usize>, pc: u64) -> Self
    {
        match error_code {
            Some(code) => Self::from_error_code(code),
            None if faulting_address.is_some_and(|address| address as u64 == pc) => Self::Execute,
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for OperationKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Read => write!(f, "Read access violation"),
            Self::Write => write!(f, "Write access violation"),
            Self::Execute => write!(f, "Execute access violation"),
            Self::Unknown => write!(f, "Unknown operation type"),
        }
    }
}

/// Decoded description of one fault, with the fault that interrupted its
/// translation, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord
{
    pub code: FaultCode,
    pub faulting_address: Option<usize>,
    pub operation: OperationKind,
    pub nested: Option<Box<FaultRecord>>,
}

impl FaultRecord
{
    pub fn new(code: FaultCode, faulting_address: Option<usize>, operation: OperationKind) -> Self
    {
        Self {
            code,
            faulting_address,
            operation,
            nested: None,
        }
    }

    #[must_use]
    pub fn with_nested(mut self, nested: FaultRecord) -> Self
    {
        self.nested = Some(Box::new(nested));
        self
    }

    /// This record followed by every nested one.
    pub fn chain(&self) -> impl Iterator<Item = &FaultRecord>
    {
        std::iter::successors(Some(self), |record| record.nested.as_deref())
    }

    /// Full message: one line per record in the chain, then the reference
    /// link.
    pub fn message(&self) -> String
    {
        let mut out = String::new();
        for (index, record) in self.chain().enumerate() {
            if index > 0 {
                out.push_str("\n  ∟ ");
            }
            // Writing into a String cannot fail
            let _ = record.append_description(&mut out);
        }
        let _ = write!(out, "\nSee {REFERENCE_URL}");
        out
    }

    fn append_description(&self, out: &mut String) -> fmt::Result
    {
        out.push_str(&self.code.description());

        if self.code.is_memory_access() {
            write!(out, " - {}", self.operation)?;
            if let Some(address) = self.faulting_address {
                write!(out, " on address {address:#x}")?;
            }
        }

        write!(out, " (signal {}, code {})", self.code.signal, self.code.si_code)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_divide_by_zero_message()
    {
        let record = FaultRecord::new(FaultCode::new(libc::SIGFPE, FPE_INTDIV), Some(0x4010), OperationKind::Unknown);
        let message = record.message();
        let expected_first_line = format!("SIGFPE/FPE_INTDIV: integer divide by zero (signal {}, code 1)", libc::SIGFPE);
        assert_eq!(message.lines().next(), Some(expected_first_line.as_str()));
        assert!(message.ends_with(&format!("\nSee {REFERENCE_URL}")));
        assert!(!message.contains("access violation"));
    }

    #[test]
    fn test_access_violation_message()
    {
        let record = FaultRecord::new(FaultCode::new(libc::SIGSEGV, SEGV_MAPERR), Some(0x10), OperationKind::Write);
        assert!(record
            .message()
            .starts_with("SIGSEGV/SEGV_MAPERR: address not mapped to object - Write access violation on address 0x10 (signal"));
    }

    #[test]
    fn test_unknown_operation_message()
    {
        let record = FaultRecord::new(FaultCode::new(libc::SIGBUS, BUS_ADRERR), Some(0xdead), OperationKind::Unknown);
        assert!(record.message().contains(" - Unknown operation type on address 0xdead"));
    }

    #[test]
    fn test_nested_records()
    {
        let nested = FaultRecord::new(FaultCode::new(libc::SIGSEGV, SEGV_ACCERR), Some(0x20), OperationKind::Read);
        let record = FaultRecord::new(FaultCode::new(libc::SIGILL, ILL_ILLOPN), None, OperationKind::Unknown).with_nested(nested);

        let message = record.message();
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SIGILL/ILL_ILLOPN: illegal operand"));
        assert!(lines[1].starts_with("  ∟ SIGSEGV/SEGV_ACCERR"));
        assert!(lines[1].contains("Read access violation on address 0x20"));
        assert_eq!(lines[2], format!("See {REFERENCE_URL}"));
        assert_eq!(record.chain().count(), 2);
    }

    #[test]
    fn test_unknown_code_fallbacks()
    {
        assert_eq!(FaultCode::new(libc::SIGFPE, 99).description(), "SIGFPE: unknown fault code");
        assert_eq!(FaultCode::new(libc::SIGILL, SI_USER).description(), "SIGILL/SI_USER: sent by kill");
        assert_eq!(FaultCode::new(libc::SIGBUS, SI_TKILL).description(), "SIGBUS/SI_TKILL: sent by tkill");
    }

    #[test]
    fn test_operation_from_error_code()
    {
        assert_eq!(OperationKind::from_error_code(0x4), OperationKind::Read);
        assert_eq!(OperationKind::from_error_code(0x6), OperationKind::Write);
        assert_eq!(OperationKind::from_error_code(0x14), OperationKind::Execute);
    }

    #[test]
    fn test_operation_inference_without_error_code()
    {
        assert_eq!(OperationKind::infer(None, Some(0x1000), 0x1000), OperationKind::Execute);
        assert_eq!(OperationKind::infer(None, Some(0x10), 0x1000), OperationKind::Unknown);
        assert_eq!(OperationKind::infer(None, None, 0x1000), OperationKind::Unknown);
        assert_eq!(OperationKind::infer(Some(0x2), Some(0x10), 0x1000), OperationKind::Write);
    }
}
