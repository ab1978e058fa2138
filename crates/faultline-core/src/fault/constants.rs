//! Signal and `si_code` values of the faults the translator handles.
//!
//! The `si_code` values are the Linux ABI ones from `<asm-generic/siginfo.h>`;
//! they are spelled out here because `libc` only exposes a subset of them.
//!
//! See: [sigaction(2)](https://man7.org/linux/man-pages/man2/sigaction.2.html)

use libc::c_int;

/// Signals with a translator installed while a scope is live.
pub const TRANSLATED_SIGNALS: [c_int; 5] = [libc::SIGFPE, libc::SIGSEGV, libc::SIGBUS, libc::SIGILL, libc::SIGTRAP];

// Codes shared by every signal
pub const SI_USER: c_int = 0;
pub const SI_KERNEL: c_int = 0x80;
pub const SI_TKILL: c_int = -6;

pub const FPE_INTDIV: c_int = 1;
pub const FPE_INTOVF: c_int = 2;
pub const FPE_FLTDIV: c_int = 3;
pub const FPE_FLTOVF: c_int = 4;
pub const FPE_FLTUND: c_int = 5;
pub const FPE_FLTRES: c_int = 6;
pub const FPE_FLTINV: c_int = 7;
pub const FPE_FLTSUB: c_int = 8;

pub const SEGV_MAPERR: c_int = 1;
pub const SEGV_ACCERR: c_int = 2;

pub const BUS_ADRALN: c_int = 1;
pub const BUS_ADRERR: c_int = 2;
pub const BUS_OBJERR: c_int = 3;

pub const ILL_ILLOPC: c_int = 1;
pub const ILL_ILLOPN: c_int = 2;
pub const ILL_ILLADR: c_int = 3;
pub const ILL_ILLTRP: c_int = 4;
pub const ILL_PRVOPC: c_int = 5;
pub const ILL_PRVREG: c_int = 6;
pub const ILL_COPROC: c_int = 7;
pub const ILL_BADSTK: c_int = 8;

pub const TRAP_BRKPT: c_int = 1;
pub const TRAP_TRACE: c_int = 2;

/// x86-64 page-fault error code: the access was a write.
pub const PF_WRITE: u64 = 1 << 1;
/// x86-64 page-fault error code: the access was an instruction fetch.
pub const PF_INSTR: u64 = 1 << 4;

/// Name of a translated signal.
pub fn signal_name(signal: c_int) -> &'static str
{
    match signal {
        libc::SIGFPE => "SIGFPE",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGBUS => "SIGBUS",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        _ => "SIG?",
    }
}
