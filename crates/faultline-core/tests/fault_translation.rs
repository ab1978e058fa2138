//! Tests for translating hardware faults into FaultException
//!
//! The faulting functions are written in inline assembly so the fault is
//! raised by the instruction under test and not by a checked operation.
//! They own nothing that needs dropping, which translation requires.

#![cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]

use std::arch::asm;
use std::hint::black_box;

use faultline_core::exception::DISABLED_TRACE;
use faultline_core::fault::{constants, OperationKind, FAULT_TRACE_ENABLED, REFERENCE_URL};
use faultline_core::{catch_faults, use_colors_on_stack_trace, CallStackAccessScope, FaultException, FaultTranslationScope, Traceable};

#[cfg(target_arch = "x86_64")]
#[inline(never)]
fn divide_by_zero(divisor: u32) -> u32
{
    let quotient: u32;
    unsafe {
        asm!(
            "div {divisor:e}",
            divisor = in(reg) divisor,
            inout("eax") 1u32 => quotient,
            inout("edx") 0u32 => _,
        );
    }
    quotient
}

#[inline(never)]
fn read_address(address: usize) -> u64
{
    let value: u64;
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("mov {value}, qword ptr [{address}]", address = in(reg) address, value = out(reg) value);
        #[cfg(target_arch = "aarch64")]
        asm!("ldr {value}, [{address}]", address = in(reg) address, value = out(reg) value);
    }
    value
}

#[inline(never)]
fn illegal_instruction()
{
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("ud2");
        #[cfg(target_arch = "aarch64")]
        asm!("udf #0");
    }
}

fn assert_traced_once(fault: &FaultException, function: &str)
{
    let trace = fault.call_stack_trace();
    if FAULT_TRACE_ENABLED {
        assert_eq!(trace.matches(function).count(), 1, "{trace}");
    } else {
        assert_eq!(trace, DISABLED_TRACE);
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_integer_divide_by_zero()
{
    use_colors_on_stack_trace(false);
    let _symbols = CallStackAccessScope::new();

    let fault = catch_faults(|| divide_by_zero(black_box(0))).unwrap_err();
    assert_eq!(fault.record().code.signal, libc::SIGFPE);
    assert_eq!(fault.record().code.si_code, constants::FPE_INTDIV);
    assert!(fault.message().starts_with("SIGFPE/FPE_INTDIV: integer divide by zero"));
    assert!(fault.message().ends_with(REFERENCE_URL));
    assert_traced_once(&fault, "fault_translation::divide_by_zero");
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_divide_without_fault_returns_value()
{
    assert_eq!(catch_faults(|| divide_by_zero(black_box(1))).unwrap(), 1);
}

#[test]
fn test_null_read()
{
    use_colors_on_stack_trace(false);
    let _symbols = CallStackAccessScope::new();

    let fault = catch_faults(|| read_address(black_box(0))).unwrap_err();
    let record = fault.record();
    assert_eq!(record.code.signal, libc::SIGSEGV);
    assert_eq!(record.code.si_code, constants::SEGV_MAPERR);
    assert_eq!(record.faulting_address, Some(0));
    #[cfg(target_arch = "x86_64")]
    assert_eq!(record.operation, OperationKind::Read);
    assert!(fault.message().contains("on address 0x0"), "{}", fault.message());
    assert_traced_once(&fault, "fault_translation::read_address");
}

#[test]
fn test_illegal_instruction()
{
    let _symbols = CallStackAccessScope::new();

    let fault = catch_faults(illegal_instruction).unwrap_err();
    assert_eq!(fault.record().code.signal, libc::SIGILL);
    assert_eq!(fault.record().operation, OperationKind::Unknown);
    assert!(fault.message().starts_with("SIGILL/ILL_"));
    assert_traced_once(&fault, "fault_translation::illegal_instruction");
}

#[test]
fn test_repeated_faults_are_translated()
{
    for _ in 0..3 {
        let fault = catch_faults(|| read_address(black_box(8))).unwrap_err();
        assert_eq!(fault.record().faulting_address, Some(8));
    }
    assert!(!FaultTranslationScope::is_active());
}

#[test]
fn test_nested_scopes()
{
    let _outer = FaultTranslationScope::new().unwrap();
    let fault = catch_faults(|| read_address(black_box(16))).unwrap_err();
    assert_eq!(fault.record().code.signal, libc::SIGSEGV);
    assert!(FaultTranslationScope::is_active());
}

#[test]
fn test_fault_serializes_with_type_name()
{
    use_colors_on_stack_trace(false);
    let fault = catch_faults(|| read_address(black_box(24))).unwrap_err();
    let text = fault.serialize();
    assert!(text.starts_with("FaultException: SIGSEGV/"), "{text}");
    assert!(text.contains("=== CALL STACK TRACE ==="));
}
