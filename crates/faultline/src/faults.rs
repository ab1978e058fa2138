//! Functions that raise a hardware fault on purpose.
//!
//! Each returns `Ok(())` only if the instruction unexpectedly completed.

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
use std::arch::asm;
use std::hint::black_box;

use faultline_core::Result;

/// Integer division by zero. Only x86-64 traps on it; elsewhere this is
/// reported as unsupported.
#[inline(never)]
pub fn divide_by_zero() -> Result<()>
{
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        let divisor: u32 = black_box(0);
        let quotient: u32;
        unsafe {
            asm!(
                "div {divisor:e}",
                divisor = in(reg) divisor,
                inout("eax") 1u32 => quotient,
                inout("edx") 0u32 => _,
            );
        }
        black_box(quotient);
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    {
        Err(faultline_core::TraceError::Unsupported("integer division traps only on x86-64"))
    }
}

/// Load from address zero.
#[inline(never)]
pub fn null_read() -> Result<()>
{
    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let address: usize = black_box(0);
        let value: u64;
        unsafe {
            #[cfg(target_arch = "x86_64")]
            asm!("mov {value}, qword ptr [{address}]", address = in(reg) address, value = out(reg) value);
            #[cfg(target_arch = "aarch64")]
            asm!("ldr {value}, [{address}]", address = in(reg) address, value = out(reg) value);
        }
        black_box(value);
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
    {
        Err(faultline_core::TraceError::Unsupported("fault translation"))
    }
}

/// Execute an undefined instruction.
#[inline(never)]
pub fn illegal_instruction() -> Result<()>
{
    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        unsafe {
            #[cfg(target_arch = "x86_64")]
            asm!("ud2");
            #[cfg(target_arch = "aarch64")]
            asm!("udf #0");
        }
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
    {
        Err(faultline_core::TraceError::Unsupported("fault translation"))
    }
}
