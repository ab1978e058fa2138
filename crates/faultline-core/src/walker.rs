//! # Stack Walker
//!
//! Produces the raw frames of the current thread, innermost first.
//!
//! Every step looks up the call frame information (CFI) row for the frame's
//! program counter in the owning module's in-memory `.eh_frame_hdr` search
//! table, computes the canonical frame address (CFA) and restores the return
//! address and frame pointer from it. Frames without CFI fall back to the
//! frame-pointer chain.
//!
//! The walk stops when:
//! - the return address is zero or the CFI marks it undefined
//! - the stack pointer stops increasing
//! - a read falls outside the current thread's stack
//! - `max_frames` frames were produced
//!
//! ## Locking
//!
//! All walks in the process are serialized by one mutex, held for exactly the
//! duration of the walk loop. A walk requested while the same thread is
//! already walking (a fault raised inside the walker and translated on this
//! thread) returns no frames instead of deadlocking.

use std::cell::Cell;
use std::sync::{Mutex, PoisonError};

use gimli::{
    BaseAddresses, CfaRule, EhFrame, EhFrameHdr, NativeEndian, Pointer, Register, RegisterRule, UnwindContext,
    UnwindSection, UnwindTableRow,
};

use crate::config::TraceConfig;
use crate::error::{Result, TraceError};
use crate::modules::{self, Module};
use crate::platform::{self, StackMemory};
use crate::types::{Address, Architecture, CapturedContext, StackFrameDescriptor};

static WALK_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static WALKING: Cell<bool> = const { Cell::new(false) };
}

/// Minimal memory accessor required for stack unwinding.
pub trait MemoryAccess
{
    fn read_u64(&self, address: Address) -> Result<u64>;
}

/// Walk the stack of the calling thread.
///
/// With `None`, the registers are captured here first and the trace starts
/// with this function; with a context, the walk starts at its `pc`. The frame
/// described by a supplied context must still be live on this thread.
#[inline(never)]
pub fn capture(context: Option<&CapturedContext>) -> Vec<StackFrameDescriptor>
{
    let start = match context {
        Some(context) => *context,
        None => match platform::capture_context() {
            Ok(context) => context,
            Err(err) => {
                tracing::debug!(%err, "cannot capture the current context");
                return Vec::new();
            }
        },
    };

    walk(&start, TraceConfig::global().max_frames)
}

/// Walk from `context` with an explicit frame cap.
pub fn walk(context: &CapturedContext, max_frames: usize) -> Vec<StackFrameDescriptor>
{
    if !context.is_valid() {
        tracing::debug!(pc = %context.pc, sp = %context.sp, "refusing to walk an invalid context");
        return Vec::new();
    }

    if WALKING.with(Cell::get) {
        tracing::debug!("stack walk re-entered on the same thread, returning no frames");
        return Vec::new();
    }

    let memory = match StackMemory::current() {
        Ok(memory) => memory,
        Err(err) => {
            tracing::debug!(%err, "cannot determine the bounds of the current stack");
            return Vec::new();
        }
    };

    let _walking = WalkingFlag::raise();
    let _lock = WALK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    StackWalker::new(Architecture::current(), &memory).walk(context, max_frames)
}

struct WalkingFlag;

impl WalkingFlag
{
    fn raise() -> Self
    {
        WALKING.with(|flag| flag.set(true));
        WalkingFlag
    }
}

impl Drop for WalkingFlag
{
    fn drop(&mut self)
    {
        WALKING.with(|flag| flag.set(false));
    }
}

/// Registers tracked while walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor
{
    pc: Address,
    sp: Address,
    fp: Address,
    lr: Address,
}

impl From<&CapturedContext> for Cursor
{
    fn from(context: &CapturedContext) -> Self
    {
        Self {
            pc: context.pc,
            sp: context.sp,
            fp: context.fp,
            lr: context.lr,
        }
    }
}

enum Step
{
    Next(Cursor),
    End,
}

/// CFI-driven stack walker with a frame-pointer fallback.
pub struct StackWalker<'a, M>
{
    architecture: Architecture,
    memory: &'a M,
    unwind_context: UnwindContext<usize>,
}

impl<'a, M: MemoryAccess> StackWalker<'a, M>
{
    pub fn new(architecture: Architecture, memory: &'a M) -> Self
    {
        Self {
            architecture,
            memory,
            unwind_context: UnwindContext::new(),
        }
    }

    /// Produce at most `max_frames` frames starting at `context`.
    pub fn walk(&mut self, context: &CapturedContext, max_frames: usize) -> Vec<StackFrameDescriptor>
    {
        let mut frames = Vec::new();
        if !self.architecture.is_supported() {
            return frames;
        }

        let mut cursor = Cursor::from(context);
        let mut exact = true;

        while frames.len() < max_frames && !cursor.pc.is_zero() {
            frames.push(StackFrameDescriptor {
                pc: cursor.pc,
                fp: cursor.fp,
                sp: cursor.sp,
                exact,
            });

            let step = match self.unwind_once(&cursor, exact) {
                Ok(Some(step)) => Some(step),
                Ok(None) => self.frame_pointer_fallback(&cursor),
                Err(err) => {
                    tracing::trace!(pc = %cursor.pc, %err, "CFI step failed, trying frame pointers");
                    self.frame_pointer_fallback(&cursor)
                }
            };

            let next = match step {
                Some(Step::Next(next)) => next,
                Some(Step::End) | None => break,
            };

            if next.sp <= cursor.sp {
                tracing::trace!(sp = %cursor.sp, next = %next.sp, "stack pointer did not increase");
                break;
            }

            tracing::trace!(pc = %cursor.pc, caller = %next.pc, cfa = %next.sp, "unwound frame");
            cursor = next;
            exact = false;
        }

        frames
    }

    fn unwind_once(&mut self, regs: &Cursor, exact: bool) -> Result<Option<Step>>
    {
        let Some(module) = modules::find_module(regs.pc) else {
            return Ok(None);
        };
        let Some(row) = self.find_row(&module, regs, exact)? else {
            return Ok(None);
        };
        self.build_step_from_row(regs, &row, exact)
    }

    fn find_row(&mut self, module: &Module, regs: &Cursor, exact: bool) -> Result<Option<UnwindTableRow<usize>>>
    {
        let (Some(hdr_address), Some(hdr_bytes)) = (module.eh_frame_hdr_address(), module.eh_frame_hdr_bytes()) else {
            return Ok(None);
        };

        let address_size = self.architecture.pointer_size_bytes();
        let bases = BaseAddresses::default().set_eh_frame_hdr(hdr_address);
        let hdr = EhFrameHdr::new(hdr_bytes, NativeEndian).parse(&bases, address_size)?;

        let eh_frame_address = match hdr.eh_frame_ptr() {
            Pointer::Direct(address) => address,
            Pointer::Indirect(_) => return Err(TraceError::Unwind("indirect .eh_frame pointer".into())),
        };
        let Some(eh_frame_bytes) = module.bytes_to_segment_end(eh_frame_address) else {
            return Ok(None);
        };

        let bases = bases.set_eh_frame(eh_frame_address).set_text(module.bias());
        let mut eh_frame = EhFrame::new(eh_frame_bytes, NativeEndian);
        eh_frame.set_address_size(address_size);

        // Return addresses point past the call, which may be the next function
        let probe = if exact { regs.pc } else { regs.pc - 1 };

        let lookup = match hdr.table() {
            Some(table) => {
                table.unwind_info_for_address(&eh_frame, &bases, &mut self.unwind_context, probe.value(), |section, bases, offset| {
                    section.cie_from_offset(bases, offset)
                })
            }
            None => eh_frame.unwind_info_for_address(&bases, &mut self.unwind_context, probe.value(), |section, bases, offset| {
                section.cie_from_offset(bases, offset)
            }),
        };

        match lookup {
            Ok(row) => Ok(Some(row.clone())),
            Err(gimli::Error::NoUnwindInfoForAddress) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn build_step_from_row(&self, regs: &Cursor, row: &UnwindTableRow<usize>, exact: bool) -> Result<Option<Step>>
    {
        let cfa = match row.cfa() {
            CfaRule::RegisterAndOffset { register, offset } => {
                let base = self
                    .register_value(regs, *register)
                    .ok_or_else(|| TraceError::Unwind(format!("no value for CFA register {}", register.0)))?;
                base.checked_offset(*offset)
                    .ok_or_else(|| TraceError::Unwind("CFA out of range".into()))?
            }
            _ => return Ok(None),
        };

        let return_address = match row.register(self.return_register()) {
            RegisterRule::Undefined | RegisterRule::SameValue => {
                // A leaf that has not spilled its link register yet
                if self.architecture == Architecture::Arm64 && exact && !regs.lr.is_zero() {
                    regs.lr
                } else {
                    return Ok(Some(Step::End));
                }
            }
            rule => Address::new(self.evaluate_rule(&rule, regs, cfa)?),
        };

        if return_address.is_zero() {
            return Ok(Some(Step::End));
        }

        let fp = match row.register(self.frame_register()) {
            RegisterRule::Undefined | RegisterRule::SameValue => regs.fp,
            rule => Address::new(self.evaluate_rule(&rule, regs, cfa)?),
        };

        Ok(Some(Step::Next(Cursor {
            pc: return_address,
            sp: cfa,
            fp,
            lr: return_address,
        })))
    }

    fn evaluate_rule(&self, rule: &RegisterRule<usize>, regs: &Cursor, cfa: Address) -> Result<u64>
    {
        match rule {
            RegisterRule::Offset(offset) => {
                let addr = cfa
                    .checked_offset(*offset)
                    .ok_or_else(|| TraceError::Unwind("saved register address out of range".into()))?;
                self.memory.read_u64(addr)
            }
            RegisterRule::ValOffset(offset) => cfa
                .checked_offset(*offset)
                .map(Address::value)
                .ok_or_else(|| TraceError::Unwind("register value out of range".into())),
            RegisterRule::Register(register) => self
                .register_value(regs, *register)
                .map(Address::value)
                .ok_or_else(|| TraceError::Unwind("register redirect missing value".into())),
            _ => Err(TraceError::Unwind("unsupported CFI expression encountered".into())),
        }
    }

    fn frame_pointer_fallback(&self, regs: &Cursor) -> Option<Step>
    {
        if !self.architecture.is_supported() {
            return None;
        }

        // Both architectures link frames as [fp] = caller fp, [fp + 8] = return address
        let fp = regs.fp;
        if fp.is_zero() || fp < regs.sp {
            return None;
        }

        let saved_fp = match self.memory.read_u64(fp) {
            Ok(value) => value,
            Err(err) => {
                tracing::trace!(%fp, %err, "frame pointer chain broken");
                return None;
            }
        };
        let return_addr = match self.memory.read_u64(fp + 8) {
            Ok(value) => value,
            Err(err) => {
                tracing::trace!(%fp, %err, "frame pointer chain broken");
                return None;
            }
        };

        if return_addr == 0 {
            return Some(Step::End);
        }

        Some(Step::Next(Cursor {
            pc: Address::new(return_addr),
            sp: fp + 16,
            fp: Address::new(saved_fp),
            lr: Address::new(return_addr),
        }))
    }

    fn register_value(&self, regs: &Cursor, register: Register) -> Option<Address>
    {
        match self.architecture {
            Architecture::X86_64 => match register {
                gimli::X86_64::RSP => Some(regs.sp),
                gimli::X86_64::RBP => Some(regs.fp),
                gimli::X86_64::RA => Some(regs.pc),
                _ => None,
            },
            Architecture::Arm64 => match register {
                gimli::AArch64::SP => Some(regs.sp),
                gimli::AArch64::X29 => Some(regs.fp),
                gimli::AArch64::X30 => Some(regs.lr),
                _ => None,
            },
            Architecture::Unknown(_) => None,
        }
    }

    fn return_register(&self) -> Register
    {
        match self.architecture {
            Architecture::Arm64 => gimli::AArch64::X30,
            _ => gimli::X86_64::RA,
        }
    }

    fn frame_register(&self) -> Register
    {
        match self.architecture {
            Architecture::Arm64 => gimli::AArch64::X29,
            _ => gimli::X86_64::RBP,
        }
    }
}
