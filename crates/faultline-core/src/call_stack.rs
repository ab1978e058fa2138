//! # Call Stack
//!
//! Entry points of the tracing pipeline: walk, resolve, filter, serialize.
//!
//! ```rust,no_run
//! use faultline_core::{call_stack, CallStackAccessScope};
//!
//! fn report()
//! {
//!     let _symbols = CallStackAccessScope::new();
//!     eprintln!("{}", call_stack::get_trace(true));
//! }
//! ```

use crate::filter;
use crate::serializer;
use crate::symbols::resolve_frames;
use crate::types::{CapturedContext, ResolvedFrame, StackFrameDescriptor};
use crate::walker;

/// Trace of the calling thread, starting at the caller of this function.
#[inline(never)]
pub fn get_trace(colorize: bool) -> String
{
    let frames = walker::capture(None);
    render(&frames_to_trace(&frames), colorize)
}

/// Trace starting at the frame described by `context`.
///
/// The context must describe a frame that is still live on this thread:
/// one captured by [`capture_context`](crate::platform::capture_context) in
/// a caller, or the registers of a fault being handled here.
#[inline(never)]
pub fn get_trace_from(context: &CapturedContext, colorize: bool) -> String
{
    let frames = walker::capture(Some(context));
    render(&frames_to_trace(&frames), colorize)
}

/// Resolved and filtered frames of the calling thread, without rendering.
#[inline(never)]
pub fn get_trace_frames() -> Vec<ResolvedFrame>
{
    let frames = walker::capture(None);
    frames_to_trace(&frames)
}

fn frames_to_trace(frames: &[StackFrameDescriptor]) -> Vec<ResolvedFrame>
{
    let resolved = resolve_frames(frames);
    let filtered = filter::filter(resolved);
    tracing::trace!(walked = frames.len(), kept = filtered.len(), "call stack captured");
    filtered
}

fn render(frames: &[ResolvedFrame], colorize: bool) -> String
{
    serializer::serialize(frames, colorize)
}
