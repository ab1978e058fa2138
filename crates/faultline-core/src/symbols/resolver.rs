//! Per-frame symbol resolution.
//!
//! Resolution never fails outright: every frame comes back as a
//! [`ResolvedFrame`] whose status says why a name is missing.

use std::cell::Cell;

use super::engine::SymbolEngineContext;
use crate::modules;
use crate::types::{ResolutionStatus, ResolvedFrame, StackFrameDescriptor};

thread_local! {
    static RESOLVING: Cell<bool> = const { Cell::new(false) };
}

/// Maps raw frames to names and source locations through one engine.
pub struct SymbolResolver<'a>
{
    engine: Option<&'a SymbolEngineContext>,
}

impl<'a> SymbolResolver<'a>
{
    /// Resolver backed by `engine`; `None` resolves everything to
    /// [`ResolutionStatus::EngineUnavailable`].
    pub fn new(engine: Option<&'a SymbolEngineContext>) -> Self
    {
        Self { engine }
    }

    /// Resolve one frame.
    pub fn resolve(&self, frame: &StackFrameDescriptor) -> ResolvedFrame
    {
        if frame.pc.is_zero() {
            return ResolvedFrame::unresolved(ResolutionStatus::InvalidAddress);
        }

        let Some(engine) = self.engine else {
            return ResolvedFrame::unresolved(ResolutionStatus::EngineUnavailable);
        };

        let probe = frame.probe_address();
        let Some(module) = modules::find_module(probe) else {
            return ResolvedFrame::unresolved(ResolutionStatus::ModuleNotFound);
        };

        let (Some(image), Some(file_address)) = (engine.image_for(&module), module.file_address(probe)) else {
            return ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound);
        };

        let Some(function) = image.function_name(file_address) else {
            return ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound);
        };

        let resolved = ResolvedFrame::resolved(function);
        match image.line_info(file_address) {
            Some(info) => resolved.with_location(info.file, info.line),
            None => resolved,
        }
    }
}

/// Resolve a whole walk with the live engine.
///
/// Logs one warning when no [`CallStackAccessScope`](super::CallStackAccessScope)
/// is live. Re-entering resolution on the same thread (a fault raised while
/// resolving and translated here) yields unavailable frames instead of
/// waiting on the engine's locks.
pub fn resolve_frames(frames: &[StackFrameDescriptor]) -> Vec<ResolvedFrame>
{
    if RESOLVING.with(Cell::get) {
        tracing::debug!("symbol resolution re-entered on the same thread");
        return frames
            .iter()
            .map(|_| ResolvedFrame::unresolved(ResolutionStatus::EngineUnavailable))
            .collect();
    }

    let engine = SymbolEngineContext::current();
    if engine.is_none() && !frames.is_empty() {
        tracing::warn!("no CallStackAccessScope is live, stack frames will not be resolved");
    }

    RESOLVING.with(|flag| flag.set(true));
    let _reset = ResetOnDrop;

    let resolver = SymbolResolver::new(engine.as_deref());
    frames.iter().map(|frame| resolver.resolve(frame)).collect()
}

struct ResetOnDrop;

impl Drop for ResetOnDrop
{
    fn drop(&mut self)
    {
        RESOLVING.with(|flag| flag.set(false));
    }
}
