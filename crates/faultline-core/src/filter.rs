//! # Frame Filter
//!
//! Trims frames that say nothing about the caller's code:
//!
//! - **Bottom**: process and thread startup frames (`_start`,
//!   `__libc_start_main`, `std::rt::lang_start`, `start_thread`, ...). The
//!   scan runs from the outermost frame inward and cuts below the first
//!   resolved frame that is not one of them. Unresolved frames on the way
//!   (startup code in a stripped libc) are cut with them.
//! - **Top**: this crate's own capture machinery (walker, `get_trace`,
//!   exception constructors, the fault handler and its signal trampoline).
//!   The scan tolerates a few unrelated frames in between (inlining and
//!   panic plumbing interleave with them) and cuts right after the last
//!   machinery frame it saw.

use crate::types::{ResolutionStatus, ResolvedFrame};

/// Runtime entry points at the bottom of every stack, matched anywhere in
/// the function name.
pub const RUNTIME_ENTRY_SYMBOLS: &[&str] = &[
    "__libc_start_main",
    "__libc_start_call_main",
    "std::rt::lang_start",
    "__rust_begin_short_backtrace",
    "core::ops::function::FnOnce::call_once",
    "core::ops::function::impls::",
    "as core::ops::function::FnOnce<",
    "std::panicking::",
    "std::panic::catch_unwind",
    "std::thread::",
    "std::sys::pal::unix::thread::",
    "std::sys::thread::",
    "::thread_start",
];

/// Entry points matched by exact name (C runtime and libc thread start).
pub const RUNTIME_ENTRY_EXACT: &[&str] = &["main", "_start", "start_thread", "clone", "clone3", "thread_start"];

/// Frames of the tracing machinery itself.
pub const INFRASTRUCTURE_SYMBOLS: &[&str] = &[
    "faultline_core::platform::",
    "faultline_core::walker::",
    "faultline_core::call_stack::get_trace",
    "faultline_core::exception::TraceableException::",
    "faultline_core::fault::FaultException::",
    "faultline_core::fault::handler::",
    "__restore_rt",
    "__rust_start_panic",
    "rust_panic",
    "std::panic::resume_unwind",
];

/// Number of unrelated frames the top scan tolerates before it stops.
pub const TOP_MISMATCH_TOLERANCE: usize = 2;

/// Drop startup frames at the bottom and machinery frames at the top.
///
/// The result may be empty.
pub fn filter(mut frames: Vec<ResolvedFrame>) -> Vec<ResolvedFrame>
{
    let end = bottom_boundary(&frames);
    let start = top_boundary(&frames[..end]);

    frames.truncate(end);
    frames.drain(..start);
    frames
}

/// Index one past the last frame kept at the bottom.
///
/// Without any resolved frame above the runtime entries, only the entries
/// matched so far are cut, so an unresolvable stack is kept whole.
fn bottom_boundary(frames: &[ResolvedFrame]) -> usize
{
    let mut end = frames.len();
    for (index, frame) in frames.iter().enumerate().rev() {
        if is_runtime_entry(frame) {
            end = index;
        } else if frame.status().is_success() {
            return index + 1;
        }
    }
    end
}

fn is_runtime_entry(frame: &ResolvedFrame) -> bool
{
    frame.name_contains_any(RUNTIME_ENTRY_SYMBOLS) || frame.function().is_some_and(|name| RUNTIME_ENTRY_EXACT.contains(&name))
}

/// Index of the first frame kept at the top.
fn top_boundary(frames: &[ResolvedFrame]) -> usize
{
    let mut last_match = None;
    let mut mismatches = 0;

    for (index, frame) in frames.iter().enumerate() {
        if is_infrastructure(frame) {
            last_match = Some(index);
        } else {
            mismatches += 1;
            if mismatches > TOP_MISMATCH_TOLERANCE {
                break;
            }
        }
    }

    last_match.map_or(0, |index| index + 1)
}

fn is_infrastructure(frame: &ResolvedFrame) -> bool
{
    frame.status() == ResolutionStatus::InvalidAddress || frame.name_contains_any(INFRASTRUCTURE_SYMBOLS)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn named(name: &str) -> ResolvedFrame
    {
        ResolvedFrame::resolved(name)
    }

    fn names(frames: &[ResolvedFrame]) -> Vec<&str>
    {
        frames.iter().map(|frame| frame.function().unwrap_or("?")).collect()
    }

    #[test]
    fn test_trims_both_ends()
    {
        let frames = vec![
            named("faultline_core::walker::capture"),
            named("faultline_core::call_stack::get_trace"),
            named("app::handler"),
            named("app::main"),
            named("core::ops::function::FnOnce::call_once"),
            named("std::sys::backtrace::__rust_begin_short_backtrace"),
            named("std::rt::lang_start::{{closure}}"),
            named("std::rt::lang_start_internal"),
            named("main"),
            named("__libc_start_call_main"),
            named("__libc_start_main_impl"),
            named("_start"),
        ];

        assert_eq!(names(&filter(frames)), vec!["app::handler", "app::main"]);
    }

    #[test]
    fn test_main_shim_matches_only_exactly()
    {
        let frames = vec![named("app::main"), named("main"), named("_start")];
        assert_eq!(names(&filter(frames)), vec!["app::main"]);
    }

    #[test]
    fn test_keeps_direct_caller()
    {
        let frames = vec![
            named("faultline_core::walker::capture"),
            named("faultline_core::call_stack::get_trace"),
            named("app::caller"),
        ];
        assert_eq!(names(&filter(frames)), vec!["app::caller"]);
    }

    #[test]
    fn test_tolerates_interleaved_frames()
    {
        let frames = vec![
            named("faultline_core::walker::capture"),
            named("alloc::vec::Vec<T>::push"),
            named("faultline_core::call_stack::get_trace"),
            named("faultline_core::exception::TraceableException::new"),
            named("app::fails"),
            named("app::main"),
        ];
        assert_eq!(names(&filter(frames)), vec!["app::fails", "app::main"]);
    }

    #[test]
    fn test_stops_after_too_many_mismatches()
    {
        let frames = vec![
            named("app::a"),
            named("app::b"),
            named("app::c"),
            named("faultline_core::call_stack::get_trace"),
            named("app::d"),
        ];
        assert_eq!(names(&filter(frames)).len(), 5);
    }

    #[test]
    fn test_no_match_cuts_nothing()
    {
        let frames = vec![named("app::a"), named("app::b")];
        assert_eq!(names(&filter(frames)), vec!["app::a", "app::b"]);
    }

    #[test]
    fn test_invalid_address_counts_as_infrastructure()
    {
        let frames = vec![ResolvedFrame::unresolved(ResolutionStatus::InvalidAddress), named("app::a")];
        assert_eq!(names(&filter(frames)), vec!["app::a"]);
    }

    #[test]
    fn test_catch_faults_is_not_trimmed()
    {
        let frames = vec![
            named("app::divide"),
            named("app::run::{{closure}}"),
            named("faultline_core::fault::catch_faults"),
            named("app::run"),
        ];
        assert_eq!(filter(frames).len(), 4);
    }

    #[test]
    fn test_everything_trimmed()
    {
        let frames = vec![named("faultline_core::walker::capture"), named("start_thread"), named("clone3")];
        assert!(filter(frames).is_empty());
    }

    #[test]
    fn test_unresolved_startup_frames_are_cut()
    {
        let frames = vec![
            named("app::worker"),
            named("app::spawn_worker::{{closure}}"),
            named("std::sys::backtrace::__rust_begin_short_backtrace"),
            named("std::thread::Builder::spawn_unchecked_::{{closure}}::{{closure}}"),
            named("<core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>::call_once"),
            named("std::panicking::try::do_call"),
            named("std::panicking::try"),
            named("std::panic::catch_unwind"),
            named("core::ops::function::FnOnce::call_once{{vtable.shim}}"),
            named("<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>::call_once"),
            named("<std::sys::thread::unix::Thread>::new::thread_start"),
            ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound),
            ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound),
        ];
        assert_eq!(names(&filter(frames)), vec!["app::worker", "app::spawn_worker::{{closure}}"]);
    }

    #[test]
    fn test_main_thread_with_stripped_libc()
    {
        let frames = vec![
            named("app::main"),
            named("core::ops::function::FnOnce::call_once"),
            named("std::sys::backtrace::__rust_begin_short_backtrace"),
            named("std::rt::lang_start::{{closure}}"),
            named("core::ops::function::impls::<impl core::ops::function::FnOnce<A> for &F>::call_once"),
            named("std::rt::lang_start_internal"),
            named("std::rt::lang_start"),
            named("main"),
            ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound),
            ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound),
            named("_start"),
        ];
        assert_eq!(names(&filter(frames)), vec!["app::main"]);
    }

    #[test]
    fn test_unresolved_frames_above_application_code_are_kept()
    {
        let frames = vec![
            named("app::leaf"),
            ResolvedFrame::unresolved(ResolutionStatus::ModuleNotFound),
            named("app::main"),
            ResolvedFrame::unresolved(ResolutionStatus::SymbolNotFound),
        ];
        let filtered = filter(frames);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered[1].status(), ResolutionStatus::ModuleNotFound);
    }

    #[test]
    fn test_fully_unresolved_stack_is_kept()
    {
        let frames = vec![ResolvedFrame::unresolved(ResolutionStatus::EngineUnavailable); 4];
        assert_eq!(filter(frames).len(), 4);
    }

    #[test]
    fn test_application_names_resembling_entries_are_kept()
    {
        let frames = vec![named("app::clone_repo"), named("app::server_start"), named("app::main")];
        assert_eq!(filter(frames).len(), 3);
    }

    #[test]
    fn test_empty_input()
    {
        assert!(filter(Vec::new()).is_empty());
    }
}
