//! # Traceable Exceptions
//!
//! Errors that carry the call stack trace of the place they were created.
//!
//! The trace is captured and rendered once, in the constructor, and never
//! recomputed. Whether it is colored is decided by the process-wide toggle
//! [`use_colors_on_stack_trace`] (initialized from `FAULTLINE_COLORS`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::{CallStackAccessScope, Traceable, TraceableException};
//!
//! fn load() -> Result<(), TraceableException>
//! {
//!     let io = std::io::Error::other("disk on fire");
//!     Err(TraceableException::with_inner("cannot load settings", io))
//! }
//!
//! let _symbols = CallStackAccessScope::new();
//! if let Err(err) = load() {
//!     eprintln!("{}", err.serialize());
//! }
//! ```

use std::error::Error;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::call_stack;
use crate::config::TraceConfig;
use crate::console::{self, Palette};
use crate::types::CapturedContext;

static USE_COLORS: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(TraceConfig::global().colors));

/// Trace text used when tracing on the fault path is compiled out.
pub const DISABLED_TRACE: &str = "(disabled in this build)";

/// Header between the message lines and the trace.
pub const TRACE_HEADER: &str = "=== CALL STACK TRACE ===";

/// Turn ANSI colors in traces and serialized exceptions on or off.
///
/// Affects every exception created and serialized afterwards.
pub fn use_colors_on_stack_trace(enable: bool)
{
    USE_COLORS.store(enable, Ordering::Relaxed);
}

/// Current state of the color toggle.
pub fn colors_enabled() -> bool
{
    USE_COLORS.load(Ordering::Relaxed)
}

/// Errors that carry a rendered call stack trace.
pub trait Traceable: Error
{
    /// Explicit name of the error kind, printed by [`Traceable::serialize`].
    fn type_name(&self) -> &str;

    fn message(&self) -> &str;

    /// Trace rendered when the error was created.
    fn call_stack_trace(&self) -> &str;

    /// The error this one wraps, if any.
    fn inner_exception(&self) -> Option<&(dyn Error + Send + Sync + 'static)>;

    /// Headline, optional inner error and trace, as one block of text.
    fn serialize(&self) -> String
    {
        let inner = self.inner_exception().map(ToString::to_string);
        render_exception(
            self.type_name(),
            self.message(),
            inner.as_deref(),
            self.call_stack_trace(),
            Palette::new(colors_enabled()),
        )
    }
}

fn render_exception(type_name: &str, message: &str, inner: Option<&str>, trace: &str, palette: Palette) -> String
{
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_exception(&mut out, type_name, message, inner, trace, palette);
    out
}

fn write_exception(
    out: &mut String,
    type_name: &str,
    message: &str,
    inner: Option<&str>,
    trace: &str,
    palette: Palette,
) -> fmt::Result
{
    palette.set(out, console::HEADLINE)?;
    write!(out, "{type_name}: {message}")?;
    palette.reset(out)?;
    out.push('\n');

    if let Some(inner) = inner {
        palette.set(out, console::INNER)?;
        write!(out, "  ∟ {inner}")?;
        palette.reset(out)?;
        out.push('\n');
    }

    writeln!(out, "{TRACE_HEADER}")?;
    writeln!(out, "{trace}")
}

/// An error with a message, an optional inner error and the trace of the
/// place it was created.
#[derive(Debug)]
pub struct TraceableException
{
    message: String,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
    trace: String,
    type_name: &'static str,
}

impl TraceableException
{
    pub const TYPE_NAME: &'static str = "TraceableException";

    /// New exception with the trace of the caller.
    #[inline(never)]
    pub fn new(message: impl Into<String>) -> Self
    {
        let trace = call_stack::get_trace(colors_enabled());
        Self::from_parts(message.into(), None, trace)
    }

    /// New exception wrapping `inner`, with the trace of the caller.
    #[inline(never)]
    pub fn with_inner<E>(message: impl Into<String>, inner: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let trace = call_stack::get_trace(colors_enabled());
        Self::from_parts(message.into(), Some(inner.into()), trace)
    }

    /// New exception whose trace starts at the frame described by `context`.
    ///
    /// With `trace_enabled == false` no stack is walked and the trace reads
    /// [`DISABLED_TRACE`].
    #[inline(never)]
    pub fn from_context(message: impl Into<String>, context: &CapturedContext, trace_enabled: bool) -> Self
    {
        let trace = if trace_enabled {
            call_stack::get_trace_from(context, colors_enabled())
        } else {
            DISABLED_TRACE.to_string()
        };
        Self::from_parts(message.into(), None, trace)
    }

    /// New exception with a fixed trace text, for when no stack can be walked.
    pub fn with_trace_text(message: impl Into<String>, trace: impl Into<String>) -> Self
    {
        Self::from_parts(message.into(), None, trace.into())
    }

    fn from_parts(message: String, inner: Option<Box<dyn Error + Send + Sync + 'static>>, trace: String) -> Self
    {
        Self {
            message,
            inner,
            trace,
            type_name: Self::TYPE_NAME,
        }
    }

    /// Replace the type name reported by [`Traceable::type_name`].
    #[must_use]
    pub fn with_type_name(mut self, type_name: &'static str) -> Self
    {
        self.type_name = type_name;
        self
    }
}

impl fmt::Display for TraceableException
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.message)
    }
}

impl Error for TraceableException
{
    fn source(&self) -> Option<&(dyn Error + 'static)>
    {
        self.inner.as_deref().map(|inner| inner as &(dyn Error + 'static))
    }
}

impl Traceable for TraceableException
{
    fn type_name(&self) -> &str
    {
        self.type_name
    }

    fn message(&self) -> &str
    {
        &self.message
    }

    fn call_stack_trace(&self) -> &str
    {
        &self.trace
    }

    fn inner_exception(&self) -> Option<&(dyn Error + Send + Sync + 'static)>
    {
        self.inner.as_deref()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_render_plain()
    {
        let text = render_exception("ParseError", "bad header", Some("unexpected eof"), "#0 app::parse\n---\n", Palette::new(false));
        assert_eq!(
            text,
            "ParseError: bad header\n  ∟ unexpected eof\n=== CALL STACK TRACE ===\n#0 app::parse\n---\n\n"
        );
    }

    #[test]
    fn test_render_without_inner()
    {
        let text = render_exception("TraceableException", "boom", None, "", Palette::new(false));
        assert_eq!(text, "TraceableException: boom\n=== CALL STACK TRACE ===\n\n");
    }

    #[test]
    fn test_render_colored()
    {
        let text = render_exception("E", "m", Some("i"), "", Palette::new(true));
        assert!(text.starts_with("\u{1b}["));
        assert!(text.contains("E: m\u{1b}[0m\n"));
        assert!(text.contains("  ∟ i\u{1b}[0m\n"));
    }

    #[test]
    fn test_trace_text_and_type_name()
    {
        let exception = TraceableException::with_trace_text("no stack", DISABLED_TRACE).with_type_name("CustomError");
        assert_eq!(exception.type_name(), "CustomError");
        assert_eq!(exception.call_stack_trace(), DISABLED_TRACE);
        assert_eq!(exception.to_string(), "no stack");
        assert!(exception.source().is_none());
    }
}
