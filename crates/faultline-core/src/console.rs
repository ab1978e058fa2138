//! ANSI color output for traces and serialized exceptions.
//!
//! Thin wrapper over `crossterm` commands that writes nothing when colors
//! are disabled, so callers can emit color codes unconditionally.

use std::fmt;

use crossterm::style::{ResetColor, SetForegroundColor};
use crossterm::Command;

pub use crossterm::style::Color;

/// Color of exception headlines.
pub const HEADLINE: Color = Color::Red;
/// Color of inner exception lines.
pub const INNER: Color = Color::DarkRed;
/// Color of function names in a trace.
pub const FUNCTION: Color = Color::DarkYellow;
/// Color of source locations in a trace.
pub const LOCATION: Color = Color::DarkGrey;

/// Writes color escape sequences when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette
{
    enabled: bool,
}

impl Palette
{
    pub const fn new(enabled: bool) -> Self
    {
        Self { enabled }
    }

    pub const fn enabled(self) -> bool
    {
        self.enabled
    }

    /// Switch the foreground color.
    pub fn set<W: fmt::Write>(self, out: &mut W, color: Color) -> fmt::Result
    {
        if self.enabled {
            SetForegroundColor(color).write_ansi(out)?;
        }
        Ok(())
    }

    /// Restore the terminal's default colors.
    pub fn reset<W: fmt::Write>(self, out: &mut W) -> fmt::Result
    {
        if self.enabled {
            ResetColor.write_ansi(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_disabled_palette_writes_nothing()
    {
        let mut out = String::new();
        let palette = Palette::new(false);
        palette.set(&mut out, FUNCTION).unwrap();
        palette.reset(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_enabled_palette_writes_escape_sequences()
    {
        let mut out = String::new();
        let palette = Palette::new(true);
        palette.set(&mut out, HEADLINE).unwrap();
        out.push_str("text");
        palette.reset(&mut out).unwrap();
        assert!(out.starts_with("\u{1b}["));
        assert!(out.ends_with("\u{1b}[0m"));
        assert!(out.contains("text"));
    }
}
