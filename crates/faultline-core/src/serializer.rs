//! # Trace Serializer
//!
//! Renders filtered frames as numbered text entries:
//!
//! ```text
//! #0 app::parse_header
//!   in src/parse.rs, line 42
//! ---
//! #1 cannot resolve symbol for frame(s) - OS error code 6: No such device or address
//! ---
//! ```
//!
//! Consecutive frames that failed with the same status collapse into one
//! entry. With colors on, the `---` separators are dropped and names and
//! locations are colored.

use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::console::{self, Palette};
use crate::os_error::append_error_message;
use crate::types::{ResolutionStatus, ResolvedFrame};

// Legacy mangling renders closures as `{{closure}}`, v0 as `{closure#N}`
static CLOSURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{closure\}\}|\{closure#\d+\}").expect("closure pattern is valid"));

/// Label of frames outside every loaded image.
pub const NON_NATIVE_LABEL: &str = "[non-native code?] cannot resolve symbol for frame(s)";

/// Label prefix of other unresolved frames.
pub const UNRESOLVED_LABEL: &str = "cannot resolve symbol for frame(s) - ";

/// Separator written after each entry in plain output.
pub const ENTRY_SEPARATOR: &str = "---";

/// Render `frames` as text.
pub fn serialize(frames: &[ResolvedFrame], colorize: bool) -> String
{
    let palette = Palette::new(colorize);
    let mut out = String::new();
    let mut index = 0usize;
    let mut previous = ResolutionStatus::Success;

    for frame in frames {
        let status = frame.status();
        if !status.is_success() && status == previous {
            continue;
        }

        // Writing into a String cannot fail
        let _ = write_entry(&mut out, index, frame, palette);
        index += 1;
        previous = status;
    }

    CLOSURE.replace_all(&out, "{closure}").into_owned()
}

fn write_entry(out: &mut String, index: usize, frame: &ResolvedFrame, palette: Palette) -> std::fmt::Result
{
    write!(out, "#{index} ")?;

    match (frame.status(), frame.function()) {
        (ResolutionStatus::Success, Some(function)) => {
            palette.set(out, console::FUNCTION)?;
            out.push_str(function);
            if let Some(file) = frame.file() {
                out.push('\n');
                palette.set(out, console::LOCATION)?;
                write!(out, "  in {file}")?;
                if let Some(line) = frame.line() {
                    write!(out, ", line {line}")?;
                }
            }
        }
        (ResolutionStatus::ModuleNotFound, _) => out.push_str(NON_NATIVE_LABEL),
        (status, _) => {
            out.push_str(UNRESOLVED_LABEL);
            append_error_message(status.error_code(), None, out)?;
        }
    }

    palette.reset(out)?;
    out.push('\n');
    if !palette.enabled() {
        out.push_str(ENTRY_SEPARATOR);
        out.push('\n');
    }
    Ok(())
}
