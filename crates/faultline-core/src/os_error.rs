//! Human-readable text for OS error codes (`errno` values).

use std::fmt::{self, Write};
use std::io;

/// Append `<function> returned error <code>: <text>` to `out`, or
/// `OS error code <code>: <text>` when no function is named.
///
/// ```rust
/// use faultline_core::os_error::append_error_message;
///
/// let mut message = String::new();
/// append_error_message(libc::ENOENT, Some("open"), &mut message).unwrap();
/// assert!(message.starts_with("open returned error 2: "));
/// ```
pub fn append_error_message<W: Write>(code: i32, function: Option<&str>, out: &mut W) -> fmt::Result
{
    match function {
        Some(name) if !name.is_empty() => write!(out, "{name} returned error ")?,
        _ => out.write_str("OS error code ")?,
    }
    write!(out, "{code}: {}", describe(code))
}

/// Same text as [`append_error_message`], as an owned string.
pub fn get_error_message(code: i32, function: Option<&str>) -> String
{
    let mut message = String::new();
    // Writing into a String cannot fail
    let _ = append_error_message(code, function, &mut message);
    message
}

fn describe(code: i32) -> String
{
    let text = io::Error::from_raw_os_error(code).to_string();
    let suffix = format!(" (os error {code})");
    match text.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_message_contains_code()
    {
        let message = get_error_message(libc::ENXIO, None);
        assert!(message.starts_with("OS error code "));
        assert!(message.contains(&libc::ENXIO.to_string()));
        assert!(!message.contains("(os error"));
    }

    #[test]
    fn test_message_names_function()
    {
        let message = get_error_message(libc::EACCES, Some("mprotect"));
        assert!(message.starts_with(&format!("mprotect returned error {}: ", libc::EACCES)));
    }

    #[test]
    fn test_empty_function_name_is_ignored()
    {
        assert!(get_error_message(libc::EINVAL, Some("")).starts_with("OS error code "));
    }
}
