//! Symbol demangling utilities.
//!
//! Rust symbols (legacy `_ZN...E` and v0 `_R...` schemes) are demangled with
//! `rustc_demangle`, without the trailing hash. Everything else (C, C++) is
//! kept as written in the symbol table.

use rustc_demangle::try_demangle;

/// Human-readable name for a raw linkage name.
///
/// ```rust
/// use faultline_core::symbols::demangle::demangle_symbol;
///
/// assert_eq!(demangle_symbol("_ZN4core3ptr13drop_in_place17h0123456789abcdefE"), "core::ptr::drop_in_place");
/// assert_eq!(demangle_symbol("__libc_start_main"), "__libc_start_main");
/// ```
pub fn demangle_symbol(raw: &str) -> String
{
    match try_demangle(raw) {
        // `{:#}` drops the `::h<hash>` suffix
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => raw.to_string(),
    }
}
