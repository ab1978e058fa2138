//! Tests for error types and OS error messages

use faultline_core::os_error::{append_error_message, get_error_message};
use faultline_core::{ResolutionStatus, TraceError};

#[test]
fn test_error_message_contains_code()
{
    for code in [libc::ENOENT, libc::EACCES, libc::EFAULT, 9999] {
        let message = get_error_message(code, None);
        assert!(!message.is_empty());
        assert!(message.contains(&code.to_string()), "{message}");
    }
}

#[test]
fn test_error_message_names_function()
{
    let message = get_error_message(libc::ENOENT, Some("dl_iterate_phdr"));
    assert!(message.starts_with("dl_iterate_phdr returned error"));
    assert!(!message.contains("os error"));
}

#[test]
fn test_append_keeps_existing_text()
{
    let mut out = String::from("context: ");
    append_error_message(libc::EFAULT, None, &mut out).unwrap();
    assert!(out.starts_with("context: OS error code "));
}

#[test]
fn test_resolution_status_codes()
{
    assert_eq!(ResolutionStatus::ModuleNotFound.error_code(), libc::ENOENT);
    assert_eq!(ResolutionStatus::SymbolNotFound.error_code(), libc::ENXIO);
    assert_eq!(ResolutionStatus::InvalidAddress.error_code(), libc::EFAULT);
    assert_eq!(ResolutionStatus::EngineUnavailable.error_code(), libc::ENODEV);
}

#[test]
fn test_trace_error_display()
{
    let err = TraceError::InvalidAddress(0x10);
    assert_eq!(err.to_string(), "Invalid address: 0x0000000000000010");

    let err = TraceError::Unsupported("module enumeration");
    assert!(err.to_string().contains("module enumeration"));
}

#[test]
fn test_trace_error_from_io()
{
    let err: TraceError = std::io::Error::other("broken pipe").into();
    assert!(matches!(err, TraceError::Io(_)));
}
