//! Conversions between UTF-8 and UTF-16 ("wide") strings, and decoding of
//! byte strings handed out by the platform.

use crate::error::{Result, TraceError};

/// Encode as UTF-16 code units (no terminator).
pub fn to_wide(text: &str) -> Vec<u16>
{
    text.encode_utf16().collect()
}

/// Decode UTF-16 code units, rejecting unpaired surrogates.
pub fn from_wide(wide: &[u16]) -> Result<String>
{
    String::from_utf16(wide).map_err(|err| TraceError::Encoding(err.to_string()))
}

/// Decode UTF-16 code units, replacing unpaired surrogates with U+FFFD.
pub fn from_wide_lossy(wide: &[u16]) -> String
{
    String::from_utf16_lossy(wide)
}

/// Decode a platform byte string (paths, symbol names), replacing invalid
/// UTF-8 with U+FFFD.
pub fn from_platform_bytes(bytes: &[u8]) -> String
{
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_round_trip_preserves_text()
    {
        let text = "naïve café ∟ 日本語 🦀";
        let wide = to_wide(text);
        assert_eq!(from_wide(&wide).unwrap(), text);
        assert_eq!(from_wide(&wide).unwrap().as_bytes(), text.as_bytes());
    }

    #[test]
    fn test_unpaired_surrogate()
    {
        let wide = [0x0061, 0xd800, 0x0062];
        assert!(matches!(from_wide(&wide), Err(TraceError::Encoding(_))));
        assert_eq!(from_wide_lossy(&wide), "a\u{fffd}b");
    }

    #[test]
    fn test_platform_bytes_are_decoded_lossily()
    {
        assert_eq!(from_platform_bytes(b"/usr/lib/libc.so.6"), "/usr/lib/libc.so.6");
        assert_eq!(from_platform_bytes(b"lib\xffname"), "lib\u{fffd}name");
    }
}
