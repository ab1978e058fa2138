//! Tests for UTF-8 and UTF-16 conversions

use faultline_core::encoding::{from_platform_bytes, from_wide, from_wide_lossy, to_wide};
use faultline_core::TraceError;

#[test]
fn test_round_trip_preserves_bytes()
{
    let samples = ["", "plain ascii", "héllo wörld", "  ∟ nested", "日本語のテキスト", "crab 🦀 emoji"];
    for sample in samples {
        let wide = to_wide(sample);
        let back = from_wide(&wide).unwrap();
        assert_eq!(back.as_bytes(), sample.as_bytes());
    }
}

#[test]
fn test_surrogate_pairs()
{
    assert_eq!(to_wide("🦀"), vec![0xd83e, 0xdd80]);
}

#[test]
fn test_unpaired_surrogate_is_rejected()
{
    let err = from_wide(&[0x61, 0xd800, 0x62]).unwrap_err();
    assert!(matches!(err, TraceError::Encoding(_)));
    assert_eq!(from_wide_lossy(&[0x61, 0xd800, 0x62]), "a\u{fffd}b");
}

#[test]
fn test_platform_bytes()
{
    assert_eq!(from_platform_bytes(b"/usr/lib/libc.so.6"), "/usr/lib/libc.so.6");
    assert_eq!(from_platform_bytes(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");
}
