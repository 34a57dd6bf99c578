//! Device-native charset handling
//!
//! The billboards speak an 8-bit Korean charset (EUC-KR); everything leaving
//! a billboard codec is transcoded from UTF-8 here.

use encoding_rs::EUC_KR;

use crate::error::{FieldError, Result};

/// Transcode UTF-8 text to EUC-KR bytes
///
/// Fails on characters with no EUC-KR mapping rather than sending replacement
/// bytes to the sign.
pub fn to_euc_kr(text: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = EUC_KR.encode(text);
    if had_errors {
        return Err(FieldError::protocol(format!(
            "Text not representable in EUC-KR: {text:?}"
        )));
    }
    Ok(bytes.into_owned())
}

/// Number of EUC-KR bytes a single character occupies (1 for ASCII, 2 for Korean)
pub fn euc_kr_width(ch: char) -> usize {
    if ch.is_ascii() {
        1
    } else {
        2
    }
}

/// Uppercase hex encoding without separators
pub fn hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(to_euc_kr("STOP").unwrap(), b"STOP");
    }

    #[test]
    fn test_korean_is_two_bytes_per_syllable() {
        // 진입금지 = "no entry", 4 syllables
        let bytes = to_euc_kr("진입금지").unwrap();
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn test_unmappable_fails() {
        assert!(to_euc_kr("🌊").is_err());
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[0x10, 0x02, 0xAB]), "1002AB");
    }
}
