//! Code-page aware text transcoding.
//!
//! Project metadata and module sources are stored as MBCS bytes in the
//! project's code page; Unicode twin records are UTF-16LE. Decoding is
//! lossy-tolerant (invalid bytes become U+FFFD), while encoding demands
//! that every character round-trips and reports the first one that does
//! not.

use encoding_rs::Encoding;

use crate::error::VbaProjectError;

/// Code page used when a project does not declare one.
pub const DEFAULT_CODE_PAGE: u16 = 1252;

/// Map a numeric code-page identifier onto its encoding.
pub fn encoding_for_code_page(code_page: u16) -> Option<&'static Encoding> {
    match code_page {
        932 => Some(encoding_rs::SHIFT_JIS),
        936 => Some(encoding_rs::GBK),
        949 => Some(encoding_rs::EUC_KR),
        950 => Some(encoding_rs::BIG5),
        1250 => Some(encoding_rs::WINDOWS_1250),
        1251 => Some(encoding_rs::WINDOWS_1251),
        1252 => Some(encoding_rs::WINDOWS_1252),
        1253 => Some(encoding_rs::WINDOWS_1253),
        1254 => Some(encoding_rs::WINDOWS_1254),
        1255 => Some(encoding_rs::WINDOWS_1255),
        1256 => Some(encoding_rs::WINDOWS_1256),
        1257 => Some(encoding_rs::WINDOWS_1257),
        1258 => Some(encoding_rs::WINDOWS_1258),
        65001 => Some(encoding_rs::UTF_8),
        _ => None,
    }
}

/// Decode MBCS bytes. Invalid sequences decode to U+FFFD.
pub fn decode(bytes: &[u8], code_page: u16) -> Result<String, VbaProjectError> {
    let encoding = encoding_for_code_page(code_page)
        .ok_or(VbaProjectError::UnsupportedCodePage(code_page))?;
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    Ok(text.into_owned())
}

/// Encode text into MBCS bytes, failing on the first character the code
/// page cannot represent.
pub fn encode(text: &str, code_page: u16) -> Result<Vec<u8>, VbaProjectError> {
    let encoding = encoding_for_code_page(code_page)
        .ok_or(VbaProjectError::UnsupportedCodePage(code_page))?;
    // All supported code pages are ASCII-compatible.
    if text.is_ascii() {
        return Ok(text.as_bytes().to_vec());
    }
    let (bytes, _, had_errors) = encoding.encode(text);
    if !had_errors {
        return Ok(bytes.into_owned());
    }
    let character = first_unencodable(text, encoding).unwrap_or('\u{FFFD}');
    Err(VbaProjectError::Unencodable {
        code_page,
        character,
    })
}

fn first_unencodable(text: &str, encoding: &'static Encoding) -> Option<char> {
    let mut buf = [0u8; 4];
    text.chars().find(|&ch| {
        let (_, _, bad) = encoding.encode(ch.encode_utf8(&mut buf));
        bad
    })
}

/// Decode a UTF-16LE twin record. An odd trailing byte is dropped.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode text as UTF-16LE code units.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_twin_round_trips() {
        let text = "Модуль1";
        assert_eq!(decode_utf16le(&encode_utf16le(text)), text);
    }

    #[test]
    fn unsupported_code_page_is_rejected() {
        assert!(matches!(
            decode(b"abc", 437),
            Err(VbaProjectError::UnsupportedCodePage(437))
        ));
    }
}
