use proptest::prelude::*;
use vba_project::codepage::{decode, decode_utf16le, encode, encode_utf16le};
use vba_project::VbaProjectError;

#[test]
fn ascii_round_trips_through_every_supported_code_page() {
    let text = "Sub Hello()\r\nEnd Sub\r\n";
    for cp in [932u16, 936, 949, 950, 1250, 1251, 1252, 1253, 1254, 1255, 1256, 1257, 1258, 65001]
    {
        let bytes = encode(text, cp).expect("ascii encodes everywhere");
        assert_eq!(decode(&bytes, cp).expect("decode"), text, "code page {cp}");
    }
}

#[test]
fn cyrillic_round_trips_through_windows_1251() {
    let text = "Модуль1 — тест";
    let bytes = encode(text, 1251).expect("representable");
    assert_eq!(decode(&bytes, 1251).expect("decode"), text);
}

#[test]
fn shift_jis_round_trips_japanese_text() {
    let text = "こんにちは";
    let bytes = encode(text, 932).expect("representable");
    assert_eq!(decode(&bytes, 932).expect("decode"), text);
}

#[test]
fn unrepresentable_character_reports_code_page_and_character() {
    // Kanji has no Windows-1252 representation.
    let err = encode("abc漢", 1252).unwrap_err();
    match err {
        VbaProjectError::Unencodable { code_page, character } => {
            assert_eq!(code_page, 1252);
            assert_eq!(character, '漢');
        }
        other => panic!("expected Unencodable, got {other}"),
    }
}

#[test]
fn invalid_bytes_decode_to_replacement_not_error() {
    // 0x82 is a Shift-JIS lead byte with no trail byte here.
    let decoded = decode(&[b'a', 0x82], 932).expect("tolerant decode");
    assert!(decoded.starts_with('a'));
    assert!(decoded.contains('\u{FFFD}'));
}

#[test]
fn utf16le_twins_round_trip_and_ignore_odd_tail() {
    let text = "Привет";
    let mut bytes = encode_utf16le(text);
    assert_eq!(decode_utf16le(&bytes), text);
    bytes.push(0x00); // odd trailing byte is dropped
    assert_eq!(decode_utf16le(&bytes), text);
}

proptest! {
    /// Latin-1-representable text survives a Windows-1252 round trip.
    #[test]
    fn windows_1252_round_trips_representable_text(
        text in proptest::collection::vec(
            prop_oneof![
                prop::char::range(' ', '~'),
                prop::char::range('\u{00A1}', '\u{00FF}'),
            ],
            0..200,
        )
    ) {
        let text: String = text.into_iter().collect();
        let bytes = encode(&text, 1252).unwrap();
        prop_assert_eq!(decode(&bytes, 1252).unwrap(), text);
    }
}
