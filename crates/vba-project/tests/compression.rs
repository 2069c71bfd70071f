use vba_project::{compress_container, decompress_container, VbaProjectError};

#[test]
fn empty_input_decodes_to_empty_output() {
    assert_eq!(decompress_container(&[]).expect("empty input"), Vec::<u8>::new());
}

#[test]
fn signature_only_input_decodes_to_empty_output() {
    assert_eq!(decompress_container(&[0x01]).expect("bare signature"), Vec::<u8>::new());
}

#[test]
fn wrong_signature_byte_is_rejected() {
    let err = decompress_container(&[0x00]).unwrap_err();
    assert!(
        matches!(err, VbaProjectError::Decompress { message, .. } if message.contains("signature")),
        "unexpected error: {err}"
    );
}

#[test]
fn wrong_chunk_header_signature_is_rejected() {
    // Header with bits 12..=14 zeroed instead of 0b011.
    let mut data = vec![0x01];
    data.extend_from_slice(&0x0002u16.to_le_bytes());
    data.extend_from_slice(b"abc");
    let err = decompress_container(&data).unwrap_err();
    assert!(
        matches!(err, VbaProjectError::Decompress { message, .. } if message.contains("chunk")),
        "unexpected error: {err}"
    );
}

#[test]
fn raw_chunk_round_trips_verbatim() {
    let payload = b"raw bytes here";
    let mut data = vec![0x01];
    let header = (0b011u16 << 12) | (payload.len() as u16 + 2 - 3);
    data.extend_from_slice(&header.to_le_bytes());
    data.extend_from_slice(payload);
    assert_eq!(decompress_container(&data).expect("raw chunk"), payload);
}

#[test]
fn literal_then_overlapping_copy_decodes() {
    // One literal 'a' followed by a copy token (offset 1, length 3). At
    // one emitted byte the length field is 12 bits wide, so the zero token
    // encodes exactly offset=1, length=3.
    let mut payload = Vec::new();
    payload.push(0x02u8); // bit 0 literal, bit 1 copy
    payload.push(b'a');
    payload.extend_from_slice(&0u16.to_le_bytes());

    let mut data = vec![0x01];
    let header = 0x8000 | (0b011u16 << 12) | (payload.len() as u16 + 2 - 3);
    data.extend_from_slice(&header.to_le_bytes());
    data.extend_from_slice(&payload);

    assert_eq!(decompress_container(&data).expect("copy token"), b"aaaa");
}

#[test]
fn copy_offset_before_chunk_start_is_rejected() {
    // A copy token as the very first token has nothing to copy from.
    let mut payload = Vec::new();
    payload.push(0x01u8);
    payload.extend_from_slice(&0u16.to_le_bytes());

    let mut data = vec![0x01];
    let header = 0x8000 | (0b011u16 << 12) | (payload.len() as u16 + 2 - 3);
    data.extend_from_slice(&header.to_le_bytes());
    data.extend_from_slice(&payload);

    let err = decompress_container(&data).unwrap_err();
    assert!(
        matches!(err, VbaProjectError::Decompress { message, .. } if message.contains("offset")),
        "unexpected error: {err}"
    );
}

#[test]
fn truncated_trailing_header_stops_silently() {
    let mut data = compress_container(b"hello world");
    data.push(0xAB); // lone byte where the next chunk header would start
    assert_eq!(decompress_container(&data).expect("truncated tail"), b"hello world");
}

#[test]
fn chunk_size_running_past_input_stops_silently() {
    let mut data = vec![0x01];
    let header = (0b011u16 << 12) | 0x0FFF; // claims a full 4096-byte chunk
    data.extend_from_slice(&header.to_le_bytes());
    data.extend_from_slice(b"short");
    assert_eq!(decompress_container(&data).expect("oversized claim"), Vec::<u8>::new());
}

#[test]
fn repeated_pattern_compresses_below_raw_size() {
    let input = vec![b'A'; 32];
    let packed = compress_container(&input);
    assert!(
        packed.len() < 34,
        "expected compression to beat raw framing, got {} bytes",
        packed.len()
    );
    assert_eq!(decompress_container(&packed).expect("round trip"), input);
}

#[test]
fn incompressible_data_falls_back_to_raw_chunks() {
    // A cheap xorshift stream defeats the matcher without pulling in an
    // RNG dependency.
    let mut state = 0x2545F491u32;
    let input: Vec<u8> = (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    let packed = compress_container(&input);
    // Signature + header + verbatim payload.
    assert_eq!(packed.len(), 1 + 2 + 4096);
    assert_eq!(decompress_container(&packed).expect("round trip"), input);
}

#[test]
fn maximum_chunk_size_decodes_exactly_4096_bytes() {
    let mut state = 0x9E3779B9u32;
    let input: Vec<u8> = (0..4096)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect();
    let packed = compress_container(&input);
    let header = u16::from_le_bytes([packed[1], packed[2]]);
    assert_eq!(header & 0x0FFF, 0x0FFF, "size field at its maximum");
    assert_eq!(decompress_container(&packed).expect("full chunk"), input);
}

#[test]
fn multi_chunk_inputs_round_trip() {
    // Spans three chunks, mixing compressible and raw sections.
    let mut input = Vec::new();
    for i in 0..9000usize {
        input.push(if i % 3 == 0 { b'x' } else { (i % 251) as u8 });
    }
    let packed = compress_container(&input);
    assert_eq!(decompress_container(&packed).expect("round trip"), input);
}

#[test]
fn round_trips_across_copy_width_transitions() {
    // The copy-token split changes at these emitted-byte counts; sizes on
    // both sides of each boundary must round-trip.
    for boundary in [17usize, 33, 65, 129, 257, 513, 1025, 2049] {
        for size in [boundary - 1, boundary, boundary + 1] {
            let input: Vec<u8> = (0..size).map(|i| (i % 7) as u8).collect();
            let packed = compress_container(&input);
            assert_eq!(
                decompress_container(&packed).expect("round trip"),
                input,
                "size {size}"
            );
        }
    }
}
