use proptest::prelude::*;
use vba_project::{compress_container, decompress_container};

proptest! {
    /// Anything the compressor emits must decode back byte-for-byte.
    #[test]
    fn compress_then_decompress_is_identity(data in proptest::collection::vec(any::<u8>(), 0..16384)) {
        let packed = compress_container(&data);
        prop_assert_eq!(decompress_container(&packed).unwrap(), data);
    }

    /// A small alphabet forces long runs and copy tokens at many
    /// positions, covering the width transitions.
    #[test]
    fn repetitive_data_round_trips(data in proptest::collection::vec(0u8..4, 0..12288)) {
        let packed = compress_container(&data);
        prop_assert_eq!(decompress_container(&packed).unwrap(), data);
    }

    /// Decompression never panics on arbitrary bytes; it either decodes or
    /// reports a structural error.
    #[test]
    fn decompress_is_total(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let _ = decompress_container(&data);
    }
}
