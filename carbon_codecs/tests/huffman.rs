/// Compressor round-trips and Huffman table properties.
use carbon_codecs::{
    compressor_by_flags, compressor_by_name, CodeTable, HuffmanCompressor, NoneCompressor,
};
use carbon_core::{Compressor, CompressorKind, Cursor, Error};

fn corpus() -> Vec<&'static str> {
    vec![
        "the quick brown fox",
        "jumps over the lazy dog",
        "",
        "aaaaaaaaaaaaaaaaaaaa",
        "carbon archive",
        "zzz",
    ]
}

/// Encode every string with `c` into one buffer, then decode them back in order.
fn round_trip(mut c: Box<dyn Compressor>, strings: &[&str]) -> Vec<String> {
    let mut cursor = Cursor::new();
    c.write_extra(&mut cursor, strings).unwrap();
    let extra_len = cursor.tell() as usize;
    for s in strings {
        c.encode_string(&mut cursor, s).unwrap();
    }
    let bytes = cursor.into_inner();

    let mut reader = compressor_by_flags(c.flag()).unwrap();
    reader.read_extra(&bytes[..extra_len]).unwrap();
    let mut src = &bytes[extra_len..];
    let out = strings
        .iter()
        .map(|s| reader.decode_string(&mut src, s.len() as u32).unwrap())
        .collect();
    assert!(src.is_empty(), "every encoded byte must be consumed");
    out
}

#[test]
fn test_none_round_trip() {
    let strings = corpus();
    assert_eq!(round_trip(Box::new(NoneCompressor), &strings), strings);
}

#[test]
fn test_huffman_round_trip() {
    let strings = corpus();
    assert_eq!(round_trip(Box::new(HuffmanCompressor::new()), &strings), strings);
}

#[test]
fn test_huffman_round_trip_multibyte_utf8() {
    let strings = vec!["grüße", "日本語テキスト", "naïve café"];
    assert_eq!(round_trip(Box::new(HuffmanCompressor::new()), &strings), strings);
}

#[test]
fn test_huffman_single_symbol_uses_one_bit() {
    let table = CodeTable::build(&["aaaa"]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(b'a'), Some(&[false][..]));

    let strings = vec!["aaaa", "a", "aaaaaaaaa"];
    assert_eq!(round_trip(Box::new(HuffmanCompressor::new()), &strings), strings);
}

#[test]
fn test_huffman_table_omits_zero_frequency_symbols() {
    let table = CodeTable::build(&["abracadabra"]);
    let letters: Vec<u8> = table.iter().map(|c| c.letter).collect();
    assert_eq!(letters, b"abcdr".to_vec());
    assert!(table.get(b'z').is_none());
}

#[test]
fn test_huffman_frequent_symbols_get_shorter_codes() {
    let table = CodeTable::build(&["aaaaaaaabbbbc"]);
    let len = |b: u8| table.get(b).unwrap().len();
    assert!(len(b'a') <= len(b'b'));
    assert!(len(b'b') <= len(b'c'));
}

#[test]
fn test_huffman_codes_are_prefix_free() {
    let table = CodeTable::build(&corpus());
    let codes: Vec<_> = table.iter().collect();
    for a in &codes {
        for b in &codes {
            if a.letter != b.letter {
                assert!(!b.bits.starts_with(&a.bits), "{:?} prefixes {:?}", a, b);
            }
        }
    }
}

#[test]
fn test_huffman_rejects_symbol_outside_table() {
    let mut c = HuffmanCompressor::new();
    let mut cursor = Cursor::new();
    c.write_extra(&mut cursor, &["abc"]).unwrap();
    let err = c.encode_string(&mut cursor, "abd").unwrap_err();
    assert!(matches!(err, Error::CompressionFailure(_)));
    assert!(!cursor.in_bit_mode());
}

#[test]
fn test_huffman_truncated_stream_is_decompression_failure() {
    let mut c = HuffmanCompressor::new();
    let mut cursor = Cursor::new();
    c.write_extra(&mut cursor, &["hello world"]).unwrap();
    let extra_len = cursor.tell() as usize;
    c.encode_string(&mut cursor, "hello").unwrap();
    let bytes = cursor.into_inner();

    let mut src = &bytes[extra_len..];
    let err = c.decode_string(&mut src, 50).unwrap_err();
    assert!(matches!(err, Error::DecompressionFailure(_)));
}

#[test]
fn test_huffman_print_extra_lists_codes() {
    let mut c = HuffmanCompressor::new();
    let mut cursor = Cursor::new();
    c.write_extra(&mut cursor, &["ab"]).unwrap();
    let extra = cursor.into_inner();

    let mut out = Vec::new();
    c.print_extra(&mut out, &extra).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("[letter: 0x61]"));
    assert!(text.contains("[letter: 0x62]"));
}

#[test]
fn test_registry_lookup() {
    assert_eq!(compressor_by_name("none").unwrap().kind(), CompressorKind::None);
    assert_eq!(compressor_by_name("HUFFMAN").unwrap().kind(), CompressorKind::Huffman);
    assert!(compressor_by_name("zstd").is_err());
    assert!(matches!(compressor_by_flags(0b11), Err(Error::Corrupted(_))));
}
