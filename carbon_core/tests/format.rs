use carbon_core::compressor::{COMPRESSOR_FLAG_HUFFMAN, COMPRESSOR_FLAG_NONE};
use carbon_core::format::{
    column_type_from_marker, ColumnHeader, ObjectHeader, PropHeader, StringEntryHeader,
    FILE_HEADER_SIZE, OBJECT_HEADER_SIZE,
};
use carbon_core::{CompressorKind, Error, FieldType, FileHeader, PropFlags, PropKind};

#[test]
fn test_prop_kind_markers_are_unique_and_resolvable() {
    for kind in PropKind::ALL {
        assert_eq!(PropKind::from_marker(kind.marker()), Some(kind));
    }
    assert_eq!(PropKind::from_marker(b'?'), None);
    assert_eq!(PropKind::Int32.marker(), b'i');
    assert_eq!(PropKind::Int32Array.marker(), b'I');
    assert_eq!(PropKind::ObjectArray.marker(), b'O');
}

#[test]
fn test_scalar_and_array_kinds_pair_up() {
    assert_eq!(PropKind::scalar_of(FieldType::Float), PropKind::Float);
    assert_eq!(PropKind::array_of(FieldType::Float), PropKind::FloatArray);
    assert_eq!(PropKind::array_of(FieldType::Object), PropKind::ObjectArray);
    assert_eq!(PropKind::TextArray.field_type(), FieldType::String);
    assert!(PropKind::NullArray.is_array());
    assert!(!PropKind::Object.is_array());
    assert_eq!(column_type_from_marker(b'I'), Some(FieldType::Int32));
    assert_eq!(column_type_from_marker(b'i'), None);
}

#[test]
fn test_prop_flags_slots_follow_bit_order() {
    let flags: PropFlags = [PropKind::Text, PropKind::Int32, PropKind::Int32Array]
        .into_iter()
        .collect();
    assert_eq!(flags.count(), 3);
    assert_eq!(
        flags.iter().collect::<Vec<_>>(),
        vec![PropKind::Int32, PropKind::Text, PropKind::Int32Array]
    );
    assert_eq!(flags.slot_of(PropKind::Int32), Some(0));
    assert_eq!(flags.slot_of(PropKind::Text), Some(1));
    assert_eq!(flags.slot_of(PropKind::Int32Array), Some(2));
    assert_eq!(flags.slot_of(PropKind::Bool), None);
}

#[test]
fn test_prop_flags_reject_reserved_bits() {
    assert!(PropFlags::from_bits(1 << 25).is_ok());
    assert!(matches!(PropFlags::from_bits(1 << 26), Err(Error::Corrupted(_))));
}

#[test]
fn test_file_header_layout() {
    let mut header = FileHeader::new(0x40);
    header.string_id_index_offset = 0x1234;
    let bytes = header.to_bytes();
    assert_eq!(bytes.len() as u64, FILE_HEADER_SIZE);
    assert_eq!(&bytes[..9], b"MP/CARBON");
    assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    assert_eq!(header.root_offset(), 0x40 + 10);
}

#[test]
fn test_file_header_rejects_bad_magic_and_version() {
    let mut bytes = FileHeader::new(0).to_bytes();
    bytes[9] = 2;
    assert!(matches!(FileHeader::from_bytes(&bytes), Err(Error::Corrupted(_))));
    bytes[0] = b'X';
    assert!(matches!(FileHeader::from_bytes(&bytes), Err(Error::Corrupted(_))));
}

#[test]
fn test_headers_check_their_marker() {
    let entry = StringEntryHeader { next_entry_off: 30, string_id: 9, string_len: 4 };
    let mut bytes = entry.to_bytes();
    assert_eq!(StringEntryHeader::from_bytes(&bytes, 0).unwrap(), entry);
    bytes[0] = b'{';
    let err = StringEntryHeader::from_bytes(&bytes, 0x20).unwrap_err();
    assert!(err.to_string().contains("expected marker [-] but found [{]"));

    let object = ObjectHeader {
        object_id: 77,
        flags: [PropKind::Null].into_iter().collect(),
    };
    let bytes = object.to_bytes();
    assert_eq!(bytes.len() as u64, OBJECT_HEADER_SIZE);
    assert_eq!(ObjectHeader::from_bytes(&bytes, 0).unwrap(), object);
}

#[test]
fn test_prop_and_column_headers() {
    let prop = PropHeader { kind: PropKind::UInt16Array, num_entries: 3 };
    assert_eq!(PropHeader::from_bytes(&prop.to_bytes(), 0).unwrap(), prop);
    assert!(PropHeader::from_bytes(&[b'?', 0, 0, 0, 0], 0).is_err());

    let column = ColumnHeader { column_name: 5, value_type: FieldType::Bool, num_entries: 2 };
    let bytes = column.to_bytes();
    assert_eq!(bytes[9], b'B');
    assert_eq!(ColumnHeader::from_bytes(&bytes, 0).unwrap(), column);
}

#[test]
fn test_compressor_flags_need_exactly_one_bit() {
    assert_eq!(CompressorKind::from_flags(COMPRESSOR_FLAG_NONE).unwrap(), CompressorKind::None);
    assert_eq!(
        CompressorKind::from_flags(COMPRESSOR_FLAG_HUFFMAN).unwrap(),
        CompressorKind::Huffman
    );
    assert!(CompressorKind::from_flags(COMPRESSOR_FLAG_NONE | COMPRESSOR_FLAG_HUFFMAN).is_err());
    assert!(CompressorKind::from_flags(0).is_err());
    assert_eq!("Huffman".parse::<CompressorKind>().unwrap(), CompressorKind::Huffman);
}
