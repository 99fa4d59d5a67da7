/// Write → open → walk round trips, offset relocatability, and corruption
/// detection in the record section.
use std::fs;
use std::path::PathBuf;

use carbon_archive::oid::{counter_of, session_of};
use carbon_archive::{
    import, write_archive, write_archive_file, write_json, write_json_file, Archive,
    ArchiveOptions, ColumnDoc, ColumnEntry, ObjectModel, PropGroup, RecordView, StringDictionary,
};
use carbon_core::format::{FILE_HEADER_SIZE, OBJECT_HEADER_SIZE, OFFSET_SIZE};
use carbon_core::{CompressorKind, Error, FieldType, FileHeader, PropKind, Scalar, Strictness};
use tempfile::TempDir;

const NESTED: &str = r#"{
    "name": "carbon",
    "version": 3,
    "ratio": 0.25,
    "stable": false,
    "missing": null,
    "tags": ["columnar", "archive"],
    "sizes": [1, 5000000000],
    "owner": {"login": "ada", "id": 7, "address": {"city": "london"}},
    "users": [
        {"name": "a", "age": 3},
        {"name": "b", "tags": ["x"]},
        {"age": 4.5, "pets": [{"kind": "cat"}, {"kind": "dog", "legs": 4}]}
    ]
}"#;

fn write_to_dir(json: &str, opts: &ArchiveOptions) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.carbon");
    write_json_file(&path, json, opts).unwrap();
    (dir, path)
}

/// Record-section bytes of an in-memory archive.
fn record_bytes(file: &[u8]) -> &[u8] {
    let mut head = [0u8; FILE_HEADER_SIZE as usize];
    head.copy_from_slice(&file[..FILE_HEADER_SIZE as usize]);
    let header = FileHeader::from_bytes(&head).unwrap();
    let start = header.root_offset() as usize;
    let size = u64::from_le_bytes(file[start - 8..start].try_into().unwrap()) as usize;
    &file[start..start + size]
}

#[test]
fn test_round_trip_none_and_huffman() {
    for kind in [CompressorKind::None, CompressorKind::Huffman] {
        let doc = import(NESTED, false).unwrap();
        let opts = ArchiveOptions::new().with_compressor(kind);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.carbon");
        write_archive_file(&path, &doc, &opts).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.records().decode().unwrap(), doc.root, "{kind}");
        assert_eq!(archive.info().num_embedded_strings as usize, doc.strings.len());
        for (id, s) in doc.strings.iter() {
            assert_eq!(archive.query().fetch_string_by_id(id).unwrap(), s, "{kind} id {id}");
        }
    }
}

#[test]
fn test_in_memory_and_file_outputs_match_for_fixed_session() {
    let opts = ArchiveOptions::new().with_id_session(0x00beef);
    let bytes = write_json(NESTED, &opts).unwrap();
    let (_dir, path) = write_to_dir(NESTED, &opts);
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_offsets_are_relocatable() {
    let bytes = write_json(NESTED, &ArchiveOptions::new()).unwrap();
    let record = record_bytes(&bytes);

    // Same bytes at a different base address, with unrelated data in front.
    let mut shifted = vec![0xAAu8; 37];
    shifted.extend_from_slice(record);
    let moved = RecordView::new(&shifted[37..]);

    let expected = import(NESTED, false).unwrap().root;
    assert_eq!(moved.decode().unwrap(), expected);
    assert_eq!(RecordView::new(record).decode().unwrap(), expected);
}

#[test]
fn test_object_view_navigation() {
    let (_dir, path) = write_to_dir(NESTED, &ArchiveOptions::new());
    let archive = Archive::open(&path).unwrap();
    let root = archive.root().unwrap();

    assert_eq!(root.offset(), 0);
    assert!(root.next().is_none());
    assert!(root.flags().contains(PropKind::Text));
    assert!(root.flags().contains(PropKind::ObjectArray));
    assert!(!root.flags().contains(PropKind::UInt8));
    assert_eq!(root.property_offsets().count(), root.flags().count());

    // Offsets ascend in canonical kind order.
    let offsets: Vec<u64> = root.property_offsets().map(|(_, off)| off).collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    let owner = root.nested_objects().unwrap();
    assert_eq!(owner.len(), 1);
    assert_ne!(owner[0].object_id(), root.object_id());
    let address = owner[0].nested_objects().unwrap();
    assert_eq!(address.len(), 1);
    assert_eq!(address[0].nested_objects().unwrap().len(), 0);

    let Some(PropGroup::Fixed { values, .. }) = root.group(PropKind::Int32).unwrap() else {
        panic!("root must carry an int32 group");
    };
    assert_eq!(values, vec![Scalar::Int32(3)]);
    assert!(root.group(PropKind::UInt16).unwrap().is_none());
}

#[test]
fn test_column_group_layout() {
    let doc = import(NESTED, false).unwrap();
    let Some(PropGroup::Table(groups)) = doc.root.group(PropKind::ObjectArray) else {
        panic!("users must become a column group");
    };
    assert_eq!(groups.len(), 1);
    let users = &groups[0];
    assert_eq!(users.num_rows(), 3);

    let names: Vec<&str> = users
        .columns
        .iter()
        .map(|c| doc.strings.get(c.key).unwrap())
        .collect();
    assert_eq!(names, ["name", "age", "tags", "pets"]);

    let age = &users.columns[1];
    assert_eq!(age.ty, FieldType::Float);
    assert_eq!(age.positions, vec![0, 2]);
    assert_eq!(
        age.entries,
        vec![
            ColumnEntry::Values(vec![Scalar::Float(3.0)]),
            ColumnEntry::Values(vec![Scalar::Float(4.5)])
        ]
    );

    let pets = &users.columns[3];
    assert_eq!(pets.ty, FieldType::Object);
    assert_eq!(pets.positions, vec![2]);
    assert_eq!(pets.entries[0].len(), 2);

    // The chained pets survive the trip to disk and back.
    let bytes = write_archive(&doc, &ArchiveOptions::new()).unwrap();
    assert_eq!(RecordView::new(record_bytes(&bytes)).decode().unwrap(), doc.root);
}

#[test]
fn test_object_ids_are_unique() {
    let opts = ArchiveOptions::new().with_id_session(42);
    let (_dir, path) = write_to_dir(NESTED, &opts);
    let archive = Archive::open(&path).unwrap();

    let mut ids = vec![];
    let mut pending = vec![archive.root().unwrap()];
    while let Some(object) = pending.pop() {
        ids.push(object.object_id());
        pending.extend(object.nested_objects().unwrap());
    }
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|&id| session_of(id) == 42 && counter_of(id) > 0));
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn test_read_optimized_sorts_ids_and_sets_flag() {
    let json = r#"{"zeta": 1, "alpha": "mid", "beta": 2}"#;
    let opts = ArchiveOptions::new().with_read_optimized(true);
    let (_dir, path) = write_to_dir(json, &opts);
    let archive = Archive::open(&path).unwrap();
    assert!(archive.is_sorted());

    let query = archive.query();
    let strings: Vec<String> = (1..=4)
        .map(|id| query.fetch_string_by_id(id).unwrap())
        .collect();
    assert_eq!(strings, ["alpha", "beta", "mid", "zeta"]);

    let Some(PropGroup::Fixed { keys, .. }) = archive.root().unwrap().group(PropKind::Int32).unwrap()
    else {
        panic!("int32 group missing");
    };
    assert_eq!(keys, vec![2, 4]);

    let (_dir, plain) = write_to_dir(json, &ArchiveOptions::new());
    assert!(!Archive::open(plain).unwrap().is_sorted());
}

#[test]
fn test_hand_built_model_round_trip() {
    let mut strings = StringDictionary::new();
    let k_small = strings.intern("small");
    let k_wide = strings.intern("wide");
    let k_list = strings.intern("list");
    let k_child = strings.intern("child");

    let mut child = ObjectModel::new();
    child.insert_scalar(k_small, Scalar::UInt16(65_000));
    let mut root = ObjectModel::new();
    root.insert_scalar(k_small, Scalar::Int8(-3));
    root.insert_scalar(k_wide, Scalar::UInt32(4_000_000_000));
    root.insert_array(k_list, FieldType::Int16, vec![Scalar::Int16(-1), Scalar::Int16(2)]);
    root.insert_array(k_wide, FieldType::UInt8, vec![]);
    root.insert_object(k_child, child);

    let doc = ColumnDoc::new(strings, root);
    let bytes = write_archive(&doc, &ArchiveOptions::new()).unwrap();
    assert_eq!(RecordView::new(record_bytes(&bytes)).decode().unwrap(), doc.root);
}

#[test]
fn test_ill_typed_model_is_rejected() {
    let mut strings = StringDictionary::new();
    let key = strings.intern("k");
    let mut root = ObjectModel::new();
    root.insert_array(key, FieldType::Int32, vec![Scalar::Bool(true)]);

    let err = write_archive(&ColumnDoc::new(strings, root), &ArchiveOptions::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidModel(_)), "{err}");
}

#[test]
#[should_panic(expected = "carbon error 12")]
fn test_strict_mode_panics_on_error() {
    let opts = ArchiveOptions::new().with_strictness(Strictness::Strict);
    let _ = write_json("[1, 2, 3]", &opts);
}

#[test]
fn test_unknown_marker_is_corruption() {
    let mut bytes = write_json(r#"{"a": 1}"#, &ArchiveOptions::new()).unwrap();
    let root = bytes.len() - record_bytes(&bytes).len();
    // One group: header, one offset slot, next slot, then the group marker.
    let marker_at = root + (OBJECT_HEADER_SIZE + 2 * OFFSET_SIZE) as usize;
    assert_eq!(bytes[marker_at], b'i');
    bytes[marker_at] = b'?';

    let err = RecordView::new(record_bytes(&bytes)).decode().unwrap_err();
    assert!(matches!(err, Error::Corrupted(ref m) if m.contains("unknown marker")), "{err}");
}

#[test]
fn test_wrong_property_offset_is_corruption() {
    let mut bytes = write_json(r#"{"a": 1, "b": true}"#, &ArchiveOptions::new()).unwrap();
    let root = bytes.len() - record_bytes(&bytes).len();
    let slot = root + OBJECT_HEADER_SIZE as usize;
    bytes[slot] = bytes[slot].wrapping_add(1);

    let err = RecordView::new(record_bytes(&bytes)).validate().unwrap_err();
    assert!(matches!(err, Error::Corrupted(_)), "{err}");
}

#[test]
fn test_open_rejects_bad_magic_and_short_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = write_json(r#"{"a": 1}"#, &ArchiveOptions::new()).unwrap();

    let short = dir.path().join("short.carbon");
    fs::write(&short, &bytes[..10]).unwrap();
    assert!(matches!(Archive::open(&short).unwrap_err(), Error::Corrupted(_)));

    bytes[0] = b'X';
    let bad = dir.path().join("bad.carbon");
    fs::write(&bad, &bytes).unwrap();
    let err = Archive::open(&bad).unwrap_err();
    assert!(matches!(err, Error::Corrupted(ref m) if m.contains("magic")), "{err}");

    let missing = Archive::open(dir.path().join("nope.carbon")).unwrap_err();
    assert!(matches!(missing, Error::Io(_)));
}

#[test]
fn test_truncated_record_section_is_corruption() {
    let bytes = write_json(NESTED, &ArchiveOptions::new()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.carbon");
    fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
    assert!(matches!(Archive::open(&path).unwrap_err(), Error::Corrupted(_)));
}
