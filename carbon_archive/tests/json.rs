/// JSON import: string interning, number typing, array classification and
/// the shapes the importer refuses.
use carbon_archive::{import, ColumnEntry, PropGroup};
use carbon_core::{Error, FieldType, PropKind, Scalar};

/// The single scalar stored under the root's group of `kind`.
fn only_value(json: &str, kind: PropKind) -> Scalar {
    let doc = import(json, false).unwrap();
    match doc.root.group(kind) {
        Some(PropGroup::Fixed { values, .. }) if values.len() == 1 => values[0],
        other => panic!("expected one {} value, got {other:?}", kind.label()),
    }
}

fn rejected(json: &str) -> String {
    match import(json, false) {
        Err(Error::InvalidModel(msg)) => msg,
        other => panic!("expected InvalidModel for {json}, got {other:?}"),
    }
}

#[test]
fn test_strings_are_interned_in_document_order() {
    let doc = import(r#"{"a": 1, "b": "x", "c": [1, 2, 3], "d": "x", "a2": "a"}"#, false).unwrap();
    let strings: Vec<(u64, &str)> = doc.strings.iter().collect();
    assert_eq!(
        strings,
        vec![(1, "a"), (2, "b"), (3, "x"), (4, "c"), (5, "d"), (6, "a2")]
    );
    assert_eq!(doc.strings.id_of("x"), Some(3));
    assert!(!doc.read_optimized);

    let Some(PropGroup::Fixed { keys, values }) = doc.root.group(PropKind::Text) else {
        panic!("text group missing");
    };
    assert_eq!(keys, &vec![2, 5, 6]);
    assert_eq!(values, &vec![Scalar::String(3), Scalar::String(3), Scalar::String(1)]);
}

#[test]
fn test_read_optimized_ids_are_lexicographic() {
    let doc = import(r#"{"b": "z", "a": {"c": 1}}"#, true).unwrap();
    let strings: Vec<&str> = doc.strings.iter().map(|(_, s)| s).collect();
    assert_eq!(strings, ["a", "b", "c", "z"]);
    assert!(doc.read_optimized);
}

#[test]
fn test_number_typing() {
    assert_eq!(only_value(r#"{"n": 5}"#, PropKind::Int32), Scalar::Int32(5));
    assert_eq!(only_value(r#"{"n": -7}"#, PropKind::Int32), Scalar::Int32(-7));
    assert_eq!(
        only_value(r#"{"n": 5000000000}"#, PropKind::Int64),
        Scalar::Int64(5_000_000_000)
    );
    assert_eq!(
        only_value(r#"{"n": 18446744073709551615}"#, PropKind::UInt64),
        Scalar::UInt64(u64::MAX)
    );
    assert_eq!(only_value(r#"{"n": 3.5}"#, PropKind::Float), Scalar::Float(3.5));
    assert_eq!(only_value(r#"{"n": true}"#, PropKind::Bool), Scalar::Bool(true));
    assert_eq!(only_value(r#"{"n": null}"#, PropKind::Null), Scalar::Null);
}

#[test]
fn test_numeric_arrays_take_the_widest_type() {
    let doc = import(r#"{"i": [1, 2], "l": [1, -5000000000], "f": [1, 2.5]}"#, false).unwrap();

    let arrays = |kind: PropKind| match doc.root.group(kind) {
        Some(PropGroup::Arrays { arrays, .. }) => arrays.clone(),
        other => panic!("{} group: {other:?}", kind.label()),
    };
    assert_eq!(arrays(PropKind::Int32Array), vec![vec![Scalar::Int32(1), Scalar::Int32(2)]]);
    assert_eq!(
        arrays(PropKind::Int64Array),
        vec![vec![Scalar::Int64(1), Scalar::Int64(-5_000_000_000)]]
    );
    assert_eq!(
        arrays(PropKind::FloatArray),
        vec![vec![Scalar::Float(1.0), Scalar::Float(2.5)]]
    );
}

#[test]
fn test_empty_array_is_a_null_array() {
    let doc = import(r#"{"e": []}"#, false).unwrap();
    let Some(PropGroup::Arrays { keys, arrays }) = doc.root.group(PropKind::NullArray) else {
        panic!("null array group missing");
    };
    assert_eq!(keys, &vec![1]);
    assert_eq!(arrays, &vec![Vec::<Scalar>::new()]);
}

#[test]
fn test_object_arrays_become_column_groups() {
    let json = r#"{"users": [{"name": "a", "age": 3}, {"name": "b", "tags": ["x"]}, {"age": 4.5}]}"#;
    let doc = import(json, false).unwrap();
    let Some(PropGroup::Table(groups)) = doc.root.group(PropKind::ObjectArray) else {
        panic!("column group missing");
    };
    let group = &groups[0];
    assert_eq!(group.key, 1);
    assert_eq!(group.num_rows(), 3);

    let layout: Vec<(u64, FieldType, Vec<u32>)> = group
        .columns
        .iter()
        .map(|c| (c.key, c.ty, c.positions.clone()))
        .collect();
    let name = doc.strings.id_of("name").unwrap();
    let age = doc.strings.id_of("age").unwrap();
    let tags = doc.strings.id_of("tags").unwrap();
    assert_eq!(
        layout,
        vec![
            (name, FieldType::String, vec![0, 1]),
            (age, FieldType::Float, vec![0, 2]),
            (tags, FieldType::String, vec![1]),
        ]
    );
    let x = doc.strings.id_of("x").unwrap();
    assert_eq!(
        group.columns[2].entries,
        vec![ColumnEntry::Values(vec![Scalar::String(x)])]
    );
}

#[test]
fn test_same_key_with_different_classes_splits_columns() {
    let doc = import(r#"{"rows": [{"v": 1}, {"v": "one"}]}"#, false).unwrap();
    let Some(PropGroup::Table(groups)) = doc.root.group(PropKind::ObjectArray) else {
        panic!("column group missing");
    };
    let types: Vec<FieldType> = groups[0].columns.iter().map(|c| c.ty).collect();
    assert_eq!(types, [FieldType::Int32, FieldType::String]);
    assert_eq!(groups[0].columns[0].key, groups[0].columns[1].key);
}

#[test]
fn test_rejected_documents() {
    assert!(rejected("[1, 2, 3]").contains("root must be an object"));
    assert!(rejected(r#""text""#).contains("root must be an object"));
    assert!(rejected(r#"{"m": [1, "a"]}"#).contains("mixes"));
    assert!(rejected(r#"{"m": [[1], [2]]}"#).contains("nested arrays"));
    assert!(rejected(r#"{"m": [-1, 18446744073709551615]}"#).contains("int64"));
    assert!(rejected(r#"{"m": [{"a": 1}, 2]}"#).contains("mixes"));
    assert!(rejected("{not json").contains("malformed JSON"));
}
