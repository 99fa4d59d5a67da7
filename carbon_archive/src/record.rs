//! Record-section reader.
//!
//! One recursive walker serves three callers: [`RecordView::decode`] rebuilds
//! the [`ObjectModel`] tree, [`RecordView::validate`] only checks it, and the
//! printers render it. Every stored offset is compared with the position the
//! walk actually reached, `next` links must chain sibling objects exactly, and
//! an unknown marker aborts the walk with [`Error::Corrupted`].

use std::io::Write;

use carbon_core::format::{
    marker, ColumnGroupHeader, ColumnHeader, IndexHeader, ObjectHeader, PropHeader, RecordHeader,
    FILE_HEADER_SIZE, INDEX_HEADER_SIZE, OFFSET_SIZE,
};
use carbon_core::{Cursor, Error, FieldType, FileHeader, PropFlags, PropKind, Result, Scalar};

use crate::index::StringIdIndex;
use crate::model::{ColumnEntry, ColumnGroupModel, ColumnModel, ObjectModel, PropGroup};
use crate::string_table::StringTable;

const INDENT: &str = "   ";

// ── Random access ──────────────────────────────────────────────────────────

/// The serialized object tree, addressed by root-relative offsets.
///
/// Offset 0 is the root object, so the same bytes can be read from any base
/// address.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn root(&self) -> Result<ObjectView<'a>> {
        self.object_at(0)
    }

    /// Object header found at root-relative `offset`.
    pub fn object_at(&self, offset: u64) -> Result<ObjectView<'a>> {
        let mut cursor = Cursor::read_only(self.bytes);
        cursor.seek(offset)?;
        let header = ObjectHeader::from_bytes(&cursor.read_array()?, offset)?;
        let property_offsets = (0..header.flags.count())
            .map(|_| cursor.read_u64())
            .collect::<Result<Vec<_>>>()?;
        let next = cursor.read_u64()?;
        Ok(ObjectView {
            record: *self,
            offset,
            header,
            property_offsets,
            next,
        })
    }

    /// Rebuild the whole tree.
    pub fn decode(&self) -> Result<ObjectModel> {
        Walker::new(self.bytes, None).root()
    }

    /// Walk the whole tree, checking every structural invariant.
    pub fn validate(&self) -> Result<()> {
        self.decode().map(drop)
    }

    /// Human-readable dump of the tree.
    pub fn print(&self, out: &mut dyn Write) -> Result<()> {
        Walker::new(self.bytes, Some(out)).root().map(drop)
    }
}

/// Header and offset table of one serialized object.
#[derive(Debug, Clone)]
pub struct ObjectView<'a> {
    record: RecordView<'a>,
    offset: u64,
    header: ObjectHeader,
    property_offsets: Vec<u64>,
    next: u64,
}

impl<'a> ObjectView<'a> {
    /// Root-relative position of the object header.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn object_id(&self) -> u64 {
        self.header.object_id
    }

    pub fn flags(&self) -> PropFlags {
        self.header.flags
    }

    /// Where the group of `kind` starts, if the object has one.
    pub fn property_offset(&self, kind: PropKind) -> Option<u64> {
        let slot = self.header.flags.slot_of(kind)?;
        self.property_offsets.get(slot).copied()
    }

    /// Present groups with their offsets, in on-disk order.
    pub fn property_offsets(&self) -> impl Iterator<Item = (PropKind, u64)> + '_ {
        self.header.flags.iter().zip(self.property_offsets.iter().copied())
    }

    /// Following sibling in a chained object list.
    pub fn next(&self) -> Option<u64> {
        (self.next != 0).then_some(self.next)
    }

    pub fn next_object(&self) -> Result<Option<ObjectView<'a>>> {
        self.next().map(|at| self.record.object_at(at)).transpose()
    }

    /// Decode the single group of `kind`.
    pub fn group(&self, kind: PropKind) -> Result<Option<PropGroup>> {
        let Some(at) = self.property_offset(kind) else {
            return Ok(None);
        };
        let mut walker = Walker::new(self.record.bytes, None);
        walker.cursor.seek(at)?;
        walker.group(kind, 0).map(Some)
    }

    /// Objects held by the object-valued properties, in key order.
    pub fn nested_objects(&self) -> Result<Vec<ObjectView<'a>>> {
        let Some(at) = self.property_offset(PropKind::Object) else {
            return Ok(Vec::new());
        };
        let mut cursor = Cursor::read_only(self.record.bytes);
        cursor.seek(at)?;
        let header = PropHeader::from_bytes(&cursor.read_array()?, at)?;
        cursor.skip(u64::from(header.num_entries) * OFFSET_SIZE)?;
        (0..header.num_entries)
            .map(|_| cursor.read_u64().and_then(|off| self.record.object_at(off)))
            .collect()
    }

    pub fn decode(&self) -> Result<ObjectModel> {
        let mut walker = Walker::new(self.record.bytes, None);
        walker.cursor.seek(self.offset)?;
        walker.object(0).map(|(object, _)| object)
    }
}

// ── Printing entry points ──────────────────────────────────────────────────

/// Dump a whole archive file: header, string table, record tree and the
/// persisted index when there is one.
pub fn print_archive(out: &mut dyn Write, file: &[u8]) -> Result<()> {
    let mut cursor = Cursor::read_only(file);
    let header = FileHeader::from_bytes(&cursor.read_array()?)?;
    writeln!(
        out,
        "0x0000 [magic: {}] [version: {}] [recordOffset: 0x{:04x}] [string-id-offset-index: 0x{:04x}]",
        String::from_utf8_lossy(carbon_core::MAGIC),
        header.version,
        header.record_header_offset,
        header.string_id_index_offset
    )?;

    cursor.seek(FILE_HEADER_SIZE)?;
    StringTable::print(out, &mut cursor)?;
    if cursor.tell() != header.record_header_offset {
        return Err(Error::corrupted(format!(
            "string table ends at 0x{:04x} but the record header is at 0x{:04x}",
            cursor.tell(),
            header.record_header_offset
        )));
    }

    let at = cursor.tell();
    let record = RecordHeader::from_bytes(&cursor.read_array()?, at)?;
    writeln!(
        out,
        "0x{at:04x} [marker: {}] [flags: {}] [record-size: 0x{:04x}]",
        marker::RECORD_HEADER as char,
        if record.is_sorted() { "sorted" } else { "none" },
        record.record_size
    )?;
    let bytes = cursor.read(record.record_size)?;
    RecordView::new(bytes).print(out)?;

    if header.string_id_index_offset != 0 {
        let at = header.string_id_index_offset;
        let tail = file
            .get(at as usize..)
            .filter(|tail| tail.len() as u64 >= INDEX_HEADER_SIZE)
            .ok_or_else(|| Error::corrupted(format!("string-id index at 0x{at:04x} is past the end of file")))?;
        let mut head = [0u8; INDEX_HEADER_SIZE as usize];
        head.copy_from_slice(&tail[..INDEX_HEADER_SIZE as usize]);
        let index_header = IndexHeader::from_bytes(&head, at)?;
        writeln!(
            out,
            "0x{at:04x} [marker: {}] [num_entries: {}] [checksum: 0x{:016x}]",
            marker::INDEX_HEADER as char,
            index_header.num_entries,
            index_header.checksum
        )?;
        let index = StringIdIndex::deserialize(tail, at)?;
        for info in index.entries() {
            writeln!(
                out,
                "{INDENT}[string-id: {}] [offset: 0x{:04x}] [string-length: {}]",
                info.id, info.offset, info.len
            )?;
        }
    }
    Ok(())
}

// ── Walker ─────────────────────────────────────────────────────────────────

fn expect_no_next(at: u64, next: u64) -> Result<()> {
    if next != 0 {
        return Err(Error::corrupted(format!(
            "object at 0x{at:04x} links to 0x{next:04x} outside of a column chain"
        )));
    }
    Ok(())
}

fn join<T>(items: impl IntoIterator<Item = T>, render: impl Fn(T) -> String) -> String {
    items.into_iter().map(render).collect::<Vec<_>>().join(", ")
}

fn keys_text(keys: &[u64]) -> String {
    join(keys, |k| format!("key: {k}"))
}

fn offsets_text(offsets: &[u64]) -> String {
    join(offsets, |o| format!("offset: 0x{o:04x}"))
}

fn values_text(values: &[Scalar]) -> String {
    join(values, |v| format!("value: {v}"))
}

/// Name used for a group slot in the object line.
fn offset_name(kind: PropKind) -> &'static str {
    use PropKind::*;
    match kind {
        Null => "nulls",
        Bool => "bools",
        Int8 => "int8s",
        Int16 => "int16s",
        Int32 => "int32s",
        Int64 => "int64s",
        UInt8 => "uint8s",
        UInt16 => "uint16s",
        UInt32 => "uint32s",
        UInt64 => "uint64s",
        Float => "floats",
        Text => "texts",
        Object => "objects",
        NullArray => "nullArrays",
        BoolArray => "boolArrays",
        Int8Array => "int8Arrays",
        Int16Array => "int16Arrays",
        Int32Array => "int32Arrays",
        Int64Array => "int64Arrays",
        UInt8Array => "uint8Arrays",
        UInt16Array => "uint16Arrays",
        UInt32Array => "uint32Arrays",
        UInt64Array => "uint64Arrays",
        FloatArray => "floatArrays",
        TextArray => "textArrays",
        ObjectArray => "objectArrays",
    }
}

struct Walker<'w, 'a> {
    cursor: Cursor<'a>,
    out: Option<&'w mut dyn Write>,
}

impl<'w, 'a> Walker<'w, 'a> {
    fn new(bytes: &'a [u8], out: Option<&'w mut dyn Write>) -> Self {
        Self {
            cursor: Cursor::read_only(bytes),
            out,
        }
    }

    /// Write one line of the dump; `text` only runs when printing.
    fn emit(&mut self, at: u64, depth: usize, text: impl FnOnce() -> String) -> Result<()> {
        if let Some(out) = self.out.as_mut() {
            writeln!(out, "0x{at:04x} {}{}", INDENT.repeat(depth), text())?;
        }
        Ok(())
    }

    fn expect_offset(&self, what: &str, stored: u64) -> Result<()> {
        let actual = self.cursor.tell();
        if stored != actual {
            return Err(Error::corrupted(format!(
                "{what} offset 0x{stored:04x} does not match its position 0x{actual:04x}"
            )));
        }
        Ok(())
    }

    /// The root object must span the whole block and stand alone.
    fn root(&mut self) -> Result<ObjectModel> {
        let (object, next) = self.object(0)?;
        expect_no_next(0, next)?;
        if self.cursor.remaining() != 0 {
            return Err(Error::corrupted(format!(
                "{} trailing bytes after the root object",
                self.cursor.remaining()
            )));
        }
        Ok(object)
    }

    fn read_u64s(&mut self, n: usize) -> Result<Vec<u64>> {
        (0..n).map(|_| self.cursor.read_u64()).collect()
    }

    fn read_values(&mut self, ty: FieldType, n: u32) -> Result<Vec<Scalar>> {
        if let Some(width) = ty.width().filter(|w| *w > 0) {
            let need = u64::from(n) * width;
            if need > self.cursor.remaining() {
                return Err(Error::corrupted(format!(
                    "{n} {} values at 0x{:04x} run past the record end",
                    ty.label(),
                    self.cursor.tell()
                )));
            }
        }
        (0..n).map(|_| Scalar::read(ty, &mut self.cursor)).collect()
    }

    /// Object at the cursor, returned with its `next` link.
    fn object(&mut self, depth: usize) -> Result<(ObjectModel, u64)> {
        let at = self.cursor.tell();
        let header = ObjectHeader::from_bytes(&self.cursor.read_array()?, at)?;
        let offsets = self.read_u64s(header.flags.count())?;
        let next = self.cursor.read_u64()?;
        self.emit(at, depth, || {
            let slots: String = header
                .flags
                .iter()
                .zip(&offsets)
                .map(|(kind, off)| format!(" {}: 0x{off:04x}", offset_name(kind)))
                .collect();
            format!(
                "[marker: {{ (BeginObject)] [object-id: {}] [flags: {}] [propertyOffsets: [{slots} ]] [next: 0x{next:04x}]",
                header.object_id,
                header.flags.bits()
            )
        })?;

        let mut object = ObjectModel::new();
        let mut announced = header.flags.iter().zip(offsets.iter().copied());
        loop {
            let pos = self.cursor.tell();
            let found = self.cursor.peek_u8()?;
            if found == marker::OBJECT_END {
                if let Some((kind, _)) = announced.next() {
                    return Err(Error::corrupted(format!(
                        "object at 0x{at:04x} flags a {} group it does not contain",
                        kind.label()
                    )));
                }
                self.cursor.read_u8()?;
                self.emit(pos, depth, || "[marker: } (EndObject)]".to_owned())?;
                return Ok((object, next));
            }

            let kind = PropKind::from_marker(found).ok_or_else(|| {
                Error::corrupted(format!(
                    "unknown marker [{}] (0x{found:02x}) at offset 0x{pos:04x}",
                    found as char
                ))
            })?;
            match announced.next() {
                Some((flagged, stored)) if flagged == kind => {
                    self.expect_offset(kind.label(), stored)?;
                }
                _ => {
                    return Err(Error::corrupted(format!(
                        "{} group at 0x{pos:04x} is not announced by the object flags",
                        kind.label()
                    )))
                }
            }
            let group = self.group(kind, depth + 1)?;
            object.groups.insert(kind, group);
        }
    }

    /// Property group of `kind` at the cursor.
    fn group(&mut self, kind: PropKind, depth: usize) -> Result<PropGroup> {
        let at = self.cursor.tell();
        let header = PropHeader::from_bytes(&self.cursor.read_array()?, at)?;
        if header.kind != kind {
            return Err(Error::unexpected_marker(kind.marker(), header.kind.marker(), at));
        }
        let keys = self.read_u64s(header.num_entries as usize)?;
        let tag = format!("[marker: {} ({})]", kind.marker() as char, kind.label());
        let ty = kind.field_type();

        match kind {
            PropKind::Object => {
                let offsets = self.read_u64s(keys.len())?;
                self.emit(at, depth, || {
                    format!(
                        "{tag} [num_entries: {}] [{}] [{}] [",
                        keys.len(),
                        keys_text(&keys),
                        offsets_text(&offsets)
                    )
                })?;
                let mut objects = Vec::new();
                for stored in &offsets {
                    self.expect_offset("nested object", *stored)?;
                    let (object, next) = self.object(depth + 1)?;
                    expect_no_next(*stored, next)?;
                    objects.push(object);
                }
                let end = self.cursor.tell();
                self.emit(end, depth, || "]".to_owned())?;
                Ok(PropGroup::Objects { keys, objects })
            }
            PropKind::ObjectArray => {
                let offsets = self.read_u64s(keys.len())?;
                self.emit(at, depth, || {
                    format!(
                        "{tag} [num_entries: {}] [{}] [{}]",
                        keys.len(),
                        keys_text(&keys),
                        offsets_text(&offsets)
                    )
                })?;
                let mut groups = Vec::new();
                for (key, stored) in keys.iter().zip(&offsets) {
                    self.expect_offset("column group", *stored)?;
                    groups.push(self.column_group(*key, depth + 1)?);
                }
                Ok(PropGroup::Table(groups))
            }
            k if k.is_array() => {
                let lengths = (0..keys.len())
                    .map(|_| self.cursor.read_u32())
                    .collect::<Result<Vec<_>>>()?;
                let mut arrays = Vec::new();
                for len in &lengths {
                    arrays.push(self.read_values(ty, *len)?);
                }
                self.emit(at, depth, || {
                    let mut line = format!(
                        "{tag} [num_entries: {}] [{}] [{}]",
                        keys.len(),
                        keys_text(&keys),
                        join(&lengths, |n| format!("num_entries: {n}"))
                    );
                    if ty != FieldType::Null {
                        let blocks = join(&arrays, |values| format!("[{}]", values_text(values)));
                        line.push_str(&format!(" [{blocks}]"));
                    }
                    line
                })?;
                Ok(PropGroup::Arrays { keys, arrays })
            }
            _ => {
                let values = self.read_values(ty, header.num_entries)?;
                self.emit(at, depth, || {
                    let mut line =
                        format!("{tag} [num_entries: {}] [{}]", keys.len(), keys_text(&keys));
                    if ty != FieldType::Null {
                        line.push_str(&format!(" [{}]", values_text(&values)));
                    }
                    line
                })?;
                Ok(PropGroup::Fixed { keys, values })
            }
        }
    }

    fn column_group(&mut self, key: u64, depth: usize) -> Result<ColumnGroupModel> {
        let at = self.cursor.tell();
        let header = ColumnGroupHeader::from_bytes(&self.cursor.read_array()?, at)?;
        let object_ids = self.read_u64s(header.num_objects as usize)?;
        let offsets = self.read_u64s(header.num_columns as usize)?;
        self.emit(at, depth, || {
            format!(
                "[marker: {} (Column Group)] [num_columns: {}] [num_objects: {}] [object_ids: {}] [offsets: {}]",
                marker::COLUMN_GROUP as char,
                header.num_columns,
                header.num_objects,
                join(&object_ids, |id| id.to_string()),
                join(&offsets, |o| format!("0x{o:04x}"))
            )
        })?;

        let mut group = ColumnGroupModel::new(key);
        for stored in &offsets {
            self.expect_offset("column", *stored)?;
            group.columns.push(self.column(header.num_objects, depth + 1)?);
        }
        let end = self.cursor.tell();
        self.emit(end, depth, || "]".to_owned())?;
        Ok(group)
    }

    fn column(&mut self, num_objects: u32, depth: usize) -> Result<ColumnModel> {
        let at = self.cursor.tell();
        let header = ColumnHeader::from_bytes(&self.cursor.read_array()?, at)?;
        let offsets = self.read_u64s(header.num_entries as usize)?;
        let positions = (0..header.num_entries)
            .map(|_| self.cursor.read_u32())
            .collect::<Result<Vec<_>>>()?;
        if positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::corrupted(format!(
                "column at 0x{at:04x} has unordered positions"
            )));
        }
        if let Some(&last) = positions.last().filter(|p| **p >= num_objects) {
            return Err(Error::corrupted(format!(
                "column at 0x{at:04x} addresses row {last} of a {num_objects}-row group"
            )));
        }
        let ty = header.value_type;
        self.emit(at, depth, || {
            format!(
                "[marker: {} (Column)] [column_name: '{}'] [value_type: {} ({})] [num_entries: {}] [{}] [positions: [{}]]",
                marker::COLUMN as char,
                header.column_name,
                PropKind::array_of(ty).marker() as char,
                PropKind::array_of(ty).label(),
                header.num_entries,
                offsets_text(&offsets),
                join(&positions, |p| p.to_string())
            )
        })?;

        let mut column = ColumnModel::new(header.column_name, ty);
        for (stored, position) in offsets.iter().zip(&positions) {
            self.expect_offset("column entry", *stored)?;
            let entry_at = self.cursor.tell();
            let num_elements = self.cursor.read_u32()?;
            let entry = if ty == FieldType::Object {
                self.emit(entry_at, depth, || {
                    format!("{INDENT}[num_elements: {num_elements}] [values: [")
                })?;
                let objects = self.object_chain(num_elements, depth + 2)?;
                let end = self.cursor.tell();
                self.emit(end, depth, || format!("{INDENT}]]"))?;
                ColumnEntry::Objects(objects)
            } else {
                let values = self.read_values(ty, num_elements)?;
                self.emit(entry_at, depth, || {
                    format!(
                        "{INDENT}[num_elements: {num_elements}] [values: [{}]]",
                        values_text(&values)
                    )
                })?;
                ColumnEntry::Values(values)
            };
            column.push(*position, entry);
        }
        Ok(column)
    }

    /// Objects of one column entry, linked through their `next` slots.
    fn object_chain(&mut self, n: u32, depth: usize) -> Result<Vec<ObjectModel>> {
        let mut objects = Vec::new();
        let mut link: Option<u64> = None;
        for _ in 0..n {
            let at = self.cursor.tell();
            if let Some(next) = link {
                if next != at {
                    return Err(Error::corrupted(format!(
                        "object chain links to 0x{next:04x} but the next object is at 0x{at:04x}"
                    )));
                }
            }
            let (object, next) = self.object(depth)?;
            link = Some(next);
            objects.push(object);
        }
        match link {
            Some(next) if next != 0 => Err(Error::corrupted(format!(
                "object chain continues to 0x{next:04x} past its {n} elements"
            ))),
            _ => Ok(objects),
        }
    }
}
