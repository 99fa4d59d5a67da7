use std::fs;
use std::io::Write;
use std::path::Path;

use carbon_codecs::compressor_by_kind;
use carbon_core::format::{
    marker, ColumnGroupHeader, ColumnHeader, FileHeader, ObjectHeader, PropHeader, RecordHeader,
    FILE_HEADER_SIZE, OFFSET_SIZE, RECORD_FLAG_SORTED, RECORD_HEADER_SIZE,
};
use carbon_core::{CompressorKind, Cursor, Error, PropKind, Result, Strictness};

use crate::archive::bake_string_id_index;
use crate::json;
use crate::model::{ColumnDoc, ColumnEntry, ColumnGroupModel, ColumnModel, ObjectModel, PropGroup};
use crate::oid::ObjectIdGenerator;
use crate::string_table::write_string_table;

// ── Options ────────────────────────────────────────────────────────────────

/// How an archive is produced.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub compressor: CompressorKind,
    /// Lexicographic string ids and key-ordered groups (JSON input only).
    pub read_optimized: bool,
    /// Append a persisted string-id index right after writing.
    pub bake_string_id_index: bool,
    pub strictness: Strictness,
    /// Fixed 24-bit object-id session instead of a clock-derived one.
    pub id_session: Option<u32>,
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compressor(mut self, compressor: CompressorKind) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_read_optimized(mut self, on: bool) -> Self {
        self.read_optimized = on;
        self
    }

    pub fn with_baked_index(mut self, on: bool) -> Self {
        self.bake_string_id_index = on;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_id_session(mut self, session: u32) -> Self {
        self.id_session = Some(session);
        self
    }
}

// ── Entry points ───────────────────────────────────────────────────────────

/// Serialize `doc` into archive bytes.
pub fn write_archive(doc: &ColumnDoc, opts: &ArchiveOptions) -> Result<Vec<u8>> {
    let result = serialize(doc, opts).and_then(|bytes| {
        if opts.bake_string_id_index {
            bake_in_memory(bytes)
        } else {
            Ok(bytes)
        }
    });
    opts.strictness.check(result)
}

/// Serialize `doc` into a new archive file at `path`.
pub fn write_archive_file(path: impl AsRef<Path>, doc: &ColumnDoc, opts: &ArchiveOptions) -> Result<()> {
    let path = path.as_ref();
    let result = serialize(doc, opts).and_then(|bytes| {
        fs::write(path, &bytes)?;
        if opts.bake_string_id_index {
            bake_string_id_index(path)?;
        }
        Ok(())
    });
    opts.strictness.check(result)
}

/// Import `json` and serialize it into archive bytes.
pub fn write_json(json: &str, opts: &ArchiveOptions) -> Result<Vec<u8>> {
    let doc = opts.strictness.check(json::import(json, opts.read_optimized))?;
    write_archive(&doc, opts)
}

/// Import `json` and serialize it into a new archive file at `path`.
pub fn write_json_file(path: impl AsRef<Path>, json: &str, opts: &ArchiveOptions) -> Result<()> {
    let doc = opts.strictness.check(json::import(json, opts.read_optimized))?;
    write_archive_file(path, &doc, opts)
}

/// Layout: file header, string table, record header, object tree.
fn serialize(doc: &ColumnDoc, opts: &ArchiveOptions) -> Result<Vec<u8>> {
    doc.root.validate()?;

    let mut cursor = Cursor::new();
    cursor.skip(FILE_HEADER_SIZE)?;

    let mut compressor = compressor_by_kind(opts.compressor);
    write_string_table(&mut cursor, compressor.as_mut(), &doc.strings)?;

    let record_header_offset = cursor.tell();
    cursor.skip(RECORD_HEADER_SIZE)?;
    let root = cursor.tell();

    let mut records = RecordWriter::new(&mut cursor, ObjectIdGenerator::new(opts.id_session));
    records.write_object(&doc.root)?;
    let objects = records.finish()?;

    let header = RecordHeader {
        flags: if doc.read_optimized { RECORD_FLAG_SORTED } else { 0 },
        record_size: cursor.tell() - root,
    };
    cursor.patch(record_header_offset, &header.to_bytes())?;
    cursor.patch(0, &FileHeader::new(record_header_offset).to_bytes())?;
    tracing::debug!(objects, bytes = header.record_size, "record table written");

    Ok(cursor.into_inner())
}

/// Bake a string-id index into archive bytes by round-tripping through a temp file.
fn bake_in_memory(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut tmp = tempfile::NamedTempFile::new()?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    bake_string_id_index(tmp.path())?;
    Ok(fs::read(tmp.path())?)
}

// ── Record writer ──────────────────────────────────────────────────────────

/// A placeholder to fill once the writer knows the value.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    at: u64,
    value: u64,
}

/// Depth-first writer of the object tree.
///
/// Offset slots (property offsets, nested-object offsets, column offsets,
/// `next` links) are reserved as they are passed and recorded as fix-ups;
/// [`finish`](Self::finish) fills them all in one pass. Every stored offset
/// is relative to the root object's position.
struct RecordWriter<'c, 'a> {
    cursor: &'c mut Cursor<'a>,
    root: u64,
    oids: ObjectIdGenerator,
    fixups: Vec<Fixup>,
}

fn count(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::InvalidModel(format!("{n} {what} exceed the u32 limit")))
}

impl<'c, 'a> RecordWriter<'c, 'a> {
    fn new(cursor: &'c mut Cursor<'a>, oids: ObjectIdGenerator) -> Self {
        let root = cursor.tell();
        Self {
            cursor,
            root,
            oids,
            fixups: Vec::new(),
        }
    }

    /// Reserve `n` offset slots; returns the position of the first.
    fn reserve_slots(&mut self, n: usize) -> Result<u64> {
        let at = self.cursor.tell();
        self.cursor.skip(n as u64 * OFFSET_SIZE)?;
        Ok(at)
    }

    /// Point the slot at `at` to the current cursor position.
    fn link_here(&mut self, at: u64) {
        let value = self.cursor.tell() - self.root;
        self.fixups.push(Fixup { at, value });
    }

    fn finish(self) -> Result<u64> {
        for fixup in &self.fixups {
            self.cursor.patch_u64(fixup.at, fixup.value)?;
        }
        Ok(self.oids.issued())
    }

    /// Write one object; returns the position of its `next` slot.
    fn write_object(&mut self, obj: &ObjectModel) -> Result<u64> {
        let flags = obj.flags();
        let header = ObjectHeader {
            object_id: self.oids.next_id()?,
            flags,
        };
        self.cursor.write(&header.to_bytes())?;
        let offsets_at = self.reserve_slots(flags.count())?;
        let next_at = self.cursor.tell();
        self.cursor.write_u64(0)?;

        for (slot, (kind, group)) in obj.present_groups().enumerate() {
            self.link_here(offsets_at + slot as u64 * OFFSET_SIZE);
            self.write_group(kind, group)?;
        }
        self.cursor.write_u8(marker::OBJECT_END)?;
        Ok(next_at)
    }

    fn write_keys(&mut self, kind: PropKind, keys: &[u64]) -> Result<()> {
        let header = PropHeader {
            kind,
            num_entries: count(keys.len(), "keys")?,
        };
        self.cursor.write(&header.to_bytes())?;
        keys.iter().try_for_each(|k| self.cursor.write_u64(*k))
    }

    fn write_group(&mut self, kind: PropKind, group: &PropGroup) -> Result<()> {
        match group {
            PropGroup::Fixed { keys, values } => {
                self.write_keys(kind, keys)?;
                values.iter().try_for_each(|v| v.write(self.cursor))
            }
            PropGroup::Objects { keys, objects } => {
                self.write_keys(kind, keys)?;
                let slots = self.reserve_slots(objects.len())?;
                for (i, object) in objects.iter().enumerate() {
                    self.link_here(slots + i as u64 * OFFSET_SIZE);
                    self.write_object(object)?;
                }
                Ok(())
            }
            PropGroup::Arrays { keys, arrays } => {
                self.write_keys(kind, keys)?;
                for array in arrays {
                    self.cursor.write_u32(count(array.len(), "array elements")?)?;
                }
                arrays
                    .iter()
                    .flatten()
                    .try_for_each(|v| v.write(self.cursor))
            }
            PropGroup::Table(groups) => {
                let keys: Vec<u64> = groups.iter().map(|g| g.key).collect();
                self.write_keys(PropKind::ObjectArray, &keys)?;
                let slots = self.reserve_slots(groups.len())?;
                for (i, group) in groups.iter().enumerate() {
                    self.link_here(slots + i as u64 * OFFSET_SIZE);
                    self.write_column_group(group)?;
                }
                Ok(())
            }
        }
    }

    fn write_column_group(&mut self, group: &ColumnGroupModel) -> Result<()> {
        let num_objects = group.num_rows();
        let header = ColumnGroupHeader {
            num_columns: count(group.columns.len(), "columns")?,
            num_objects,
        };
        self.cursor.write(&header.to_bytes())?;
        // One synthesized id per row, whether or not every column fills it.
        for _ in 0..num_objects {
            let id = self.oids.next_id()?;
            self.cursor.write_u64(id)?;
        }
        let slots = self.reserve_slots(group.columns.len())?;
        for (i, column) in group.columns.iter().enumerate() {
            self.link_here(slots + i as u64 * OFFSET_SIZE);
            self.write_column(column)?;
        }
        Ok(())
    }

    fn write_column(&mut self, column: &ColumnModel) -> Result<()> {
        let header = ColumnHeader {
            column_name: column.key,
            value_type: column.ty,
            num_entries: count(column.entries.len(), "column entries")?,
        };
        self.cursor.write(&header.to_bytes())?;
        let slots = self.reserve_slots(column.entries.len())?;
        for position in &column.positions {
            self.cursor.write_u32(*position)?;
        }

        for (i, entry) in column.entries.iter().enumerate() {
            self.link_here(slots + i as u64 * OFFSET_SIZE);
            self.cursor.write_u32(count(entry.len(), "entry elements")?)?;
            match entry {
                ColumnEntry::Values(values) => {
                    values.iter().try_for_each(|v| v.write(self.cursor))?;
                }
                ColumnEntry::Objects(objects) => {
                    let mut prev_next: Option<u64> = None;
                    for object in objects {
                        if let Some(at) = prev_next {
                            self.link_here(at);
                        }
                        prev_next = Some(self.write_object(object)?);
                    }
                }
            }
        }
        Ok(())
    }
}
