use std::fmt;

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Magic bytes opening every archive file.
pub const MAGIC: &[u8; 9] = b"MP/CARBON";

pub const VERSION: u8 = 1;

/// Fixed size of the file header in bytes.
///   magic[9] + version:u8 + record_header_offset:u64 + string_id_index_offset:u64
///   = 9 + 1 + 8 + 8 = 26
pub const FILE_HEADER_SIZE: u64 = 26;

/// marker:u8 + num_entries:u32 + flags:u8 + first_entry:u64 + extra_size:u64 = 22
pub const STRING_TABLE_HEADER_SIZE: u64 = 22;

/// marker:u8 + next_entry_off:u64 + string_id:u64 + string_len:u32 = 21
pub const STRING_ENTRY_HEADER_SIZE: u64 = 21;

/// marker:u8 + flags:u8 + record_size:u64 = 10
pub const RECORD_HEADER_SIZE: u64 = 10;

/// marker:u8 + object_id:u64 + flags:u32 = 13
pub const OBJECT_HEADER_SIZE: u64 = 13;

/// marker:u8 + num_entries:u32 = 5
pub const PROP_HEADER_SIZE: u64 = 5;

/// marker:u8 + num_columns:u32 + num_objects:u32 = 9
pub const COLUMN_GROUP_HEADER_SIZE: u64 = 9;

/// marker:u8 + column_name:u64 + value_type:u8 + num_entries:u32 = 14
pub const COLUMN_HEADER_SIZE: u64 = 14;

/// marker:u8 + num_entries:u64 + checksum:u64 = 17
pub const INDEX_HEADER_SIZE: u64 = 17;

/// string_id:u64 + offset:u64 + string_len:u32 = 20
pub const INDEX_ENTRY_SIZE: u64 = 20;

/// Bytes of one stored offset or id.
pub const OFFSET_SIZE: u64 = 8;

// ── Markers ────────────────────────────────────────────────────────────────

pub mod marker {
    pub const OBJECT_BEGIN: u8 = b'{';
    pub const OBJECT_END: u8 = b'}';
    pub const STRING_TABLE: u8 = b'D';
    pub const STRING_ENTRY: u8 = b'-';
    pub const COLUMN_GROUP: u8 = b'X';
    pub const COLUMN: u8 = b'x';
    pub const HUFFMAN_ENTRY: u8 = b'd';
    pub const RECORD_HEADER: u8 = b'r';
    pub const INDEX_HEADER: u8 = b'#';
}

// ── Record flags ───────────────────────────────────────────────────────────

/// Strings carry lexicographically ordered ids and groups are ordered by key.
pub const RECORD_FLAG_SORTED: u8 = 1 << 0;

// ── Field types ────────────────────────────────────────────────────────────

/// Element type of a property or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldType {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    String,
    Object,
}

impl FieldType {
    /// On-disk bytes per value, `None` for nested objects.
    pub fn width(self) -> Option<u64> {
        Some(match self {
            FieldType::Null => 0,
            FieldType::Bool | FieldType::Int8 | FieldType::UInt8 => 1,
            FieldType::Int16 | FieldType::UInt16 => 2,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => 4,
            FieldType::Int64 | FieldType::UInt64 | FieldType::String => 8,
            FieldType::Object => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldType::Null => "Null",
            FieldType::Bool => "Boolean",
            FieldType::Int8 => "Int8",
            FieldType::Int16 => "Int16",
            FieldType::Int32 => "Int32",
            FieldType::Int64 => "Int64",
            FieldType::UInt8 => "UInt8",
            FieldType::UInt16 => "UInt16",
            FieldType::UInt32 => "UInt32",
            FieldType::UInt64 => "UInt64",
            FieldType::Float => "Float",
            FieldType::String => "Text",
            FieldType::Object => "Object",
        }
    }
}

// ── Property kinds ─────────────────────────────────────────────────────────

/// The 26 property-group variants an object may carry.
///
/// Declaration order is the canonical write order and the discriminant is the
/// bit index inside [`PropFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PropKind {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Text,
    Object,
    NullArray,
    BoolArray,
    Int8Array,
    Int16Array,
    Int32Array,
    Int64Array,
    UInt8Array,
    UInt16Array,
    UInt32Array,
    UInt64Array,
    FloatArray,
    TextArray,
    ObjectArray,
}

impl PropKind {
    pub const COUNT: usize = 26;

    pub const ALL: [PropKind; PropKind::COUNT] = [
        PropKind::Null,
        PropKind::Bool,
        PropKind::Int8,
        PropKind::Int16,
        PropKind::Int32,
        PropKind::Int64,
        PropKind::UInt8,
        PropKind::UInt16,
        PropKind::UInt32,
        PropKind::UInt64,
        PropKind::Float,
        PropKind::Text,
        PropKind::Object,
        PropKind::NullArray,
        PropKind::BoolArray,
        PropKind::Int8Array,
        PropKind::Int16Array,
        PropKind::Int32Array,
        PropKind::Int64Array,
        PropKind::UInt8Array,
        PropKind::UInt16Array,
        PropKind::UInt32Array,
        PropKind::UInt64Array,
        PropKind::FloatArray,
        PropKind::TextArray,
        PropKind::ObjectArray,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn marker(self) -> u8 {
        match self {
            PropKind::Null => b'n',
            PropKind::Bool => b'b',
            PropKind::Int8 => b'c',
            PropKind::Int16 => b's',
            PropKind::Int32 => b'i',
            PropKind::Int64 => b'l',
            PropKind::UInt8 => b'r',
            PropKind::UInt16 => b'h',
            PropKind::UInt32 => b'e',
            PropKind::UInt64 => b'g',
            PropKind::Float => b'f',
            PropKind::Text => b't',
            PropKind::Object => b'o',
            PropKind::NullArray => b'N',
            PropKind::BoolArray => b'B',
            PropKind::Int8Array => b'C',
            PropKind::Int16Array => b'S',
            PropKind::Int32Array => b'I',
            PropKind::Int64Array => b'L',
            PropKind::UInt8Array => b'R',
            PropKind::UInt16Array => b'H',
            PropKind::UInt32Array => b'E',
            PropKind::UInt64Array => b'G',
            PropKind::FloatArray => b'F',
            PropKind::TextArray => b'T',
            PropKind::ObjectArray => b'O',
        }
    }

    pub fn from_marker(marker: u8) -> Option<PropKind> {
        PropKind::ALL.into_iter().find(|kind| kind.marker() == marker)
    }

    pub fn is_array(self) -> bool {
        self >= PropKind::NullArray
    }

    /// Element type stored by this group.
    pub fn field_type(self) -> FieldType {
        use PropKind::*;
        match self {
            Null | NullArray => FieldType::Null,
            Bool | BoolArray => FieldType::Bool,
            Int8 | Int8Array => FieldType::Int8,
            Int16 | Int16Array => FieldType::Int16,
            Int32 | Int32Array => FieldType::Int32,
            Int64 | Int64Array => FieldType::Int64,
            UInt8 | UInt8Array => FieldType::UInt8,
            UInt16 | UInt16Array => FieldType::UInt16,
            UInt32 | UInt32Array => FieldType::UInt32,
            UInt64 | UInt64Array => FieldType::UInt64,
            Float | FloatArray => FieldType::Float,
            Text | TextArray => FieldType::String,
            Object | ObjectArray => FieldType::Object,
        }
    }

    /// Single-value group for `ty`.
    pub fn scalar_of(ty: FieldType) -> PropKind {
        PropKind::ALL[ty as usize]
    }

    /// Array group for `ty`.
    pub fn array_of(ty: FieldType) -> PropKind {
        PropKind::ALL[PropKind::NullArray.index() + ty as usize]
    }

    pub fn label(self) -> &'static str {
        use PropKind::*;
        match self {
            Null => "Null",
            Bool => "Boolean",
            Int8 => "Int8",
            Int16 => "Int16",
            Int32 => "Int32",
            Int64 => "Int64",
            UInt8 => "UInt8",
            UInt16 => "UInt16",
            UInt32 => "UInt32",
            UInt64 => "UInt64",
            Float => "Float",
            Text => "Text",
            Object => "Object",
            NullArray => "Null Array",
            BoolArray => "Boolean Array",
            Int8Array => "Int8 Array",
            Int16Array => "Int16 Array",
            Int32Array => "Int32 Array",
            Int64Array => "Int64 Array",
            UInt8Array => "UInt8 Array",
            UInt16Array => "UInt16 Array",
            UInt32Array => "UInt32 Array",
            UInt64Array => "UInt64 Array",
            FloatArray => "Float Array",
            TextArray => "Text Array",
            ObjectArray => "Object Array",
        }
    }
}

/// Column value types are tagged with the array marker of their element type.
pub fn column_type_marker(ty: FieldType) -> u8 {
    PropKind::array_of(ty).marker()
}

pub fn column_type_from_marker(marker: u8) -> Option<FieldType> {
    PropKind::from_marker(marker)
        .filter(|kind| kind.is_array())
        .map(PropKind::field_type)
}

// ── Presence flags ─────────────────────────────────────────────────────────

/// Set of property kinds present on an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropFlags(u32);

impl PropFlags {
    const VALID: u32 = (1 << PropKind::COUNT) - 1;

    pub fn empty() -> Self {
        Self(0)
    }

    /// Accepts only bits that name a [`PropKind`].
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::VALID != 0 {
            return Err(Error::corrupted(format!(
                "object flags 0x{bits:08x} set bits outside the {} property kinds",
                PropKind::COUNT
            )));
        }
        Ok(Self(bits))
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn insert(&mut self, kind: PropKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn contains(self, kind: PropKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Present kinds in ascending bit order.
    pub fn iter(self) -> impl Iterator<Item = PropKind> {
        PropKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }

    /// Slot of `kind` in the object's offset table, if present.
    pub fn slot_of(self, kind: PropKind) -> Option<usize> {
        self.contains(kind)
            .then(|| (self.0 & (kind.bit() - 1)).count_ones() as usize)
    }
}

impl FromIterator<PropKind> for PropFlags {
    fn from_iter<I: IntoIterator<Item = PropKind>>(iter: I) -> Self {
        let mut flags = PropFlags::empty();
        for kind in iter {
            flags.insert(kind);
        }
        flags
    }
}

// ── Scalar values ──────────────────────────────────────────────────────────

/// One fixed-width value as stored inside a property group or column.
///
/// Strings are referenced by their dictionary id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    String(u64),
}

impl Scalar {
    pub fn field_type(&self) -> FieldType {
        match self {
            Scalar::Null => FieldType::Null,
            Scalar::Bool(_) => FieldType::Bool,
            Scalar::Int8(_) => FieldType::Int8,
            Scalar::Int16(_) => FieldType::Int16,
            Scalar::Int32(_) => FieldType::Int32,
            Scalar::Int64(_) => FieldType::Int64,
            Scalar::UInt8(_) => FieldType::UInt8,
            Scalar::UInt16(_) => FieldType::UInt16,
            Scalar::UInt32(_) => FieldType::UInt32,
            Scalar::UInt64(_) => FieldType::UInt64,
            Scalar::Float(_) => FieldType::Float,
            Scalar::String(_) => FieldType::String,
        }
    }

    pub fn write(&self, cursor: &mut Cursor<'_>) -> Result<()> {
        match *self {
            Scalar::Null => Ok(()),
            Scalar::Bool(v) => cursor.write_u8(v as u8),
            Scalar::Int8(v) => cursor.write_i8(v),
            Scalar::Int16(v) => cursor.write_i16(v),
            Scalar::Int32(v) => cursor.write_i32(v),
            Scalar::Int64(v) => cursor.write_i64(v),
            Scalar::UInt8(v) => cursor.write_u8(v),
            Scalar::UInt16(v) => cursor.write_u16(v),
            Scalar::UInt32(v) => cursor.write_u32(v),
            Scalar::UInt64(v) => cursor.write_u64(v),
            Scalar::Float(v) => cursor.write_f32(v),
            Scalar::String(id) => cursor.write_u64(id),
        }
    }

    pub fn read(ty: FieldType, cursor: &mut Cursor<'_>) -> Result<Scalar> {
        Ok(match ty {
            FieldType::Null => Scalar::Null,
            FieldType::Bool => Scalar::Bool(cursor.read_u8()? != 0),
            FieldType::Int8 => Scalar::Int8(cursor.read_i8()?),
            FieldType::Int16 => Scalar::Int16(cursor.read_i16()?),
            FieldType::Int32 => Scalar::Int32(cursor.read_i32()?),
            FieldType::Int64 => Scalar::Int64(cursor.read_i64()?),
            FieldType::UInt8 => Scalar::UInt8(cursor.read_u8()?),
            FieldType::UInt16 => Scalar::UInt16(cursor.read_u16()?),
            FieldType::UInt32 => Scalar::UInt32(cursor.read_u32()?),
            FieldType::UInt64 => Scalar::UInt64(cursor.read_u64()?),
            FieldType::Float => Scalar::Float(cursor.read_f32()?),
            FieldType::String => Scalar::String(cursor.read_u64()?),
            FieldType::Object => {
                return Err(Error::corrupted("objects are not stored as inline values"))
            }
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int8(v) => write!(f, "{v}"),
            Scalar::Int16(v) => write!(f, "{v}"),
            Scalar::Int32(v) => write!(f, "{v}"),
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::UInt8(v) => write!(f, "{v}"),
            Scalar::UInt16(v) => write!(f, "{v}"),
            Scalar::UInt32(v) => write!(f, "{v}"),
            Scalar::UInt64(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v:.6}"),
            Scalar::String(id) => write!(f, "{id}"),
        }
    }
}

// ── Headers ────────────────────────────────────────────────────────────────

fn expect_marker(expected: u8, found: u8, offset: u64) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::unexpected_marker(expected, found, offset))
    }
}

fn le_u32(buf: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[..4]);
    u32::from_le_bytes(raw)
}

fn le_u64(buf: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(raw)
}

/// Decoded 26-byte file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    /// Absolute position of the record header; the root object follows it.
    pub record_header_offset: u64,
    /// Absolute position of the persisted string-id index, 0 when absent.
    pub string_id_index_offset: u64,
}

impl FileHeader {
    pub fn new(record_header_offset: u64) -> Self {
        Self {
            version: VERSION,
            record_header_offset,
            string_id_index_offset: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[..9].copy_from_slice(MAGIC);
        buf[9] = self.version;
        buf[10..18].copy_from_slice(&self.record_header_offset.to_le_bytes());
        buf[18..26].copy_from_slice(&self.string_id_index_offset.to_le_bytes());
        buf
    }

    /// Checks magic and version.
    pub fn from_bytes(buf: &[u8; FILE_HEADER_SIZE as usize]) -> Result<Self> {
        if &buf[..9] != MAGIC {
            return Err(Error::corrupted("invalid magic bytes, not a carbon archive"));
        }
        if buf[9] != VERSION {
            return Err(Error::corrupted(format!(
                "unsupported archive version {} (expected {VERSION})",
                buf[9]
            )));
        }
        Ok(Self {
            version: buf[9],
            record_header_offset: le_u64(&buf[10..]),
            string_id_index_offset: le_u64(&buf[18..]),
        })
    }

    /// File position of the root object header.
    pub fn root_offset(&self) -> u64 {
        self.record_header_offset + RECORD_HEADER_SIZE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringTableHeader {
    pub num_entries: u32,
    /// Compressor flags; exactly one bit set.
    pub flags: u8,
    /// Absolute position of the first entry header.
    pub first_entry: u64,
    pub extra_size: u64,
}

impl StringTableHeader {
    pub fn to_bytes(&self) -> [u8; STRING_TABLE_HEADER_SIZE as usize] {
        let mut buf = [0u8; STRING_TABLE_HEADER_SIZE as usize];
        buf[0] = marker::STRING_TABLE;
        buf[1..5].copy_from_slice(&self.num_entries.to_le_bytes());
        buf[5] = self.flags;
        buf[6..14].copy_from_slice(&self.first_entry.to_le_bytes());
        buf[14..22].copy_from_slice(&self.extra_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; STRING_TABLE_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::STRING_TABLE, buf[0], offset)?;
        Ok(Self {
            num_entries: le_u32(&buf[1..]),
            flags: buf[5],
            first_entry: le_u64(&buf[6..]),
            extra_size: le_u64(&buf[14..]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringEntryHeader {
    /// Distance from this header to the next one, 0 on the last entry.
    pub next_entry_off: u64,
    pub string_id: u64,
    /// Decoded length in bytes.
    pub string_len: u32,
}

impl StringEntryHeader {
    pub fn to_bytes(&self) -> [u8; STRING_ENTRY_HEADER_SIZE as usize] {
        let mut buf = [0u8; STRING_ENTRY_HEADER_SIZE as usize];
        buf[0] = marker::STRING_ENTRY;
        buf[1..9].copy_from_slice(&self.next_entry_off.to_le_bytes());
        buf[9..17].copy_from_slice(&self.string_id.to_le_bytes());
        buf[17..21].copy_from_slice(&self.string_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; STRING_ENTRY_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::STRING_ENTRY, buf[0], offset)?;
        Ok(Self {
            next_entry_off: le_u64(&buf[1..]),
            string_id: le_u64(&buf[9..]),
            string_len: le_u32(&buf[17..]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub flags: u8,
    /// Bytes of the object tree that follows the header.
    pub record_size: u64,
}

impl RecordHeader {
    pub fn is_sorted(&self) -> bool {
        self.flags & RECORD_FLAG_SORTED != 0
    }

    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE as usize] {
        let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
        buf[0] = marker::RECORD_HEADER;
        buf[1] = self.flags;
        buf[2..10].copy_from_slice(&self.record_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::RECORD_HEADER, buf[0], offset)?;
        Ok(Self {
            flags: buf[1],
            record_size: le_u64(&buf[2..]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectHeader {
    pub object_id: u64,
    pub flags: PropFlags,
}

impl ObjectHeader {
    pub fn to_bytes(&self) -> [u8; OBJECT_HEADER_SIZE as usize] {
        let mut buf = [0u8; OBJECT_HEADER_SIZE as usize];
        buf[0] = marker::OBJECT_BEGIN;
        buf[1..9].copy_from_slice(&self.object_id.to_le_bytes());
        buf[9..13].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; OBJECT_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::OBJECT_BEGIN, buf[0], offset)?;
        Ok(Self {
            object_id: le_u64(&buf[1..]),
            flags: PropFlags::from_bits(le_u32(&buf[9..]))?,
        })
    }
}

/// Header of a property group (and of an object-array group).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropHeader {
    pub kind: PropKind,
    pub num_entries: u32,
}

impl PropHeader {
    pub fn to_bytes(&self) -> [u8; PROP_HEADER_SIZE as usize] {
        let mut buf = [0u8; PROP_HEADER_SIZE as usize];
        buf[0] = self.kind.marker();
        buf[1..5].copy_from_slice(&self.num_entries.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; PROP_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        let kind = PropKind::from_marker(buf[0]).ok_or_else(|| {
            Error::corrupted(format!(
                "unknown property marker [{}] at offset 0x{offset:04x}",
                buf[0] as char
            ))
        })?;
        Ok(Self {
            kind,
            num_entries: le_u32(&buf[1..]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnGroupHeader {
    pub num_columns: u32,
    pub num_objects: u32,
}

impl ColumnGroupHeader {
    pub fn to_bytes(&self) -> [u8; COLUMN_GROUP_HEADER_SIZE as usize] {
        let mut buf = [0u8; COLUMN_GROUP_HEADER_SIZE as usize];
        buf[0] = marker::COLUMN_GROUP;
        buf[1..5].copy_from_slice(&self.num_columns.to_le_bytes());
        buf[5..9].copy_from_slice(&self.num_objects.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; COLUMN_GROUP_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::COLUMN_GROUP, buf[0], offset)?;
        Ok(Self {
            num_columns: le_u32(&buf[1..]),
            num_objects: le_u32(&buf[5..]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHeader {
    pub column_name: u64,
    pub value_type: FieldType,
    pub num_entries: u32,
}

impl ColumnHeader {
    pub fn to_bytes(&self) -> [u8; COLUMN_HEADER_SIZE as usize] {
        let mut buf = [0u8; COLUMN_HEADER_SIZE as usize];
        buf[0] = marker::COLUMN;
        buf[1..9].copy_from_slice(&self.column_name.to_le_bytes());
        buf[9] = column_type_marker(self.value_type);
        buf[10..14].copy_from_slice(&self.num_entries.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; COLUMN_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::COLUMN, buf[0], offset)?;
        let value_type = column_type_from_marker(buf[9]).ok_or_else(|| {
            Error::corrupted(format!(
                "unknown column value type [{}] at offset 0x{offset:04x}",
                buf[9] as char
            ))
        })?;
        Ok(Self {
            column_name: le_u64(&buf[1..]),
            value_type,
            num_entries: le_u32(&buf[10..]),
        })
    }
}

/// Header of the persisted string-id index at the tail of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexHeader {
    pub num_entries: u64,
    /// xxh3-64 of the serialized entries.
    pub checksum: u64,
}

impl IndexHeader {
    pub fn to_bytes(&self) -> [u8; INDEX_HEADER_SIZE as usize] {
        let mut buf = [0u8; INDEX_HEADER_SIZE as usize];
        buf[0] = marker::INDEX_HEADER;
        buf[1..9].copy_from_slice(&self.num_entries.to_le_bytes());
        buf[9..17].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; INDEX_HEADER_SIZE as usize], offset: u64) -> Result<Self> {
        expect_marker(marker::INDEX_HEADER, buf[0], offset)?;
        Ok(Self {
            num_entries: le_u64(&buf[1..]),
            checksum: le_u64(&buf[9..]),
        })
    }
}
