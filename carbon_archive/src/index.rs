use std::collections::HashMap;

use xxhash_rust::xxh3::xxh3_64;

use carbon_core::format::{IndexHeader, INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE};
use carbon_core::{Cursor, Error, Result};

use crate::query::StringIdInfo;

/// String id → location of its encoded bytes.
///
/// Persisted at the tail of the archive as a `'#'` header followed by the
/// entries in ascending id order. The header checksum is the xxh3-64 of the
/// entry bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringIdIndex {
    entries: HashMap<u64, (u64, u32)>,
}

impl StringIdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: StringIdInfo) {
        self.entries.insert(info.id, (info.offset, info.len));
    }

    pub fn get(&self, id: u64) -> Option<StringIdInfo> {
        self.entries
            .get(&id)
            .map(|&(offset, len)| StringIdInfo { id, offset, len })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in ascending id order.
    pub fn entries(&self) -> Vec<StringIdInfo> {
        let mut out: Vec<StringIdInfo> = self
            .entries
            .iter()
            .map(|(&id, &(offset, len))| StringIdInfo { id, offset, len })
            .collect();
        out.sort_unstable_by_key(|info| info.id);
        out
    }

    /// Bytes taken by the persisted form.
    pub fn byte_size(&self) -> u64 {
        INDEX_HEADER_SIZE + self.entries.len() as u64 * INDEX_ENTRY_SIZE
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut body = Cursor::with_capacity(self.entries.len() * INDEX_ENTRY_SIZE as usize);
        for info in self.entries() {
            body.write_u64(info.id)?;
            body.write_u64(info.offset)?;
            body.write_u32(info.len)?;
        }
        let body = body.into_inner();
        let header = IndexHeader {
            num_entries: self.entries.len() as u64,
            checksum: xxh3_64(&body),
        };
        let mut out = Vec::with_capacity(INDEX_HEADER_SIZE as usize + body.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse the index at the start of `bytes`; `offset` is its file position
    /// and only appears in error messages.
    pub fn deserialize(bytes: &[u8], offset: u64) -> Result<Self> {
        let mut cursor = Cursor::read_only(bytes);
        let header = IndexHeader::from_bytes(&cursor.read_array()?, offset)?;
        let body_len = header
            .num_entries
            .checked_mul(INDEX_ENTRY_SIZE)
            .filter(|len| *len <= cursor.remaining())
            .ok_or_else(|| {
                Error::corrupted(format!(
                    "string-id index at 0x{offset:04x} claims {} entries but the file ends first",
                    header.num_entries
                ))
            })?;

        let body = cursor.peek(body_len)?;
        let checksum = xxh3_64(body);
        if checksum != header.checksum {
            return Err(Error::corrupted(format!(
                "string-id index checksum mismatch: stored 0x{:016x}, computed 0x{checksum:016x}",
                header.checksum
            )));
        }

        let mut index = Self::new();
        for _ in 0..header.num_entries {
            let info = StringIdInfo {
                id: cursor.read_u64()?,
                offset: cursor.read_u64()?,
                len: cursor.read_u32()?,
            };
            if index.get(info.id).is_some() {
                return Err(Error::corrupted(format!(
                    "string-id index lists id {} twice",
                    info.id
                )));
            }
            index.insert(info);
        }
        Ok(index)
    }
}
