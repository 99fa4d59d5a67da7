use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use carbon_codecs::compressor_by_flags;
use carbon_core::format::{
    StringEntryHeader, StringTableHeader, STRING_ENTRY_HEADER_SIZE, STRING_TABLE_HEADER_SIZE,
};
use carbon_core::{Compressor, Cursor, Error, Result};

use crate::model::StringDictionary;

/// Opened string table: the compressor (with its extra state restored) and
/// where the entry chain starts.
#[derive(Debug)]
pub struct StringTable {
    pub(crate) compressor: Box<dyn Compressor>,
    pub header: StringTableHeader,
    /// Absolute position of the table header.
    pub offset: u64,
}

impl StringTable {
    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    pub fn num_entries(&self) -> u32 {
        self.header.num_entries
    }

    pub fn first_entry(&self) -> u64 {
        self.header.first_entry
    }

    /// Read the header at `offset` and restore the compressor state.
    ///
    /// `file_len` bounds every size and position the header announces.
    pub fn read(file: &mut File, offset: u64, file_len: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; STRING_TABLE_HEADER_SIZE as usize];
        file.read_exact(&mut buf)
            .map_err(|_| Error::corrupted("file is shorter than the string table header"))?;
        let header = StringTableHeader::from_bytes(&buf, offset)?;

        let extra_end = (offset + STRING_TABLE_HEADER_SIZE)
            .checked_add(header.extra_size)
            .filter(|&end| end <= file_len)
            .ok_or_else(|| {
                Error::corrupted(format!(
                    "string table extra block of {} bytes runs past the end of the file",
                    header.extra_size
                ))
            })?;
        if header.num_entries > 0 && !(extra_end..file_len).contains(&header.first_entry) {
            return Err(Error::corrupted(format!(
                "first string entry at 0x{:04x} lies outside the string table",
                header.first_entry
            )));
        }

        let mut compressor = compressor_by_flags(header.flags)?;
        let mut extra = vec![0u8; header.extra_size as usize];
        file.read_exact(&mut extra)?;
        compressor.read_extra(&extra)?;

        Ok(Self {
            compressor,
            header,
            offset,
        })
    }

    /// Follow the entry chain and check it has exactly `num_entries` links.
    ///
    /// Returns the position just past the last entry.
    pub fn verify_chain(&self, file: &mut File, file_len: u64) -> Result<u64> {
        let mut reader = BufReader::new(file);
        let mut end = self.offset + STRING_TABLE_HEADER_SIZE + self.header.extra_size;
        let mut at = self.header.first_entry;
        let mut buf = [0u8; STRING_ENTRY_HEADER_SIZE as usize];
        for link in 0..self.header.num_entries {
            reader.seek(SeekFrom::Start(at))?;
            reader.read_exact(&mut buf).map_err(|e| {
                Error::corrupted(format!(
                    "string entry {link} at 0x{at:04x} is unreadable: {e}"
                ))
            })?;
            let entry = StringEntryHeader::from_bytes(&buf, at)?;
            let last = link + 1 == self.header.num_entries;
            match (entry.next_entry_off, last) {
                (0, false) => {
                    return Err(Error::corrupted(format!(
                        "string chain ends after {} of {} entries",
                        link + 1,
                        self.header.num_entries
                    )))
                }
                (next, true) if next != 0 => {
                    return Err(Error::corrupted(format!(
                        "string chain continues past its {} entries",
                        self.header.num_entries
                    )))
                }
                (0, true) => {
                    // The last entry runs to the end of its encoded bytes.
                    let data_start = at + STRING_ENTRY_HEADER_SIZE;
                    reader.seek(SeekFrom::Start(data_start))?;
                    self.compressor
                        .decode_string(&mut reader, entry.string_len)?;
                    end = reader.stream_position()?;
                }
                (next, _) if next < STRING_ENTRY_HEADER_SIZE => {
                    return Err(Error::corrupted(format!(
                        "string entry at 0x{at:04x} links back into itself"
                    )))
                }
                (next, _) => {
                    at = at.checked_add(next).filter(|&n| n < file_len).ok_or_else(|| {
                        Error::corrupted(format!(
                            "string entry at 0x{at:04x} links past the end of the file"
                        ))
                    })?;
                }
            }
        }
        Ok(end)
    }

    /// Diagnostic dump of the table found at the cursor position.
    pub fn print(out: &mut dyn Write, cursor: &mut Cursor<'_>) -> Result<()> {
        let offset = cursor.tell();
        let header = StringTableHeader::from_bytes(&cursor.read_array()?, offset)?;
        let kind = carbon_core::CompressorKind::from_flags(header.flags)?;
        writeln!(
            out,
            "0x{offset:04x} [marker: {}] [nentries: {}] [flags: {}] [first-entry-off: 0x{:04x}] [extra-size: {}]",
            carbon_core::format::marker::STRING_TABLE as char,
            header.num_entries,
            kind,
            header.first_entry,
            header.extra_size
        )?;

        let mut compressor = compressor_by_flags(header.flags)?;
        let extra = cursor.read(header.extra_size)?.to_vec();
        compressor.print_extra(out, &extra)?;
        compressor.read_extra(&extra)?;

        for _ in 0..header.num_entries {
            let at = cursor.tell();
            let entry = StringEntryHeader::from_bytes(&cursor.read_array()?, at)?;
            write!(
                out,
                "0x{at:04x}    [marker: {}] [next-entry-off: 0x{:04x}] [string-id: {}] [string-length: {}] ",
                carbon_core::format::marker::STRING_ENTRY as char,
                entry.next_entry_off,
                entry.string_id,
                entry.string_len
            )?;
            let mut rest = &cursor.as_slice()[cursor.tell() as usize..];
            let before = rest.len();
            compressor.print_encoded(out, &mut rest, entry.string_len)?;
            let consumed = (before - rest.len()) as u64;
            cursor.skip(consumed)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Write the dictionary at the cursor: header placeholder, extra block, then
/// the chained entries. The header is filled in once every entry is placed.
pub fn write_string_table(
    cursor: &mut Cursor<'_>,
    compressor: &mut dyn Compressor,
    strings: &StringDictionary,
) -> Result<()> {
    let header_at = cursor.tell();
    cursor.skip(STRING_TABLE_HEADER_SIZE)?;

    let corpus: Vec<&str> = strings.iter().map(|(_, s)| s).collect();
    let extra_at = cursor.tell();
    compressor.write_extra(cursor, &corpus)?;
    let extra_size = cursor.tell() - extra_at;

    let first_entry = if strings.is_empty() { 0 } else { cursor.tell() };
    let count = strings.len();
    for (i, (id, s)) in strings.iter().enumerate() {
        let entry_at = cursor.tell();
        cursor.skip(STRING_ENTRY_HEADER_SIZE)?;
        compressor.encode_string(cursor, s)?;
        let string_len = u32::try_from(s.len()).map_err(|_| {
            Error::InvalidModel(format!("string {id} is {} bytes long", s.len()))
        })?;
        let entry = StringEntryHeader {
            next_entry_off: if i + 1 == count { 0 } else { cursor.tell() - entry_at },
            string_id: id,
            string_len,
        };
        cursor.patch(entry_at, &entry.to_bytes())?;
    }

    let header = StringTableHeader {
        num_entries: u32::try_from(count)
            .map_err(|_| Error::InvalidModel(format!("{count} strings exceed the table limit")))?,
        flags: compressor.flag(),
        first_entry,
        extra_size,
    };
    cursor.patch(header_at, &header.to_bytes())?;
    let size = cursor.tell() - header_at;
    tracing::debug!(
        entries = count,
        compressor = compressor.name(),
        bytes = size,
        "string table written"
    );
    Ok(())
}
