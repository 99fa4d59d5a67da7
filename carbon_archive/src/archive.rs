use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use carbon_core::format::{RecordHeader, FILE_HEADER_SIZE, RECORD_HEADER_SIZE};
use carbon_core::{Error, FileHeader, Result, Strictness};

use crate::cache::{CacheStats, StringCache};
use crate::index::StringIdIndex;
use crate::query::{Query, QueryOptions};
use crate::record::{print_archive, ObjectView, RecordView};
use crate::string_table::StringTable;

/// Shared file handle. Every user seeks before reading, so one descriptor
/// serves all threads as long as each seek+read sequence holds the lock.
#[derive(Debug, Clone)]
pub struct IoContext {
    file: Arc<Mutex<File>>,
}

impl IoContext {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: Arc::new(Mutex::new(File::open(path)?)),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock()
    }
}

/// Section sizes reported by [`Archive::info`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Table header, extra block and every entry.
    pub string_table_size: u64,
    /// Object tree bytes, record header excluded.
    pub record_table_size: u64,
    pub num_embedded_strings: u32,
    /// Persisted index bytes, 0 when the archive has none.
    pub string_id_index_size: u64,
}

/// The object tree, held in memory once the archive is open.
#[derive(Debug)]
pub struct RecordTable {
    pub flags: u8,
    bytes: Vec<u8>,
}

impl RecordTable {
    pub fn is_sorted(&self) -> bool {
        RecordHeader {
            flags: self.flags,
            record_size: 0,
        }
        .is_sorted()
    }

    pub fn view(&self) -> RecordView<'_> {
        RecordView::new(&self.bytes)
    }
}

/// An opened, read-only archive file.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    header: FileHeader,
    string_table: StringTable,
    records: RecordTable,
    info: ArchiveInfo,
    io: IoContext,
    index: RwLock<Option<Arc<StringIdIndex>>>,
    cache: RwLock<Option<Arc<StringCache>>>,
    options: QueryOptions,
}

impl Archive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, QueryOptions::default(), Strictness::default())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        options: QueryOptions,
        strictness: Strictness,
    ) -> Result<Self> {
        let path = path.as_ref();
        let result = Self::load(path, options);
        if let Err(err) = &result {
            tracing::error!(path = %path.display(), code = err.code(), "cannot open archive: {err}");
        }
        strictness.check(result)
    }

    fn load(path: &Path, options: QueryOptions) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut head = [0u8; FILE_HEADER_SIZE as usize];
        file.read_exact(&mut head)
            .map_err(|_| Error::corrupted("file is shorter than the archive header"))?;
        let header = FileHeader::from_bytes(&head)?;

        let string_table = StringTable::read(&mut file, FILE_HEADER_SIZE, file_len)?;
        let table_end = string_table.verify_chain(&mut file, file_len)?;
        if table_end != header.record_header_offset {
            return Err(Error::corrupted(format!(
                "string table ends at 0x{table_end:04x} but the record header is at 0x{:04x}",
                header.record_header_offset
            )));
        }

        let records = read_records(&mut file, &header, file_len)?;
        records.view().root()?;

        let index = match header.string_id_index_offset {
            0 => None,
            at => {
                let index = read_index(&mut file, at)?;
                if index.len() != string_table.num_entries() as usize {
                    return Err(Error::corrupted(format!(
                        "string-id index holds {} entries for {} strings",
                        index.len(),
                        string_table.num_entries()
                    )));
                }
                Some(Arc::new(index))
            }
        };

        let info = ArchiveInfo {
            string_table_size: table_end - FILE_HEADER_SIZE,
            record_table_size: records.bytes.len() as u64,
            num_embedded_strings: string_table.num_entries(),
            string_id_index_size: index.as_ref().map_or(0, |i| i.byte_size()),
        };
        tracing::debug!(
            path = %path.display(),
            strings = info.num_embedded_strings,
            compressor = string_table.compressor().name(),
            indexed = index.is_some(),
            "archive opened"
        );

        drop(file);
        Ok(Self {
            path: path.to_path_buf(),
            header,
            string_table,
            records,
            info,
            io: IoContext::open(path)?,
            index: RwLock::new(index),
            cache: RwLock::new(None),
            options,
        })
    }

    /// Release the handle. Dropping does the same.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "archive closed");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn info(&self) -> ArchiveInfo {
        self.info
    }

    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn io(&self) -> &IoContext {
        &self.io
    }

    pub fn is_sorted(&self) -> bool {
        self.records.is_sorted()
    }

    pub fn records(&self) -> RecordView<'_> {
        self.records.view()
    }

    pub fn root(&self) -> Result<ObjectView<'_>> {
        self.records.view().root()
    }

    /// Walk the whole object tree.
    pub fn validate(&self) -> Result<()> {
        self.records.view().validate()
    }

    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Dump the archive file as [`print_archive`] renders it.
    pub fn print(&self, out: &mut dyn Write) -> Result<()> {
        let mut bytes = Vec::new();
        {
            let mut file = self.io.lock();
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut bytes)?;
        }
        print_archive(out, &bytes)
    }

    // ── Index and cache ────────────────────────────────────────────────────

    pub fn has_string_id_index(&self) -> bool {
        self.index.read().is_some()
    }

    pub fn string_id_index(&self) -> Option<Arc<StringIdIndex>> {
        self.index.read().clone()
    }

    /// Forget the loaded index; lookups fall back to scanning. The file is
    /// left untouched.
    pub fn drop_indexes(&self) {
        if self.index.write().take().is_some() {
            tracing::debug!("string-id index dropped");
        }
    }

    pub fn ensure_string_cache(&self) {
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(Arc::new(StringCache::new(self.options.cache_capacity)));
        }
    }

    pub fn drop_string_cache(&self) {
        self.cache.write().take();
    }

    pub fn string_cache(&self) -> Option<Arc<StringCache>> {
        self.cache.read().clone()
    }

    pub fn string_cache_stats(&self) -> Option<CacheStats> {
        self.cache.read().as_ref().map(|c| c.stats())
    }

    /// Persist a string-id index into this archive's file and reopen it.
    pub fn bake_string_id_index(self) -> Result<Self> {
        let path = self.path.clone();
        let options = self.options;
        self.close();
        bake_string_id_index(&path)?;
        Self::open_with(&path, options, Strictness::Lenient)
    }
}

fn read_records(file: &mut File, header: &FileHeader, file_len: u64) -> Result<RecordTable> {
    let at = header.record_header_offset;
    file.seek(SeekFrom::Start(at))?;
    let mut head = [0u8; RECORD_HEADER_SIZE as usize];
    file.read_exact(&mut head)
        .map_err(|_| Error::corrupted(format!("record header at 0x{at:04x} is truncated")))?;
    let record = RecordHeader::from_bytes(&head, at)?;

    let start = header.root_offset();
    let end = start
        .checked_add(record.record_size)
        .filter(|end| *end <= file_len)
        .ok_or_else(|| {
            Error::corrupted(format!(
                "record table of {} bytes at 0x{start:04x} runs past the end of file",
                record.record_size
            ))
        })?;
    let len = usize::try_from(end - start)
        .map_err(|_| Error::AllocationFailure(format!("{} byte record table", end - start)))?;
    let mut bytes = vec![0u8; len];
    file.read_exact(&mut bytes)?;
    Ok(RecordTable {
        flags: record.flags,
        bytes,
    })
}

fn read_index(file: &mut File, at: u64) -> Result<StringIdIndex> {
    file.seek(SeekFrom::Start(at))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    StringIdIndex::deserialize(&tail, at)
}

/// Build the string-id index of the archive at `path` and append it to the
/// file, replacing any index baked before. Returns the number of entries.
///
/// The new file is written next to the old one and renamed over it.
pub fn bake_string_id_index(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let archive = Archive::open(path)?;
    let index = archive.query().create_index_string_id_to_offset()?;
    let mut header = *archive.header();
    let record_end = header.root_offset() + archive.info().record_table_size;
    archive.close();

    let mut bytes = fs::read(path)?;
    bytes.truncate(record_end as usize);
    header.string_id_index_offset = record_end;
    bytes[..FILE_HEADER_SIZE as usize].copy_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&index.serialize()?);

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!(path = %path.display(), entries = index.len(), "string-id index baked");
    Ok(index.len())
}
