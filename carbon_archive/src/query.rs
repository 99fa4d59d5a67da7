//! String queries over an opened archive.
//!
//! Every file access goes through the archive's IO context: a lock is taken
//! for one batch of positioned reads and released before the caller sees the
//! results, so several threads may query one [`Archive`] at once.

use std::io::{BufReader, Read, Seek, SeekFrom};

use carbon_core::cursor::GROWTH_FACTOR;
use carbon_core::format::{StringEntryHeader, STRING_ENTRY_HEADER_SIZE};
use carbon_core::{Error, Result};

use crate::archive::Archive;
use crate::index::StringIdIndex;

// ── Options ────────────────────────────────────────────────────────────────

/// Query-side tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Dictionary entries read per lock acquisition.
    pub batch_size: usize,
    /// Entries kept by the string cache once it is enabled.
    pub cache_capacity: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            cache_capacity: 1024,
        }
    }
}

impl QueryOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

// ── String-id scan ─────────────────────────────────────────────────────────

/// Where one dictionary string lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringIdInfo {
    pub id: u64,
    /// Absolute file position of the encoded bytes.
    pub offset: u64,
    /// Decoded length in bytes.
    pub len: u32,
}

/// Walks the dictionary chain, yielding one batch of entries per step.
///
/// The chain must hold exactly the number of entries the table header
/// announces. A broken chain yields one `Corrupted` error and ends the
/// iteration.
pub struct StringIdIter<'a> {
    archive: &'a Archive,
    at: u64,
    remaining: u32,
    batch_size: usize,
}

impl<'a> StringIdIter<'a> {
    fn new(archive: &'a Archive) -> Self {
        let table = archive.string_table();
        Self {
            archive,
            at: table.first_entry(),
            remaining: table.num_entries(),
            batch_size: archive.options().batch_size.max(1),
        }
    }

    fn read_batch(&mut self) -> Result<Vec<StringIdInfo>> {
        let take = (self.remaining as usize).min(self.batch_size);
        let total = self.archive.string_table().num_entries();
        let mut file = self.archive.io().lock();
        let mut reader = BufReader::new(&mut *file);
        reader.seek(SeekFrom::Start(self.at))?;

        let mut batch = Vec::with_capacity(take);
        let mut buf = [0u8; STRING_ENTRY_HEADER_SIZE as usize];
        for _ in 0..take {
            reader.read_exact(&mut buf).map_err(|e| {
                Error::corrupted(format!("string entry at 0x{:04x} is unreadable: {e}", self.at))
            })?;
            let entry = StringEntryHeader::from_bytes(&buf, self.at)?;
            batch.push(StringIdInfo {
                id: entry.string_id,
                offset: self.at + STRING_ENTRY_HEADER_SIZE,
                len: entry.string_len,
            });
            self.remaining -= 1;

            match (entry.next_entry_off, self.remaining) {
                (0, 0) => break,
                (0, left) => {
                    return Err(Error::corrupted(format!(
                        "string chain ends with {left} of {total} entries unread"
                    )))
                }
                (_, 0) => {
                    return Err(Error::corrupted(format!(
                        "string chain continues past its {total} entries"
                    )))
                }
                (next, _) if next < STRING_ENTRY_HEADER_SIZE => {
                    return Err(Error::corrupted(format!(
                        "string entry at 0x{:04x} links back into itself",
                        self.at
                    )))
                }
                (next, _) => {
                    let gap = next - STRING_ENTRY_HEADER_SIZE;
                    let gap = i64::try_from(gap).map_err(|_| {
                        Error::corrupted(format!("string entry link of {next} bytes"))
                    })?;
                    self.at = self.at.checked_add(next).ok_or_else(|| {
                        Error::corrupted(format!(
                            "string entry at 0x{:04x} links past the end of the file",
                            self.at
                        ))
                    })?;
                    reader.seek_relative(gap)?;
                }
            }
        }
        tracing::debug!(entries = batch.len(), left = self.remaining, "string-id batch scanned");
        Ok(batch)
    }
}

impl Iterator for StringIdIter<'_> {
    type Item = Result<Vec<StringIdInfo>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let batch = self.read_batch();
        if batch.is_err() {
            self.remaining = 0;
        }
        Some(batch)
    }
}

// ── Predicates ─────────────────────────────────────────────────────────────

/// Selects matching strings out of one decoded batch.
pub trait StringPredicate: Send + Sync {
    /// Indices into `batch` of the strings that match.
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>>;

    /// Most matches this predicate wants; negative means unbounded.
    fn limit(&self) -> i64 {
        -1
    }
}

fn matching(batch: &[String], hit: impl Fn(&str) -> bool) -> Vec<usize> {
    batch
        .iter()
        .enumerate()
        .filter_map(|(i, s)| hit(s).then_some(i))
        .collect()
}

/// Exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equals(pub String);

/// Substring match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contains(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartsWith(pub String);

impl StringPredicate for Equals {
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>> {
        Ok(matching(batch, |s| s == self.0))
    }
}

impl StringPredicate for Contains {
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>> {
        Ok(matching(batch, |s| s.contains(self.0.as_str())))
    }
}

impl StringPredicate for StartsWith {
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>> {
        Ok(matching(batch, |s| s.starts_with(self.0.as_str())))
    }
}

/// Any `Fn(&str) -> bool` as a predicate.
pub struct FnPredicate<F>(pub F);

pub fn from_fn<F>(f: F) -> FnPredicate<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    FnPredicate(f)
}

impl<F> StringPredicate for FnPredicate<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>> {
        Ok(matching(batch, &self.0))
    }
}

/// A predicate carrying its own result limit.
#[derive(Debug, Clone)]
pub struct Limited<P> {
    inner: P,
    limit: i64,
}

impl<P: StringPredicate> StringPredicate for Limited<P> {
    fn eval(&self, batch: &[String]) -> Result<Vec<usize>> {
        self.inner.eval(batch)
    }

    fn limit(&self) -> i64 {
        self.limit
    }
}

pub trait StringPredicateExt: StringPredicate + Sized {
    fn with_limit(self, limit: i64) -> Limited<Self> {
        Limited { inner: self, limit }
    }
}

impl<P: StringPredicate> StringPredicateExt for P {}

/// Combine two limits (negative = unbounded) into an optional bound.
fn effective_limit(call: i64, predicate: i64) -> Option<usize> {
    let bound = |l: i64| usize::try_from(l).ok();
    match (bound(call), bound(predicate)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

// ── Query ──────────────────────────────────────────────────────────────────

/// String lookups and searches bound to one archive.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    archive: &'a Archive,
}

impl<'a> Query<'a> {
    pub fn new(archive: &'a Archive) -> Self {
        Self { archive }
    }

    pub fn archive(&self) -> &'a Archive {
        self.archive
    }

    /// Batches of (id, offset, length) in dictionary order.
    pub fn scan_string_ids(&self) -> StringIdIter<'a> {
        StringIdIter::new(self.archive)
    }

    /// Decode the strings at the given locations, in order.
    ///
    /// The IO context stays locked for the whole batch.
    pub fn fetch_strings_by_offset(&self, entries: &[StringIdInfo]) -> Result<Vec<String>> {
        let compressor = self.archive.string_table().compressor();
        let mut file = self.archive.io().lock();
        let mut reader = BufReader::new(&mut *file);
        let mut out = Vec::with_capacity(entries.len());
        for info in entries {
            let pos = reader.stream_position()?;
            match info.offset.checked_sub(pos).map(i64::try_from) {
                Some(Ok(ahead)) => reader.seek_relative(ahead)?,
                _ => {
                    reader.seek(SeekFrom::Start(info.offset))?;
                }
            }
            out.push(compressor.decode_string(&mut reader, info.len)?);
        }
        Ok(out)
    }

    /// Cached lookup: string cache, then persisted index, then a full scan.
    pub fn fetch_string_by_id(&self, id: u64) -> Result<String> {
        let cache = self.archive.string_cache();
        if let Some(hit) = cache.as_ref().and_then(|c| c.get(id)) {
            return Ok(hit);
        }
        let value = self.fetch_string_by_id_nocache(id)?;
        if let Some(cache) = cache {
            cache.put(id, value.clone());
        }
        Ok(value)
    }

    /// Lookup through the persisted index if loaded, otherwise a full scan.
    pub fn fetch_string_by_id_nocache(&self, id: u64) -> Result<String> {
        let info = match self.archive.string_id_index() {
            Some(index) => index.get(id),
            None => self.locate(id)?,
        };
        let info = info.ok_or(Error::NotFound(id))?;
        let mut strings = self.fetch_strings_by_offset(&[info])?;
        strings.pop().ok_or(Error::NotFound(id))
    }

    fn locate(&self, id: u64) -> Result<Option<StringIdInfo>> {
        for batch in self.scan_string_ids() {
            if let Some(info) = batch?.into_iter().find(|info| info.id == id) {
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Ids of the strings `predicate` accepts, in dictionary order.
    ///
    /// `limit` caps the result (negative = unbounded) and is combined with
    /// the predicate's own limit. A limit of 0 returns at once without
    /// touching the file.
    pub fn find_ids(&self, predicate: &dyn StringPredicate, limit: i64) -> Result<Vec<u64>> {
        Ok(self
            .find_entries(predicate, limit)?
            .into_iter()
            .map(|info| info.id)
            .collect())
    }

    /// Like [`find_ids`](Self::find_ids), paired with the decoded strings.
    ///
    /// The matches are decoded in one locked pass from the locations the
    /// search already found, so no per-id lookup is needed.
    pub fn find_strings(
        &self,
        predicate: &dyn StringPredicate,
        limit: i64,
    ) -> Result<Vec<(u64, String)>> {
        let entries = self.find_entries(predicate, limit)?;
        let strings = self.fetch_strings_by_offset(&entries)?;
        Ok(entries.iter().map(|info| info.id).zip(strings).collect())
    }

    fn find_entries(
        &self,
        predicate: &dyn StringPredicate,
        limit: i64,
    ) -> Result<Vec<StringIdInfo>> {
        let limit = effective_limit(limit, predicate.limit());
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut found: Vec<StringIdInfo> = Vec::new();
        for batch in self.scan_string_ids() {
            let batch = batch?;
            let strings = self.fetch_strings_by_offset(&batch)?;
            let mut hits = predicate.eval(&strings)?;
            hits.sort_unstable();
            hits.dedup();

            for idx in hits {
                let info = batch.get(idx).ok_or_else(|| {
                    Error::PredicateEvaluationFailure(format!(
                        "predicate returned index {idx} for a batch of {}",
                        batch.len()
                    ))
                })?;
                if found.len() == found.capacity() {
                    let grown = ((found.capacity() as f64) * GROWTH_FACTOR).ceil() as usize;
                    found.reserve_exact(grown.max(16) - found.len());
                }
                found.push(*info);
                if Some(found.len()) == limit {
                    return Ok(found);
                }
            }
        }
        Ok(found)
    }

    /// One full scan into an id → location map.
    pub fn create_index_string_id_to_offset(&self) -> Result<StringIdIndex> {
        let mut index = StringIdIndex::new();
        for batch in self.scan_string_ids() {
            batch?.into_iter().for_each(|info| index.insert(info));
        }
        tracing::debug!(entries = index.len(), "string-id index built");
        Ok(index)
    }
}
