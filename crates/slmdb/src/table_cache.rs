//! Caches open file handles for zero-level record files, so a point read does not pay the cost
//! of an `open` syscall on every lookup.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_cache::sync::Cache;

use crate::error::Result;
use crate::index::RecordLocator;
use crate::record_file::{decode_record, DecodedRecord};

fn zero_level_file_name(file_number: u64) -> String {
    format!("{file_number:020}.rec")
}

/// An open handle to one zero-level record file, read via positional reads so concurrent
/// lookups against the same file never contend on a shared cursor.
struct OpenRecordFile {
    file: File,
}

impl OpenRecordFile {
    fn read_at(&self, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

/// Bounds the number of concurrently-open zero-level file handles, evicting the
/// least-recently-used file once the cache is full.
pub(crate) struct TableCache {
    db_directory_path: PathBuf,
    cache: Cache<u64, Arc<OpenRecordFile>>,
}

impl TableCache {
    pub fn new(db_directory_path: PathBuf, max_open_files: usize) -> Self {
        Self { db_directory_path, cache: Cache::new(max_open_files) }
    }

    pub fn record_file_path(&self, file_number: u64) -> PathBuf {
        self.db_directory_path.join(zero_level_file_name(file_number))
    }

    fn open(&self, file_number: u64) -> Result<Arc<OpenRecordFile>> {
        if let Some(open) = self.cache.get(&file_number) {
            return Ok(open);
        }

        let file = File::open(self.record_file_path(file_number))?;
        let open = Arc::new(OpenRecordFile { file });
        self.cache.insert(file_number, Arc::clone(&open));
        Ok(open)
    }

    /// Reads and decodes the record named by `locator`.
    pub fn get_record(&self, locator: RecordLocator) -> Result<DecodedRecord> {
        let open = self.open(locator.file_number)?;
        let bytes = open.read_at(locator.offset, locator.size)?;
        decode_record(&bytes)
    }

    /// Drops any cached handle for `file_number`, called once a compaction has deleted the
    /// underlying file so a stale handle is never served again.
    pub fn evict(&self, file_number: u64) {
        self.cache.remove(&file_number);
    }
}

/// Opens a fresh record file for writing a flush or compaction output.
pub(crate) fn create_record_file(path: &Path) -> io::Result<File> {
    File::create(path)
}
