//! The embedded key/value store: wires together the memtable, write-ahead log, secondary index,
//! zero-level file population, and background compactor behind one `Database` handle.

use std::fs::{self, File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fs4::fs_std::FileExt as _;
use parking_lot::Mutex;
use tracing::Level as LogLevel;

use crate::compactor::{CompactionContext, CompactorHandle};
use crate::error::{Error, Result};
use crate::format::{self, EntryType};
use crate::index::{Index, RecordLocator};
use crate::iter::DbIterator;
use crate::logger::{rotate_and_open_log_file, InfoLogger};
use crate::memtable::{Memtable, MemtableLookup};
use crate::nvm_pool::{InMemoryNvmPool, NvmAllocator, NvmHandle};
use crate::options::{Options, ReadOptions, WriteOptions};
use crate::record_file::{scan_records, RecordFileWriter};
use crate::snapshot::{Snapshot, SnapshotList};
use crate::table_cache::{create_record_file, TableCache};
use crate::version::{NewFileEntry, VersionEdit, VersionSet};
use crate::write_batch::WriteBatch;
use crate::write_log::LogWriter;

/// The value bytes stored on disk are the raw user value, verbatim.
const VALUE_TAG_INLINE: u8 = 0;
/// The value bytes stored on disk are an 8-byte little-endian [`NvmHandle`]; the real value
/// lives in the NVM pool.
const VALUE_TAG_NVM: u8 = 1;

fn wal_path(db_path: &Path, log_number: u64) -> PathBuf {
    db_path.join(format!("{log_number:020}.wal"))
}

fn lock_path(db_path: &Path) -> PathBuf {
    db_path.join("LOCK")
}

/// Acquires an advisory exclusive lock on the database directory, so a second process opening
/// the same path fails fast instead of racing this one's writer.
fn acquire_lock(db_path: &Path) -> Result<File> {
    let path = lock_path(db_path);
    let lock_file = OpenOptions::new().create(true).append(true).open(&path)?;
    match lock_file.try_lock_exclusive() {
        Ok(true) => Ok(lock_file),
        Ok(false) => Err(Error::InvalidArgument(format!(
            "database at {} is already open in another process",
            db_path.display()
        ))),
        Err(err) => Err(Error::IoError(err)),
    }
}

/// Encodes `value` as it should be written to a zero-level file, routing it through the NVM pool
/// first if it is small enough and a pool is configured. Deletions (empty `value`, carried only
/// to record the tombstone) are always stored inline.
fn encode_stored_value(
    nvm_pool: Option<&InMemoryNvmPool>,
    nvm_small_value_threshold: usize,
    entry_type: EntryType,
    value: &[u8],
) -> Vec<u8> {
    if let (EntryType::Value, Some(pool)) = (entry_type, nvm_pool) {
        if value.len() < nvm_small_value_threshold {
            let handle = pool.put(value);
            let mut encoded = Vec::with_capacity(9);
            encoded.push(VALUE_TAG_NVM);
            encoded.extend_from_slice(&handle.to_le_bytes());
            return encoded;
        }
    }
    let mut encoded = Vec::with_capacity(value.len() + 1);
    encoded.push(VALUE_TAG_INLINE);
    encoded.extend_from_slice(value);
    encoded
}

/// Reverses [`encode_stored_value`], dereferencing an NVM handle through `nvm_pool` if needed.
pub(crate) fn decode_stored_value(nvm_pool: Option<&InMemoryNvmPool>, stored: &[u8]) -> Result<Vec<u8>> {
    match stored.split_first() {
        Some((&VALUE_TAG_INLINE, rest)) => Ok(rest.to_vec()),
        Some((&VALUE_TAG_NVM, rest)) => {
            let handle_bytes: [u8; 8] = rest
                .try_into()
                .map_err(|_| Error::corruption(None, "truncated nvm value handle"))?;
            let handle = NvmHandle::from_le_bytes(handle_bytes);
            let pool = nvm_pool
                .ok_or_else(|| Error::corruption(None, "record tagged nvm but no nvm pool is configured"))?;
            pool.get(handle)
                .ok_or_else(|| Error::corruption(None, "nvm handle does not resolve to a live value"))
        }
        Some((tag, _)) => Err(Error::corruption(None, format!("unrecognized value tag {tag}"))),
        None => Err(Error::corruption(None, "empty stored value")),
    }
}

struct WriterState {
    memtable: Arc<Memtable>,
    wal: LogWriter<File>,
    wal_log_number: u64,
}

/// An open database. Every field shared with the background compactor is already behind an
/// `Arc`, so cloning the pieces it needs at `open` time is cheap.
pub struct Database {
    db_path: PathBuf,
    options: Options,
    versions: Arc<VersionSet>,
    index: Arc<Index>,
    table_cache: Arc<TableCache>,
    snapshots: Arc<SnapshotList>,
    writer: Mutex<WriterState>,
    sequence: AtomicU64,
    compactor: CompactorHandle,
    logger: Mutex<InfoLogger<File>>,
    nvm_pool: Option<InMemoryNvmPool>,
    lock_file: File,
}

impl Database {
    /// Opens (and, per `options`, optionally creates) a database at `path`, replaying its
    /// write-ahead log and rebuilding the secondary index from the recovered file population.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if !db_path.exists() {
            if !options.create_if_missing {
                return Err(Error::InvalidArgument(format!(
                    "database does not exist at {}",
                    db_path.display()
                )));
            }
            fs::create_dir_all(&db_path)?;
        } else if options.error_if_exists {
            return Err(Error::InvalidArgument(format!(
                "database already exists at {}",
                db_path.display()
            )));
        }

        let lock_file = acquire_lock(&db_path)?;

        let versions = Arc::new(VersionSet::recover(&db_path, options.create_if_missing)?);
        let table_cache = Arc::new(TableCache::new(db_path.clone(), options.max_open_files));

        // The secondary index is not itself persisted; it is rebuilt from whatever file
        // population the manifest just replayed.
        let index = Arc::new(Index::new(Arc::clone(&options.comparator)));
        for file in versions.current().files() {
            let bytes = fs::read(table_cache.record_file_path(file.file_number()))?;
            for scanned in scan_records(&bytes) {
                let (offset, size, record) = scanned?;
                let Some(parsed) = format::InternalKeyRef::parse(&record.internal_key) else {
                    continue;
                };
                index.insert(parsed.user_key, RecordLocator::new(file.file_number(), offset, size));
            }
        }

        let memtable = Arc::new(Memtable::new(Arc::clone(&options.comparator)));
        let mut last_sequence = versions.last_sequence();

        let existing_log_number = versions.log_number();
        let (wal_log_number, wal) = if existing_log_number != 0 {
            let path = wal_path(&db_path, existing_log_number);
            if path.exists() {
                last_sequence = replay_wal(&path, &memtable, last_sequence)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let offset = file.metadata()?.len();
            (existing_log_number, LogWriter::resuming_at(file, offset))
        } else {
            let new_number = versions.new_file_number();
            versions.set_log_number(new_number)?;
            let path = wal_path(&db_path, new_number);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            (new_number, LogWriter::new(file))
        };
        versions.set_last_sequence(last_sequence);

        let snapshots = SnapshotList::new();

        let compactor = CompactorHandle::spawn(CompactionContext {
            db_path: db_path.clone(),
            versions: Arc::clone(&versions),
            index: Arc::clone(&index),
            table_cache: Arc::clone(&table_cache),
            merge_threshold_percent: options.merge_threshold_percent,
        });

        let log_file = rotate_and_open_log_file(&db_path)?;
        let logger = Mutex::new(InfoLogger::new(log_file, options.info_log_level));
        logger.lock().log(LogLevel::INFO, || format!("opened database at {}", db_path.display()));

        let nvm_pool = cfg!(feature = "nvm-pool").then(InMemoryNvmPool::new);

        Ok(Self {
            db_path,
            options,
            versions,
            index,
            table_cache,
            snapshots,
            writer: Mutex::new(WriterState { memtable, wal, wal_log_number }),
            sequence: AtomicU64::new(last_sequence),
            compactor,
            logger,
            nvm_pool,
            lock_file,
        })
    }

    pub fn put(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(options, &batch)
    }

    pub fn delete(&self, options: &WriteOptions, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(options, &batch)
    }

    /// Applies every entry in `batch` atomically with respect to readers: a batch's writes
    /// become visible to the memtable together, after the whole batch is durable in the WAL.
    pub fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock();
        let base_sequence = self.sequence.fetch_add(batch.len() as u64, Ordering::SeqCst) + 1;

        writer.wal.add_record(&batch.encode())?;
        if options.sync || self.options.sync_writes_by_default {
            writer.wal.flush()?;
        }

        for (offset, entry) in batch.iter().enumerate() {
            let sequence = base_sequence + offset as u64;
            writer.memtable.add(sequence, entry.entry_type, &entry.key, &entry.value);
        }

        self.versions.set_last_sequence(base_sequence + batch.len() as u64 - 1);

        if writer.memtable.approximate_memory_usage() >= self.options.write_buffer_size {
            self.flush_locked(&mut writer)?;
        }

        Ok(())
    }

    pub fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Vec<u8>> {
        let snapshot_sequence = options
            .snapshot
            .as_ref()
            .map_or_else(|| self.sequence.load(Ordering::SeqCst), Snapshot::sequence_number);

        let memtable = Arc::clone(&self.writer.lock().memtable);

        match memtable.get(key, snapshot_sequence) {
            MemtableLookup::Found(value) => return Ok(value),
            MemtableLookup::Deleted => return Err(Error::NotFound),
            MemtableLookup::NotFound => {}
        }

        let Some(locator) = self.index.get(key) else { return Err(Error::NotFound) };
        let record = self.table_cache.get_record(locator)?;
        let Some(parsed) = format::InternalKeyRef::parse(&record.internal_key) else {
            return Err(Error::corruption(Some(key.to_vec()), "malformed indexed key"));
        };
        if parsed.sequence > snapshot_sequence {
            // The indexed version postdates the snapshot and no older version of this key
            // survived compaction; treat it as absent rather than returning a too-new value.
            return Err(Error::NotFound);
        }

        match parsed.entry_type {
            EntryType::Deletion => Err(Error::NotFound),
            EntryType::Value => decode_stored_value(self.nvm_pool.as_ref(), &record.value),
        }
    }

    pub fn contains(&self, options: &ReadOptions, key: &[u8]) -> Result<bool> {
        match self.get(options, key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Unlike `put`, fails with [`Error::NotFound`] if `key` is not already present.
    pub fn update(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        if !self.contains(&ReadOptions::default(), key)? {
            return Err(Error::NotFound);
        }
        self.put(options, key, value)
    }

    pub fn new_iterator(&self, options: &ReadOptions) -> Result<DbIterator> {
        let snapshot_sequence = options
            .snapshot
            .as_ref()
            .map_or_else(|| self.sequence.load(Ordering::SeqCst), Snapshot::sequence_number);

        let memtable = Arc::clone(&self.writer.lock().memtable);
        let version = self.versions.current();
        DbIterator::new(
            &memtable,
            &version,
            &self.table_cache,
            &self.options.comparator,
            self.nvm_pool.as_ref(),
            snapshot_sequence,
        )
    }

    #[must_use]
    pub fn get_snapshot(&self) -> Snapshot {
        self.snapshots.take(self.sequence.load(Ordering::SeqCst))
    }

    /// Requests a compaction pass and blocks until it has either run or been skipped (no file
    /// was below the density threshold).
    pub fn compact_range(&self) {
        self.compactor.request_compaction();
        self.compactor.wait_until_idle();
    }

    /// Blocks until every compaction requested so far (by a write's flush or an explicit
    /// `compact_range`) has finished running, without itself requesting a new pass.
    pub fn wait_for_compaction(&self) {
        self.compactor.wait_until_idle();
    }

    /// Returns a diagnostic string for a recognized property name, or `None` otherwise.
    ///
    /// Recognized names: `"stats"` (file and key counts), `"sstables"` (one line per zero-level
    /// file, in the shape of the file population's debug listing), `"csv"` (the same file listing
    /// as comma-separated fields, for scripting).
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<String> {
        let version = self.versions.current();
        match name {
            "stats" => {
                let (alive, total) = version
                    .files()
                    .fold((0u64, 0u64), |(alive, total), f| (alive + u64::from(f.alive()), total + u64::from(f.total())));
                Some(format!(
                    "files: {}\nrecords: {alive} alive / {total} total\nsequence: {}\n",
                    version.files().count(),
                    self.sequence.load(Ordering::SeqCst),
                ))
            }
            "sstables" => {
                let mut out = String::from("Files:\n");
                for file in version.files() {
                    out.push_str(&format!(
                        " {}:{} [{:?} .. {:?}] {{{} / {}}}\n",
                        file.file_number(),
                        file.file_size(),
                        file.smallest_key(),
                        file.largest_key(),
                        file.alive(),
                        file.total(),
                    ));
                }
                Some(out)
            }
            "csv" => {
                let mut out = String::from("file_number,file_size,alive,total\n");
                for file in version.files() {
                    out.push_str(&format!(
                        "{},{},{},{}\n",
                        file.file_number(),
                        file.file_size(),
                        file.alive(),
                        file.total(),
                    ));
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Forces the active memtable to flush to a new zero-level file, even if it has not reached
    /// `write_buffer_size` yet.
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        self.flush_locked(&mut writer)
    }

    fn flush_locked(&self, writer: &mut WriterState) -> Result<()> {
        if writer.memtable.is_empty() {
            return Ok(());
        }

        let entries = writer.memtable.snapshot_entries();
        let new_file_number = self.versions.new_file_number();
        let path = self.table_cache.record_file_path(new_file_number);
        let dest = create_record_file(&path)?;
        let mut file_writer = RecordFileWriter::new(dest);

        let mut smallest_key: Option<Vec<u8>> = None;
        let mut largest_key: Option<Vec<u8>> = None;

        // `entries` is in internal-key order: user key ascending, then sequence descending, so
        // the first entry seen for a given user key is its newest record. Only that record
        // should affect the index; older records for the same key are still written to the file
        // (they count toward `total`) but must not overwrite the index with a stale locator.
        let mut newest_written: std::collections::HashSet<&[u8]> = std::collections::HashSet::new();

        for (internal_key, value) in &entries {
            let Some(parsed) = format::InternalKeyRef::parse(internal_key) else { continue };
            let stored_value = encode_stored_value(
                self.nvm_pool.as_ref(),
                self.options.nvm_small_value_threshold,
                parsed.entry_type,
                value,
            );
            let (offset, size) = file_writer.append(internal_key, &stored_value)?;

            if newest_written.insert(parsed.user_key) {
                let old = match parsed.entry_type {
                    EntryType::Value => self.index.insert(
                        parsed.user_key,
                        RecordLocator::new(new_file_number, offset, size),
                    ),
                    EntryType::Deletion => self.index.erase(parsed.user_key),
                };
                if let Some(old_locator) = old {
                    let version = self.versions.current();
                    if let Some(old_file) = version.get(old_locator.file_number) {
                        old_file.record_superseded();
                    }
                }
            }

            if smallest_key.as_deref().is_none_or(|k: &[u8]| internal_key.as_slice() < k) {
                smallest_key = Some(internal_key.clone());
            }
            if largest_key.as_deref().is_none_or(|k: &[u8]| internal_key.as_slice() > k) {
                largest_key = Some(internal_key.clone());
            }
        }
        file_writer.flush()?;
        let file_size = file_writer.bytes_written();
        drop(file_writer);

        let total = u32::try_from(entries.len()).unwrap_or(u32::MAX);

        let new_log_number = self.versions.new_file_number();
        let new_wal_path = wal_path(&self.db_path, new_log_number);
        let new_wal_file = OpenOptions::new().create(true).append(true).open(&new_wal_path)?;

        let mut edit = VersionEdit::new();
        edit.new_files.push(NewFileEntry {
            file_number: new_file_number,
            file_size,
            smallest_key: smallest_key.unwrap_or_default(),
            largest_key: largest_key.unwrap_or_default(),
            total,
            alive: total,
        });
        edit.log_number = Some(new_log_number);
        self.versions.log_and_apply(edit)?;

        let old_wal_path = wal_path(&self.db_path, writer.wal_log_number);
        writer.memtable = Arc::new(Memtable::new(Arc::clone(&self.options.comparator)));
        writer.wal = LogWriter::new(new_wal_file);
        writer.wal_log_number = new_log_number;
        let _ = fs::remove_file(old_wal_path);

        self.logger.lock().log(LogLevel::DEBUG, || {
            format!("flushed memtable to file {new_file_number} ({total} entries)")
        });
        self.compactor.request_compaction();

        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Removes every file belonging to a database directory at `path`. A directory that does not
/// exist, or one with no files in it, is not an error.
pub fn destroy_database(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn replay_wal(path: &Path, memtable: &Memtable, mut last_sequence: u64) -> Result<u64> {
    let file = File::open(path)?;
    let mut reader = crate::write_log::LogReader::new(BufReader::new(file));

    while let Some(record) = reader
        .next_record()
        .map_err(|e| Error::corruption(None, format!("write-ahead log: {e}")))?
    {
        let batch = WriteBatch::decode(&record)
            .ok_or_else(|| Error::corruption(None, "malformed write-ahead log batch"))?;
        for (offset, entry) in batch.iter().enumerate() {
            let sequence = last_sequence + 1 + offset as u64;
            memtable.add(sequence, entry.entry_type, &entry.key, &entry.value);
        }
        last_sequence += batch.len() as u64;
    }

    Ok(last_sequence)
}
