//! Tracking of the zero-level file population: which files currently exist, their alive/total
//! density, and the manifest log that durably records changes to that set.

mod version_edit;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::file_tracking::FileMetadata;
use crate::write_log::{LogReader, LogWriter};

pub(crate) use version_edit::{NewFileEntry, VersionEdit};

const MANIFEST_FILE_NAME: &str = "MANIFEST";

/// An immutable snapshot of the zero-level file population. Readers hold an `Arc<Version>` for
/// the duration of a lookup so that a concurrent compaction can never remove a file out from
/// under them; the file is merely excluded from the *next* `Version`.
#[derive(Debug, Default)]
pub(crate) struct Version {
    files: BTreeMap<u64, Arc<FileMetadata>>,
}

impl Version {
    pub fn files(&self) -> impl Iterator<Item = &Arc<FileMetadata>> {
        self.files.values()
    }

    pub fn get(&self, file_number: u64) -> Option<&Arc<FileMetadata>> {
        self.files.get(&file_number)
    }

    /// Files whose density has dropped to or below `merge_threshold_percent`, oldest (smallest
    /// file number) first, since older files are more likely to block a long-pinned snapshot.
    pub fn merge_candidates(&self, merge_threshold_percent: u8) -> Vec<Arc<FileMetadata>> {
        self.files
            .values()
            .filter(|meta| meta.is_merge_candidate(merge_threshold_percent))
            .cloned()
            .collect()
    }

    fn apply(&self, edit: &VersionEdit) -> Self {
        let mut files = self.files.clone();
        for file_number in &edit.deleted_files {
            files.remove(file_number);
        }
        for entry in &edit.new_files {
            files.insert(
                entry.file_number,
                Arc::new(FileMetadata::new(
                    entry.file_number,
                    entry.file_size,
                    entry.smallest_key.clone(),
                    entry.largest_key.clone(),
                    entry.total,
                    entry.alive,
                )),
            );
        }
        Self { files }
    }
}

/// Owns the current [`Version`], the manifest log recording changes to it, and the file number
/// and sequence number counters.
pub(crate) struct VersionSet {
    current: RwLock<Arc<Version>>,
    manifest: Mutex<LogWriter<File>>,
    next_file_number: AtomicU64,
    last_sequence: AtomicU64,
    log_number: AtomicU64,
}

impl VersionSet {
    /// Opens an existing database's manifest, replaying it to reconstruct the current
    /// [`Version`], or creates a fresh manifest if `create_if_missing` and none exists.
    pub fn recover(db_path: &Path, create_if_missing: bool) -> Result<Self> {
        let manifest_path = db_path.join(MANIFEST_FILE_NAME);

        let mut version = Version::default();
        let mut next_file_number = 1u64;
        let mut last_sequence = 0u64;
        let mut log_number = 0u64;

        if manifest_path.exists() {
            let file = File::open(&manifest_path)?;
            let mut reader = LogReader::new(BufReader::new(file));
            while let Some(record) = reader
                .next_record()
                .map_err(|e| Error::corruption(None, format!("manifest: {e}")))?
            {
                let edit = VersionEdit::decode_from(&record)?;
                version = version.apply(&edit);
                if let Some(n) = edit.next_file_number {
                    next_file_number = next_file_number.max(n);
                }
                if let Some(s) = edit.last_sequence {
                    last_sequence = last_sequence.max(s);
                }
                if let Some(l) = edit.log_number {
                    log_number = l;
                }
            }
        } else if !create_if_missing {
            return Err(Error::InvalidArgument(format!(
                "no manifest at {}",
                manifest_path.display()
            )));
        }

        for meta in version.files() {
            next_file_number = next_file_number.max(meta.file_number() + 1);
        }

        let manifest_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)?;
        let initial_offset = manifest_file.metadata()?.len();
        let writer = LogWriter::resuming_at(manifest_file, initial_offset);

        Ok(Self {
            current: RwLock::new(Arc::new(version)),
            manifest: Mutex::new(writer),
            next_file_number: AtomicU64::new(next_file_number),
            last_sequence: AtomicU64::new(last_sequence),
            log_number: AtomicU64::new(log_number),
        })
    }

    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.current.read())
    }

    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    pub fn set_last_sequence(&self, sequence: u64) {
        self.last_sequence.fetch_max(sequence, Ordering::SeqCst);
    }

    pub fn log_number(&self) -> u64 {
        self.log_number.load(Ordering::SeqCst)
    }

    /// Appends `edit` to the manifest and atomically installs the resulting [`Version]` as
    /// current. Holds the manifest lock for the duration so concurrent compactions and flushes
    /// serialize their edits.
    pub fn log_and_apply(&self, mut edit: VersionEdit) -> Result<()> {
        let mut manifest = self.manifest.lock();

        edit.next_file_number.get_or_insert(self.next_file_number.load(Ordering::SeqCst));
        edit.last_sequence.get_or_insert(self.last_sequence());
        if edit.log_number.is_none() {
            let current = self.log_number();
            if current != 0 {
                edit.log_number = Some(current);
            }
        }

        let mut buf = Vec::new();
        edit.encode(&mut buf);
        manifest.add_record(&buf)?;
        manifest.flush()?;

        let next_version = self.current.read().apply(&edit);
        *self.current.write() = Arc::new(next_version);

        if let Some(log_number) = edit.log_number {
            self.log_number.store(log_number, Ordering::SeqCst);
        }

        Ok(())
    }

    pub fn set_log_number(&self, log_number: u64) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.log_number = Some(log_number);
        self.log_and_apply(edit)
    }
}
