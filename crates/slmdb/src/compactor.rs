//! Density-based compaction: periodically rewrites the zero-level files whose alive/total ratio
//! has dropped below the configured threshold into a fresh, fully-dense file, reclaiming the
//! space occupied by superseded and deleted records.
//!
//! Compaction runs on a dedicated background thread, woken by a [`crossbeam_channel`] rather
//! than polling, the same shape the LevelDB family of engines uses for its own background
//! compaction thread.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};

use crate::error::Result;
use crate::format::{EntryType, InternalKeyRef};
use crate::index::{Index, RecordLocator};
use crate::record_file::{scan_records, RecordFileWriter};
use crate::table_cache::TableCache;
use crate::version::{NewFileEntry, VersionEdit, VersionSet};

enum CompactorMessage {
    MaybeCompact,
    WaitUntilIdle(Sender<()>),
    Shutdown,
}

/// Shared state the background compaction thread needs, handed to it once at spawn time.
pub(crate) struct CompactionContext {
    pub db_path: PathBuf,
    pub versions: Arc<VersionSet>,
    pub index: Arc<Index>,
    pub table_cache: Arc<TableCache>,
    pub merge_threshold_percent: u8,
}

/// A handle to the background compaction thread. Dropping it signals the thread to exit and
/// joins it, so a `Database` never outlives its own compactor.
pub(crate) struct CompactorHandle {
    sender: Sender<CompactorMessage>,
    join_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl CompactorHandle {
    pub fn spawn(context: CompactionContext) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = Arc::clone(&running);

        let join_handle = std::thread::Builder::new()
            .name("slmdb-compactor".into())
            .spawn(move || {
                while running_for_thread.load(Ordering::Acquire) {
                    match receiver.recv() {
                        Ok(CompactorMessage::MaybeCompact) => {
                            if let Err(err) = run_one_pass(&context) {
                                tracing::event!(tracing::Level::WARN, "compaction pass failed: {err}");
                            }
                        }
                        Ok(CompactorMessage::WaitUntilIdle(ack)) => {
                            let _ = ack.send(());
                        }
                        Ok(CompactorMessage::Shutdown) | Err(_) => break,
                    }
                }
            })
            .expect("spawning the compaction thread should not fail");

        Self { sender, join_handle: Some(join_handle), running }
    }

    /// Asks the compactor to consider a pass; does not block for it to run.
    pub fn request_compaction(&self) {
        let _ = self.sender.send(CompactorMessage::MaybeCompact);
    }

    /// Blocks until every previously-queued message has been processed.
    pub fn wait_until_idle(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.sender.send(CompactorMessage::WaitUntilIdle(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for CompactorHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.sender.send(CompactorMessage::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs one compaction pass: finds every file below the density threshold, rewrites their
/// still-live records into one fresh file, and retires the inputs.
fn run_one_pass(context: &CompactionContext) -> Result<()> {
    let version = context.versions.current();
    let candidates = version.merge_candidates(context.merge_threshold_percent);
    if candidates.is_empty() {
        return Ok(());
    }

    let new_file_number = context.versions.new_file_number();
    let new_path = context.table_cache.record_file_path(new_file_number);
    let dest = crate::table_cache::create_record_file(&new_path)?;
    let mut writer = RecordFileWriter::new(dest);

    let mut smallest_key: Option<Vec<u8>> = None;
    let mut largest_key: Option<Vec<u8>> = None;
    let mut total = 0u32;
    let mut alive = 0u32;

    let mut index_updates = Vec::new();

    for candidate in &candidates {
        let file_number = candidate.file_number();
        let bytes = fs::read(context.table_cache.record_file_path(file_number))?;

        for scanned in scan_records(&bytes) {
            let (offset, size, record) = scanned?;
            total += 1;

            let Some(parsed) = InternalKeyRef::parse(&record.internal_key) else { continue };
            if parsed.entry_type == EntryType::Deletion {
                // Deletions are never indexed (the index only ever points at value records), so
                // a tombstone can never survive a compaction once no older snapshot needs it.
                continue;
            }
            let old_locator = RecordLocator::new(file_number, offset, size);
            let is_alive = context.index.get(parsed.user_key) == Some(old_locator);

            if !is_alive {
                continue;
            }

            let (new_offset, new_size) = writer.append(&record.internal_key, &record.value)?;
            alive += 1;

            index_updates.push((
                parsed.user_key.to_vec(),
                old_locator,
                RecordLocator::new(new_file_number, new_offset, new_size),
            ));

            if smallest_key.as_deref().is_none_or(|k| record.internal_key.as_slice() < k) {
                smallest_key = Some(record.internal_key.clone());
            }
            if largest_key.as_deref().is_none_or(|k| record.internal_key.as_slice() > k) {
                largest_key = Some(record.internal_key.clone());
            }
        }
    }
    writer.flush()?;
    let file_size = writer.bytes_written();
    drop(writer);

    context.index.bulk_replace_if_unchanged(index_updates);

    let mut edit = VersionEdit::new();
    for candidate in &candidates {
        edit.deleted_files.push(candidate.file_number());
    }
    if alive > 0 {
        edit.new_files.push(NewFileEntry {
            file_number: new_file_number,
            file_size,
            smallest_key: smallest_key.unwrap_or_default(),
            largest_key: largest_key.unwrap_or_default(),
            total,
            alive,
        });
    }
    context.versions.log_and_apply(edit)?;

    if alive == 0 {
        let _ = fs::remove_file(&new_path);
    }
    for candidate in &candidates {
        context.table_cache.evict(candidate.file_number());
        let _ = fs::remove_file(context.table_cache.record_file_path(candidate.file_number()));
    }

    Ok(())
}
