//! Tunable knobs for opening and operating a database, grouped the way the LevelDB family of
//! engines groups them: one struct fixed at `open`, plus small per-call option structs for reads
//! and writes.

use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::config_constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_OPEN_FILES,
    DEFAULT_MERGE_THRESHOLD_PERCENT, DEFAULT_WRITE_BUFFER_SIZE,
};
use crate::logger::InfoLogLevel;

/// Options fixed for the lifetime of an open database.
#[derive(Clone)]
pub struct Options {
    /// Create the database directory and an empty database if none exists yet.
    pub create_if_missing: bool,
    /// Fail `open` if a database already exists at the given path.
    pub error_if_exists: bool,
    /// Flush the active memtable to a new zero-level file once it approximately reaches this
    /// many bytes.
    pub write_buffer_size: usize,
    /// Roll to a new zero-level file once the current one approximately reaches this many bytes.
    pub max_file_size: u64,
    /// A file becomes a compaction candidate once `alive * 100 / total` drops below this percent.
    pub merge_threshold_percent: u8,
    /// Upper bound on concurrently-open record file handles held by the table cache.
    pub max_open_files: usize,
    /// Read buffer granularity used by the table cache.
    pub block_size: usize,
    /// Verbosity of the on-disk `LOG` file; `tracing` events are always emitted regardless.
    pub info_log_level: InfoLogLevel,
    /// Whether every write is followed by an `fsync`/`fdatasync` of the write-ahead log.
    pub sync_writes_by_default: bool,
    /// Route values smaller than this many bytes to the NVM pool instead of a zero-level file.
    /// Only consulted when the `nvm-pool` feature is enabled.
    pub nvm_small_value_threshold: usize,
    /// The total order over user keys. Changing this on a database that already has data
    /// written under a different comparator silently produces a misordered index; the engine
    /// does not currently detect that mismatch itself.
    pub comparator: Arc<dyn Comparator>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            merge_threshold_percent: DEFAULT_MERGE_THRESHOLD_PERCENT,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            block_size: DEFAULT_BLOCK_SIZE,
            info_log_level: InfoLogLevel::default(),
            sync_writes_by_default: false,
            nvm_small_value_threshold: 256,
            comparator: Arc::new(BytewiseComparator),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_file_size", &self.max_file_size)
            .field("merge_threshold_percent", &self.merge_threshold_percent)
            .field("max_open_files", &self.max_open_files)
            .field("block_size", &self.block_size)
            .field("info_log_level", &self.info_log_level)
            .field("sync_writes_by_default", &self.sync_writes_by_default)
            .field("nvm_small_value_threshold", &self.nvm_small_value_threshold)
            .field("comparator", &self.comparator.id())
            .finish()
    }
}

/// Per-call options for `Put`/`Delete`/`Write`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Force an `fsync`/`fdatasync` of the write-ahead log before returning, overriding
    /// [`Options::sync_writes_by_default`] for this call.
    pub sync: bool,
}

/// Per-call options for `Get` and for constructing an iterator.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Read against this snapshot's sequence number instead of the engine's latest sequence.
    pub snapshot: Option<crate::snapshot::Snapshot>,
    /// Verify record checksums on this read even if the engine is not configured to do so by
    /// default.
    pub verify_checksums: bool,
}
