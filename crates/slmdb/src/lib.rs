//! A single-level, NVM-friendly embedded key/value store.
//!
//! Unlike a classical LSM-tree, this engine keeps its on-disk data in one flat population of
//! "zero-level" record files rather than several sorted, leveled runs. A secondary in-memory
//! B-tree index maps every live user key directly to the physical location of its newest record,
//! so a point read that misses the memtable costs exactly one index probe and one file read,
//! never a multi-level search. Reclamation happens by density: a background compactor rewrites
//! any file whose fraction of still-live records has dropped below a configurable threshold.

mod comparator;
mod compactor;
mod config_constants;
mod db;
mod error;
mod file_tracking;
mod format;
mod index;
mod iter;
mod logger;
mod memtable;
mod nvm_pool;
mod options;
mod record_file;
mod snapshot;
mod table_cache;
mod version;
mod write_batch;
mod write_log;

pub use comparator::{BytewiseComparator, Comparator};
pub use db::{destroy_database, Database};
pub use error::{Error, Result};
pub use iter::DbIterator;
pub use logger::InfoLogLevel;
pub use options::{Options, ReadOptions, WriteOptions};
pub use snapshot::Snapshot;
pub use write_batch::WriteBatch;
