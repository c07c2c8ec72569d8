/// The block size for the write-ahead log's physical record framing.
pub(crate) const WRITE_LOG_BLOCK_SIZE: usize = 1 << 15;

/// Default `write_buffer_size`: memtables are flushed once they approximately reach this size.
pub(crate) const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 << 20;

/// Default `max_file_size`: record files are rolled once they approximately reach this size.
pub(crate) const DEFAULT_MAX_FILE_SIZE: u64 = 2 << 20;

/// Default `merge_threshold`, as a percent: files with `alive * 100 / total` at or below this
/// become merge candidates.
pub(crate) const DEFAULT_MERGE_THRESHOLD_PERCENT: u8 = 50;

/// Default `max_open_files` for the table cache.
pub(crate) const DEFAULT_MAX_OPEN_FILES: usize = 512;

/// Default `block_size`, kept for API compatibility with the options surface; this engine's
/// record files are not block-chunked, so it only affects the table cache's read buffer size.
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A crc32c checksum is XOR-rotated before storage, matching the on-disk convention used by the
/// LSM family this engine descends from, so that a zeroed-out record does not look valid.
const CHECKSUM_MASK_DELTA: u32 = 0xa282_ead8;

#[inline]
#[must_use]
pub(crate) const fn mask_checksum(unmasked: u32) -> u32 {
    unmasked.rotate_right(15).wrapping_add(CHECKSUM_MASK_DELTA)
}

#[inline]
#[must_use]
pub(crate) const fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(CHECKSUM_MASK_DELTA).rotate_left(15)
}
