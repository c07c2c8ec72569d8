use std::io::{self, Write};

use crate::config_constants::{mask_checksum, WRITE_LOG_BLOCK_SIZE};

use super::{RecordType, HEADER_SIZE};

/// Appends logical records to an underlying writer, framing them into the physical record
/// format described in the module docs.
pub(crate) struct LogWriter<W> {
    dest: W,
    /// Bytes remaining in the current [`WRITE_LOG_BLOCK_SIZE`]-byte block.
    block_remaining: usize,
}

impl<W: Write> LogWriter<W> {
    pub fn new(dest: W) -> Self {
        Self { dest, block_remaining: WRITE_LOG_BLOCK_SIZE }
    }

    /// Resumes appending after `initial_offset` bytes have already been written to `dest`,
    /// so the block boundary bookkeeping lines up with what's already on disk.
    pub fn resuming_at(dest: W, initial_offset: u64) -> Self {
        let into_block = (initial_offset % WRITE_LOG_BLOCK_SIZE as u64) as usize;
        Self { dest, block_remaining: WRITE_LOG_BLOCK_SIZE - into_block }
    }

    pub fn add_record(&mut self, mut record: &[u8]) -> io::Result<()> {
        let mut first_fragment = true;

        // Always emit at least one physical fragment, even for an empty logical record.
        while first_fragment || !record.is_empty() {
            if self.block_remaining < HEADER_SIZE {
                // Zero-pad the rest of the block and roll over; the reader skips trailers
                // shorter than a header.
                let padding = [0u8; HEADER_SIZE];
                self.dest.write_all(&padding[..self.block_remaining])?;
                self.block_remaining = WRITE_LOG_BLOCK_SIZE;
            }

            let available = self.block_remaining - HEADER_SIZE;
            let fragment_len = record.len().min(available);
            let last_fragment = fragment_len == record.len();

            let record_type = match (first_fragment, last_fragment) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, false) => RecordType::Middle,
                (false, true) => RecordType::Last,
            };

            let (fragment, rest) = record.split_at(fragment_len);
            self.write_fragment(record_type, fragment)?;

            record = rest;
            first_fragment = false;
            self.block_remaining -= HEADER_SIZE + fragment_len;
        }

        Ok(())
    }

    fn write_fragment(&mut self, record_type: RecordType, fragment: &[u8]) -> io::Result<()> {
        let checksum = mask_checksum(crc32c::crc32c(fragment));
        let fragment_len = u16::try_from(fragment.len()).expect("fragment fits within one block");

        self.dest.write_all(&checksum.to_le_bytes())?;
        self.dest.write_all(&fragment_len.to_le_bytes())?;
        self.dest.write_all(&[record_type as u8])?;
        self.dest.write_all(fragment)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }

    pub fn into_inner(self) -> W {
        self.dest
    }
}
