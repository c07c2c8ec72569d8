use std::io::{self, Read};

use thiserror::Error;

use crate::config_constants::{unmask_checksum, WRITE_LOG_BLOCK_SIZE};

use super::{RecordType, HEADER_SIZE};

#[derive(Error, Debug)]
pub(crate) enum ReadError {
    #[error("I/O error reading log: {0}")]
    Io(#[from] io::Error),
    #[error("checksum mismatch in log record")]
    ChecksumMismatch,
    #[error("log record fragments out of order")]
    BadFragmentOrder,
    #[error("log truncated mid-record")]
    Truncated,
}

/// Reads logical records written by [`super::LogWriter`].
pub(crate) struct LogReader<R> {
    src: R,
    block: Vec<u8>,
    block_pos: usize,
    block_len: usize,
}

impl<R: Read> LogReader<R> {
    pub fn new(src: R) -> Self {
        Self { src, block: vec![0u8; WRITE_LOG_BLOCK_SIZE], block_pos: 0, block_len: 0 }
    }

    /// Reads the next logical record, reassembling fragments as needed.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A trailing, incompletely-written record
    /// (the tail of an in-flight write at crash time) is treated the same as end of stream,
    /// since there is no way to distinguish "never finished" from "deliberately short read".
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let mut record: Option<Vec<u8>> = None;

        loop {
            let Some((record_type, fragment)) = self.next_fragment()? else {
                // End of stream. Any partial record in `record` is the tail of an in-flight
                // write at crash time; discard it rather than surfacing a bogus record.
                return Ok(None);
            };

            match record_type {
                RecordType::Full => {
                    if record.is_some() {
                        return Err(ReadError::BadFragmentOrder);
                    }
                    return Ok(Some(fragment));
                }
                RecordType::First => {
                    if record.is_some() {
                        return Err(ReadError::BadFragmentOrder);
                    }
                    record = Some(fragment);
                }
                RecordType::Middle => {
                    let buf = record.as_mut().ok_or(ReadError::BadFragmentOrder)?;
                    buf.extend_from_slice(&fragment);
                }
                RecordType::Last => {
                    let mut buf = record.take().ok_or(ReadError::BadFragmentOrder)?;
                    buf.extend_from_slice(&fragment);
                    return Ok(Some(buf));
                }
            }
        }
    }

    fn next_fragment(&mut self) -> Result<Option<(RecordType, Vec<u8>)>, ReadError> {
        loop {
            if self.block_len - self.block_pos < HEADER_SIZE {
                if !self.refill_block()? {
                    return Ok(None);
                }
                continue;
            }

            let header = &self.block[self.block_pos..self.block_pos + HEADER_SIZE];
            let masked_checksum = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let fragment_len = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;
            let Some(record_type) = RecordType::from_u8(header[6]) else {
                // Zero-padding at the end of a block: skip to the next block.
                self.block_pos = self.block_len;
                continue;
            };

            let fragment_start = self.block_pos + HEADER_SIZE;
            let fragment_end = fragment_start + fragment_len;
            if fragment_end > self.block_len {
                // A record whose length claims to extend past what was actually written; this
                // is what a crash mid-write looks like. Treat as end of stream.
                self.block_pos = self.block_len;
                return Ok(None);
            }

            let fragment = self.block[fragment_start..fragment_end].to_vec();
            self.block_pos = fragment_end;

            let expected = unmask_checksum(masked_checksum);
            if crc32c::crc32c(&fragment) != expected {
                return Err(ReadError::ChecksumMismatch);
            }

            return Ok(Some((record_type, fragment)));
        }
    }

    /// Reads up to one more block. Returns `false` at end of stream.
    fn refill_block(&mut self) -> Result<bool, ReadError> {
        let mut total_read = 0;
        loop {
            match self.src.read(&mut self.block[total_read..])? {
                0 => break,
                n => {
                    total_read += n;
                    if total_read == self.block.len() {
                        break;
                    }
                }
            }
        }

        self.block_pos = 0;
        self.block_len = total_read;
        Ok(total_read > 0)
    }
}
