//! Physical framing for the write-ahead log and the manifest log.
//!
//! Both logs share one physical record format: logical records (a serialized [`WriteBatch`] or
//! a serialized [`VersionEdit`]) are split into fragments that fit within fixed-size blocks, each
//! fragment prefixed with a masked CRC32C checksum, its length, and a type tag that says whether
//! it is the whole logical record or one fragment of several.
//!
//! [`WriteBatch`]: crate::write_batch::WriteBatch
//! [`VersionEdit`]: crate::version::version_edit::VersionEdit

mod reader;
mod writer;

pub(crate) use reader::{LogReader, ReadError};
pub(crate) use writer::LogWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Full),
            2 => Some(Self::First),
            3 => Some(Self::Middle),
            4 => Some(Self::Last),
            _ => None,
        }
    }
}

/// 4-byte masked CRC32C, 2-byte little-endian length, 1-byte type tag.
const HEADER_SIZE: usize = 4 + 2 + 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_handful_of_small_records() {
        let mut buf = Vec::new();
        {
            let mut writer = LogWriter::new(&mut buf);
            writer.add_record(b"first").unwrap();
            writer.add_record(b"").unwrap();
            writer.add_record(b"third record").unwrap();
        }

        let mut reader = LogReader::new(buf.as_slice());
        assert_eq!(reader.next_record().unwrap(), Some(b"first".to_vec()));
        assert_eq!(reader.next_record().unwrap(), Some(Vec::new()));
        assert_eq!(reader.next_record().unwrap(), Some(b"third record".to_vec()));
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn round_trips_a_record_spanning_multiple_blocks() {
        let mut buf = Vec::new();
        let big = vec![0x5au8; crate::config_constants::WRITE_LOG_BLOCK_SIZE * 3];
        {
            let mut writer = LogWriter::new(&mut buf);
            writer.add_record(&big).unwrap();
            writer.add_record(b"after").unwrap();
        }

        let mut reader = LogReader::new(buf.as_slice());
        assert_eq!(reader.next_record().unwrap(), Some(big));
        assert_eq!(reader.next_record().unwrap(), Some(b"after".to_vec()));
    }

    #[test]
    fn detects_checksum_corruption() {
        let mut buf = Vec::new();
        {
            let mut writer = LogWriter::new(&mut buf);
            writer.add_record(b"hello").unwrap();
        }
        // Flip a byte inside the record payload.
        let payload_start = HEADER_SIZE;
        buf[payload_start] ^= 0xff;

        let mut reader = LogReader::new(buf.as_slice());
        assert!(matches!(reader.next_record(), Err(ReadError::ChecksumMismatch)));
    }
}
