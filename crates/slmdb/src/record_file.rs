//! On-disk format for a zero-level record file: a flat, append-only sequence of records, each
//! independently checksummed so the table cache can read any one of them in isolation given the
//! offset and size the secondary index holds for it.
//!
//! Unlike the write-ahead log, records here are never split into fragments: a zero-level file is
//! built once, in full, by a flush or a compaction, so there is no need to frame around block
//! boundaries.

use std::io::Write;

use integer_encoding::{VarInt as _, VarIntWriter as _};

use crate::config_constants::mask_checksum;
use crate::error::{Error, Result};

/// `[masked_crc32c: u32 LE][key_len: varint][key][value_len: varint][value]`
pub(crate) fn encode_record(internal_key: &[u8], value: &[u8], out: &mut Vec<u8>) {
    let start = out.len();
    out.extend_from_slice(&[0u8; 4]); // checksum placeholder
    out.write_varint(internal_key.len() as u32).expect("writing to a Vec does not fail");
    out.extend_from_slice(internal_key);
    out.write_varint(value.len() as u32).expect("writing to a Vec does not fail");
    out.extend_from_slice(value);

    let checksum = mask_checksum(crc32c::crc32c(&out[start + 4..]));
    out[start..start + 4].copy_from_slice(&checksum.to_le_bytes());
}

/// Writes records sequentially to `dest`, tracking each record's offset and length so the
/// caller can populate the secondary index.
pub(crate) struct RecordFileWriter<W> {
    dest: W,
    offset: u64,
}

impl<W: Write> RecordFileWriter<W> {
    pub fn new(dest: W) -> Self {
        Self { dest, offset: 0 }
    }

    /// Appends one record and returns `(offset, size)` of the bytes just written.
    pub fn append(&mut self, internal_key: &[u8], value: &[u8]) -> std::io::Result<(u64, u32)> {
        let mut buf = Vec::with_capacity(internal_key.len() + value.len() + 16);
        encode_record(internal_key, value, &mut buf);
        self.dest.write_all(&buf)?;

        let offset = self.offset;
        let size = u32::try_from(buf.len()).expect("a single record fits in u32 bytes");
        self.offset += u64::from(size);
        Ok((offset, size))
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.dest.flush()
    }

    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> W {
        self.dest
    }
}

/// A decoded view of one record read back from a zero-level file.
pub(crate) struct DecodedRecord {
    pub internal_key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Decodes exactly one record from `bytes`, which must be exactly the `size`-byte span the
/// index recorded for it (i.e. a [`RecordLocator`](crate::index::RecordLocator)'s slice).
pub(crate) fn decode_record(bytes: &[u8]) -> Result<DecodedRecord> {
    decode_record_prefix(bytes).map(|(record, _consumed)| record)
}

/// Decodes one record starting at the front of `bytes`, which may have trailing bytes
/// belonging to later records. Returns the record plus how many bytes it occupied, so a
/// sequential scan over a whole file can advance past it.
pub(crate) fn decode_record_prefix(bytes: &[u8]) -> Result<(DecodedRecord, usize)> {
    let corrupt = || Error::corruption(None, "malformed zero-level record");

    if bytes.len() < 4 {
        return Err(corrupt());
    }
    let masked_checksum = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

    let mut rest = &bytes[4..];
    let (key_len, n) = u32::decode_var(rest).ok_or_else(corrupt)?;
    rest = &rest[n..];
    let key_len = key_len as usize;
    if rest.len() < key_len {
        return Err(corrupt());
    }
    let (internal_key, after_key) = rest.split_at(key_len);
    rest = after_key;

    let (value_len, n) = u32::decode_var(rest).ok_or_else(corrupt)?;
    rest = &rest[n..];
    let value_len = value_len as usize;
    if rest.len() < value_len {
        return Err(corrupt());
    }
    let value = &rest[..value_len];

    let record_len = bytes.len() - rest.len() + value_len;
    let checksummed = &bytes[4..record_len];

    let expected = crate::config_constants::unmask_checksum(masked_checksum);
    if crc32c::crc32c(checksummed) != expected {
        return Err(Error::corruption(Some(internal_key.to_vec()), "checksum mismatch"));
    }

    Ok((
        DecodedRecord { internal_key: internal_key.to_vec(), value: value.to_vec() },
        record_len,
    ))
}

/// Scans every record in a whole zero-level file read into memory, yielding
/// `(offset, size, record)` triples in file order.
pub(crate) fn scan_records(bytes: &[u8]) -> impl Iterator<Item = Result<(u64, u32, DecodedRecord)>> + '_ {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= bytes.len() {
            return None;
        }
        match decode_record_prefix(&bytes[offset..]) {
            Ok((record, consumed)) => {
                let this_offset = offset as u64;
                let size = consumed as u32;
                offset += consumed;
                Some(Ok((this_offset, size, record)))
            }
            Err(err) => {
                offset = bytes.len();
                Some(Err(err))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_handful_of_records() {
        let mut writer = RecordFileWriter::new(Vec::new());
        let (off1, size1) = writer.append(b"key-one", b"value-one").unwrap();
        let (off2, size2) = writer.append(b"key-two", b"").unwrap();
        let buf = writer.into_inner();

        let rec1 = decode_record(&buf[off1 as usize..(off1 + u64::from(size1)) as usize]).unwrap();
        assert_eq!(rec1.internal_key, b"key-one");
        assert_eq!(rec1.value, b"value-one");

        let rec2 = decode_record(&buf[off2 as usize..(off2 + u64::from(size2)) as usize]).unwrap();
        assert_eq!(rec2.internal_key, b"key-two");
        assert_eq!(rec2.value, b"");
    }

    #[test]
    fn detects_corruption() {
        let mut writer = RecordFileWriter::new(Vec::new());
        writer.append(b"k", b"v").unwrap();
        let mut buf = writer.into_inner();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        assert!(decode_record(&buf).is_err());
    }
}
