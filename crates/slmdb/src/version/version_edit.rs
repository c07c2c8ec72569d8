//! Manifest log record format: the varint-tagged encoding of incremental changes to the set of
//! live record files.

use integer_encoding::{VarInt as _, VarIntWriter as _};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum EditTag {
    LogNumber = 1,
    NextFileNumber = 2,
    LastSequence = 3,
    DeletedFile = 4,
    NewFile = 5,
}

impl EditTag {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::LogNumber),
            2 => Some(Self::NextFileNumber),
            3 => Some(Self::LastSequence),
            4 => Some(Self::DeletedFile),
            5 => Some(Self::NewFile),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct NewFileEntry {
    pub file_number: u64,
    pub file_size: u64,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub total: u32,
    pub alive: u32,
}

/// A batch of changes to apply to the current [`super::Version`]: new files from a flush or a
/// compaction, files removed by a compaction, and bookkeeping counters.
#[derive(Debug, Default)]
pub(crate) struct VersionEdit {
    pub log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub deleted_files: Vec<u64>,
    pub new_files: Vec<NewFileEntry>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, output: &mut Vec<u8>) {
        if let Some(log_number) = self.log_number {
            write_tag(output, EditTag::LogNumber);
            write_varint_u64(output, log_number);
        }
        if let Some(next_file_number) = self.next_file_number {
            write_tag(output, EditTag::NextFileNumber);
            write_varint_u64(output, next_file_number);
        }
        if let Some(last_sequence) = self.last_sequence {
            write_tag(output, EditTag::LastSequence);
            write_varint_u64(output, last_sequence);
        }
        for file_number in &self.deleted_files {
            write_tag(output, EditTag::DeletedFile);
            write_varint_u64(output, *file_number);
        }
        for entry in &self.new_files {
            write_tag(output, EditTag::NewFile);
            write_varint_u64(output, entry.file_number);
            write_varint_u64(output, entry.file_size);
            write_byte_slice(output, &entry.smallest_key);
            write_byte_slice(output, &entry.largest_key);
            write_varint_u32(output, entry.total);
            write_varint_u32(output, entry.alive);
        }
    }

    pub fn decode_from(mut input: &[u8]) -> Result<Self> {
        let mut edit = Self::new();

        while !input.is_empty() {
            let raw_tag = read_varint_u32(&mut input)?;
            let tag = EditTag::from_u32(raw_tag)
                .ok_or_else(|| Error::corruption(None, "unrecognized manifest edit tag"))?;

            match tag {
                EditTag::LogNumber => edit.log_number = Some(read_varint_u64(&mut input)?),
                EditTag::NextFileNumber => edit.next_file_number = Some(read_varint_u64(&mut input)?),
                EditTag::LastSequence => edit.last_sequence = Some(read_varint_u64(&mut input)?),
                EditTag::DeletedFile => edit.deleted_files.push(read_varint_u64(&mut input)?),
                EditTag::NewFile => {
                    let file_number = read_varint_u64(&mut input)?;
                    let file_size = read_varint_u64(&mut input)?;
                    let smallest_key = read_byte_slice(&mut input)?.to_vec();
                    let largest_key = read_byte_slice(&mut input)?.to_vec();
                    let total = read_varint_u32(&mut input)?;
                    let alive = read_varint_u32(&mut input)?;
                    edit.new_files.push(NewFileEntry {
                        file_number,
                        file_size,
                        smallest_key,
                        largest_key,
                        total,
                        alive,
                    });
                }
            }
        }

        Ok(edit)
    }
}

fn corrupt() -> Error {
    Error::corruption(None, "truncated manifest edit record")
}

fn read_varint_u32(input: &mut &[u8]) -> Result<u32> {
    let (value, len) = u32::decode_var(input).ok_or_else(corrupt)?;
    *input = &input[len..];
    Ok(value)
}

fn write_varint_u32(output: &mut Vec<u8>, value: u32) {
    output.write_varint(value).expect("writing to a Vec does not fail");
}

fn read_varint_u64(input: &mut &[u8]) -> Result<u64> {
    let (value, len) = u64::decode_var(input).ok_or_else(corrupt)?;
    *input = &input[len..];
    Ok(value)
}

fn write_varint_u64(output: &mut Vec<u8>, value: u64) {
    output.write_varint(value).expect("writing to a Vec does not fail");
}

fn read_byte_slice<'a>(input: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = read_varint_u32(input)? as usize;
    if input.len() < len {
        return Err(corrupt());
    }
    let (slice, rest) = input.split_at(len);
    *input = rest;
    Ok(slice)
}

fn write_byte_slice(output: &mut Vec<u8>, bytes: &[u8]) {
    write_varint_u32(output, u32::try_from(bytes.len()).expect("key fits in u32"));
    output.extend_from_slice(bytes);
}

fn write_tag(output: &mut Vec<u8>, tag: EditTag) {
    write_varint_u32(output, tag as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_edit() {
        let mut edit = VersionEdit::new();
        edit.log_number = Some(7);
        edit.next_file_number = Some(8);
        edit.last_sequence = Some(100);
        edit.deleted_files.push(3);
        edit.new_files.push(NewFileEntry {
            file_number: 9,
            file_size: 4096,
            smallest_key: b"a".to_vec(),
            largest_key: b"z".to_vec(),
            total: 10,
            alive: 10,
        });

        let mut buf = Vec::new();
        edit.encode(&mut buf);

        let decoded = VersionEdit::decode_from(&buf).unwrap();
        assert_eq!(decoded.log_number, Some(7));
        assert_eq!(decoded.next_file_number, Some(8));
        assert_eq!(decoded.last_sequence, Some(100));
        assert_eq!(decoded.deleted_files, vec![3]);
        assert_eq!(decoded.new_files.len(), 1);
        assert_eq!(decoded.new_files[0].file_number, 9);
        assert_eq!(decoded.new_files[0].smallest_key, b"a");
    }
}
