//! A sequence of `(type, user_key, value?)` entries applied atomically by [`crate::db::Database::write`].

use crate::format::EntryType;

#[derive(Debug, Clone)]
pub(crate) struct BatchEntry {
    pub entry_type: EntryType,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) entries: Vec<BatchEntry>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.entries.push(BatchEntry {
            entry_type: EntryType::Value,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self
    }

    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.entries.push(BatchEntry {
            entry_type: EntryType::Deletion,
            key: key.to_vec(),
            value: Vec::new(),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    /// Encodes the batch as `[count: varint][entry_type: u8][key_len: varint][key][value_len: varint][value]...`,
    /// the form persisted to the write-ahead log.
    pub(crate) fn encode(&self) -> Vec<u8> {
        use integer_encoding::VarIntWriter as _;

        let mut out = Vec::new();
        out.write_varint(self.entries.len() as u64).expect("writing to Vec never fails");
        for entry in &self.entries {
            out.push(entry.entry_type as u8);
            out.write_varint(entry.key.len() as u64).expect("writing to Vec never fails");
            out.extend_from_slice(&entry.key);
            if entry.entry_type == EntryType::Value {
                out.write_varint(entry.value.len() as u64).expect("writing to Vec never fails");
                out.extend_from_slice(&entry.value);
            }
        }
        out
    }

    /// Inverse of [`Self::encode`].
    pub(crate) fn decode(mut input: &[u8]) -> Option<Self> {
        use integer_encoding::VarInt as _;

        let (count, len) = u64::decode_var(input)?;
        input = &input[len..];

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let entry_type = EntryType::from_u8(*input.first()?)?;
            input = &input[1..];

            let (key_len, len) = u64::decode_var(input)?;
            input = &input[len..];
            let key = input.get(..key_len as usize)?.to_vec();
            input = &input[key_len as usize..];

            let value = if entry_type == EntryType::Value {
                let (value_len, len) = u64::decode_var(input)?;
                input = &input[len..];
                let value = input.get(..value_len as usize)?.to_vec();
                input = &input[value_len as usize..];
                value
            } else {
                Vec::new()
            };

            entries.push(BatchEntry { entry_type, key, value });
        }

        Some(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut batch = WriteBatch::new();
        batch.put(b"k1", b"v1");
        batch.delete(b"k2");
        batch.put(b"k3", b"v3");

        let decoded = WriteBatch::decode(&batch.encode()).unwrap();
        assert_eq!(decoded.entries.len(), 3);
        assert_eq!(decoded.entries[0].key, b"k1");
        assert_eq!(decoded.entries[0].value, b"v1");
        assert_eq!(decoded.entries[1].entry_type, EntryType::Deletion);
        assert_eq!(decoded.entries[2].value, b"v3");
    }
}
