use keep_bucket::{BucketResult, ByteReader, ByteWriter, EntryCodec};
use keep_types::BlobId;

use crate::state::{FileState, HistoryEntry};

/// Encoded size of one state: 16-byte blob id + i64 timestamp.
const STATE_SIZE: usize = BlobId::LEN + 8;

/// Bucket codec for history entries.
///
/// Payload: `count: u32`, then `count` states newest first, each a raw
/// 16-byte blob id followed by the timestamp as i64 LE.
#[derive(Debug)]
pub struct HistoryCodec;

impl EntryCodec for HistoryCodec {
    type Value = HistoryEntry;
    const VERSION: u8 = 2;
    const INDEX_FILE: &'static str = "history.index";

    fn is_empty(value: &HistoryEntry) -> bool {
        value.is_empty()
    }

    fn write_value(value: &HistoryEntry, out: &mut ByteWriter) {
        out.put_u32(value.len() as u32);
        for state in value.states() {
            out.put_bytes(&state.blob_id.to_bytes());
            out.put_i64(state.timestamp_ms);
        }
    }

    fn read_value(input: &mut ByteReader<'_>) -> BucketResult<HistoryEntry> {
        let count = input.read_count(STATE_SIZE)?;
        let mut states = Vec::with_capacity(count);
        for _ in 0..count {
            let blob_id = BlobId::from_bytes(input.read_array()?);
            let timestamp_ms = input.read_i64()?;
            states.push(FileState::new(blob_id, timestamp_ms));
        }
        Ok(HistoryEntry::from_states(states))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keep_bucket::BucketError;

    #[test]
    fn payload_layout() {
        let id = BlobId::from_bytes([7; 16]);
        let entry = HistoryEntry::from_states([FileState::new(id, 0x0102)]);
        let mut out = ByteWriter::new();
        HistoryCodec::write_value(&entry, &mut out);
        let bytes = out.into_bytes();

        assert_eq!(bytes.len(), 4 + STATE_SIZE);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..20], &[7; 16]);
        assert_eq!(&bytes[20..], &0x0102i64.to_le_bytes());

        let decoded = HistoryCodec::read_value(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn overflowing_count_is_corrupt() {
        let mut out = ByteWriter::new();
        out.put_u32(2);
        out.put_bytes(&[0; STATE_SIZE]);
        let bytes = out.into_bytes();
        assert!(matches!(
            HistoryCodec::read_value(&mut ByteReader::new(&bytes)),
            Err(BucketError::Corrupt(_))
        ));
    }
}
