use std::fmt::Debug;

use crate::error::{BucketError, BucketResult};

/// Value shape of one kind of bucket.
///
/// The bucket core handles paths, versioning and persistence; a codec only
/// says how a value is written and read back. `read_value` must consume
/// exactly the bytes `write_value` produced and fail with
/// [`BucketError::Corrupt`] on short or malformed input.
pub trait EntryCodec {
    type Value: Clone + Debug + PartialEq;

    /// Format version byte written at the start of the index file.
    const VERSION: u8;

    /// File name of the index inside a bucket directory.
    const INDEX_FILE: &'static str;

    /// Empty values are never stored; setting one removes the entry.
    fn is_empty(value: &Self::Value) -> bool;

    fn write_value(value: &Self::Value, out: &mut ByteWriter);

    fn read_value(input: &mut ByteReader<'_>) -> BucketResult<Self::Value>;
}

/// Little-endian output buffer for index files.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed (u32) UTF-8 string.
    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.put_bytes(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader over an index file.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_bytes(&mut self, n: usize) -> BucketResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(BucketError::Corrupt(format!(
                "need {n} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> BucketResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> BucketResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> BucketResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> BucketResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> BucketResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a count that prefixes `item_size`-byte items, rejecting counts
    /// the remaining input cannot hold.
    pub fn read_count(&mut self, item_size: usize) -> BucketResult<usize> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(item_size) > self.remaining() {
            return Err(BucketError::Corrupt(format!(
                "count {count} overflows remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    pub fn read_str(&mut self) -> BucketResult<&'a str> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|e| BucketError::Corrupt(format!("invalid UTF-8 string: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_roundtrip() {
        let mut w = ByteWriter::new();
        w.put_u8(7);
        w.put_u32(0xdead_beef);
        w.put_i64(-42);
        w.put_str("héllo");
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_str().unwrap(), "héllo");
        assert!(r.is_at_end());
    }

    #[test]
    fn short_input_is_corrupt() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(matches!(r.read_u32(), Err(BucketError::Corrupt(_))));
    }

    #[test]
    fn oversized_count_is_corrupt() {
        let mut w = ByteWriter::new();
        w.put_u32(1_000_000);
        w.put_bytes(&[0; 24]);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(r.read_count(24), Err(BucketError::Corrupt(_))));
    }

    #[test]
    fn invalid_utf8_is_corrupt() {
        let mut w = ByteWriter::new();
        w.put_u32(2);
        w.put_bytes(&[0xff, 0xfe]);
        let bytes = w.into_bytes();
        assert!(matches!(
            ByteReader::new(&bytes).read_str(),
            Err(BucketError::Corrupt(_))
        ));
    }
}
