use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Last identifier handed out by [`BlobId::generate`] in this process.
static LAST_GENERATED: Mutex<u128> = Mutex::new(0);

/// Identifier of one stored blob version (UUID v7, 16 bytes).
///
/// Identifiers are generated fresh for every stored blob and never derived
/// from content. Within a process they are strictly increasing, so a larger
/// `BlobId` was always created later; history ordering relies on this to
/// break timestamp ties.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(uuid::Uuid);

impl BlobId {
    /// Byte length of the binary form.
    pub const LEN: usize = 16;

    /// Generate a new time-ordered identifier.
    pub fn generate() -> Self {
        let candidate = uuid::Uuid::now_v7().as_u128();
        let mut last = LAST_GENERATED.lock().expect("blob id lock poisoned");
        let next = if candidate > *last { candidate } else { *last + 1 };
        *last = next;
        Self(uuid::Uuid::from_u128(next))
    }

    /// Create from raw bytes (as written by [`BlobId::to_bytes`]).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Hex-encoded string (32 characters); also the blob's file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Short representation (first 8 hex characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from_bytes(arr))
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.short_hex())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_strictly_increase() {
        let ids: Vec<BlobId> = (0..1000).map(|_| BlobId::generate()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn hex_roundtrip() {
        let id = BlobId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(BlobId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = BlobId::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 16, actual: 2 });
        assert!(matches!(BlobId::from_hex("zz"), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn bytes_roundtrip() {
        let id = BlobId::generate();
        assert_eq!(BlobId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn debug_is_short() {
        let id = BlobId::from_bytes([0xab; 16]);
        assert_eq!(format!("{id:?}"), "BlobId(abababab)");
    }
}
