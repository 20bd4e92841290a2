use keep_types::BlobId;

use crate::error::{BlobError, BlobResult};

/// Largest supported shard count. Shard names are two hex digits.
pub const MAX_SHARDS: usize = 256;

/// Check that `limit` is a usable shard count.
pub fn validate_limit(limit: usize) -> BlobResult<()> {
    if limit.is_power_of_two() && limit <= MAX_SHARDS {
        Ok(())
    } else {
        Err(BlobError::InvalidLimit(limit))
    }
}

/// Shard directory name for `id` under a fan-out of `limit`.
///
/// XOR-folds the id bytes into one byte and masks it to the shard range.
/// `limit` must have passed [`validate_limit`].
pub fn shard(id: &BlobId, limit: usize) -> String {
    let folded = id.to_bytes().iter().fold(0u8, |acc, b| acc ^ b);
    let mask = (limit.clamp(1, MAX_SHARDS) - 1) as u8;
    format!("{:02x}", folded & mask)
}
