//! Blake3 hashing utilities.
//!
//! Used for lockfile fingerprints, git mirror directory names and path
//! location revision stamps.

/// Compute Blake3 hash of data
pub fn blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().to_string()
}

/// Hash an ordered list of fields, separating them so `["ab", "c"]` and `["a", "bc"]` differ
pub fn blake3_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = blake3::Hasher::new();
    for field in fields {
        let field = field.as_ref();
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
