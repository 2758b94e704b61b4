use sha2::{Digest, Sha256};

/// Hex SHA-256 of `data`. Chunk ids and on-disk file names are derived from it.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|byte| format!("{:02x}", byte)).collect()
}
