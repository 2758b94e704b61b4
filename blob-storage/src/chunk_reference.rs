use serde::{Deserialize, Serialize};

/// Ordered list of the parts a chunked upload was split into.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkManifest {
    pub file_id: String,
    /// Size of the reassembled file in bytes.
    pub total_size: u64,
    /// Number of parts the uploader produced.
    pub part_count: u32,
    /// List of all chunk references, in upload order.
    pub chunks: Vec<ChunkReference>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkReference {
    /// Position of the part in the original file, starting at zero.
    pub index: u32,
    /// A content-addressable ID: the SHA-256 of the part bytes.
    pub id: String,
    pub size: u64,
}

/// Key the manifest for `file_id` is stored under in a `ChunkStore`.
pub fn manifest_key(file_id: &str) -> String {
    format!("{}.manifest", file_id)
}

impl ChunkManifest {
    /// Checks that the manifest describes a complete, ordered part set for
    /// `file_id`. Returns a human readable reason when it does not.
    pub fn check(&self, file_id: &str) -> Result<(), String> {
        if self.file_id != file_id {
            return Err(format!("manifest belongs to {}", self.file_id));
        }
        if self.chunks.len() != self.part_count as usize {
            return Err(format!(
                "manifest lists {} of {} parts",
                self.chunks.len(),
                self.part_count
            ));
        }
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.index as usize != position {
                return Err(format!(
                    "part at position {} has index {}",
                    position, chunk.index
                ));
            }
        }
        let declared = self
            .chunks
            .iter()
            .try_fold(0u64, |sum, c| sum.checked_add(c.size))
            .ok_or_else(|| "part sizes overflow".to_string())?;
        if declared != self.total_size {
            return Err(format!(
                "parts add up to {} bytes, expected {}",
                declared, self.total_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(indices: &[u32], part_count: u32) -> ChunkManifest {
        ChunkManifest {
            file_id: "f".to_string(),
            total_size: indices.len() as u64 * 2,
            part_count,
            chunks: indices
                .iter()
                .map(|&index| ChunkReference { index, id: format!("c{}", index), size: 2 })
                .collect(),
        }
    }

    #[test]
    fn test_complete_manifest_passes() {
        assert!(manifest(&[0, 1, 2], 3).check("f").is_ok());
    }

    #[test]
    fn test_gap_out_of_order_and_short_fail() {
        assert!(manifest(&[0, 2, 3], 3).check("f").is_err());
        assert!(manifest(&[1, 0, 2], 3).check("f").is_err());
        assert!(manifest(&[0, 1], 3).check("f").is_err());
        assert!(manifest(&[0, 1, 2], 3).check("other").is_err());
    }

    #[test]
    fn test_overflowing_part_sizes_fail() {
        let mut m = manifest(&[0, 1], 2);
        m.chunks[0].size = u64::MAX;
        m.chunks[1].size = 6;
        m.total_size = 5;
        assert_eq!(m.check("f"), Err("part sizes overflow".to_string()));
    }

    #[test]
    fn test_duplicate_index_fails() {
        assert!(manifest(&[0, 0, 1], 3).check("f").is_err());
    }

    #[test]
    fn test_size_mismatch_fails() {
        let mut m = manifest(&[0, 1], 2);
        m.total_size += 1;
        assert!(m.check("f").is_err());
    }
}
