use std::path::Path;

use crate::error::EngineError;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Smallest file accepted by a multipart session.
pub const MULTIPART_MIN_SIZE: u64 = 5 * MIB;
/// Files at or above this size are uploaded in parts.
pub const MULTIPART_THRESHOLD: u64 = 50 * MIB;

const SMALL_TIER_LIMIT: u64 = 5 * GIB;
const MEDIUM_TIER_LIMIT: u64 = 100 * GIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub part_size: u64,
    pub total_parts: u64,
    pub start_part: u64,
}

pub fn chunk_size_for(size: u64) -> u64 {
    if size < SMALL_TIER_LIMIT {
        5 * MIB
    } else if size < MEDIUM_TIER_LIMIT {
        25 * MIB
    } else {
        50 * MIB
    }
}

impl ChunkPlan {
    pub fn for_size(size: u64) -> Self {
        let part_size = chunk_size_for(size);
        Self {
            part_size,
            total_parts: size.div_ceil(part_size),
            start_part: 1,
        }
    }

    /// Plan for a session that already has `uploaded_parts` confirmed parts.
    pub fn resuming(size: u64, uploaded_parts: u64) -> Self {
        Self {
            start_part: uploaded_parts + 1,
            ..Self::for_size(size)
        }
    }
}

pub fn file_size(path: &Path) -> Result<u64, EngineError> {
    let metadata = std::fs::metadata(path)
        .map_err(|err| EngineError::invalid_input(format!("{} file not found: {err}", path.display())))?;
    if !metadata.is_file() {
        return Err(EngineError::invalid_input(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(metadata.len())
}
