//! Size and checksum verification of downloaded archives
//!
//! A download is only reported as successfully fetched after its catalog
//! metadata (expected size, checksum) has been checked against the file on
//! disk.

use crate::error::{Result, content_mismatch};
use crate::hash;

use super::FileTaskItem;

/// Validate a completed download against its expected metadata
pub fn verify_item(item: &FileTaskItem) -> Result<()> {
    if let Some(expected_size) = item.expected_size {
        let actual = std::fs::metadata(&item.target)
            .map(|m| m.len())
            .map_err(|e| content_mismatch(item.target.display().to_string(), e.to_string()))?;
        if actual != expected_size {
            return Err(content_mismatch(
                item.target.display().to_string(),
                format!("size {} does not match expected {}", actual, expected_size),
            ));
        }
    }

    if let Some(expected_checksum) = &item.checksum {
        let actual = hash::hash_file(&item.target)?;
        if !hash::verify_hash(expected_checksum, &actual) {
            return Err(content_mismatch(
                item.target.display().to_string(),
                format!(
                    "checksum {} does not match expected {}",
                    actual, expected_checksum
                ),
            ));
        }
    }

    Ok(())
}
