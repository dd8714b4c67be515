//! Atomic file replacement.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Replace `path` with `content` in one rename.
///
/// Each call stages into its own uniquely named temp file next to `path`,
/// so concurrent writers never share or truncate each other's staging file.
/// The last rename wins.
pub(crate) async fn write_atomic(path: &Path, content: String) -> Result<()> {
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("No parent directory: {}", path.display())))?;
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Internal(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| {
            Error::Internal(format!(
                "Failed to replace {}: {}",
                path.display(),
                e.error
            ))
        })?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Internal(format!("Write task failed: {}", e)))?
}
