//! Output file writing
//!
//! Both operations acquire the destination directory first and surface a
//! directory failure without attempting the write.

use std::path::Path;

use crate::error::{BuildError, Result};

/// Write `content` to `destination`, creating missing parent directories.
pub async fn write(destination: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    ensure_parent(destination).await?;

    tokio::fs::write(destination, content)
        .await
        .map_err(|source| BuildError::Write {
            path: destination.to_path_buf(),
            source,
        })
}

/// Copy `source` byte-for-byte to `destination`, creating missing parent directories.
pub async fn copy(source: &Path, destination: &Path) -> Result<u64> {
    ensure_parent(destination).await?;

    tokio::fs::copy(source, destination)
        .await
        .map_err(|source| BuildError::Write {
            path: destination.to_path_buf(),
            source,
        })
}

async fn ensure_parent(destination: &Path) -> Result<()> {
    let Some(dir) = destination.parent() else {
        return Ok(());
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| BuildError::DirectoryCreation {
            path: dir.to_path_buf(),
            source,
        })
}
