//! Filesystem helpers for moving outputs across mount points.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file, falling back to copy-and-delete when the rename fails
/// with EXDEV (source and destination on different filesystems). The
/// copy goes through a temp file next to the destination so the final
/// rename is atomic there.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await?;
    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_within_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("b.mp4");
        fs::write(&src, b"payload").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_move_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("nested/out/b.mp4");
        fs::write(&src, b"x").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_missing_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = move_file(dir.path().join("nope.mp4"), dir.path().join("b.mp4")).await;
        assert!(result.is_err());
    }
}
