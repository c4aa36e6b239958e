//! Atomic file writes: write a hidden sibling, then rename into place.

use std::path::{Path, PathBuf};

use notionsync_shared::{Result, SyncError};

/// Hidden temporary sibling of `target`, e.g. `dir/.index.md.tmp`.
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.tmp"))
}

/// Replace `target` with `contents` so readers never observe a partial file.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let temp = temp_path(target);

    if let Err(e) = tokio::fs::write(&temp, contents).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(SyncError::io(&temp, e));
    }
    tokio::fs::rename(&temp, target)
        .await
        .map_err(|e| SyncError::io(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn temp_path_is_hidden_sibling() {
        let p = temp_path(Path::new("/content/my-trip/index.md"));
        assert_eq!(p, PathBuf::from("/content/my-trip/.index.md.tmp"));
    }

    #[tokio::test]
    async fn write_atomic_replaces_existing_file() {
        let dir = std::env::temp_dir().join(format!("notionsync-write-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("index.md");

        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert!(!temp_path(&target).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn write_atomic_reports_missing_directory() {
        let target = std::env::temp_dir()
            .join(format!("notionsync-missing-{}", Uuid::now_v7()))
            .join("index.md");
        let err = write_atomic(&target, b"x").await.unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
    }
}
