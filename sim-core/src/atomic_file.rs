//! Atomic file persistence shared by the Replay Store (§4.5) and the
//! conquest save/load path (§4.11, §6): write to a `.tmp` sibling, copy the
//! previous contents to a `.bak` sibling, then rename tmp into place. Reads
//! try the main file, falling back to the backup (§9 "corrupted persisted
//! state" — an out-of-version or parse failure must never crash the room,
//! so this module only handles the file IO half; callers decide what a bad
//! parse means).

use std::path::Path;

/// Writes `contents` to `path` atomically: `path.tmp` is written first, the
/// existing `path` (if any) is copied to `path.bak`, then `path.tmp` is
/// renamed over `path`. A crash at any point leaves either the old file or
/// the new one intact, never a half-written one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), String> {
    let tmp_path = tmp_path_for(path);
    let bak_path = bak_path_for(path);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| format!("failed to write temp file {}: {}", tmp_path.display(), e))?;

    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::copy(path, &bak_path)
            .await
            .map_err(|e| format!("failed to back up {}: {}", path.display(), e))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| format!("failed to rename {} into {}: {}", tmp_path.display(), path.display(), e))
}

/// Reads `path`, falling back to its `.bak` sibling if the main file is
/// missing or unreadable. Returns `Ok(None)` when neither exists — "no
/// save", never an error.
pub async fn read_with_backup_fallback(path: &Path) -> Result<Option<Vec<u8>>, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => return Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "primary save unreadable, trying backup");
        }
    }

    let bak_path = bak_path_for(path);
    match tokio::fs::read(&bak_path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("failed to read backup {}: {}", bak_path.display(), e)),
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    s.into()
}

fn bak_path_for(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".bak");
    s.into()
}

/// Sanitizes an arbitrary id into a filesystem-safe stem: only
/// alphanumerics, underscore, hyphen and dot survive (§4.5). Slashes and
/// whitespace are stripped so the result is always a single path segment,
/// never a traversal.
pub fn sanitize_id(id: &str) -> String {
    id.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_write_and_read() {
        let dir = std::env::temp_dir().join(format!("atomic_file_test_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("state.json");

        write_atomic(&path, b"{\"a\":1}").await.unwrap();
        let read_back = read_with_backup_fallback(&path).await.unwrap().unwrap();
        assert_eq!(read_back, b"{\"a\":1}");

        write_atomic(&path, b"{\"a\":2}").await.unwrap();
        let bak = tokio::fs::read(bak_path_for(&path)).await.unwrap();
        assert_eq!(bak, b"{\"a\":1}");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_file_is_none_not_an_error() {
        let path = std::env::temp_dir().join("atomic_file_test_missing_never_written.json");
        let result = read_with_backup_fallback(&path).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize_id("room/../../etc-passwd 1"), "room..etc-passwd1");
        assert_eq!(sanitize_id("galaxy_7-A"), "galaxy_7-A");
    }
}
