//! Backup siblings for patched files.
//!
//! A backup holds the pre-patch content of a file and is created at most
//! once: the first patch creates it, later runs leave it alone. Idempotency
//! decisions never look at backups, only at live file content.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const BACKUP_SUFFIX: &str = ".original";

/// Sibling path holding the pre-patch content, e.g. `play_sd_raw.cpp.original`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "BackupOutcome distinguishes first-time creation from a prior backup"]
pub enum BackupOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Create the backup sibling unless one already exists.
pub fn ensure_backup(path: &Path) -> io::Result<BackupOutcome> {
    let backup = backup_path(path);
    if backup.exists() {
        return Ok(BackupOutcome::AlreadyExists(backup));
    }
    fs::copy(path, &backup)?;
    Ok(BackupOutcome::Created(backup))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(PathBuf),
    NoBackup(PathBuf),
}

/// Copy the backup back over the live file, undoing the patch.
/// The backup itself is kept.
pub fn restore_backup(path: &Path) -> io::Result<RestoreOutcome> {
    let backup = backup_path(path);
    if !backup.exists() {
        return Ok(RestoreOutcome::NoBackup(backup));
    }
    fs::copy(&backup, path)?;
    Ok(RestoreOutcome::Restored(backup))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/lib/Audio/play_sd_raw.cpp")),
            PathBuf::from("/lib/Audio/play_sd_raw.cpp.original")
        );
    }

    #[test]
    fn test_ensure_backup_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("record_queue.cpp");
        fs::write(&file, b"first").unwrap();

        let outcome = ensure_backup(&file).unwrap();
        assert!(matches!(outcome, BackupOutcome::Created(_)));
        assert_eq!(fs::read(backup_path(&file)).unwrap(), b"first");

        // Live file changes; a second ensure must not overwrite the backup.
        fs::write(&file, b"second").unwrap();
        let outcome = ensure_backup(&file).unwrap();
        assert!(matches!(outcome, BackupOutcome::AlreadyExists(_)));
        assert_eq!(fs::read(backup_path(&file)).unwrap(), b"first");
    }

    #[test]
    fn test_ensure_backup_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.cpp");
        assert!(ensure_backup(&file).is_err());
        assert!(!backup_path(&file).exists());
    }

    #[test]
    fn test_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("play_sd_wav.cpp");
        fs::write(&file, b"original").unwrap();
        ensure_backup(&file).unwrap();
        fs::write(&file, b"patched").unwrap();

        let outcome = restore_backup(&file).unwrap();
        assert!(matches!(outcome, RestoreOutcome::Restored(_)));
        assert_eq!(fs::read(&file).unwrap(), b"original");
        // Backup survives the restore.
        assert!(backup_path(&file).exists());
    }

    #[test]
    fn test_restore_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mixer.cpp");
        fs::write(&file, b"content").unwrap();

        let outcome = restore_backup(&file).unwrap();
        assert!(matches!(outcome, RestoreOutcome::NoBackup(_)));
        assert_eq!(fs::read(&file).unwrap(), b"content");
    }
}
