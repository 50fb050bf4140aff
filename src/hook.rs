//! Pre-build patch hook.
//!
//! Invoked once before final build-artifact assembly, possibly before the
//! dependent library exists on disk. The hook never propagates a failure to
//! the host build system: it returns a [`PatchReport`] summarizing per-file
//! outcomes, and the worst case is that the exclusion silently fails to take
//! effect for one file.

use crate::backup::{ensure_backup, BackupOutcome};
use crate::guard::GuardSpec;
use crate::locate::BuildEnv;
use crate::target::{PatchTarget, Transform};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
enum StepError {
    #[error("read failed: {0}")]
    Read(std::io::Error),
    #[error("write failed: {0}")]
    Write(std::io::Error),
}

/// Backup disposition for a patched file. Backup creation failure is
/// non-fatal (the patch proceeds) but is surfaced distinctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    Created,
    AlreadyExists,
    Failed(String),
}

/// Outcome for one patch target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FileOutcome should be checked for failures"]
pub enum FileOutcome {
    /// File was transformed and written back.
    Patched { backup: BackupStatus },
    /// Dry-run: the file would be transformed.
    WouldPatch,
    /// Sentinel already present; no write performed.
    AlreadyPatched,
    /// Target file absent in this library version; skipped.
    NotFound,
    /// No anchor or block matched; no write performed.
    Unchanged,
    /// Read or write failed; remaining files were still processed.
    Failed { reason: String },
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Patched { backup: BackupStatus::Created } => {
                write!(f, "patched (backup created)")
            }
            FileOutcome::Patched { backup: BackupStatus::AlreadyExists } => {
                write!(f, "patched (already backed up)")
            }
            FileOutcome::Patched { backup: BackupStatus::Failed(reason) } => {
                write!(f, "patched (backup failed: {reason})")
            }
            FileOutcome::WouldPatch => write!(f, "would patch"),
            FileOutcome::AlreadyPatched => write!(f, "already patched"),
            FileOutcome::NotFound => write!(f, "skipped (not found)"),
            FileOutcome::Unchanged => write!(f, "no matching region"),
            FileOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

/// Summary of one hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchReport summarizes the hook run"]
pub struct PatchReport {
    /// Resolved library directory, or `None` when the library is not
    /// installed yet (not an error; nothing was done).
    pub library_dir: Option<PathBuf>,
    pub files: Vec<FileReport>,
}

impl PatchReport {
    pub fn library_found(&self) -> bool {
        self.library_dir.is_some()
    }

    pub fn patched_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Patched { .. } | FileOutcome::WouldPatch))
    }

    pub fn already_patched_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::AlreadyPatched))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Patch every target inside the located library directory.
///
/// Per-file failures are collected into the report; they never abort the
/// remaining files and never raise outward.
pub fn patch_library(env: &BuildEnv, guard: &GuardSpec, targets: &[PatchTarget]) -> PatchReport {
    run(env, guard, targets, false)
}

/// Dry-run variant: same report semantics, zero writes and zero backups.
pub fn check_library(env: &BuildEnv, guard: &GuardSpec, targets: &[PatchTarget]) -> PatchReport {
    run(env, guard, targets, true)
}

fn run(env: &BuildEnv, guard: &GuardSpec, targets: &[PatchTarget], dry_run: bool) -> PatchReport {
    let Some(dir) = env.locate_library() else {
        return PatchReport {
            library_dir: None,
            files: Vec::new(),
        };
    };

    let files = targets
        .iter()
        .map(|target| FileReport {
            filename: target.filename.clone(),
            outcome: patch_file(&dir, target, guard, dry_run),
        })
        .collect();

    PatchReport {
        library_dir: Some(dir),
        files,
    }
}

fn patch_file(dir: &Path, target: &PatchTarget, guard: &GuardSpec, dry_run: bool) -> FileOutcome {
    let path = dir.join(&target.filename);
    if !path.exists() {
        return FileOutcome::NotFound;
    }

    // Lossy read: undecodable bytes are substituted rather than failing.
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) => {
            return FileOutcome::Failed {
                reason: StepError::Read(e).to_string(),
            }
        }
    };
    let content = String::from_utf8_lossy(&bytes);

    let new_content = match target.apply(guard, &content) {
        Transform::AlreadyPatched => return FileOutcome::AlreadyPatched,
        Transform::Unchanged => return FileOutcome::Unchanged,
        Transform::Changed(c) => c,
    };

    if dry_run {
        return FileOutcome::WouldPatch;
    }

    let backup = match ensure_backup(&path) {
        Ok(BackupOutcome::Created(_)) => BackupStatus::Created,
        Ok(BackupOutcome::AlreadyExists(_)) => BackupStatus::AlreadyExists,
        Err(e) => BackupStatus::Failed(e.to_string()),
    };

    if let Err(e) = atomic_write(&path, new_content.as_bytes()) {
        return FileOutcome::Failed {
            reason: StepError::Write(e).to_string(),
        };
    }

    // Touch so incremental builds recompile the patched file. Best-effort.
    let _ = filetime::set_file_mtime(&path, filetime::FileTime::now());

    FileOutcome::Patched { backup }
}

/// Atomic write: tempfile in the same directory + fsync + rename, so either
/// the full new content lands or the file is untouched.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::backup_path;
    use crate::target::sd_patch_targets;
    use tempfile::TempDir;

    fn fake_library() -> (TempDir, BuildEnv) {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("libdeps").join("teensy41").join("Audio");
        fs::create_dir_all(&lib).unwrap();

        fs::write(lib.join("play_sd_raw.cpp"), "void play_raw() {}\n").unwrap();
        fs::write(lib.join("play_sd_wav.cpp"), "void play_wav() {}\n").unwrap();
        fs::write(lib.join("record_queue.cpp"), "void record() {}\n").unwrap();
        fs::write(
            lib.join("Audio.h"),
            format!(
                "#include \"mixer.h\"\n{}\n#include \"synth_sine.h\"\n",
                crate::target::AUDIO_H_SD_INCLUDES
            ),
        )
        .unwrap();
        fs::write(lib.join("mixer.cpp"), "void mix() {}\n").unwrap();

        let env = BuildEnv::new(vec![lib]);
        (dir, env)
    }

    #[test]
    fn test_patch_then_repatch_is_idempotent() {
        let (_dir, env) = fake_library();
        let guard = GuardSpec::no_sd_card();
        let targets = sd_patch_targets();

        let first = patch_library(&env, &guard, &targets);
        assert!(first.library_found());
        assert_eq!(first.patched_count(), 4);
        assert_eq!(first.failed_count(), 0);

        let lib = first.library_dir.clone().unwrap();
        let raw = fs::read_to_string(lib.join("play_sd_raw.cpp")).unwrap();
        assert_eq!(raw.matches("#ifndef NO_SD_CARD").count(), 1);
        assert_eq!(
            fs::read_to_string(backup_path(&lib.join("play_sd_raw.cpp"))).unwrap(),
            "void play_raw() {}\n"
        );

        let second = patch_library(&env, &guard, &targets);
        assert_eq!(second.patched_count(), 0);
        assert_eq!(second.already_patched_count(), 4);
        // Content and backup untouched by the second run.
        assert_eq!(
            fs::read_to_string(lib.join("play_sd_raw.cpp")).unwrap(),
            raw
        );
        assert_eq!(
            fs::read_to_string(backup_path(&lib.join("play_sd_raw.cpp"))).unwrap(),
            "void play_raw() {}\n"
        );
    }

    #[test]
    fn test_missing_library_is_a_noop() {
        let env = BuildEnv::new(vec![PathBuf::from("/no/such/libdeps/Audio")]);
        let report = patch_library(&env, &GuardSpec::no_sd_card(), &sd_patch_targets());
        assert!(!report.library_found());
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_missing_target_file_is_skipped_without_writes() {
        let (_dir, env) = fake_library();
        let lib = env.locate_library().unwrap();
        fs::remove_file(lib.join("record_queue.cpp")).unwrap();

        let listing_before: Vec<_> = fs::read_dir(&lib)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        let report = patch_library(
            &env,
            &GuardSpec::no_sd_card(),
            &[PatchTarget::wrap("record_queue.cpp")],
        );

        assert_eq!(report.files[0].outcome, FileOutcome::NotFound);
        let listing_after: Vec<_> = fs::read_dir(&lib)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(listing_before, listing_after);
    }

    #[test]
    fn test_check_mode_writes_nothing() {
        let (_dir, env) = fake_library();
        let lib = env.locate_library().unwrap();

        let report = check_library(&env, &GuardSpec::no_sd_card(), &sd_patch_targets());

        assert_eq!(report.patched_count(), 4);
        for r in &report.files {
            assert_eq!(r.outcome, FileOutcome::WouldPatch);
        }
        assert_eq!(
            fs::read_to_string(lib.join("play_sd_raw.cpp")).unwrap(),
            "void play_raw() {}\n"
        );
        assert!(!backup_path(&lib.join("play_sd_raw.cpp")).exists());
    }

    #[test]
    fn test_undecodable_bytes_are_substituted_not_fatal() {
        let (_dir, env) = fake_library();
        let lib = env.locate_library().unwrap();
        fs::write(lib.join("play_sd_raw.cpp"), b"void f() {} // \xFF\xFE\n").unwrap();

        let report = patch_library(
            &env,
            &GuardSpec::no_sd_card(),
            &[PatchTarget::wrap("play_sd_raw.cpp")],
        );

        assert!(matches!(
            report.files[0].outcome,
            FileOutcome::Patched { .. }
        ));
        let patched = fs::read_to_string(lib.join("play_sd_raw.cpp")).unwrap();
        assert!(patched.contains("#ifndef NO_SD_CARD"));
        assert!(patched.contains('\u{FFFD}'));
    }

    #[test]
    fn test_failure_on_one_file_does_not_stop_the_rest() {
        let (_dir, env) = fake_library();
        let lib = env.locate_library().unwrap();
        fs::remove_file(lib.join("play_sd_wav.cpp")).unwrap();

        let report = patch_library(&env, &GuardSpec::no_sd_card(), &sd_patch_targets());

        assert_eq!(report.files.len(), 4);
        assert_eq!(report.files[1].outcome, FileOutcome::NotFound);
        assert_eq!(report.patched_count(), 3);
    }

    #[test]
    fn test_unchanged_header_reports_no_matching_region() {
        let (_dir, env) = fake_library();
        let lib = env.locate_library().unwrap();
        fs::write(lib.join("Audio.h"), "#include \"mixer.h\"\n").unwrap();

        let report = patch_library(
            &env,
            &GuardSpec::no_sd_card(),
            &[PatchTarget::include_block(
                "Audio.h",
                crate::target::AUDIO_H_SD_INCLUDES,
            )],
        );

        assert_eq!(report.files[0].outcome, FileOutcome::Unchanged);
    }
}
