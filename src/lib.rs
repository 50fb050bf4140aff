//! nosd-patcher: build-time SD-card exclusion for a vendored Audio library.
//!
//! Two decision layers share one exclusion definition:
//!
//! - [`SourceFilter`] removes SD-card source files from the build's
//!   source-file enumeration for the Audio library.
//! - [`patch_library`] rewrites the installed library files, wrapping
//!   SD-dependent content in a `#ifndef NO_SD_CARD` guard (whole files,
//!   anchored regions, or the SD `#include` lines of the aggregating
//!   header), with a `.original` backup per file.
//!
//! # Safety
//!
//! - Sentinel-based idempotency: a file containing the guard-open token is
//!   never re-transformed
//! - Backups are created at most once and never overwritten
//! - Atomic file writes (tempfile + fsync + rename)
//! - Hook entry points never propagate failures to the host build; they
//!   return per-file outcome reports
//!
//! # Example
//!
//! ```no_run
//! use nosd_patcher::{patch_library, sd_patch_targets, BuildEnv, GuardSpec};
//! use std::path::PathBuf;
//!
//! let env = BuildEnv::new(vec![PathBuf::from(".pio/libdeps/teensy41/Audio")]);
//! let report = patch_library(&env, &GuardSpec::no_sd_card(), &sd_patch_targets());
//! for file in &report.files {
//!     println!("{}: {}", file.filename, file.outcome);
//! }
//! ```

pub mod backup;
pub mod config;
pub mod exclude;
pub mod filter;
pub mod guard;
pub mod hook;
pub mod locate;
pub mod target;

// Re-exports
pub use backup::{backup_path, ensure_backup, restore_backup, BackupOutcome, RestoreOutcome};
pub use config::{load_from_path, load_from_str, ConfigError, TargetSetConfig};
pub use exclude::ExclusionRule;
pub use filter::{FilterOutcome, SourceFilter};
pub use guard::GuardSpec;
pub use hook::{check_library, patch_library, FileOutcome, FileReport, PatchReport};
pub use locate::BuildEnv;
pub use target::{sd_patch_targets, PatchTarget, TargetKind, Transform};
