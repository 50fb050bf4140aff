//! Patch targets and the pure content transforms behind them.
//!
//! A [`PatchTarget`] names one file inside the located library directory and
//! the exact transformation to apply. Transforms are pure (`&str -> Transform`)
//! so they can be tested without touching the filesystem; the hook layer owns
//! reads, backups, and atomic writes.

use crate::guard::GuardSpec;

/// One file to patch and how to patch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    /// File name relative to the located library directory.
    pub filename: String,
    pub kind: TargetKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// Wrap the entire file content in the guard.
    WrapFile,
    /// Insert guard-open after a literal start anchor and guard-close before
    /// a literal end anchor (or at end of file when `close_at_eof` is set).
    Anchored {
        start_anchor: String,
        end_anchor: Option<String>,
        close_at_eof: bool,
    },
    /// Wrap a literal multi-line `#include` block in the guard, leaving the
    /// surrounding includes outside it.
    IncludeBlock { block: String },
}

/// Outcome of applying a transform to in-memory content.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Transform says whether the file needs to be written"]
pub enum Transform {
    /// Content changed; the new content should be written back.
    Changed(String),
    /// Sentinel already present; the file is never re-transformed.
    AlreadyPatched,
    /// No anchor or block matched; nothing to write.
    Unchanged,
}

impl PatchTarget {
    pub fn wrap(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: TargetKind::WrapFile,
        }
    }

    pub fn anchored(
        filename: impl Into<String>,
        start_anchor: impl Into<String>,
        end_anchor: Option<String>,
        close_at_eof: bool,
    ) -> Self {
        Self {
            filename: filename.into(),
            kind: TargetKind::Anchored {
                start_anchor: start_anchor.into(),
                end_anchor,
                close_at_eof,
            },
        }
    }

    pub fn include_block(filename: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: TargetKind::IncludeBlock {
                block: block.into(),
            },
        }
    }

    /// Apply this target's transform to `content`.
    ///
    /// Checks the sentinel first: content in `patched` state is refused
    /// regardless of target kind.
    pub fn apply(&self, guard: &GuardSpec, content: &str) -> Transform {
        if guard.is_patched(content) {
            return Transform::AlreadyPatched;
        }

        match &self.kind {
            TargetKind::WrapFile => Transform::Changed(wrap_whole_file(guard, content)),
            TargetKind::Anchored {
                start_anchor,
                end_anchor,
                close_at_eof,
            } => apply_anchored(guard, content, start_anchor, end_anchor.as_deref(), *close_at_eof),
            TargetKind::IncludeBlock { block } => apply_include_block(guard, content, block),
        }
    }
}

fn wrap_whole_file(guard: &GuardSpec, content: &str) -> String {
    format!(
        "// Patched by nosd-patcher to support {} builds\n{}\n\n{}\n\n{}\n",
        guard.macro_name(),
        guard.open_line(),
        content,
        guard.close_line()
    )
}

fn apply_anchored(
    guard: &GuardSpec,
    content: &str,
    start_anchor: &str,
    end_anchor: Option<&str>,
    close_at_eof: bool,
) -> Transform {
    // The guard-open goes in first. Without it there is nowhere to close:
    // inserting a guard-close on its own would leave an unbalanced #endif,
    // and since the sentinel is the open line, the file would never read as
    // patched and every re-invocation would insert another close.
    if !content.contains(start_anchor) {
        return Transform::Unchanged;
    }

    let open = format!("{}\n{}", start_anchor, guard.open_line());
    let mut out = content.replacen(start_anchor, &open, 1);

    match end_anchor {
        Some(end) if out.contains(end) => {
            let close = format!("{}\n{}", guard.close_line(), end);
            out = out.replacen(end, &close, 1);
        }
        Some(_) => {}
        None if close_at_eof => {
            let close = guard.close_line();
            if !out.trim_end().ends_with(&close) {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&close);
                out.push('\n');
            }
        }
        None => {}
    }

    Transform::Changed(out)
}

fn apply_include_block(guard: &GuardSpec, content: &str, block: &str) -> Transform {
    if !content.contains(block) {
        return Transform::Unchanged;
    }
    let wrapped = format!("{}\n{}\n{}", guard.open_line(), block, guard.close_line());
    Transform::Changed(content.replacen(block, &wrapped, 1))
}

/// The contiguous SD include block inside the Audio library's aggregating
/// `Audio.h` header.
pub const AUDIO_H_SD_INCLUDES: &str = "#include \"play_sd_raw.h\"\n\
#include \"play_sd_wav.h\"\n\
#include \"play_serialflash_raw.h\"\n\
#include \"record_queue.h\"";

/// Default target set: whole-file wraps for the SD source files plus the
/// include-block wrap in `Audio.h`.
pub fn sd_patch_targets() -> Vec<PatchTarget> {
    vec![
        PatchTarget::wrap("play_sd_raw.cpp"),
        PatchTarget::wrap("play_sd_wav.cpp"),
        PatchTarget::wrap("record_queue.cpp"),
        PatchTarget::include_block("Audio.h", AUDIO_H_SD_INCLUDES),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExclusionRule;

    fn guard() -> GuardSpec {
        GuardSpec::no_sd_card()
    }

    #[test]
    fn test_wrap_whole_file_layout() {
        let target = PatchTarget::wrap("play_sd_raw.cpp");
        let out = match target.apply(&guard(), "int x;") {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };

        // In order: guard-open, blank line, body, blank line, guard-close.
        let open_at = out.find("#ifndef NO_SD_CARD").unwrap();
        let body_at = out.find("int x;").unwrap();
        let close_at = out.find("#endif // NO_SD_CARD").unwrap();
        assert!(open_at < body_at && body_at < close_at);
        assert!(out.contains("#ifndef NO_SD_CARD\n\nint x;"));
        assert!(out.contains("int x;\n\n#endif // NO_SD_CARD"));

        // Result scans as patched.
        assert!(guard().is_patched(&out));
    }

    #[test]
    fn test_wrap_refuses_patched_content() {
        let target = PatchTarget::wrap("play_sd_raw.cpp");
        let first = match target.apply(&guard(), "void f();\n") {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };
        assert_eq!(target.apply(&guard(), &first), Transform::AlreadyPatched);
        // Exactly one sentinel after a single pass.
        assert_eq!(first.matches("#ifndef NO_SD_CARD").count(), 1);
    }

    #[test]
    fn test_anchored_both_anchors() {
        let target = PatchTarget::anchored(
            "record_queue.h",
            "class AudioRecordQueue {",
            Some("}; // AudioRecordQueue".to_string()),
            false,
        );
        let content = "#pragma once\nclass AudioRecordQueue {\nint q;\n}; // AudioRecordQueue\n";
        let out = match target.apply(&guard(), content) {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };

        // Start anchor immediately followed by guard-open, end anchor
        // immediately preceded by guard-close.
        assert!(out.contains("class AudioRecordQueue {\n#ifndef NO_SD_CARD"));
        assert!(out.contains("#endif // NO_SD_CARD\n}; // AudioRecordQueue"));
        // Content outside the anchors is untouched.
        assert!(out.starts_with("#pragma once\n"));
        assert!(out.contains("\nint q;\n"));
    }

    #[test]
    fn test_anchored_close_at_eof() {
        let target = PatchTarget::anchored("x.h", "// sd section", None, true);
        let out = match target.apply(&guard(), "int a;\n// sd section\nint b;\n") {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };
        assert!(out.ends_with("#endif // NO_SD_CARD\n"));
        assert_eq!(out.matches("#endif // NO_SD_CARD").count(), 1);
    }

    #[test]
    fn test_anchored_close_at_eof_skips_existing_trailer() {
        let target = PatchTarget::anchored("x.h", "// sd section", None, true);
        // Trailing close already present (but no open sentinel, so the file
        // does not count as patched).
        let content = "// sd section\nint b;\n#endif // NO_SD_CARD\n";
        let out = match target.apply(&guard(), content) {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };
        assert_eq!(out.matches("#endif // NO_SD_CARD").count(), 1);
    }

    #[test]
    fn test_anchored_end_anchor_without_start_is_unchanged() {
        // Only the end anchor is present. Inserting a lone guard-close here
        // would produce an unbalanced #endif and, with no sentinel in the
        // file, every rerun would add another one.
        let target = PatchTarget::anchored(
            "record_queue.h",
            "// begin sd section",
            Some("// end sd section".to_string()),
            false,
        );
        let content = "int a;\n// end sd section\nint b;\n";

        assert_eq!(target.apply(&guard(), content), Transform::Unchanged);
        // A second pass sees the same content and still changes nothing.
        assert_eq!(target.apply(&guard(), content), Transform::Unchanged);
        assert!(!content.contains("#endif"));
    }

    #[test]
    fn test_anchored_missing_anchors_is_unchanged() {
        let target = PatchTarget::anchored("x.h", "// sd section", None, true);
        assert_eq!(
            target.apply(&guard(), "int a;\nint b;\n"),
            Transform::Unchanged
        );
    }

    #[test]
    fn test_include_block_wraps_only_sd_includes() {
        let target = PatchTarget::include_block("Audio.h", AUDIO_H_SD_INCLUDES);
        let content = format!(
            "#include \"play_memory.h\"\n#include \"play_queue.h\"\n{}\n#include \"synth_sine.h\"\n",
            AUDIO_H_SD_INCLUDES
        );
        let out = match target.apply(&guard(), &content) {
            Transform::Changed(s) => s,
            other => panic!("expected Changed, got {other:?}"),
        };

        assert!(out.starts_with("#include \"play_memory.h\"\n"));
        assert!(out.contains("#ifndef NO_SD_CARD\n#include \"play_sd_raw.h\""));
        assert!(out.contains("#include \"record_queue.h\"\n#endif // NO_SD_CARD"));
        // Non-SD includes stay outside the guard.
        let open_at = out.find("#ifndef NO_SD_CARD").unwrap();
        let close_at = out.find("#endif // NO_SD_CARD").unwrap();
        let sine_at = out.find("#include \"synth_sine.h\"").unwrap();
        assert!(out.find("#include \"play_queue.h\"").unwrap() < open_at);
        assert!(sine_at > close_at);
    }

    #[test]
    fn test_include_block_absent_is_unchanged() {
        let target = PatchTarget::include_block("Audio.h", AUDIO_H_SD_INCLUDES);
        assert_eq!(
            target.apply(&guard(), "#include \"mixer.h\"\n"),
            Transform::Unchanged
        );
    }

    /// The exclusion fragments and the patch-target filenames are two
    /// different literal lists describing one feature set. Keep them in sync.
    #[test]
    fn test_exclusion_rule_covers_wrap_targets() {
        let rule = ExclusionRule::sd_card();
        for target in sd_patch_targets() {
            match target.kind {
                TargetKind::WrapFile => {
                    assert!(
                        rule.matches(&target.filename),
                        "wrap target {} not covered by exclusion rule",
                        target.filename
                    );
                }
                // The aggregator header stays in the build; only its SD
                // includes are guarded.
                _ => assert!(!rule.matches(&target.filename)),
            }
        }
    }

    #[test]
    fn test_each_fragment_names_a_real_sd_file() {
        let rule = ExclusionRule::sd_card();
        // Canonical SD-feature files of the Audio library.
        let sd_files = [
            "play_sd_raw.cpp",
            "play_sd_wav.cpp",
            "record_queue.cpp",
            "play_serialflash_raw.cpp",
            "record_serialflash.cpp",
        ];
        for fragment in rule.fragments() {
            assert!(
                sd_files.iter().any(|f| f.contains(fragment.as_str())),
                "fragment {fragment} matches no known SD file"
            );
        }
    }
}
