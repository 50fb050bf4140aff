use std::path::Path;

/// Membership test for the excluded feature set: a path matches if it
/// contains any configured fragment as a literal, case-sensitive substring.
///
/// Deliberately not glob/regex and not token-boundary-aware. A fragment like
/// `record_queue` also matches `record_queued.cpp`; that looseness is part of
/// the contract and pinned by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRule {
    fragments: Vec<String>,
}

impl ExclusionRule {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    /// The SD-card feature set of the Teensy Audio library.
    pub fn sd_card() -> Self {
        Self::new([
            "play_sd_",
            "record_queue",
            "play_serialflash",
            "record_serialflash",
        ])
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Total and side-effect free; safe to call from hot enumeration paths.
    pub fn matches(&self, path: &str) -> bool {
        self.fragments.iter().any(|f| path.contains(f.as_str()))
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        self.matches(&path.to_string_lossy())
    }
}
