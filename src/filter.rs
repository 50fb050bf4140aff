//! Source-list filtering for the build's library source enumeration.
//!
//! Runs after the build system enumerates a library's source files and
//! before it compiles them. The filter never aborts the build: enumeration
//! failures degrade to a no-op outcome that callers can log.

use crate::exclude::ExclusionRule;
use std::fmt;
use std::path::PathBuf;

/// Filters a named library's source list against an exclusion rule.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    /// Library names are matched by case-sensitive substring containment.
    library_fragment: String,
    rule: ExclusionRule,
}

/// Result of one filter invocation.
///
/// Carries the full decision as data so callers (and tests) never have to
/// depend on log text. Counts for the summary line come from
/// [`FilterOutcome::counts`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FilterOutcome carries the filtered source list"]
pub enum FilterOutcome {
    /// Library name did not match; the input list is returned unchanged.
    NotTargetLibrary { sources: Vec<PathBuf> },
    /// Library matched; `kept` preserves the original relative order.
    Filtered {
        kept: Vec<PathBuf>,
        excluded: Vec<PathBuf>,
    },
    /// Enumeration failed; no filtering was performed for this invocation.
    Skipped { reason: String },
}

impl FilterOutcome {
    /// The source list the build should compile, or `None` when filtering
    /// was skipped and the host must keep the list it already had.
    pub fn into_sources(self) -> Option<Vec<PathBuf>> {
        match self {
            FilterOutcome::NotTargetLibrary { sources } => Some(sources),
            FilterOutcome::Filtered { kept, .. } => Some(kept),
            FilterOutcome::Skipped { .. } => None,
        }
    }

    /// `(original_count, filtered_count)` when filtering took place.
    pub fn counts(&self) -> Option<(usize, usize)> {
        match self {
            FilterOutcome::Filtered { kept, excluded } => {
                Some((kept.len() + excluded.len(), kept.len()))
            }
            _ => None,
        }
    }

    /// Base names of excluded entries, for per-file diagnostics.
    pub fn excluded_names(&self) -> Vec<String> {
        match self {
            FilterOutcome::Filtered { excluded, .. } => excluded
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| p.to_string_lossy().into_owned())
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOutcome::NotTargetLibrary { sources } => {
                write!(f, "not a target library, {} sources untouched", sources.len())
            }
            FilterOutcome::Filtered { kept, excluded } => write!(
                f,
                "filtered sources ({}, {})",
                kept.len() + excluded.len(),
                kept.len()
            ),
            FilterOutcome::Skipped { reason } => {
                write!(f, "filtering skipped: {reason}")
            }
        }
    }
}

impl SourceFilter {
    pub fn new(library_fragment: impl Into<String>, rule: ExclusionRule) -> Self {
        Self {
            library_fragment: library_fragment.into(),
            rule,
        }
    }

    /// Filter targeting the vendored Audio library's SD-card files.
    pub fn sd_card() -> Self {
        Self::new("Audio", ExclusionRule::sd_card())
    }

    pub fn rule(&self) -> &ExclusionRule {
        &self.rule
    }

    fn is_target_library(&self, library_name: &str) -> bool {
        library_name.contains(self.library_fragment.as_str())
    }

    /// Filter an already-enumerated source list.
    ///
    /// Order-preserving and idempotent: filtering an already-filtered list
    /// removes zero additional elements.
    pub fn filter(&self, library_name: &str, sources: Vec<PathBuf>) -> FilterOutcome {
        if !self.is_target_library(library_name) {
            return FilterOutcome::NotTargetLibrary { sources };
        }

        let (excluded, kept): (Vec<PathBuf>, Vec<PathBuf>) =
            sources.into_iter().partition(|p| self.rule.matches_path(p));

        FilterOutcome::Filtered { kept, excluded }
    }

    /// Filter sources produced by a fallible enumeration.
    ///
    /// Any enumeration failure is absorbed into a `Skipped` outcome so the
    /// surrounding build hook never raises.
    pub fn filter_enumerated<F, E>(&self, library_name: &str, enumerate: F) -> FilterOutcome
    where
        F: FnOnce() -> Result<Vec<PathBuf>, E>,
        E: fmt::Display,
    {
        match enumerate() {
            Ok(sources) => self.filter(library_name, sources),
            Err(e) => FilterOutcome::Skipped {
                reason: e.to_string(),
            },
        }
    }
}
