//! Target-set definition files.
//!
//! The SD-card set ships built in ([`TargetSetConfig::sd_default`]), but the
//! same engine can patch other vendored libraries from a TOML definition:
//!
//! ```toml
//! [meta]
//! name = "audio-no-sd"
//!
//! [library]
//! name_fragment = "Audio"
//! guard_macro = "NO_SD_CARD"
//! exclude_fragments = ["play_sd_", "record_queue"]
//!
//! [[targets]]
//! file = "play_sd_raw.cpp"
//! kind = "wrap-file"
//! ```

use crate::exclude::ExclusionRule;
use crate::filter::SourceFilter;
use crate::guard::GuardSpec;
use crate::locate::BuildEnv;
use crate::target::{self, PatchTarget, TargetKind};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct TargetSetConfig {
    #[serde(default)]
    pub meta: Metadata,
    pub library: LibrarySpec,
    #[serde(default)]
    pub targets: Vec<TargetDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibrarySpec {
    /// Substring matched against library names and search paths.
    pub name_fragment: String,
    #[serde(default = "default_libdeps_fragment")]
    pub libdeps_fragment: String,
    pub guard_macro: String,
    #[serde(default)]
    pub exclude_fragments: Vec<String>,
}

fn default_libdeps_fragment() -> String {
    "libdeps".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetDefinition {
    pub file: String,
    #[serde(flatten)]
    pub kind: KindSpec,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum KindSpec {
    WrapFile,
    Anchored {
        start_anchor: String,
        #[serde(default)]
        end_anchor: Option<String>,
        #[serde(default)]
        close_at_eof: bool,
    },
    IncludeBlock {
        block: String,
    },
}

impl TargetSetConfig {
    /// The built-in SD-card set for the Teensy Audio library.
    pub fn sd_default() -> Self {
        Self {
            meta: Metadata {
                name: "audio-no-sd".to_string(),
                description: Some(
                    "Exclude SD-card code paths from the Audio library".to_string(),
                ),
            },
            library: LibrarySpec {
                name_fragment: "Audio".to_string(),
                libdeps_fragment: default_libdeps_fragment(),
                guard_macro: "NO_SD_CARD".to_string(),
                exclude_fragments: ExclusionRule::sd_card()
                    .fragments()
                    .to_vec(),
            },
            targets: target::sd_patch_targets()
                .into_iter()
                .map(|t| TargetDefinition {
                    file: t.filename,
                    kind: match t.kind {
                        TargetKind::WrapFile => KindSpec::WrapFile,
                        TargetKind::Anchored {
                            start_anchor,
                            end_anchor,
                            close_at_eof,
                        } => KindSpec::Anchored {
                            start_anchor,
                            end_anchor,
                            close_at_eof,
                        },
                        TargetKind::IncludeBlock { block } => KindSpec::IncludeBlock { block },
                    },
                })
                .collect(),
        }
    }

    pub fn guard(&self) -> GuardSpec {
        GuardSpec::new(&self.library.guard_macro)
    }

    pub fn exclusion_rule(&self) -> ExclusionRule {
        ExclusionRule::new(self.library.exclude_fragments.iter().cloned())
    }

    pub fn source_filter(&self) -> SourceFilter {
        SourceFilter::new(&self.library.name_fragment, self.exclusion_rule())
    }

    pub fn patch_targets(&self) -> Vec<PatchTarget> {
        self.targets
            .iter()
            .map(|t| PatchTarget {
                filename: t.file.clone(),
                kind: match &t.kind {
                    KindSpec::WrapFile => TargetKind::WrapFile,
                    KindSpec::Anchored {
                        start_anchor,
                        end_anchor,
                        close_at_eof,
                    } => TargetKind::Anchored {
                        start_anchor: start_anchor.clone(),
                        end_anchor: end_anchor.clone(),
                        close_at_eof: *close_at_eof,
                    },
                    KindSpec::IncludeBlock { block } => TargetKind::IncludeBlock {
                        block: block.clone(),
                    },
                },
            })
            .collect()
    }

    pub fn build_env(&self, include_paths: Vec<PathBuf>) -> BuildEnv {
        BuildEnv::with_fragments(
            include_paths,
            &self.library.name_fragment,
            &self.library.libdeps_fragment,
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.library.name_fragment.trim().is_empty() {
            issues.push(ValidationIssue::MissingField("library.name_fragment"));
        }
        if self.library.guard_macro.trim().is_empty() {
            issues.push(ValidationIssue::MissingField("library.guard_macro"));
        }
        if self.targets.is_empty() && self.library.exclude_fragments.is_empty() {
            issues.push(ValidationIssue::EmptyTargetSet);
        }
        for fragment in &self.library.exclude_fragments {
            if fragment.is_empty() {
                // An empty fragment is contained in every path.
                issues.push(ValidationIssue::Invalid {
                    file: None,
                    message: "empty exclude fragment matches every source file".to_string(),
                });
            }
        }

        for t in &self.targets {
            if t.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField("targets.file"));
                continue;
            }
            match &t.kind {
                KindSpec::WrapFile => {}
                KindSpec::Anchored {
                    start_anchor,
                    end_anchor,
                    close_at_eof,
                } => {
                    if start_anchor.is_empty() {
                        issues.push(ValidationIssue::Invalid {
                            file: Some(t.file.clone()),
                            message: "anchored target requires a start_anchor".to_string(),
                        });
                    }
                    if end_anchor.is_some() && *close_at_eof {
                        issues.push(ValidationIssue::Invalid {
                            file: Some(t.file.clone()),
                            message: "end_anchor and close_at_eof are mutually exclusive"
                                .to_string(),
                        });
                    }
                }
                KindSpec::IncludeBlock { block } => {
                    if block.trim().is_empty() {
                        issues.push(ValidationIssue::Invalid {
                            file: Some(t.file.clone()),
                            message: "include-block target requires a block".to_string(),
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyTargetSet,
    MissingField(&'static str),
    Invalid {
        file: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTargetSet => {
                write!(f, "target set defines no targets and no exclude fragments")
            }
            ValidationIssue::MissingField(field) => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::Invalid { file, message } => match file {
                Some(file) => write!(f, "target '{file}': {message}"),
                None => write!(f, "{message}"),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read target set from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse target set TOML: {0}")]
    Toml(#[from] toml_edit::de::Error),
    #[error("invalid target set: {0}")]
    Validation(ValidationError),
}

pub fn load_from_str(input: &str) -> Result<TargetSetConfig, ConfigError> {
    let config: TargetSetConfig = toml_edit::de::from_str(input)?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<TargetSetConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents)
}
