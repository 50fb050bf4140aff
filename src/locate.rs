//! Build-environment configuration and library directory resolution.
//!
//! The build environment is an explicit record passed into each entry point
//! rather than read from ambient process state, so everything stays testable
//! without a live build host. Library location is recomputed per invocation
//! and never cached across builds.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read-only inputs from the host build configuration.
#[derive(Debug, Clone)]
pub struct BuildEnv {
    /// Library/include search paths, e.g. the host's `CPPPATH`.
    pub include_paths: Vec<PathBuf>,
    /// Substring identifying the target library in a search path.
    pub library_fragment: String,
    /// Substring identifying the dependency-installation root.
    pub libdeps_fragment: String,
}

impl BuildEnv {
    /// Environment targeting the vendored Audio library.
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            include_paths,
            library_fragment: "Audio".to_string(),
            libdeps_fragment: "libdeps".to_string(),
        }
    }

    pub fn with_fragments(
        include_paths: Vec<PathBuf>,
        library_fragment: impl Into<String>,
        libdeps_fragment: impl Into<String>,
    ) -> Self {
        Self {
            include_paths,
            library_fragment: library_fragment.into(),
            libdeps_fragment: libdeps_fragment.into(),
        }
    }

    /// Environment pinned to one explicit library directory, bypassing the
    /// fragment matching. Used when the caller already knows where the
    /// library lives.
    pub fn for_directory(dir: impl Into<PathBuf>) -> Self {
        Self::with_fragments(vec![dir.into()], "", "")
    }

    /// Build the search-path list by scanning a PlatformIO project's
    /// `.pio/libdeps` tree (one directory per environment, one per library).
    pub fn from_project_dir(project: &Path) -> Self {
        let libdeps = project.join(".pio").join("libdeps");
        let mut include_paths = Vec::new();

        for entry in WalkDir::new(&libdeps)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_dir() {
                include_paths.push(entry.path().to_path_buf());
            }
        }
        include_paths.sort();

        Self::new(include_paths)
    }

    /// Resolve the target library's directory, or `None` when it is not
    /// installed yet (a legitimate state on the first build before the
    /// dependency fetch).
    pub fn locate_library(&self) -> Option<PathBuf> {
        for path in &self.include_paths {
            let text = path.to_string_lossy();
            if text.contains(self.library_fragment.as_str())
                && text.contains(self.libdeps_fragment.as_str())
                && path.is_dir()
            {
                return Some(path.clone());
            }
        }
        None
    }
}
